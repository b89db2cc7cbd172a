//! Bidirectional mapping between paid plans and provider price ids.

use super::plan::Plan;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceCatalog {
    entries: Vec<(Plan, String)>,
}

impl PriceCatalog {
    pub fn new(standard_price_id: impl Into<String>, premium_price_id: impl Into<String>) -> Self {
        Self::default()
            .with_price(Plan::Standard, standard_price_id)
            .with_price(Plan::Premium, premium_price_id)
    }

    /// Adds or replaces the price of a plan. Empty ids are ignored.
    pub fn with_price(mut self, plan: Plan, price_id: impl Into<String>) -> Self {
        let price_id = price_id.into();
        if price_id.is_empty() {
            return self;
        }
        self.entries.retain(|(p, _)| *p != plan);
        self.entries.push((plan, price_id));
        self
    }

    pub fn price_for(&self, plan: Plan) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| *p == plan)
            .map(|(_, id)| id.as_str())
    }

    pub fn plan_for(&self, price_id: &str) -> Option<Plan> {
        self.entries
            .iter()
            .find(|(_, id)| id == price_id)
            .map(|(p, _)| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_both_directions() {
        let catalog = PriceCatalog::new("price_std", "price_prem");
        assert_eq!(catalog.price_for(Plan::Standard), Some("price_std"));
        assert_eq!(catalog.plan_for("price_prem"), Some(Plan::Premium));
    }

    #[test]
    fn free_has_no_price() {
        let catalog = PriceCatalog::new("price_std", "price_prem");
        assert_eq!(catalog.price_for(Plan::Free), None);
        assert_eq!(catalog.plan_for("price_unknown"), None);
    }

    #[test]
    fn empty_ids_are_skipped() {
        let catalog = PriceCatalog::new("", "price_prem");
        assert_eq!(catalog.price_for(Plan::Standard), None);
    }

    #[test]
    fn with_price_replaces_existing() {
        let catalog = PriceCatalog::new("a", "b").with_price(Plan::Standard, "c");
        assert_eq!(catalog.price_for(Plan::Standard), Some("c"));
        assert_eq!(catalog.plan_for("a"), None);
    }
}
