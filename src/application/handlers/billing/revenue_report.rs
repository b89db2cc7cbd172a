//! RevenueReportHandler - Succeeded ledger amounts per month.

use std::sync::Arc;

use crate::domain::billing::{BillingError, MonthlyRevenue};
use crate::domain::foundation::Timestamp;
use crate::ports::LedgerRepository;

pub const DEFAULT_REVENUE_MONTHS: u32 = 12;
pub const MAX_REVENUE_MONTHS: u32 = 36;

#[derive(Debug, Clone, Default)]
pub struct RevenueReportQuery {
    /// Months to look back from now; absent means `DEFAULT_REVENUE_MONTHS`.
    pub months: Option<u32>,
}

impl RevenueReportQuery {
    fn window(&self) -> u32 {
        self.months
            .unwrap_or(DEFAULT_REVENUE_MONTHS)
            .clamp(1, MAX_REVENUE_MONTHS)
    }
}

pub struct RevenueReportHandler {
    ledger: Arc<dyn LedgerRepository>,
}

impl RevenueReportHandler {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        query: RevenueReportQuery,
    ) -> Result<Vec<MonthlyRevenue>, BillingError> {
        let since = Timestamp::now().minus_months(query.window());
        let report = self.ledger.monthly_revenue(since).await?;
        Ok(report)
    }
}
