//! Webhook log queries for operators.

use std::sync::Arc;

use crate::domain::billing::{BillingError, EventLogRecord, EventLogStatus};
use crate::ports::EventLogStore;

pub const DEFAULT_WEBHOOK_PAGE: u32 = 20;
pub const MAX_WEBHOOK_PAGE: u32 = 100;

#[derive(Debug, Clone, Default)]
pub struct ListWebhookEventsQuery {
    pub status: Option<EventLogStatus>,
    pub event_type: Option<String>,
    /// Clamped to `1..=MAX_WEBHOOK_PAGE`; absent means `DEFAULT_WEBHOOK_PAGE`.
    pub limit: Option<u32>,
}

impl ListWebhookEventsQuery {
    fn page_size(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_WEBHOOK_PAGE)
            .clamp(1, MAX_WEBHOOK_PAGE)
    }
}

pub struct ListWebhookEventsHandler {
    events: Arc<dyn EventLogStore>,
}

impl ListWebhookEventsHandler {
    pub fn new(events: Arc<dyn EventLogStore>) -> Self {
        Self { events }
    }

    pub async fn handle(
        &self,
        query: ListWebhookEventsQuery,
    ) -> Result<Vec<EventLogRecord>, BillingError> {
        let records = self
            .events
            .list(query.status, query.event_type.as_deref(), query.page_size())
            .await?;
        Ok(records)
    }
}

pub struct GetWebhookEventHandler {
    events: Arc<dyn EventLogStore>,
}

impl GetWebhookEventHandler {
    pub fn new(events: Arc<dyn EventLogStore>) -> Self {
        Self { events }
    }

    pub async fn handle(&self, event_id: &str) -> Result<EventLogRecord, BillingError> {
        self.events
            .find(event_id)
            .await?
            .ok_or_else(|| BillingError::EventNotFound(event_id.to_string()))
    }
}
