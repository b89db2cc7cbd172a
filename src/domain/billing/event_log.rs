//! Inbound event log.
//!
//! Every delivered provider event is recorded under its event id. A record
//! is never deleted; redelivery resets it to `Pending` so the pipeline can
//! run it again.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLogStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl EventLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLogStatus::Pending => "pending",
            EventLogStatus::Processing => "processing",
            EventLogStatus::Processed => "processed",
            EventLogStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventLogStatus::Pending),
            "processing" => Some(EventLogStatus::Processing),
            "processed" => Some(EventLogStatus::Processed),
            "failed" => Some(EventLogStatus::Failed),
            _ => None,
        }
    }

    /// Processed and failed are terminal for a single attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventLogStatus::Processed | EventLogStatus::Failed)
    }
}

/// Durable record of one provider event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: EventLogStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<Timestamp>,
    pub attempts: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl EventLogRecord {
    /// Creates a record in `Pending`.
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            status: EventLogStatus::Pending,
            error_message: None,
            processed_at: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Prepares an existing record for another run.
    pub fn reset_for_redelivery(&mut self, event_type: &str, payload: serde_json::Value) {
        self.event_type = event_type.to_string();
        self.payload = payload;
        self.status = EventLogStatus::Pending;
        self.error_message = None;
        self.processed_at = None;
        self.updated_at = Timestamp::now();
    }

    pub fn mark_processing(&mut self) {
        self.status = EventLogStatus::Processing;
        self.attempts += 1;
        self.updated_at = Timestamp::now();
    }

    pub fn mark_processed(&mut self) {
        let now = Timestamp::now();
        self.status = EventLogStatus::Processed;
        self.error_message = None;
        self.processed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = EventLogStatus::Failed;
        self.error_message = Some(reason.into());
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_is_pending() {
        let record = EventLogRecord::new("evt_1", "invoice.payment_succeeded", json!({}));
        assert_eq!(record.status, EventLogStatus::Pending);
        assert_eq!(record.attempts, 0);
    }

    #[test]
    fn failed_record_resets_on_redelivery() {
        let mut record = EventLogRecord::new("evt_1", "x", json!({}));
        record.mark_processing();
        record.mark_failed("db down");
        assert_eq!(record.status, EventLogStatus::Failed);

        record.reset_for_redelivery("x", json!({"again": true}));
        assert_eq!(record.status, EventLogStatus::Pending);
        assert!(record.error_message.is_none());
        assert!(record.processed_at.is_none());
        assert_eq!(record.payload["again"], json!(true));
        assert_eq!(record.attempts, 1);
    }

    #[test]
    fn processed_sets_timestamp_and_clears_error() {
        let mut record = EventLogRecord::new("evt_1", "x", json!({}));
        record.mark_failed("boom");
        record.mark_processed();
        assert!(record.processed_at.is_some());
        assert!(record.error_message.is_none());
        assert!(record.status.is_terminal());
    }

    #[test]
    fn status_parses_its_own_output() {
        for status in [
            EventLogStatus::Pending,
            EventLogStatus::Processing,
            EventLogStatus::Processed,
            EventLogStatus::Failed,
        ] {
            assert_eq!(EventLogStatus::parse(status.as_str()), Some(status));
        }
    }
}
