//! Event type routing.

/// Closed set of webhook processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    CheckoutCompleted,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePayment,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::CheckoutCompleted => "checkout_completed",
            ProcessorKind::SubscriptionUpdated => "subscription_updated",
            ProcessorKind::SubscriptionDeleted => "subscription_deleted",
            ProcessorKind::InvoicePayment => "invoice_payment",
        }
    }
}

/// Result of running one processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// State was written (possibly idempotently re-written).
    Applied,
    /// Recognized no-op; the event is still marked processed.
    Ignored { reason: &'static str },
}

impl ProcessOutcome {
    pub fn ignored(reason: &'static str) -> Self {
        ProcessOutcome::Ignored { reason }
    }
}

/// Selects the processor for a provider event type.
///
/// `None` means the event is acknowledged without any effect.
pub fn route(event_type: &str) -> Option<ProcessorKind> {
    match event_type {
        "checkout.session.completed" => Some(ProcessorKind::CheckoutCompleted),
        "customer.subscription.updated" => Some(ProcessorKind::SubscriptionUpdated),
        "customer.subscription.deleted" => Some(ProcessorKind::SubscriptionDeleted),
        "invoice.payment_succeeded" | "invoice.payment_failed" => {
            Some(ProcessorKind::InvoicePayment)
        }
        _ => None,
    }
}
