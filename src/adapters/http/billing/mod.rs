//! Billing HTTP adapter.

mod dto;
mod handlers;
mod routes;

#[cfg(test)]
mod tests;

pub use dto::{ErrorResponse, SuccessResponse};
pub use handlers::{ApiError, BillingAppState, CallerId, STRIPE_SIGNATURE_HEADER, USER_ID_HEADER};
pub use routes::{admin_routes, billing_router, billing_routes, webhook_routes};
