//! Domain layer - Core business logic.
//!
//! Pure types and rules with no I/O. Adapters and handlers depend on this
//! module, never the other way round.

pub mod billing;
pub mod foundation;
