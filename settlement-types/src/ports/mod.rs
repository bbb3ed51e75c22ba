//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod gateway;
mod ledger;

pub use gateway::{GatewayAck, GatewayError, GatewayPaymentId, GatewayPaymentRequest, PaymentGateway};
pub use ledger::LedgerStore;
