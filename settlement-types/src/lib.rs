//! # Settlement Types
//!
//! Domain types and port traits for the settlement orchestrator.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Amount, BatchTask, Payment, Deposit, MerchantSettlement)
//! - `ports/` - Trait definitions that adapters must implement (ledger, gateway)
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Amount, BatchStatus, BatchTask, BatchTaskId, Deposit, DepositId, DepositStatus, DividendPool,
    MerchantSettlement, NewBatchTask, NewDeposit, NewMerchantSettlement, Payment, PaymentCounts,
    PaymentId, PaymentOwner, PaymentStatus, RecipientShare, RunId, RunLease, SettlementId,
    SettlementStatus, Split, SplitRatios, split,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    GatewayAck, GatewayError, GatewayPaymentId, GatewayPaymentRequest, LedgerStore, PaymentGateway,
};
