//! # Settlement Hex
//!
//! Application service layer and HTTP adapter for the settlement orchestrator.
//!
//! ## Architecture
//!
//! - `admission` - Batch Task Manager (idempotent fan-out admission)
//! - `orchestrator` - per-recipient payment state machine and batch rollup
//! - `aggregator` - read-only status rollup for polling
//! - `service` - application facade used by the inbound adapter
//! - `worker` - durable background dispatch of admitted batches
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! Everything is generic over `L: LedgerStore` and `G: PaymentGateway`, so the
//! SQLite adapter and the HTTP gateway are injected by the binary and replaced
//! by in-memory doubles in tests.

pub mod admission;
pub mod aggregator;
pub mod inbound;
pub mod orchestrator;
pub mod service;
pub mod worker;


pub use admission::BatchTaskManager;
pub use aggregator::StatusAggregator;
pub use orchestrator::SettlementOrchestrator;
pub use service::SettlementService;
pub use worker::DispatchWorker;
