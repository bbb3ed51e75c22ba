//! Domain models for the settlement service.

#[macro_use]
mod id;

pub mod amount;
pub mod batch;
pub mod deposit;
pub mod payment;
pub mod settlement;
pub mod split;

pub use amount::Amount;
pub use batch::{
    BatchStatus, BatchTask, BatchTaskId, NewBatchTask, RecipientShare, RunId, RunLease,
};
pub use deposit::{Deposit, DepositId, DepositStatus, NewDeposit};
pub use payment::{Payment, PaymentCounts, PaymentId, PaymentOwner, PaymentStatus};
pub use settlement::{
    DividendPool, MerchantSettlement, NewMerchantSettlement, SettlementId, SettlementStatus,
};
pub use split::{Split, SplitRatios, split};
