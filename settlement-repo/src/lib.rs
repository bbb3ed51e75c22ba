//! # Settlement Repository
//!
//! Concrete ledger store implementation (adapter) for the settlement service.
//! This crate provides the SQLite adapter that implements the `LedgerStore` port.

#[cfg(not(feature = "sqlite"))]
compile_error!("Enable the repo feature: `sqlite`.");

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
mod types;


#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepo;

/// Build and initialize a ledger store from a database URL.
///
/// This function:
/// 1. Connects to the database
/// 2. Runs migrations to create tables
/// 3. Returns a ready-to-use `SqliteRepo`
///
/// # Examples
///
/// ```ignore
/// let repo = build_repo("sqlite://settlement.db?mode=rwc").await?;
/// ```
#[cfg(feature = "sqlite")]
pub async fn build_repo(database_url: &str) -> anyhow::Result<SqliteRepo> {
    SqliteRepo::new(database_url).await
}
