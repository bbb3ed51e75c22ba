//! Settlement CLI
//!
//! Command-line interface for the Settlement API.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use settlement_client::SettlementClient;
use settlement_types::{
    AdmitBatchRequest, Amount, BatchTaskId, ClaimRequest, DepositId, RecipientShare,
    RecordDepositRequest, SettleMerchantRequest,
};

#[derive(Parser)]
#[command(name = "settlement")]
#[command(author, version, about = "Settlement API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the Settlement API
    #[arg(
        long,
        env = "SETTLEMENT_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Batch (fan-out) operations
    Batch {
        #[command(subcommand)]
        action: BatchCommands,
    },
    /// Deposit operations
    Deposit {
        #[command(subcommand)]
        action: DepositCommands,
    },
    /// Settle a merchant deposit
    Settle {
        #[arg(long)]
        deposit_reference: String,
        #[arg(long)]
        merchant: String,
        #[arg(long)]
        merchant_address: String,
        /// Gross amount, up to six decimal places
        #[arg(long)]
        amount: String,
    },
    /// Show a merchant's dividend pool
    Pool {
        /// Merchant ID
        merchant: String,
    },
    /// Reconciliation with the payment network
    Reconcile {
        #[command(subcommand)]
        action: ReconcileCommands,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum BatchCommands {
    /// Admit a fan-out
    Admit {
        /// Idempotency key for the batch
        #[arg(long)]
        external_id: String,
        /// Payout line as ADDRESS=AMOUNT (repeatable, dispatched in order)
        #[arg(long = "recipient", required = true, value_parser = parse_recipient)]
        recipients: Vec<RecipientShare>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        deposit_reference: Option<String>,
    },
    /// Get batch status by task ID
    Status {
        /// Batch task ID (UUID)
        id: String,
    },
    /// Get batch status by external batch ID
    Find {
        external_id: String,
    },
    /// Poll a batch until it reaches a terminal status
    Wait {
        /// Batch task ID (UUID)
        id: String,
        /// Polling interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
    /// Re-drive a batch stuck in processing
    Resume {
        /// Batch task ID (UUID)
        id: String,
    },
}

#[derive(Subcommand)]
enum DepositCommands {
    /// Record a confirmed inbound deposit
    Record {
        #[arg(long)]
        payment_id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        amount: String,
        /// Expiry as RFC 3339 (e.g. 2026-01-01T00:00:00Z)
        #[arg(long)]
        expires_at: DateTime<Utc>,
    },
    /// Get deposit details
    Get {
        /// Deposit ID (UUID)
        id: String,
    },
    /// Refund an expired deposit to its depositor
    Refund {
        /// Deposit ID (UUID)
        id: String,
        /// Calling user; must be the depositor
        #[arg(long)]
        user: String,
    },
    /// Claim an active deposit
    Claim {
        /// Deposit ID (UUID)
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        address: String,
    },
}

#[derive(Subcommand)]
enum ReconcileCommands {
    /// List open network payments and stuck batches, settlements and deposits
    List,
    /// Cancel an open payment at the network
    Cancel {
        /// Payment network identifier
        payment_id: String,
    },
}

fn parse_recipient(s: &str) -> Result<RecipientShare, String> {
    let (address, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDRESS=AMOUNT, got {s:?}"))?;
    let amount: Amount = amount.parse().map_err(|e| format!("{e}"))?;
    Ok(RecipientShare {
        recipient_address: address.trim().to_string(),
        amount,
    })
}

fn parse_amount(s: &str) -> Result<Amount> {
    s.parse()
        .map_err(|e| anyhow::anyhow!("Invalid amount {}: {}", s, e))
}

fn parse_batch_id(s: &str) -> Result<BatchTaskId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid batch task ID: {}", s))
}

fn parse_deposit_id(s: &str) -> Result<DepositId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid deposit ID: {}", s))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = SettlementClient::new(&cli.api_url);

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Batch { action } => match action {
            BatchCommands::Admit {
                external_id,
                recipients,
                user,
                deposit_reference,
            } => {
                let req = AdmitBatchRequest {
                    external_batch_id: external_id,
                    initiating_user_id: user,
                    deposit_reference,
                    recipients,
                    metadata: serde_json::json!({}),
                };
                print_json(&client.admit_batch(&req).await?)?;
            }
            BatchCommands::Status { id } => {
                let id = parse_batch_id(&id)?;
                print_json(&client.get_batch(id).await?)?;
            }
            BatchCommands::Find { external_id } => {
                print_json(&client.get_batch_by_external_id(&external_id).await?)?;
            }
            BatchCommands::Wait { id, interval_ms } => {
                let id = parse_batch_id(&id)?;
                loop {
                    let view = client.get_batch(id).await?;
                    if view.task.status.is_terminal() {
                        print_json(&view)?;
                        break;
                    }
                    eprintln!(
                        "{}: {}/{} payments settled",
                        view.task.status,
                        view.counts.terminal(),
                        view.task.recipient_count
                    );
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
            BatchCommands::Resume { id } => {
                let id = parse_batch_id(&id)?;
                print_json(&client.resume_batch(id).await?)?;
            }
        },

        Commands::Deposit { action } => match action {
            DepositCommands::Record {
                payment_id,
                user,
                address,
                amount,
                expires_at,
            } => {
                let req = RecordDepositRequest {
                    gateway_payment_id: payment_id,
                    depositor_user_id: user,
                    depositor_address: address,
                    amount: parse_amount(&amount)?,
                    expires_at,
                };
                print_json(&client.record_deposit(&req).await?)?;
            }
            DepositCommands::Get { id } => {
                let id = parse_deposit_id(&id)?;
                print_json(&client.get_deposit(id).await?)?;
            }
            DepositCommands::Refund { id, user } => {
                let id = parse_deposit_id(&id)?;
                print_json(&client.refund(id, &user).await?)?;
            }
            DepositCommands::Claim { id, user, address } => {
                let id = parse_deposit_id(&id)?;
                let req = ClaimRequest {
                    claimant_user_id: user,
                    claimant_address: address,
                };
                print_json(&client.claim(id, &req).await?)?;
            }
        },

        Commands::Settle {
            deposit_reference,
            merchant,
            merchant_address,
            amount,
        } => {
            let req = SettleMerchantRequest {
                deposit_reference,
                merchant_id: merchant,
                merchant_address,
                gross_amount: parse_amount(&amount)?,
            };
            print_json(&client.settle_merchant(&req).await?)?;
        }

        Commands::Pool { merchant } => {
            print_json(&client.dividend_pool(&merchant).await?)?;
        }

        Commands::Reconcile { action } => match action {
            ReconcileCommands::List => {
                print_json(&client.reconcile().await?)?;
            }
            ReconcileCommands::Cancel { payment_id } => {
                print_json(&client.cancel_incomplete(&payment_id).await?)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_recipient() {
        let share = parse_recipient("GABC=12.5").unwrap();
        assert_eq!(share.recipient_address, "GABC");
        assert_eq!(share.amount, "12.5".parse::<Amount>().unwrap());
    }

    #[test]
    fn test_parse_recipient_rejects_bad_input() {
        assert!(parse_recipient("GABC").is_err());
        assert!(parse_recipient("GABC=-1").is_err());
        assert!(parse_recipient("GABC=0.0000001").is_err());
    }

    #[test]
    fn test_batch_admit_args() {
        let cli = Cli::try_parse_from([
            "settlement",
            "batch",
            "admit",
            "--external-id",
            "b-1",
            "--recipient",
            "GA=1",
            "--recipient",
            "GB=2.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Batch {
                action: BatchCommands::Admit { recipients, .. },
            } => {
                assert_eq!(recipients.len(), 2);
                assert_eq!(recipients[1].recipient_address, "GB");
            }
            _ => panic!("expected batch admit"),
        }
    }
}
