//! # Ledger Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store adapter and the simulated acquiring bank
//! - Create the payment and refund managers
//! - Run one manager operation per invocation and print the result as JSON

mod config;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use acquiring_bank::AcquiringBankSimulator;
use ledger_engine::{PaymentManager, RefundManager};
use ledger_repo::{Repo, build_repo};
use ledger_types::{
    CreatePaymentRequest, CreateRefundRequest, Currency, EngineError, ListParams, MerchantId,
    PaymentId, RefundId, RequestContext,
};

use config::{Config, LogFormat};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author, version, about = "Payment and refund ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Payment operations
    Payment {
        #[command(subcommand)]
        action: PaymentCommands,
    },
    /// Refund operations
    Refund {
        #[command(subcommand)]
        action: RefundCommands,
    },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Submit a new payment (starts Pending)
    Create {
        /// Merchant ID (UUID)
        #[arg(long)]
        merchant: String,
        /// Amount in the smallest currency unit
        #[arg(long)]
        amount: i64,
        /// Currency (USD, EUR, GBP, INR)
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value = "card")]
        method: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Get payment details
    Get {
        /// Payment ID (UUID)
        id: String,
    },
    /// List a merchant's payments, newest first
    List {
        #[arg(long)]
        merchant: String,
        #[arg(long, default_value_t = ListParams::DEFAULT_LIMIT)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Authorize a pending payment with the acquiring bank
    Process {
        /// Payment ID (UUID)
        id: String,
    },
    /// Replace a payment's description
    UpdateDescription {
        /// Payment ID (UUID)
        id: String,
        description: String,
    },
}

#[derive(Subcommand)]
enum RefundCommands {
    /// Raise a refund against a completed payment
    Create {
        /// Payment ID (UUID)
        #[arg(long)]
        payment: String,
        /// Amount in the smallest currency unit
        #[arg(long)]
        amount: i64,
        /// Currency (USD, EUR, GBP, INR)
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Get refund details
    Get {
        /// Refund ID (UUID)
        id: String,
    },
    /// List the refunds of a payment, newest first
    List {
        #[arg(long)]
        payment: String,
        #[arg(long, default_value_t = ListParams::DEFAULT_LIMIT)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Complete a pending refund and debit its payment
    Process {
        /// Refund ID (UUID)
        id: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ledger_engine=debug".into());

    // Records go to stdout; diagnostics stay on stderr.
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn parse_id<T: std::str::FromStr>(kind: &str, s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid {} ID: {}", kind, s))
}

fn parse_currency(s: &str) -> Result<Currency> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Unknown currency: {}. Supported: USD, EUR, GBP, INR", s))
}

/// Keeps the caller-facing classification in the final error message.
fn engine_err(e: EngineError) -> anyhow::Error {
    anyhow::anyhow!(
        "{} [kind={}, retryable={}]",
        e,
        e.kind(),
        e.is_retryable()
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_payment(
    payments: &PaymentManager<Repo, AcquiringBankSimulator>,
    ctx: &RequestContext,
    action: PaymentCommands,
) -> Result<()> {
    match action {
        PaymentCommands::Create {
            merchant,
            amount,
            currency,
            method,
            description,
        } => {
            let req = CreatePaymentRequest {
                merchant_id: parse_id::<MerchantId>("merchant", &merchant)?,
                amount,
                currency: parse_currency(&currency)?,
                payment_method: method,
                description,
            };
            let payment = payments.create(ctx, Some(req)).await.map_err(engine_err)?;
            print_json(&payment)
        }
        PaymentCommands::Get { id } => {
            let id = parse_id::<PaymentId>("payment", &id)?;
            print_json(&payments.get(ctx, id).await.map_err(engine_err)?)
        }
        PaymentCommands::List {
            merchant,
            limit,
            offset,
        } => {
            let merchant_id = parse_id::<MerchantId>("merchant", &merchant)?;
            let listed = payments
                .list(ctx, merchant_id, ListParams::new(limit, offset))
                .await
                .map_err(engine_err)?;
            print_json(&listed)
        }
        PaymentCommands::Process { id } => {
            let id = parse_id::<PaymentId>("payment", &id)?;
            print_json(&payments.process(ctx, id).await.map_err(engine_err)?)
        }
        PaymentCommands::UpdateDescription { id, description } => {
            let id = parse_id::<PaymentId>("payment", &id)?;
            let mut payment = payments.get(ctx, id).await.map_err(engine_err)?;
            payment.description = description;
            let updated = payments
                .update(ctx, Some(payment))
                .await
                .map_err(engine_err)?;
            print_json(&updated)
        }
    }
}

async fn run_refund(
    refunds: &RefundManager<Repo>,
    ctx: &RequestContext,
    action: RefundCommands,
) -> Result<()> {
    match action {
        RefundCommands::Create {
            payment,
            amount,
            currency,
            reason,
        } => {
            let req = CreateRefundRequest {
                payment_id: parse_id::<PaymentId>("payment", &payment)?,
                amount,
                currency: parse_currency(&currency)?,
                reason,
            };
            let refund = refunds.create(ctx, Some(req)).await.map_err(engine_err)?;
            print_json(&refund)
        }
        RefundCommands::Get { id } => {
            let id = parse_id::<RefundId>("refund", &id)?;
            print_json(&refunds.get(ctx, id).await.map_err(engine_err)?)
        }
        RefundCommands::List {
            payment,
            limit,
            offset,
        } => {
            let payment_id = parse_id::<PaymentId>("payment", &payment)?;
            let listed = refunds
                .list(ctx, payment_id, ListParams::new(limit, offset))
                .await
                .map_err(engine_err)?;
            print_json(&listed)
        }
        RefundCommands::Process { id } => {
            let id = parse_id::<RefundId>("refund", &id)?;
            print_json(&refunds.process(ctx, id).await.map_err(engine_err)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::debug!(
        backend = Repo::backend(),
        delay_ms = config.gateway.processing_delay.as_millis() as u64,
        failure_rate = config.gateway.failure_rate,
        "Loaded configuration"
    );

    // Build store (handles connection and migration)
    let store = Arc::new(build_repo(&config.database_url).await?);

    let bank = Arc::new(match config.gateway_seed {
        Some(seed) => AcquiringBankSimulator::with_seed(config.gateway, seed),
        None => AcquiringBankSimulator::new(config.gateway),
    });

    let ctx = RequestContext::with_timeout(config.request_timeout);

    match cli.command {
        Commands::Payment { action } => {
            let payments = PaymentManager::new(store, bank);
            run_payment(&payments, &ctx, action).await
        }
        Commands::Refund { action } => {
            let refunds = RefundManager::new(store);
            run_refund(&refunds, &ctx, action).await
        }
    }
}
