//! Farmlink CLI - database migrations and billing exports.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! fl-cli migrate
//!
//! # Preview a billing period
//! fl-cli period --month 2026-01 --closing-day 20
//!
//! # Export billing documents as JSON
//! fl-cli invoice --buyer-kind restaurant --buyer-id 3 --month 2026-01
//! fl-cli statement --farmer-id 5 --month 2026-01
//! ```
//!
//! Logs go to stderr so the JSON on stdout can be piped.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use farmlink_core::BuyerKind;
use farmlink_core::billing::TargetMonth;

mod commands;

#[derive(Parser)]
#[command(name = "fl-cli")]
#[command(author, version, about = "Farmlink CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Show the billing period for a month and closing day
    Period {
        /// Billing month (YYYY-MM)
        #[arg(short, long)]
        month: TargetMonth,

        /// Closing day (1-28, or 99 for end of month)
        #[arg(short, long, default_value_t = 99)]
        closing_day: i32,
    },
    /// Export a buyer's monthly invoice as JSON
    Invoice {
        /// `restaurant` or `consumer`
        #[arg(short = 'k', long)]
        buyer_kind: BuyerKind,

        #[arg(short, long)]
        buyer_id: i32,

        /// Billing month (YYYY-MM)
        #[arg(short, long)]
        month: TargetMonth,
    },
    /// Export a farmer's monthly sales statement as JSON
    Statement {
        #[arg(short, long)]
        farmer_id: i32,

        /// Calendar month (YYYY-MM)
        #[arg(short, long)]
        month: TargetMonth,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Period { month, closing_day } => commands::billing::period(month, closing_day)?,
        Commands::Invoice {
            buyer_kind,
            buyer_id,
            month,
        } => commands::billing::invoice(buyer_kind, buyer_id, month).await?,
        Commands::Statement { farmer_id, month } => {
            commands::billing::statement(farmer_id, month).await?;
        }
    }
    Ok(())
}
