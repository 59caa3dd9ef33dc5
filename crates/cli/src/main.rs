//! Haya CLI - Database migrations and operator jobs.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations (and create the session table)
//! haya-cli migrate
//!
//! # Ask for reviews on orders delivered in the last 72 hours
//! haya-cli reviews sweep --hours 72
//!
//! # Add 5 units of a variant
//! haya-cli stock restock -p robe-lin -c Ecru -s M -q 5
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `reviews sweep` - Send review requests for recently delivered orders
//! - `stock restock` - Add units to a variant

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "haya-cli")]
#[command(author, version, about = "Haya CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Review requests
    Reviews {
        #[command(subcommand)]
        action: ReviewsAction,
    },
    /// Stock management
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
}

#[derive(Subcommand)]
enum ReviewsAction {
    /// Send review requests for recently delivered orders
    Sweep {
        /// Look-back window in hours (1-720)
        #[arg(long, default_value_t = haya_storefront::services::reviews::DEFAULT_SWEEP_WINDOW_HOURS)]
        hours: i64,
    },
}

#[derive(Subcommand)]
enum StockAction {
    /// Add units to a variant
    Restock {
        /// Product id
        #[arg(short, long)]
        product: String,

        /// Color name
        #[arg(short, long)]
        color: String,

        /// Size label
        #[arg(short, long)]
        size: String,

        /// Units to add
        #[arg(short, long)]
        quantity: u32,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

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
        Commands::Reviews { action } => match action {
            ReviewsAction::Sweep { hours } => {
                commands::reviews::sweep(hours).await?;
            }
        },
        Commands::Stock { action } => match action {
            StockAction::Restock {
                product,
                color,
                size,
                quantity,
            } => {
                commands::stock::restock(&product, &color, &size, quantity).await?;
            }
        },
    }
    Ok(())
}
