//! cartsync CLI - Drive the cart and order layer from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the guest cart
//! cartsync cart show
//!
//! # Add two mugs to the cart of a signed-in user
//! cartsync --identity session.json cart add mug "Coffee Mug" 12.50 --qty 2
//!
//! # Place an order from a checkout payload
//! cartsync --identity session.json order submit checkout.json
//!
//! # Follow live order updates until Ctrl+C
//! cartsync --identity session.json listen
//! ```
//!
//! # Commands
//!
//! - `cart` - Show and edit the cart
//! - `wishlist` - Show and edit the wishlist
//! - `order` - Submit orders, list history and pending orders
//! - `listen` - Merge pushed order updates into the history

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use cartsync_client::config::ClientConfig;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CommandError, Session};

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Cart and order bookkeeping for one browser profile")]
struct Cli {
    /// JSON session record of the signed-in user (guest when omitted)
    #[arg(long, global = true)]
    identity: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show and edit the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Submit orders and inspect history
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Merge pushed order updates into the history until Ctrl+C
    Listen,
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart with totals
    Show,
    /// Add a product, or increase its quantity
    Add {
        id: String,
        title: String,
        price: Decimal,
        #[arg(short, long, default_value_t = 1)]
        qty: u32,
    },
    /// Set the quantity of a line
    Qty {
        id: String,
        #[arg(allow_negative_numbers = true)]
        qty: i64,
    },
    /// Remove a line
    Remove { id: String },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Print the wishlist
    Show,
    /// Save a product
    Add {
        id: String,
        title: String,
        price: Decimal,
    },
    /// Remove a saved product
    Remove { id: String },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Place an order from a checkout payload file
    Submit { payload: PathBuf },
    /// Print the order history
    History,
    /// Print orders recorded locally as pending
    Pending,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Map tracing levels to Sentry: errors and warnings become events, the rest breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Invalid configuration: {e}");
            }
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync_client=info,cartsync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CommandError> {
    let session = Session::open(config, cli.identity)?;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&session),
            CartAction::Add {
                id,
                title,
                price,
                qty,
            } => commands::cart::add(&session, id, title, price, qty)?,
            CartAction::Qty { id, qty } => commands::cart::set_qty(&session, &id, qty)?,
            CartAction::Remove { id } => commands::cart::remove(&session, &id)?,
            CartAction::Clear => commands::cart::clear(&session)?,
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::wishlist::show(&session),
            WishlistAction::Add { id, title, price } => {
                commands::wishlist::add(&session, id, title, price)?;
            }
            WishlistAction::Remove { id } => commands::wishlist::remove(&session, &id)?,
        },
        Commands::Order { action } => match action {
            OrderAction::Submit { payload } => commands::order::submit(&session, &payload).await?,
            OrderAction::History => commands::order::history(&session),
            OrderAction::Pending => commands::order::pending(&session),
        },
        Commands::Listen => commands::listen::run(&session).await?,
    }
    Ok(())
}
