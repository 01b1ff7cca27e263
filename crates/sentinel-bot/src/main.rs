//! Sentinel - position lifecycle monitor entry point.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use sentinel_bot::config::{CONFIG_ENV, DEFAULT_CONFIG_PATH};
use sentinel_bot::{AppConfig, Application};
use sentinel_core::{ChannelName, Direction, InstrumentRef, PositionId, Price, SecurityId, Segment, TradeMode};
use sentinel_position::NewPosition;
use sentinel_telemetry::{init_logging, LogFormat};

/// Sentinel position monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SENTINEL_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor stored positions until Ctrl-C (default)
    Run,
    /// Print stored positions as JSON
    Positions {
        /// Include converted records
        #[arg(long)]
        all: bool,
    },
    /// Search the instrument master by trading symbol
    Search {
        query: String,
    },
    /// Open a position (while `run` is stopped)
    Open {
        /// Display symbol, e.g. "NIFTY 22500 CE"; taken from the master with --atm
        #[arg(required_unless_present = "atm")]
        symbol: Option<String>,
        #[arg(long, required_unless_present = "atm", conflicts_with = "atm")]
        security_id: Option<u32>,
        #[arg(long, default_value = "NSE_FNO")]
        segment: Segment,
        /// Trade the at-the-money option of this index (e.g. NIFTY, BANKNIFTY)
        #[arg(long, requires = "spot", conflicts_with = "symbol")]
        atm: Option<String>,
        /// Index spot used to pick the ATM strike
        #[arg(long, requires = "atm")]
        spot: Option<Price>,
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        quantity: u32,
        /// Risk distance in price points
        #[arg(long)]
        risk: Decimal,
        /// Entry price; the current quote is used when omitted
        #[arg(long)]
        entry: Option<Price>,
        #[arg(long, default_value = "PAPER")]
        mode: TradeMode,
        /// Requested channel; defaults to the free channel
        #[arg(long)]
        channel: Option<String>,
    },
    /// Promote an ACTIVE paper position to live (while `run` is stopped)
    Promote {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogFormat::from_env(), None)?;

    info!("Starting Sentinel v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SENTINEL_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    info!(config_path = %config_path.display(), "Loading configuration");
    let config = AppConfig::load(&config_path)?;
    info!(mode = ?config.mode, "Configuration loaded");

    let free_channel = config.channels.free_channel.clone();
    let app = Application::new(config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => app.run().await?,
        Command::Positions { all } => {
            println!("{}", serde_json::to_string_pretty(&app.positions(all))?);
        }
        Command::Search { query } => {
            let hits = app.search_instruments(&query).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Open {
            symbol,
            security_id,
            segment,
            atm,
            spot,
            direction,
            quantity,
            risk,
            entry,
            mode,
            channel,
        } => {
            let (symbol, instrument) = match (atm, spot, symbol, security_id) {
                (Some(index), Some(spot), _, _) => {
                    let option = app.resolve_atm(&index, spot, direction).await?;
                    (option.trading_symbol.clone(), option.instrument_ref())
                }
                (None, _, Some(symbol), Some(id)) => {
                    (symbol, InstrumentRef::new(SecurityId::new(id), segment))
                }
                _ => bail!("open needs SYMBOL and --security-id, or --atm with --spot"),
            };
            let id = app
                .open_position(NewPosition {
                    symbol,
                    instrument,
                    direction,
                    quantity,
                    risk_distance: risk,
                    entry_price: entry,
                    mode,
                    channel: channel.map(ChannelName::new).unwrap_or(free_channel),
                })
                .await?;
            println!("{id}");
        }
        Command::Promote { id } => {
            let promotion = app.promote(&PositionId::from_string(id)).await?;
            println!("{} -> {}", promotion.paper_id, promotion.live_id);
        }
    }

    Ok(())
}
