use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pgcet_core::registry::Registry;
use pgcet_notifier::kea::{format_announcements, KeaClient, KEA_URL, LATEST_LIMIT};
use pgcet_notifier::telegram::TelegramClient;
use pgcet_notifier::watch::{CheckOutcome, Watcher};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "notifier")]
#[command(about = "Watch the KEA portal and notify registered users of new announcements")]
struct Cli {
    /// Portal page to scrape
    #[arg(long, default_value = KEA_URL, global = true)]
    url: String,
    /// Request timeout seconds
    #[arg(long, default_value_t = 20, global = true)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WatchArgs {
    /// Registry database directory (shared with the server; only one process may open it)
    #[arg(long, default_value = "./pgcet.db")]
    db: PathBuf,
    /// File holding the last broadcast headline
    #[arg(long, default_value = "./last_kea_update.json")]
    state: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for a new headline on an interval and broadcast it
    Watch {
        #[command(flatten)]
        args: WatchArgs,
        /// Seconds between checks
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
    /// Run a single check
    Check {
        #[command(flatten)]
        args: WatchArgs,
    },
    /// Print the latest announcements
    Latest {
        #[arg(long, default_value_t = LATEST_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let kea = KeaClient::new(&cli.url, Duration::from_secs(cli.timeout_secs))?;

    match cli.command {
        Commands::Watch { args, interval_secs } => {
            let watcher = watcher(kea, args)?;
            tracing::info!(interval_secs, "watching for updates");
            watcher.run(Duration::from_secs(interval_secs.max(1))).await;
            Ok(())
        }
        Commands::Check { args } => {
            match watcher(kea, args)?.check_once().await? {
                CheckOutcome::NoHeadline => println!("no headline found"),
                CheckOutcome::Unchanged => println!("no new updates"),
                CheckOutcome::Notified { delivered, failed } => {
                    println!("new update sent: delivered={delivered} failed={failed}")
                }
            }
            Ok(())
        }
        Commands::Latest { limit } => {
            let latest = kea.latest(limit).await?;
            println!("{}", format_announcements(latest.as_deref()));
            Ok(())
        }
    }
}

fn watcher(kea: KeaClient, args: WatchArgs) -> Result<Watcher> {
    let token = std::env::var("BOT_TOKEN").context("BOT_TOKEN must be set to send notifications")?;
    let telegram = TelegramClient::new(&token)?;
    let registry = Registry::open(&args.db)?;
    Ok(Watcher::new(kea, telegram, registry, args.state))
}
