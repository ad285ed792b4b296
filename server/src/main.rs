use anyhow::Result;
use axum::Router;
use clap::Parser;
use pgcet_core::persist::{load_course_tables, TablePaths};
use pgcet_core::registry::Registry;
use pgcet_core::CourseTables;
use pgcet_notifier::kea::{KeaClient, KEA_URL};
use pgcet_notifier::telegram::TelegramClient;
use pgcet_notifier::watch::Watcher;
use pgcet_server::{build_app, bot, AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Registry database directory
    #[arg(long, default_value = "./pgcet.db")]
    db: PathBuf,
    /// Directory holding the cutoff and syllabus PDFs
    #[arg(long, default_value = "./docs")]
    docs: PathBuf,
    /// Rank table directory written by `ranktool build`; bundled datasets are used when absent
    #[arg(long)]
    tables: Option<PathBuf>,
    /// Portal page to read announcements from
    #[arg(long, default_value = KEA_URL)]
    kea_url: String,
    /// Also run the announcement watcher in this process
    #[arg(long, default_value_t = false)]
    watch: bool,
    /// Seconds between announcement checks
    #[arg(long, default_value_t = 3600)]
    interval_secs: u64,
    /// File holding the last broadcast headline
    #[arg(long, default_value = "./last_kea_update.json")]
    state: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let tables = match &args.tables {
        Some(dir) => load_course_tables(&TablePaths::new(dir))?,
        None => CourseTables::bundled(),
    };
    let registry = Registry::open(&args.db)?;
    let kea = KeaClient::new(&args.kea_url, Duration::from_secs(20))?;
    let state = AppState::new(ServerConfig {
        registry: registry.clone(),
        tables,
        docs_dir: args.docs.clone(),
        kea: Some(kea.clone()),
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    });

    let telegram = match std::env::var("BOT_TOKEN") {
        Ok(token) => Some(TelegramClient::new(&token)?),
        Err(_) => {
            tracing::info!("BOT_TOKEN not set; telegram bot and watcher disabled");
            None
        }
    };
    if let Some(telegram) = &telegram {
        tokio::spawn(bot::run(state.clone(), telegram.clone()));
        if args.watch {
            let watcher = Watcher::new(kea, telegram.clone(), registry, args.state.clone());
            let every = Duration::from_secs(args.interval_secs.max(1));
            tokio::spawn(async move { watcher.run(every).await });
        }
    }

    let app: Router = build_app(state);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
