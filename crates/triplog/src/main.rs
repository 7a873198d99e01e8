//! Triplog - trip logging engine

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use triplog_core::TrackingConfig;
use triplog_server::AppState;
use triplog_session::CsvStore;

#[derive(Parser)]
#[command(name = "triplog")]
#[command(about = "Trip detection and logging for position streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CLI batch/single/replay mode
    Cli {
        /// Pass remaining arguments to triplog-cli
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Launch the HTTP ingestion server
    Serve {
        /// Port to bind to
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,

        /// Default tracking config for new sessions (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also append committed records to this CSV file
        #[arg(long)]
        records_csv: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Cli { args }) => {
            let cli_args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
            run_cli(&cli_args)
        }
        Some(Commands::Serve {
            port,
            host,
            config,
            records_csv,
        }) => run_server(port, &host, config, records_csv),
        None => run_server(8080, "0.0.0.0", None, None),
    }
}

fn run_cli(args: &[&str]) -> anyhow::Result<()> {
    let mut full_args = vec!["triplog-cli"];
    full_args.extend(args);

    match triplog_cli::run_cli_main(&full_args) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("CLI error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_server(
    port: u16,
    host: &str,
    config: Option<PathBuf>,
    records_csv: Option<PathBuf>,
) -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::runtime::Runtime;

    let defaults = match &config {
        Some(path) => TrackingConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => TrackingConfig::default(),
    };
    defaults.validate()?;

    let mut state = AppState::new(defaults);
    if let Some(path) = &records_csv {
        let store = CsvStore::open(path).with_context(|| format!("failed to open {:?}", path))?;
        state = state.with_mirror(Arc::new(store));
    }

    let rt = Runtime::new()?;
    rt.block_on(async {
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        let app = triplog_server::create_router(Arc::new(state));
        println!("listening on http://{}", addr);
        tracing::info!("server started on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    })
}
