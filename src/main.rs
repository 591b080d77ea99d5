use clap::Parser;
use tracing_subscriber::EnvFilter;

use mailclaw::{app, cli::Cli};

#[tokio::main]
async fn main() {
    // Load .env if present (credentials files are optional by design)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailclaw=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = app::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
