use clap::Parser;
use cloudram_client_core::telemetry::logging;
use cloudram_client_core::terminal::app;
use cloudram_client_core::terminal::cli::Cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = logging::init(&cli.logging.to_config()) {
        eprintln!("⚠️  logging disabled: {err}");
    }

    if let Err(err) = app::run(cli).await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
