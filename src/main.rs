use clap::Parser;
use regwatch::app::App;
use regwatch::cli::Args;
use regwatch::config::Config;
use regwatch::logging::setup_logging;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and set up logging before App::new() so startup logs are
    // never silently dropped.
    let config = Config::from_env().expect("Failed to load config");
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting regwatch"
    );

    let app = App::new(config)
        .await
        .expect("Failed to initialize application");

    app.run(&args).await
}
