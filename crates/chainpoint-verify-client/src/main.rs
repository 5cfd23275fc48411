#![doc = include_str!("../README.md")]

use chainpoint_anchor_verify::cancel_scope;
use chainpoint_verify_client::shutdown::Shutdown;
use chainpoint_verify_client::{run, VerifyArgs};
use clap::{command, Parser};
use tracing::{error, info, subscriber::set_global_default};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verify: VerifyArgs,
    /// Logging level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber_builder =
        tracing_subscriber::fmt::Subscriber::builder().with_env_filter(env_filter);

    let subscriber = subscriber_builder.with_writer(std::io::stderr).finish();
    set_global_default(subscriber).expect("Failed to set subscriber");
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let (handle, cancel) = cancel_scope();
    let shutdown = Shutdown::new(handle);
    tokio::spawn(async move {
        if let Err(err) = shutdown.run().await {
            error!("Failed to install signal handlers: {}", err);
        }
    });

    match run(cli.verify, cancel).await {
        Ok(_) => {
            info!("Chainpoint verifier has exited without errors");
            std::process::exit(0);
        }
        Err(err) => {
            error!("Chainpoint verifier has exited with error: {}", err);
            std::process::exit(1);
        }
    }
}
