use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gradewatch::config::{FileConfig, load_config};
use gradewatch::extract::HtmlExtractor;
use gradewatch::monitor::{Collaborators, Scheduler, SchedulerOptions};
use gradewatch::notifications::telegram::TelegramNotifier;
use gradewatch::portal::http::HttpPortalClient;
use gradewatch::version::VERSION;

/// How long shutdown waits for an in-flight cycle before giving up on it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "gradewatch", version = VERSION, about = "Watches a student portal and alerts when the posted grade changes")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "gradewatch.toml")]
    config: String,
    /// Run a single check cycle and exit.
    #[arg(long)]
    once: bool,
    /// Directory for the rotating JSON log file.
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "gradewatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    // A missing .env is fine; the config file alone is enough.
    dotenv::dotenv().ok();

    init_logging(&cli.log_dir);
    info!(version = VERSION, "Starting gradewatch...");

    let FileConfig {
        mut monitor,
        http,
        scheduler: scheduler_settings,
    } = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Critical error loading configuration. Exiting.");
            return Err(e.into());
        }
    };
    monitor.apply_overrides(|key| std::env::var(key).ok());

    let collaborators = Collaborators::new(
        Arc::new(HttpPortalClient::new(http)),
        Arc::new(HtmlExtractor),
        Arc::new(TelegramNotifier::new()?),
    );
    let scheduler = Scheduler::new(collaborators, SchedulerOptions::from(&scheduler_settings));

    if cli.once {
        monitor.validate()?;
        let result = scheduler.check_once(&monitor).await;
        println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
        return match result.outcome {
            Ok(value) => {
                let latency_ms = u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX);
                info!(value = %value, latency_ms, "Single check finished.");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
    }

    scheduler.start(monitor)?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping monitoring service.");
    scheduler.stop();

    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.wait_for_cycle())
        .await
        .is_err()
    {
        warn!(grace_seconds = SHUTDOWN_GRACE.as_secs(), "In-flight check cycle did not finish before shutdown.");
    }

    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    Ok(())
}
