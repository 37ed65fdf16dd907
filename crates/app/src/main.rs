mod adjustment;
mod console;
mod lifecycle;
mod report;
mod telemetry;
#[cfg(test)]
mod testutil;

use tracing::info;

use staffdb_storage::{ConnectRetry, Database};
use staffdb_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;

    let retry = ConnectRetry {
        max_attempts: config.db_connect_attempts,
        backoff: config.db_connect_backoff,
    };
    let database = Database::connect(&config.database_url, &retry).await?;
    database.run_migrations().await?;

    info!(
        stage = "app",
        env = %config.environment.as_str(),
        policy = config.adjustment_policy.as_str(),
        "staffdb ready"
    );

    let lifecycle = lifecycle::LifecycleService::new(database.clone());
    let adjustment = adjustment::AdjustmentService::new(database.clone(), config.adjustment_policy);
    let reports = report::ReportService::new(database);

    console::run(lifecycle, adjustment, reports).await?;
    Ok(())
}
