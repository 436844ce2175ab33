use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carryover_worker::{run, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carryover_worker=info,carryover_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        backup = %config.backup_path.display(),
        project_key = %config.project_key,
        overwrite = config.overwrite_details,
        "Loaded worker configuration"
    );

    let summary = run(config).await?;
    tracing::info!(
        issues = summary.issues_created,
        attachments = summary.attachments_created,
        errors = summary.error_count,
        "Worker finished"
    );
    Ok(())
}
