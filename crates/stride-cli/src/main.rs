use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stride_store::PgSourceStore;
use stride_sync::{merge_scholarship_collections, SyncConfig, SyncScheduler, SyncService};
use stride_warehouse::{ensure_schema, BackoffPolicy, HttpWarehouse, HttpWarehouseConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stride-cli")]
#[command(about = "Stride analytics pipeline command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Idempotently provision the warehouse dataset and tables.
    Provision,
    /// Run one full sync (ad-hoc backfill).
    Sync,
    /// Run one incremental sync over the configured window.
    Incremental,
    /// Run one weekly aggregate recompute.
    Weekly,
    /// Run the cron scheduler until interrupted.
    Schedule,
    /// One-shot scholarship catalog consolidation.
    Merge {
        #[arg(long, default_value = "scholarships_legacy")]
        source: String,
        #[arg(long, default_value = "scholarships")]
        target: String,
    },
}

fn warehouse_from(config: &SyncConfig) -> Result<Arc<HttpWarehouse>> {
    let warehouse = HttpWarehouse::new(HttpWarehouseConfig {
        base_url: config.warehouse_url.clone(),
        project: config.warehouse_project.clone(),
        timeout: Duration::from_secs(config.http_timeout_secs),
        backoff: BackoffPolicy::default(),
    })
    .context("building warehouse client")?;
    Ok(Arc::new(warehouse))
}

async fn service_from(config: &SyncConfig) -> Result<Arc<SyncService>> {
    let store = PgSourceStore::connect(&config.database_url)
        .await
        .context("connecting to operational store")?;
    let warehouse = warehouse_from(config)?;
    Ok(Arc::new(
        SyncService::new(Arc::new(store), warehouse, config.warehouse_dataset.clone())
            .with_row_cap(config.full_sync_row_cap),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Provision => {
            let warehouse = warehouse_from(&config)?;
            let report = ensure_schema(warehouse.as_ref(), &config.warehouse_dataset)
                .await
                .context("provisioning schema")?;
            println!(
                "schema provisioned: dataset_created={} tables_created={}",
                report.created_dataset,
                report.created_tables.len()
            );
        }
        Commands::Sync => {
            let service = service_from(&config).await?;
            let run = service.full_sync().await?;
            println!(
                "full sync complete: run_id={} inserted={} duration={:.1}s succeeded={}",
                run.run_id,
                run.total_inserted(),
                run.duration_seconds,
                run.succeeded
            );
        }
        Commands::Incremental => {
            let service = service_from(&config).await?;
            let run = service.incremental_sync(config.incremental_window()).await?;
            println!(
                "incremental sync complete: run_id={} inserted={} duration={:.1}s",
                run.run_id,
                run.total_inserted(),
                run.duration_seconds
            );
        }
        Commands::Weekly => {
            let service = service_from(&config).await?;
            let run = service.weekly_aggregate_sync().await?;
            println!(
                "weekly aggregate complete: run_id={} inserted={}",
                run.run_id,
                run.total_inserted()
            );
        }
        Commands::Schedule => {
            if !config.scheduler_enabled {
                println!("scheduler disabled; set STRIDE_SCHEDULER_ENABLED=1 to enable");
                return Ok(());
            }
            let service = service_from(&config).await?;
            let mut scheduler = SyncScheduler::build(service, &config).await?;
            scheduler.start().await?;
            info!("scheduler running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            scheduler.stop().await?;
        }
        Commands::Merge { source, target } => {
            let store = PgSourceStore::connect(&config.database_url)
                .await
                .context("connecting to operational store")?;
            let report = merge_scholarship_collections(&store, &source, &target).await?;
            println!(
                "merge complete: scanned={} inserted={} updated={}",
                report.scanned, report.inserted, report.updated
            );
        }
    }

    Ok(())
}
