//! Lead engine host
//!
//! Wires the stores, services, job queues and recurring tasks together and
//! runs until a shutdown signal arrives. Ticks enqueue work, the queues
//! bound concurrency, and the services do the rest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;

use leadflow_engine::calls::{CallService, SimulatedDialer};
use leadflow_engine::config::{Config, StoreBackend};
use leadflow_engine::lead::{ImportRow, LeadList, LeadService};
use leadflow_engine::marketing::MarketingService;
use leadflow_engine::queue::{self, JobRunner, QueueConfig};
use leadflow_engine::scheduler::{RecurringConfig, RecurringTasks};
use leadflow_engine::store::Stores;
use leadflow_engine::templates;
use leadflow_engine::whatsapp::WhatsAppService;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "engine exited with error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        environment = config.environment.as_str(),
        backend = config.store_backend.as_str(),
        database = %config.database_url_masked(),
        "starting lead engine"
    );

    let stores = match config.store_backend {
        StoreBackend::Memory => Stores::memory(),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let stores = Stores::postgres(url, config.db_max_connections)
                .await
                .context("failed to connect to database")?;
            tracing::info!("database connected");
            stores
        }
    };

    let leads = LeadService::new(stores.leads.clone());
    let calls = CallService::new(
        stores.leads.clone(),
        stores.templates.clone(),
        Arc::new(SimulatedDialer),
    );
    let whatsapp = Arc::new(WhatsAppService::new(
        stores.leads.clone(),
        stores.connections.clone(),
        stores.templates.clone(),
        config.whatsapp_pool_size,
        config.whatsapp_daily_limit,
    ));
    let marketing = MarketingService::new(stores.leads.clone(), stores.templates.clone());

    whatsapp
        .initialize_pool()
        .await
        .context("failed to provision whatsapp pool")?;
    seed_templates(&stores).await?;
    if config.seed_demo_data {
        seed_demo_leads(&leads).await?;
    }

    // Queues own the concurrency; the runner maps jobs to services
    let runner = Arc::new(JobRunner::new(
        calls.clone(),
        (*whatsapp).clone(),
        marketing.clone(),
        leads.clone(),
    ));
    let queue_config = QueueConfig {
        max_deliveries: config.queue_max_deliveries,
        redelivery_delay: Duration::from_secs(config.queue_redelivery_delay_secs),
    };
    let (queue, workers) = queue::start(runner, queue_config);

    let recurring = RecurringConfig {
        call_dispatch_cron: config.call_dispatch_cron.clone(),
        call_dispatch_batch: config.call_dispatch_batch,
        proposal_sweep_cron: config.proposal_sweep_cron.clone(),
        daily_reset_cron: config.daily_reset_cron.clone(),
    };
    let tasks = RecurringTasks::start(recurring, queue.clone(), calls, whatsapp.clone()).await?;

    tracing::info!("lead engine running");
    shutdown_signal().await;

    // Stop the ticks first, then close the queues and drain in-flight jobs
    tasks.shutdown().await?;
    drop(queue);
    workers.join().await;

    tracing::info!("engine shutdown complete");
    Ok(())
}

/// Load the starter templates on first run
async fn seed_templates(stores: &Stores) -> Result<()> {
    if stores.templates.count().await? > 0 {
        return Ok(());
    }
    let starter = templates::starter_set();
    let seeded = starter.len();
    for template in &starter {
        stores
            .templates
            .insert(template)
            .await
            .context("failed to seed message template")?;
    }
    tracing::info!(seeded, "message templates seeded");
    Ok(())
}

/// Import a small demo batch so a fresh engine has something to work
async fn seed_demo_leads(leads: &LeadService) -> Result<()> {
    let rows = vec![
        ImportRow {
            name: "Maria Souza".to_string(),
            cpf: "11122233344".to_string(),
            phones: vec!["+5511999990001".to_string()],
            email: "maria@example.com".to_string(),
            list: Some(LeadList::A),
        },
        ImportRow {
            name: "Joao Lima".to_string(),
            cpf: "22233344455".to_string(),
            phones: vec!["+5511999990002".to_string(), "+5511999990003".to_string()],
            email: String::new(),
            list: None,
        },
        ImportRow {
            name: "Ana Castro".to_string(),
            cpf: "33344455566".to_string(),
            phones: vec!["+5511999990004".to_string()],
            email: "ana@example.com".to_string(),
            list: Some(LeadList::B),
        },
    ];
    let summary = leads
        .import_leads(rows, Some("demo".to_string()))
        .await
        .context("failed to seed demo leads")?;
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "demo leads seeded"
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
