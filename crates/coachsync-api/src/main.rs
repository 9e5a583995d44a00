//! coachsync server entry point: HTTP surface plus the outbox dispatcher.

use std::sync::Arc;

use coachsync_airtable::AirtableClient;
use coachsync_api::config::AppConfig;
use coachsync_api::error::AppError;
use coachsync_api::state::AppState;
use coachsync_api::{app, telemetry};
use coachsync_core::clock::{Clock, SystemClock};
use coachsync_core::external::ExternalStore;
use coachsync_core::rng::SystemRng;
use coachsync_outbox::OutboxDispatcher;
use coachsync_reconcile::ReconciliationSweep;
use coachsync_store::{
    PgDeadLetterRepository, PgInboxRepository, PgMappingRepository, PgOutboxRepository,
    PgReplicaRepository, schema,
};
use coachsync_user_sync::UserSync;
use coachsync_writers::AirtableWriter;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting coachsync");

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    schema::run_migrations(&pool)
        .await
        .map_err(sqlx::Error::from)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let external: Arc<dyn ExternalStore> = Arc::new(
        AirtableClient::new(config.airtable.clone())
            .map_err(|e| AppError::Config(e.to_string()))?,
    );
    let outbox = Arc::new(PgOutboxRepository::new(pool.clone()));
    let mappings = Arc::new(PgMappingRepository::new(pool.clone()));
    let replica = Arc::new(PgReplicaRepository::new(pool.clone()));

    let writer = AirtableWriter::new(external.clone(), mappings.clone(), clock.clone());
    let dispatcher = Arc::new(OutboxDispatcher::new(
        outbox,
        Arc::new(writer),
        clock.clone(),
        Box::new(SystemRng),
        config.sync.clone(),
    ));
    let user_sync = UserSync::new(
        external.clone(),
        Arc::new(PgInboxRepository::new(pool.clone())),
        replica.clone(),
        clock.clone(),
        config.webhook_secret.clone(),
    );
    let sweep = ReconciliationSweep::new(external, replica, mappings, clock.clone());
    let app_state = AppState::new(
        clock,
        Arc::new(PgDeadLetterRepository::new(pool)),
        Arc::new(user_sync),
        Arc::new(sweep),
        config.admin_token.clone(),
    );
    if config.admin_token.is_none() {
        tracing::warn!("SYNC_ADMIN_TOKEN is not set, operator endpoints are disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = dispatcher.spawn(&shutdown_rx);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Could not listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Stopping dispatcher");
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Dispatcher tasks already stopped");
    }
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "Dispatcher task failed");
        }
    }
    telemetry.shutdown();

    Ok(())
}
