use temuka::{
    app,
    chat::Hub,
    config::Settings,
    db::Db,
    AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    let db = Db::connect(&settings.database_url).await?;
    tracing::info!("database ready");

    let (hub, hub_task) = Hub::spawn(db.clone(), settings.hub_capacity);

    let app_state = AppState {
        db,
        hub: hub.clone(),
        limits: settings.limits,
    };
    let app = app(app_state, &settings.cors_origin)?;

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "listening");

    let stopping = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "could not listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            // open websockets only close once the hub lets go of them
            if let Err(err) = stopping.shutdown().await {
                tracing::warn!(error = %err, "hub already stopped");
            }
        })
        .await?;

    hub_task.await?;
    hub.drain().await;
    tracing::info!("sessions drained");
    Ok(())
}
