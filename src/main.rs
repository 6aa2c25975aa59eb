use agentry::config::CONFIG;
use agentry::db::SessionStore;
use agentry::factory::FactoryResolver;
use agentry::server::{AgentryState, agentry_router};
use agentry::service::spawn_idle_sweeper;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = &*CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        registry_path = %cfg.registry.path.display(),
        loglevel = %cfg.basic.loglevel,
        listen_addr = %cfg.basic.listen_addr,
        listen_port = cfg.basic.listen_port,
        binding_ttl_secs = cfg.relay.binding_ttl_secs,
        idle_expiry_secs = cfg.sessions.idle_expiry_secs
    );

    let registry = agentry::registry::spawn(cfg.registry.path.clone()).await?;
    let sessions = SessionStore::connect(&cfg.basic.database_url).await?;
    let relay = agentry::relay::from_config(&cfg.relay);
    let resolver = Arc::new(FactoryResolver::default());
    let _sweeper = spawn_idle_sweeper(sessions.clone(), &cfg.sessions);

    let state = AgentryState::new(
        registry.clone(),
        resolver,
        sessions,
        relay,
        Arc::from(cfg.basic.api_key.as_str()),
    )?;
    let app = agentry_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    registry.stop();
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
