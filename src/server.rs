//! Server wiring and lifecycle

use crate::{
    auth::AuthService,
    config::Config,
    connections::{
        BattleNetConnection, ConnectionEndpoints, ConnectionRegistry, ConnectionService,
        RegistryHealthChecker, XboxConnection, build_http_client,
    },
    database::{DatabaseManager, DatabaseManagerImpl},
    error::AppError,
    events::BroadcastEventSink,
    health::HealthService,
    middleware::request_id_middleware,
    routes::{create_connection_routes, create_health_routes},
    shutdown::ShutdownCoordinator,
};
use axum::{Router, extract::DefaultBodyLimit, middleware};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Maximum request body size. Authorize and callback payloads are tiny.
const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub database: Arc<dyn DatabaseManager>,
    pub registry: Arc<ConnectionRegistry>,
    pub connections: Arc<ConnectionService>,
    pub events: Arc<BroadcastEventSink>,
    pub health_service: Arc<HealthService>,
    pub shutdown_coordinator: Arc<ShutdownCoordinator>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        Self::with_endpoints(config, ConnectionEndpoints::default()).await
    }

    /// Build the server with explicit provider endpoints. Tests point
    /// these at local mock servers.
    pub async fn with_endpoints(
        config: Config,
        endpoints: ConnectionEndpoints,
    ) -> Result<Self, AppError> {
        let auth = Arc::new(AuthService::new(&config.auth)?);

        let database_impl = Arc::new(
            DatabaseManagerImpl::new_from_config(&config.database)
                .await
                .map_err(AppError::Database)?,
        );
        let database: Arc<dyn DatabaseManager> = database_impl.clone();

        let http_client = build_http_client(&config.http)?;
        let events = Arc::new(BroadcastEventSink::new(config.events.channel_capacity));

        // Registration order is the order providers are listed and
        // enumerated in error messages.
        let mut registry = ConnectionRegistry::new();
        registry.register(Arc::new(BattleNetConnection::new(
            &config.public_base_url,
            &config.state,
            database.clone(),
            http_client.clone(),
            endpoints.battlenet,
        )));
        registry.register(Arc::new(XboxConnection::new(
            &config.public_base_url,
            &config.state,
            database.clone(),
            http_client.clone(),
            endpoints.xbox,
        )));

        for (id, settings) in &config.connections {
            match registry.get(id) {
                Some(provider) => provider.initialize(settings.clone())?,
                None => warn!("Ignoring settings for unknown connection provider: {}", id),
            }
        }

        let registry = Arc::new(registry);
        let connections = Arc::new(ConnectionService::new(registry.clone(), events.clone()));

        let health_service = Arc::new(HealthService::new());
        health_service.register(database_impl).await;
        health_service
            .register(Arc::new(RegistryHealthChecker::new(registry.clone())))
            .await;

        Ok(Self {
            config: Arc::new(config),
            auth,
            database,
            registry,
            connections,
            events,
            health_service,
            shutdown_coordinator: Arc::new(ShutdownCoordinator::new()),
        })
    }

    pub async fn run(&self) -> Result<(), AppError> {
        if self.config.database.migration_on_startup {
            self.database.migrate().await.map_err(AppError::Database)?;
        }

        let app = self.create_app();

        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid listen address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to address: {e}")))?;

        info!("Server listening on http://{}", addr);

        let signal_coordinator = self.shutdown_coordinator.clone();
        tokio::spawn(async move {
            signal_coordinator.wait_for_shutdown_signal().await;
        });

        let sweeper = tokio::spawn(sweep_expired_states(
            self.registry.clone(),
            self.config.state.sweep_interval_seconds,
            self.shutdown_coordinator.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_coordinator.subscribe();
        let serve_result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
                info!("Graceful shutdown initiated");
            })
            .await;

        if let Err(e) = serve_result {
            error!("Server error: {}", e);
        }

        // The sweeper watches the same shutdown channel and exits on its own
        let _ = sweeper.await;
        info!("Server shutdown complete");

        Ok(())
    }

    pub fn create_app(&self) -> Router {
        Router::new()
            .merge(create_connection_routes(self.clone()))
            .with_state(self.clone())
            .nest(
                "/health",
                create_health_routes().with_state(self.health_service.clone()),
            )
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .layer(middleware::from_fn(request_id_middleware))
    }
}

/// Periodically drop expired state tokens from every provider's store.
async fn sweep_expired_states(
    registry: Arc<ConnectionRegistry>,
    interval_seconds: u64,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for provider in registry.providers() {
                    let removed = provider.states().sweep();
                    if removed > 0 {
                        debug!("Swept {} expired {} state tokens", removed, provider.id());
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("State sweeper stopped");
                return;
            }
        }
    }
}
