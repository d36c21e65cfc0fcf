use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::BalancerConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::dispatch::{Backend, Dispatcher, Pool, Selector};
use crate::error::{BalancerError, Result};
use crate::transport::{BackendLink, ClientListener, TcpLink};

/// Wires configuration, backend links, the dispatcher and the listeners
/// into one running service.
pub struct Balancer<L> {
    config: BalancerConfig,
    dispatcher: Arc<Dispatcher<L>>,
}

impl Balancer<TcpLink> {
    /// Validates `config` and opens one connection per backend.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config, or
    /// `BackendUnavailable` if any backend cannot be reached.
    pub async fn connect(config: BalancerConfig) -> Result<Self> {
        config.validate()?;

        let mut links = Vec::with_capacity(config.backends.len());
        for backend in &config.backends {
            let link = TcpLink::connect(backend.endpoint.clone())
                .await
                .map_err(|e| BalancerError::unavailable(backend.endpoint.clone(), e))?;
            links.push(link);
        }

        Self::from_links(config, links)
    }
}

impl<L: BackendLink> Balancer<L> {
    /// Builds the pool from `config.backends` paired, in order, with `links`.
    pub fn from_links(config: BalancerConfig, links: Vec<L>) -> Result<Self> {
        config.validate()?;
        if links.len() != config.backends.len() {
            return Err(BalancerError::Configuration(format!(
                "{} backends configured but {} links supplied",
                config.backends.len(),
                links.len()
            )));
        }

        let backends = config
            .backends
            .iter()
            .zip(links)
            .enumerate()
            .map(|(id, (backend, link))| {
                Backend::new(id, backend.endpoint.clone(), backend.kind, config.cost_unit, link)
            })
            .collect();
        let pool = Pool::new(backends)?;
        let selector = Selector::new(config.policy, config.load_model);
        let dispatcher = Arc::new(Dispatcher::new(pool, selector, config.forward_timeout));

        Ok(Self { config, dispatcher })
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<L>> {
        &self.dispatcher
    }

    /// Binds the configured listen address and serves until `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves clients from an already-bound listener.
    ///
    /// Spawns the dashboard if one is configured, then accepts clients until
    /// `shutdown` fires and in-flight requests have drained.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        if let Some(dashboard_addr) = self.config.dashboard_addr {
            let state = DashboardState {
                source: self.dispatcher.clone(),
            };
            let dashboard_shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_dashboard(dashboard_addr, state, dashboard_shutdown).await;
            });
        }

        let listener =
            ClientListener::new(listener, self.dispatcher.clone(), self.config.client_read_timeout);
        listener.run(shutdown).await;
    }
}
