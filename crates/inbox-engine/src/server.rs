//! # Inbox Server
//!
//! Owns the store, the [`InboxApi`] facade and the periodic assignment loop.
//!
//! ```rust,no_run
//! use inbox_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let mut server = InboxServerBuilder::new()
//!     .with_config(InboxConfig::default())
//!     .with_in_memory_database()
//!     .build()
//!     .await?;
//!
//! server.start()?;
//! server.serve("127.0.0.1:8080".parse().map_err(|_| InboxError::configuration("bad address"))?).await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::agent::SYSTEM_ACTOR;
use crate::api::{http, InboxApi};
use crate::config::InboxConfig;
use crate::database::DatabaseManager;
use crate::error::{InboxError, Result};
use crate::integration::{AuditSink, LoggingDispatcher, MessageDispatcher, TracingAuditSink};

pub struct InboxServer {
    api: InboxApi,
    config: InboxConfig,
    assignment_handle: Option<JoinHandle<()>>,
}

impl InboxServer {
    pub fn new(
        db: DatabaseManager,
        config: InboxConfig,
        dispatcher: Arc<dyn MessageDispatcher>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let api = InboxApi::new(db, &config, dispatcher, audit);
        Self {
            api,
            config,
            assignment_handle: None,
        }
    }

    /// Start background work (the periodic assignment loop, when enabled)
    pub fn start(&mut self) -> Result<()> {
        if self.assignment_handle.is_some() {
            return Err(InboxError::conflict("server already started"));
        }

        if !self.config.assignment.periodic_enabled {
            info!("Periodic assignment disabled; queues are assigned on request only");
            return Ok(());
        }

        let api = self.api.clone();
        let period = Duration::from_millis(self.config.assignment.interval_ms);
        self.assignment_handle = Some(tokio::spawn(async move {
            Self::assignment_loop(api, period).await;
        }));
        info!("✅ Started periodic assignment every {:?}", period);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("🛑 Stopping inbox server...");
        if let Some(handle) = self.assignment_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("✅ Inbox server stopped");
        Ok(())
    }

    /// Serve HTTP until the listener fails
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| InboxError::configuration(format!("cannot bind {}: {}", addr, e)))?;
        info!("🌐 {} listening on http://{}", self.config.general.service_name, addr);

        axum::serve(listener, http::router(self.api.clone()))
            .await
            .map_err(|e| InboxError::internal(format!("http server: {}", e)))
    }

    /// Serve HTTP until `shutdown` completes
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| InboxError::configuration(format!("cannot bind {}: {}", addr, e)))?;
        info!("🌐 {} listening on http://{}", self.config.general.service_name, addr);

        axum::serve(listener, http::router(self.api.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| InboxError::internal(format!("http server: {}", e)))
    }

    pub fn api(&self) -> &InboxApi {
        &self.api
    }

    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.assignment_handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// One assignment pass over every tenant with automatic assignment enabled
    pub async fn run_assignment_pass(api: &InboxApi) -> Result<usize> {
        let mut total = 0;
        for tenant_id in api.database().tenants_with_enabled_assignment().await? {
            match api.engine().assign_queue(&tenant_id, None, SYSTEM_ACTOR).await {
                Ok(summary) => total += summary.assigned,
                Err(e) => error!("Assignment pass failed for tenant {}: {}", tenant_id, e),
            }
        }
        Ok(total)
    }

    async fn assignment_loop(api: InboxApi, period: Duration) {
        info!("🔄 Starting assignment loop");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match Self::run_assignment_pass(&api).await {
                Ok(0) => {}
                Ok(assigned) => debug!("Assignment pass placed {} session(s)", assigned),
                Err(e) => error!("Assignment pass failed: {}", e),
            }
        }
    }
}

/// Builder for [`InboxServer`]
pub struct InboxServerBuilder {
    config: Option<InboxConfig>,
    database_url: Option<String>,
    in_memory: bool,
    dispatcher: Option<Arc<dyn MessageDispatcher>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl InboxServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            database_url: None,
            in_memory: false,
            dispatcher: None,
            audit: None,
        }
    }

    pub fn with_config(mut self, config: InboxConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the configured database url
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self.in_memory = false;
        self
    }

    pub fn with_in_memory_database(mut self) -> Self {
        self.in_memory = true;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn MessageDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub async fn build(self) -> Result<InboxServer> {
        let mut config = self
            .config
            .ok_or_else(|| InboxError::configuration("Configuration not provided"))?;
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        config.validate()?;

        let db = if self.in_memory {
            DatabaseManager::new_in_memory().await?
        } else {
            DatabaseManager::with_config(&config.database).await?
        };

        let dispatcher = self.dispatcher.unwrap_or_else(|| Arc::new(LoggingDispatcher) as Arc<dyn MessageDispatcher>);
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink) as Arc<dyn AuditSink>);

        info!("🚀 Inbox engine initialized ({})", config.general.service_name);
        Ok(InboxServer::new(db, config, dispatcher, audit))
    }
}

impl Default for InboxServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
