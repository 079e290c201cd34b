//! Probe registry: owns the interception engine, the context store and the
//! tracer, and attaches the HTTP probes to host objects.
//!
//! # Design Decisions
//! - One engine per agent; attaching the same probe twice is a no-op
//! - Probes disabled in config are never attached
//! - Only URL filters are reloadable; toggling probes needs a restart

use std::sync::Arc;

use crate::aspect::{Interceptable, Interceptor, WrapOutcome};
use crate::config::AgentConfig;
use crate::context::ContextStore;
use crate::http::{HttpClient, HttpServer};
use crate::probes::{FilterSet, InboundProbe, OutboundProbe};
use crate::trace::{Recorder, Tracer};

/// Entry point that instruments clients and servers.
pub struct Agent {
    config: AgentConfig,
    engine: Arc<Interceptor>,
    store: ContextStore,
    tracer: Arc<dyn Tracer>,
    recorder: Option<Arc<Recorder>>,
    inbound: Arc<InboundProbe>,
    outbound: Arc<OutboundProbe>,
}

impl Agent {
    /// Agent reporting to an in-memory [`Recorder`].
    pub fn new(config: &AgentConfig) -> Self {
        let recorder = Arc::new(Recorder::new(config.service_name.clone(), &config.tracer));
        let mut agent = Self::with_tracer(config, recorder.clone());
        agent.recorder = Some(recorder);
        agent
    }

    /// Agent reporting to any tracer.
    pub fn with_tracer(config: &AgentConfig, tracer: Arc<dyn Tracer>) -> Self {
        let engine = Arc::new(Interceptor::new());
        let store = ContextStore::new();
        let filters = Arc::new(FilterSet::new(config.probes.filters.clone()));
        let inbound = Arc::new(InboundProbe::new(
            tracer.clone(),
            store.clone(),
            filters,
            engine.clone(),
        ));
        let outbound = Arc::new(OutboundProbe::new(tracer.clone()));

        tracing::info!(
            service_name = %config.service_name,
            inbound = config.probes.inbound,
            outbound = config.probes.outbound,
            filters = config.probes.filters.len(),
            "Agent initialized"
        );

        Self {
            config: config.clone(),
            engine,
            store,
            tracer,
            recorder: None,
            inbound,
            outbound,
        }
    }

    /// Attach the outbound probe. `None` when outbound probing is disabled.
    ///
    /// The engine remembers every instrumented client until
    /// [`Agent::release`] is called for it; release short-lived clients.
    pub fn instrument_client(&self, client: &HttpClient) -> Option<WrapOutcome> {
        if !self.config.probes.outbound {
            tracing::debug!("Outbound probe disabled, client left as is");
            return None;
        }
        Some(self.outbound.attach(&self.engine, client))
    }

    /// Attach the inbound probe. `None` when inbound probing is disabled.
    ///
    /// Attach before registering the request listener: listeners already
    /// registered are not traced.
    pub fn instrument_server(&self, server: &HttpServer) -> Option<WrapOutcome> {
        if !self.config.probes.inbound {
            tracing::debug!("Inbound probe disabled, server left as is");
            return None;
        }
        Some(self.inbound.attach(server))
    }

    /// Forget the claims held for a client or server that is being dropped.
    pub fn release<T: Interceptable>(&self, target: &T) -> usize {
        self.engine.forget(target.target_id())
    }

    /// Apply a reloaded configuration.
    pub fn apply_config(&self, config: &AgentConfig) {
        self.inbound.filters().replace(config.probes.filters.clone());
        if config.probes.inbound != self.config.probes.inbound
            || config.probes.outbound != self.config.probes.outbound
        {
            tracing::warn!("Probe toggles changed; restart to apply");
        }
    }

    pub fn engine(&self) -> &Interceptor {
        &self.engine
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    /// The in-memory recorder, when the agent was built with [`Agent::new`].
    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_deref()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("service_name", &self.config.service_name)
            .field("engine", &self.engine)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, ServerConfig, UrlFilter};

    #[test]
    fn instruments_once_per_target() {
        let agent = Agent::new(&AgentConfig::default());
        let client = HttpClient::new(&ClientConfig::default());
        let server = HttpServer::new(ServerConfig::default());

        assert_eq!(agent.instrument_client(&client), Some(WrapOutcome::Attached));
        assert_eq!(agent.instrument_client(&client), Some(WrapOutcome::AlreadyAttached));
        assert_eq!(agent.instrument_server(&server), Some(WrapOutcome::Attached));
        assert!(agent.recorder().is_some());
    }

    #[test]
    fn disabled_probes_are_not_attached() {
        let mut config = AgentConfig::default();
        config.probes.inbound = false;
        config.probes.outbound = false;
        let agent = Agent::new(&config);

        assert_eq!(agent.instrument_client(&HttpClient::new(&ClientConfig::default())), None);
        assert_eq!(agent.instrument_server(&HttpServer::new(ServerConfig::default())), None);
    }

    #[test]
    fn reload_replaces_filters() {
        let agent = Agent::new(&AgentConfig::default());
        let mut config = AgentConfig::default();
        config.probes.filters.push(UrlFilter {
            pattern: "/metrics".to_string(),
            to: String::new(),
        });

        agent.apply_config(&config);
        assert_eq!(agent.inbound.filters().apply("/metrics"), None);
    }

    #[test]
    fn released_targets_leave_no_claims() {
        let agent = Agent::new(&AgentConfig::default());
        let server = HttpServer::new(ServerConfig::default());
        agent.instrument_server(&server);
        server.on(crate::http::REQUEST_EVENT, |_, res| {
            res.end("ok");
        });

        for _ in 0..3 {
            let client = HttpClient::new(&ClientConfig::default());
            agent.instrument_client(&client);
            assert_eq!(agent.release(&client), 1);
        }
        assert_eq!(agent.engine().claims(), 2);
        assert_eq!(agent.release(&server), 2);
        assert_eq!(agent.engine().claims(), 0);
    }
}
