//! Application state.
//!
//! Grounded on the teacher's `AppState`/`AppStateInner` Arc-wrapped-fields
//! shape (`state.rs`): one cheap-to-clone handle threaded through axum via
//! `Router::with_state`, an inner struct holding the actual store/manager
//! handles.

use std::sync::Arc;

use cp_adapters::EmailSender;
use cp_core::broker::TaskBroker;
use cp_core::store::StateStore;
use cp_orchestrator::PipelineRunner;

use crate::auth::PortalAuthStore;
use crate::config::GatewayConfig;
use crate::idp::IdentityPortalClient;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: StateStore,
    broker: TaskBroker,
    runner: PipelineRunner,
    auth: PortalAuthStore,
    idp: IdentityPortalClient,
    email: Arc<dyn EmailSender>,
    http: reqwest::Client,
    config: GatewayConfig,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: StateStore,
        broker: TaskBroker,
        runner: PipelineRunner,
        auth: PortalAuthStore,
        idp: IdentityPortalClient,
        email: Arc<dyn EmailSender>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                broker,
                runner,
                auth,
                idp,
                email,
                http: reqwest::Client::new(),
                config,
            }),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn broker(&self) -> &TaskBroker {
        &self.inner.broker
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.inner.runner
    }

    pub fn auth(&self) -> &PortalAuthStore {
        &self.inner.auth
    }

    pub fn idp(&self) -> &IdentityPortalClient {
        &self.inner.idp
    }

    pub fn email(&self) -> &Arc<dyn EmailSender> {
        &self.inner.email
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }
}
