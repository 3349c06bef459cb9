//! HTTPS front door for the workspace orchestration control plane.
//!
//! Bootstraps the C1 state store and C2 task broker, wires the C3
//! resource adapters behind the C4 pipeline runner, spawns the
//! provisioning/certificates/agents/notifications worker loops, and
//! serves the C5 REST surface.

mod auth;
mod config;
mod error;
mod idp;
mod proxy;
mod routes;
mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cp_adapters::{
    AzureIdentityProvider, CertbotCertificates, ContainerRuntime, DatabaseCloner,
    DevSelfSignedCertificates, DnsZone, DockerContainerRuntime, EmailSender, FallbackEmailSender,
    FileZone, GitHubRepositoryHost, HttpEmailTransport, IdentityProvider, PostgresCloner,
    RepositoryHost, TlsCertificates,
};
use cp_core::broker::TaskBroker;
use cp_core::store::StateStore;
use cp_orchestrator::{AgentDriver, HttpApiDriver, LocalCliDriver, PipelineDeps, PipelineRunner, SshCliDriver};

use crate::auth::PortalAuthStore;
use crate::config::{AgentDriverKind, GatewayConfig, TlsMode};
use crate::idp::IdentityPortalClient;
use crate::state::AppState;

const QUEUES: &[&str] = &["provisioning", "certificates", "agents", "notifications"];

fn build_agent_driver(config: &GatewayConfig) -> Arc<dyn AgentDriver> {
    match config.agent_driver_kind {
        AgentDriverKind::Local => Arc::new(LocalCliDriver::new(config.agent_driver_command.clone(), Vec::new())),
        AgentDriverKind::Ssh => {
            let host = config.agent_driver_ssh_host.clone().unwrap_or_default();
            Arc::new(SshCliDriver::new(host, config.agent_driver_command.clone()))
        }
        AgentDriverKind::Http => {
            let endpoint = config.agent_driver_http_endpoint.clone().unwrap_or_default();
            Arc::new(HttpApiDriver::new(endpoint, config.agent_driver_http_bearer.clone()))
        }
    }
}

fn build_tls_certificates(config: &GatewayConfig) -> Arc<dyn TlsCertificates> {
    match config.tls_mode {
        TlsMode::DevSelfSigned => Arc::new(DevSelfSignedCertificates::new(config.data_dir.join("certs"))),
        TlsMode::Certbot => Arc::new(CertbotCertificates::new(
            config.certbot_container.clone(),
            std::time::Duration::from_secs(120),
        )),
    }
}

/// Falls back to an unreachable endpoint rather than skipping construction
/// entirely: `FallbackEmailSender` already logs and swallows transport
/// failures, so an unconfigured SMTP endpoint degrades to "emails silently
/// fail" rather than requiring a null-object adapter that doesn't exist.
fn build_email_sender(config: &GatewayConfig) -> Arc<dyn EmailSender> {
    let primary: Box<dyn cp_adapters::EmailTransport> = match (&config.smtp_endpoint, &config.smtp_api_key) {
        (Some(endpoint), Some(api_key)) => Box::new(HttpEmailTransport::new(endpoint.clone(), api_key.clone())),
        _ => {
            tracing::warn!("CP_SMTP_ENDPOINT/CP_SMTP_API_KEY not set, outbound email will fail silently");
            Box::new(HttpEmailTransport::new(String::new(), String::new()))
        }
    };
    Arc::new(FallbackEmailSender::new(primary, None))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cp_gateway=debug,cp_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env();

    let store = StateStore::new(config.data_dir.join("state.json"))
        .await
        .expect("failed to initialize state store");
    let broker = TaskBroker::new();

    let containers: Arc<dyn ContainerRuntime> = Arc::new(DockerContainerRuntime::default());
    let dns: Arc<dyn DnsZone> = Arc::new(FileZone::new(config.zone_file.clone(), std::time::Duration::from_secs(5)));
    let tls = build_tls_certificates(&config);
    let database: Arc<dyn DatabaseCloner> = Arc::new(PostgresCloner::new(
        config.postgres_user.clone(),
        config.postgres_password.clone(),
        config.dump_dir.clone(),
    ));
    let identity: Arc<dyn IdentityProvider> = Arc::new(AzureIdentityProvider::new(
        config.idp_tenant_id.clone(),
        config.azure_client_id.clone().unwrap_or_default(),
        config.azure_client_secret.clone().unwrap_or_default(),
        config.azure_ciam_authority.clone(),
    ));
    let repository: Arc<dyn RepositoryHost> =
        Arc::new(GitHubRepositoryHost::new(config.github_token.clone().unwrap_or_default()));
    let agent_driver = build_agent_driver(&config);

    let deps = PipelineDeps {
        store: store.clone(),
        broker: broker.clone(),
        containers,
        dns,
        tls,
        database,
        identity,
        repository,
        agent_driver,
        base_domain: config.base_domain.clone(),
        tenants_root: config.tenants_root.clone(),
        kanban_image: config.kanban_image.clone(),
        agent_image: config.agent_image.clone(),
        docker_network: config.docker_network.clone(),
        github_owner: config.github_owner.clone(),
    };
    let runner = PipelineRunner::new(deps);

    for queue in QUEUES {
        for _ in 0..config.orchestrator_workers {
            let runner = runner.clone();
            tokio::spawn(runner.run_worker_loop(queue));
        }
    }

    let auth = PortalAuthStore::new(config.jwt_secret.clone(), config.access_token_ttl_hours);
    let idp = IdentityPortalClient::from_config(&config);
    let email = build_email_sender(&config);

    let bind_port = config.bind_port;
    let app_state = AppState::new(store, broker, runner, auth, idp, email, config);

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router())
        .merge(routes::workspaces::router())
        .merge(routes::sandboxes::router())
        .merge(routes::teams::router())
        .merge(routes::tokens::router())
        .merge(routes::tasks::router())
        .merge(routes::webhook::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], bind_port));
    tracing::info!("control plane gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind gateway port");
    axum::serve(listener, app).await.expect("gateway server exited unexpectedly");
}
