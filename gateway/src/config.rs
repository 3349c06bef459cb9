//! Environment-sourced configuration.
//!
//! Grounded on the teacher's scattered `std::env::var` reads in
//! `state.rs`/`main.rs`; collected here into one struct read once at
//! bootstrap, matching spec.md §6's "CLI / env" surface (domain, port,
//! shared network name, host project path, IdP credentials/authority,
//! agent image name).

use std::path::PathBuf;

const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-me";

pub struct GatewayConfig {
    pub bind_port: u16,
    pub data_dir: PathBuf,
    pub tenants_root: PathBuf,
    pub base_domain: String,
    pub docker_network: String,
    pub kanban_image: String,
    pub agent_image: String,
    pub reserved_slugs: Vec<String>,
    pub orchestrator_workers: usize,

    pub jwt_secret: String,
    pub jwt_secret_is_default: bool,
    pub access_token_ttl_hours: i64,

    pub idp_authority: Option<String>,
    pub idp_client_id: Option<String>,
    pub idp_client_secret: Option<String>,
    pub idp_tenant_id: String,

    pub tls_mode: TlsMode,
    pub certbot_container: String,

    /// Graph client-credentials client used to provision per-workspace app
    /// registrations; distinct from `idp_client_id`/`idp_client_secret`,
    /// which authenticate the portal login flow.
    pub azure_client_id: Option<String>,
    pub azure_client_secret: Option<String>,
    pub azure_ciam_authority: Option<String>,

    pub github_token: Option<String>,
    pub github_owner: String,
    pub github_template_repo: String,

    pub postgres_user: String,
    pub postgres_password: String,
    pub dump_dir: PathBuf,

    pub zone_file: PathBuf,

    pub smtp_endpoint: Option<String>,
    pub smtp_api_key: Option<String>,

    pub agent_driver_kind: AgentDriverKind,
    pub agent_driver_command: String,
    pub agent_driver_http_endpoint: Option<String>,
    pub agent_driver_http_bearer: Option<String>,
    pub agent_driver_ssh_host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentDriverKind {
    Local,
    Ssh,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    DevSelfSigned,
    Certbot,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("CP_JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());
        let jwt_secret_is_default = jwt_secret == DEFAULT_JWT_SECRET;
        if jwt_secret_is_default {
            tracing::warn!("CP_JWT_SECRET not set, using an insecure development default");
        }

        Self {
            bind_port: std::env::var("CP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("CP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/control-plane")),
            tenants_root: std::env::var("CP_TENANTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/teams")),
            base_domain: std::env::var("CP_BASE_DOMAIN").unwrap_or_else(|_| "kanban.example.com".to_string()),
            docker_network: std::env::var("CP_DOCKER_NETWORK").unwrap_or_else(|_| "kanban-net".to_string()),
            kanban_image: std::env::var("CP_KANBAN_IMAGE").unwrap_or_else(|_| "kanban-app:latest".to_string()),
            agent_image: std::env::var("CP_AGENT_IMAGE").unwrap_or_else(|_| "kanban-agent:latest".to_string()),
            reserved_slugs: std::env::var("CP_RESERVED_SLUGS")
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_else(|_| vec!["app".to_string(), "api".to_string(), "www".to_string()]),
            orchestrator_workers: std::env::var("CP_ORCHESTRATOR_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),

            jwt_secret,
            jwt_secret_is_default,
            access_token_ttl_hours: std::env::var("CP_ACCESS_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),

            idp_authority: std::env::var("CP_IDP_AUTHORITY").ok(),
            idp_client_id: std::env::var("CP_IDP_CLIENT_ID").ok(),
            idp_client_secret: std::env::var("CP_IDP_CLIENT_SECRET").ok(),
            idp_tenant_id: std::env::var("CP_IDP_TENANT_ID").unwrap_or_else(|_| "common".to_string()),

            tls_mode: match std::env::var("CP_TLS_MODE").as_deref() {
                Ok("certbot") => TlsMode::Certbot,
                _ => TlsMode::DevSelfSigned,
            },
            certbot_container: std::env::var("CP_CERTBOT_CONTAINER").unwrap_or_else(|_| "certbot".to_string()),

            azure_client_id: std::env::var("CP_AZURE_CLIENT_ID").ok(),
            azure_client_secret: std::env::var("CP_AZURE_CLIENT_SECRET").ok(),
            azure_ciam_authority: std::env::var("CP_AZURE_CIAM_AUTHORITY").ok(),

            github_token: std::env::var("CP_GITHUB_TOKEN").ok(),
            github_owner: std::env::var("CP_GITHUB_OWNER").unwrap_or_else(|_| "kanban-saas".to_string()),
            github_template_repo: std::env::var("CP_GITHUB_TEMPLATE_REPO").unwrap_or_else(|_| "kanban-app-template".to_string()),

            postgres_user: std::env::var("CP_POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            postgres_password: std::env::var("CP_POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
            dump_dir: std::env::var("CP_DUMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/control-plane/dumps")),

            zone_file: std::env::var("CP_ZONE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/control-plane/zones/kanban.zone")),

            smtp_endpoint: std::env::var("CP_SMTP_ENDPOINT").ok(),
            smtp_api_key: std::env::var("CP_SMTP_API_KEY").ok(),

            agent_driver_kind: match std::env::var("CP_AGENT_DRIVER").as_deref() {
                Ok("ssh") => AgentDriverKind::Ssh,
                Ok("http") => AgentDriverKind::Http,
                _ => AgentDriverKind::Local,
            },
            agent_driver_command: std::env::var("CP_AGENT_DRIVER_COMMAND").unwrap_or_else(|_| "opencode".to_string()),
            agent_driver_http_endpoint: std::env::var("CP_AGENT_DRIVER_HTTP_ENDPOINT").ok(),
            agent_driver_http_bearer: std::env::var("CP_AGENT_DRIVER_HTTP_BEARER").ok(),
            agent_driver_ssh_host: std::env::var("CP_AGENT_DRIVER_SSH_HOST").ok(),
        }
    }
}
