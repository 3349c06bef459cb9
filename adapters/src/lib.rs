//! Resource adapters for the workspace orchestration control plane (C3).
//!
//! Each adapter is a narrow trait plus a default implementation that shells
//! out to, or calls, the concrete external system (docker, a DNS zone file,
//! certbot, postgres, Azure Graph, GitHub, an email transport). The
//! orchestrator crate depends on the traits only; concrete implementations
//! are wired up at the gateway's composition root as `Arc<dyn Trait>`.

pub mod container;
pub mod database;
pub mod dns;
mod docker;
pub mod email;
pub mod error;
pub mod identity;
pub mod repository;
pub mod tls;

pub use container::{ContainerRuntime, ContainerSpec, ContainerStatus, DockerContainerRuntime};
pub use database::{CloneMode, DatabaseCloner, PostgresCloner};
pub use dns::{DnsZone, FileZone};
pub use email::{EmailSender, EmailTransport, FallbackEmailSender, HttpEmailTransport};
pub use error::{AdapterError, Result};
pub use identity::{AppRegistration, AzureIdentityProvider, IdentityProvider};
pub use repository::{GitHubRepositoryHost, RepoInfo, RepositoryHost};
pub use tls::{CertbotCertificates, CertMetadata, DevSelfSignedCertificates, TlsCertificates};
