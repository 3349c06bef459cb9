//! C3 `TlsCertificates` adapter — dev self-signed vs prod ACME-via-certbot.
//!
//! The prod path is grounded on `certificate_service.py`: certificates live
//! under `/etc/letsencrypt/live/{fqdn}` inside a certbot container, reached
//! through `docker exec`, with existence checked via `test -f fullchain.pem`
//! and revocation either `certbot revoke` or a plain directory delete in
//! development. The dev path replaces that container dependency with a
//! local `openssl` self-signed cert cached for a year, since local
//! development has no certbot container to exec into.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use tokio::process::Command;

use crate::docker::run_docker;
use crate::error::{AdapterError, Result};

#[derive(Debug, Clone)]
pub struct CertMetadata {
    pub fqdn: String,
    pub cert_path: String,
    pub key_path: String,
    pub not_after: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TlsCertificates: Send + Sync {
    async fn issue(&self, fqdn: &str) -> Result<CertMetadata>;
    async fn revoke(&self, fqdn: &str) -> Result<()>;
    async fn check_exists(&self, fqdn: &str) -> Result<bool>;
}

/// Local self-signed issuance for development, grounded on the same
/// docker-exec pattern but shelling to `openssl` directly on the host since
/// there is no certbot container in dev compose.
pub struct DevSelfSignedCertificates {
    cert_dir: PathBuf,
    validity_days: u32,
}

impl DevSelfSignedCertificates {
    pub fn new(cert_dir: PathBuf) -> Self {
        Self {
            cert_dir,
            validity_days: 365,
        }
    }

    fn paths(&self, fqdn: &str) -> (PathBuf, PathBuf) {
        let dir = self.cert_dir.join(fqdn);
        (dir.join("fullchain.pem"), dir.join("privkey.pem"))
    }
}

#[async_trait]
impl TlsCertificates for DevSelfSignedCertificates {
    async fn issue(&self, fqdn: &str) -> Result<CertMetadata> {
        let (cert_path, key_path) = self.paths(fqdn);

        if cert_path.exists() {
            return Ok(CertMetadata {
                fqdn: fqdn.to_string(),
                cert_path: cert_path.display().to_string(),
                key_path: key_path.display().to_string(),
                not_after: Some(Utc::now() + ChronoDuration::days(self.validity_days as i64)),
            });
        }

        if let Some(parent) = cert_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let status = Command::new("openssl")
            .args([
                "req",
                "-x509",
                "-newkey",
                "rsa:2048",
                "-nodes",
                "-days",
                &self.validity_days.to_string(),
                "-keyout",
                key_path.to_str().unwrap_or_default(),
                "-out",
                cert_path.to_str().unwrap_or_default(),
                "-subj",
                &format!("/CN={fqdn}"),
                "-addext",
                &format!("subjectAltName=DNS:{fqdn}"),
            ])
            .status()
            .await
            .map_err(AdapterError::Io)?;

        if !status.success() {
            return Err(AdapterError::CommandFailed(format!(
                "openssl self-signed cert generation failed for {fqdn}"
            )));
        }

        Ok(CertMetadata {
            fqdn: fqdn.to_string(),
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
            not_after: Some(Utc::now() + ChronoDuration::days(self.validity_days as i64)),
        })
    }

    async fn revoke(&self, fqdn: &str) -> Result<()> {
        let dir = self.cert_dir.join(fqdn);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn check_exists(&self, fqdn: &str) -> Result<bool> {
        let (cert_path, _) = self.paths(fqdn);
        Ok(cert_path.exists())
    }
}

/// Production ACME issuance via a certbot sidecar container, exactly the
/// shape of `certificate_service.py`'s `run_docker_cmd` calls.
pub struct CertbotCertificates {
    container: String,
    wait_timeout: std::time::Duration,
}

impl CertbotCertificates {
    pub fn new(container: impl Into<String>, wait_timeout: std::time::Duration) -> Self {
        Self {
            container: container.into(),
            wait_timeout,
        }
    }

    fn live_dir(fqdn: &str) -> String {
        format!("/etc/letsencrypt/live/{fqdn}")
    }
}

#[async_trait]
impl TlsCertificates for CertbotCertificates {
    async fn issue(&self, fqdn: &str) -> Result<CertMetadata> {
        let deadline = tokio::time::Instant::now() + self.wait_timeout;

        let output = tokio::time::timeout_at(
            deadline,
            run_docker(&[
                "exec",
                &self.container,
                "/scripts/issue-certificate.sh",
                fqdn,
            ]),
        )
        .await
        .map_err(|_| AdapterError::Timeout(format!("certificate issuance for {fqdn}")))??;

        if !output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "certbot issuance failed for {fqdn}: {}",
                output.stderr_string()
            )));
        }

        let live_dir = Self::live_dir(fqdn);
        Ok(CertMetadata {
            fqdn: fqdn.to_string(),
            cert_path: format!("{live_dir}/fullchain.pem"),
            key_path: format!("{live_dir}/privkey.pem"),
            not_after: None,
        })
    }

    async fn revoke(&self, fqdn: &str) -> Result<()> {
        let output = run_docker(&[
            "exec",
            &self.container,
            "certbot",
            "revoke",
            "--cert-name",
            fqdn,
            "--non-interactive",
            "--delete-after-revoke",
        ])
        .await?;

        if !output.status_success {
            tracing::warn!(fqdn, stderr = %output.stderr_string(), "certbot revoke failed");
        }
        Ok(())
    }

    async fn check_exists(&self, fqdn: &str) -> Result<bool> {
        let live_dir = Self::live_dir(fqdn);
        let output = run_docker(&[
            "exec",
            &self.container,
            "test",
            "-f",
            &format!("{live_dir}/fullchain.pem"),
        ])
        .await?;
        Ok(output.status_success)
    }
}
