//! C3 `DnsZone` adapter — append/remove `A` records in a flat zone file.
//!
//! The original source manages DNS through a mounted bind zone file rather
//! than a provider API; this keeps the same file-based idempotent-append
//! shape rather than inventing an API client with nothing to ground it on.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

#[async_trait]
pub trait DnsZone: Send + Sync {
    async fn add_record(&self, name: &str, address: &str) -> Result<()>;
    async fn remove_record(&self, name: &str) -> Result<()>;
    async fn wait_propagation(&self, name: &str) -> Result<()>;
}

pub struct FileZone {
    zone_file: PathBuf,
    propagation_delay: std::time::Duration,
}

impl FileZone {
    pub fn new(zone_file: PathBuf, propagation_delay: std::time::Duration) -> Self {
        Self {
            zone_file,
            propagation_delay,
        }
    }

    fn record_line(name: &str, address: &str) -> String {
        format!("{name}    IN  A       {address}\n")
    }

    async fn read_lines(&self) -> Result<Vec<String>> {
        match tokio::fs::read_to_string(&self.zone_file).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl DnsZone for FileZone {
    async fn add_record(&self, name: &str, address: &str) -> Result<()> {
        let mut lines = self.read_lines().await?;
        let new_line = Self::record_line(name, address);
        if lines.iter().any(|line| line.trim() == new_line.trim()) {
            return Ok(());
        }
        // Idempotent against stale records for the same name: drop any
        // prior line for `name` before appending the current address.
        lines.retain(|line| !line.trim_start().starts_with(&format!("{name} ")));
        lines.push(new_line.trim_end().to_string());

        if let Some(parent) = self.zone_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&self.zone_file).await?;
        let content = lines.join("\n") + "\n";
        file.write_all(content.as_bytes()).await?;
        Ok(())
    }

    async fn remove_record(&self, name: &str) -> Result<()> {
        let lines = self.read_lines().await?;
        let filtered: Vec<String> = lines
            .into_iter()
            .filter(|line| !line.trim_start().starts_with(&format!("{name} ")))
            .collect();

        let mut file = tokio::fs::File::create(&self.zone_file).await?;
        let content = if filtered.is_empty() {
            String::new()
        } else {
            filtered.join("\n") + "\n"
        };
        file.write_all(content.as_bytes()).await?;
        Ok(())
    }

    async fn wait_propagation(&self, _name: &str) -> Result<()> {
        tokio::time::sleep(self.propagation_delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let zone = FileZone::new(dir.path().join("zone.txt"), std::time::Duration::from_millis(1));

        zone.add_record("shop.example.com", "10.0.0.1").await.unwrap();
        zone.add_record("shop.example.com", "10.0.0.1").await.unwrap();

        let lines = zone.read_lines().await.unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn add_record_replaces_stale_address() {
        let dir = tempfile::tempdir().unwrap();
        let zone = FileZone::new(dir.path().join("zone.txt"), std::time::Duration::from_millis(1));

        zone.add_record("shop.example.com", "10.0.0.1").await.unwrap();
        zone.add_record("shop.example.com", "10.0.0.2").await.unwrap();

        let lines = zone.read_lines().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("10.0.0.2"));
    }

    #[tokio::test]
    async fn remove_record_drops_matching_line() {
        let dir = tempfile::tempdir().unwrap();
        let zone = FileZone::new(dir.path().join("zone.txt"), std::time::Duration::from_millis(1));

        zone.add_record("shop.example.com", "10.0.0.1").await.unwrap();
        zone.remove_record("shop.example.com").await.unwrap();

        let lines = zone.read_lines().await.unwrap();
        assert!(lines.is_empty());
    }
}
