//! C3 `DatabaseCloner` adapter — PostgreSQL cloning between containers.
//!
//! Grounded directly on `database_cloner.py`'s two cloning strategies:
//! `clone_database` (dump to a temp file, then restore) and
//! `clone_database_direct` (pipe `pg_dump` straight into `pg_restore`).
//! Both shell to `docker exec` exactly as the original does, using
//! `--format=custom --no-owner --no-acl` for the dump and restore.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::{Command, Stdio};

use crate::docker::run_docker;
use crate::error::{AdapterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    FileBased,
    DirectPipe,
}

#[async_trait]
pub trait DatabaseCloner: Send + Sync {
    async fn clone(
        &self,
        source_container: &str,
        source_db: &str,
        target_container: &str,
        target_db: &str,
        mode: CloneMode,
    ) -> Result<()>;
    async fn create_database(&self, container: &str, db: &str) -> Result<()>;
    async fn delete(&self, container: &str, db: &str) -> Result<()>;
    async fn exists(&self, container: &str, db: &str) -> Result<bool>;
    async fn size(&self, container: &str, db: &str) -> Result<u64>;
}

pub struct PostgresCloner {
    user: String,
    password: String,
    dump_dir: PathBuf,
}

impl PostgresCloner {
    pub fn new(user: impl Into<String>, password: impl Into<String>, dump_dir: PathBuf) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            dump_dir,
        }
    }

    fn pgpassword_env(&self) -> String {
        format!("PGPASSWORD={}", self.password)
    }

    async fn dump_to_file(&self, container: &str, db: &str, dump_path: &PathBuf) -> Result<()> {
        let env = self.pgpassword_env();
        let output = run_docker(&[
            "exec",
            "-e",
            &env,
            container,
            "pg_dump",
            "-U",
            &self.user,
            "-d",
            db,
            "--format=custom",
            "--no-owner",
            "--no-acl",
        ])
        .await?;

        if !output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "pg_dump failed for {db}: {}",
                output.stderr_string()
            )));
        }
        tokio::fs::write(dump_path, &output.stdout).await?;
        Ok(())
    }

    async fn restore_from_file(
        &self,
        container: &str,
        db: &str,
        dump_path: &PathBuf,
    ) -> Result<()> {
        let container_dump_path = format!(
            "/tmp/{}",
            dump_path.file_name().and_then(|n| n.to_str()).unwrap_or("dump.sql")
        );

        let copy_output = run_docker(&[
            "cp",
            dump_path.to_str().unwrap_or_default(),
            &format!("{container}:{container_dump_path}"),
        ])
        .await?;
        if !copy_output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "failed to copy dump into {container}: {}",
                copy_output.stderr_string()
            )));
        }

        let env = self.pgpassword_env();
        let restore_output = run_docker(&[
            "exec",
            "-e",
            &env,
            container,
            "pg_restore",
            "-U",
            &self.user,
            "-d",
            db,
            "--no-owner",
            "--no-acl",
            &container_dump_path,
        ])
        .await?;

        // pg_restore returns non-zero for benign warnings too; only treat
        // it as fatal when stderr actually mentions an error.
        let failed = !restore_output.status_success
            && restore_output.stderr_string().to_lowercase().contains("error");

        let _ = run_docker(&["exec", container, "rm", "-f", &container_dump_path]).await;

        if failed {
            return Err(AdapterError::CommandFailed(format!(
                "pg_restore failed for {db}: {}",
                restore_output.stderr_string()
            )));
        }
        Ok(())
    }

    async fn clone_direct_pipe(
        &self,
        source_container: &str,
        source_db: &str,
        target_container: &str,
        target_db: &str,
    ) -> Result<()> {
        let env = self.pgpassword_env();

        let mut dump_child = Command::new("docker")
            .args([
                "exec",
                "-e",
                &env,
                source_container,
                "pg_dump",
                "-U",
                &self.user,
                "-d",
                source_db,
                "--format=custom",
                "--no-owner",
                "--no-acl",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(AdapterError::Io)?;

        let dump_stdout = dump_child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::CommandFailed("pg_dump stdout unavailable".to_string()))?;

        let mut restore_child = Command::new("docker")
            .args([
                "exec",
                "-i",
                "-e",
                &env,
                target_container,
                "pg_restore",
                "-U",
                &self.user,
                "-d",
                target_db,
                "--no-owner",
                "--no-acl",
            ])
            .stdin(Stdio::from(
                dump_stdout
                    .try_into_std()
                    .map_err(|_| AdapterError::CommandFailed("failed to pipe pg_dump output".to_string()))?,
            ))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(AdapterError::Io)?;

        let restore_output = restore_child
            .wait_with_output()
            .await
            .map_err(AdapterError::Io)?;
        let _ = dump_child.wait().await;

        let restore_stderr = String::from_utf8_lossy(&restore_output.stderr).to_lowercase();
        if !restore_output.status.success() && restore_stderr.contains("error") {
            return Err(AdapterError::CommandFailed(format!(
                "pg_restore (direct pipe) failed for {target_db}: {restore_stderr}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseCloner for PostgresCloner {
    async fn clone(
        &self,
        source_container: &str,
        source_db: &str,
        target_container: &str,
        target_db: &str,
        mode: CloneMode,
    ) -> Result<()> {
        match mode {
            CloneMode::FileBased => {
                tokio::fs::create_dir_all(&self.dump_dir).await?;
                let dump_path = self.dump_dir.join(format!("{source_db}_{target_db}.sql"));

                let result = async {
                    self.dump_to_file(source_container, source_db, &dump_path)
                        .await?;
                    self.create_database(target_container, target_db).await?;
                    self.restore_from_file(target_container, target_db, &dump_path)
                        .await
                }
                .await;

                let _ = tokio::fs::remove_file(&dump_path).await;
                result
            }
            CloneMode::DirectPipe => {
                self.create_database(target_container, target_db).await?;
                self.clone_direct_pipe(source_container, source_db, target_container, target_db)
                    .await
            }
        }
    }

    async fn create_database(&self, container: &str, db: &str) -> Result<()> {
        let env = self.pgpassword_env();
        let _ = run_docker(&[
            "exec",
            "-e",
            &env,
            container,
            "psql",
            "-U",
            &self.user,
            "-c",
            &format!("DROP DATABASE IF EXISTS {db};"),
        ])
        .await?;

        let output = run_docker(&[
            "exec",
            "-e",
            &env,
            container,
            "psql",
            "-U",
            &self.user,
            "-c",
            &format!("CREATE DATABASE {db};"),
        ])
        .await?;

        if !output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "failed to create database {db}: {}",
                output.stderr_string()
            )));
        }
        Ok(())
    }

    async fn delete(&self, container: &str, db: &str) -> Result<()> {
        let env = self.pgpassword_env();
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{db}' AND pid <> pg_backend_pid();"
        );
        let _ = run_docker(&[
            "exec", "-e", &env, container, "psql", "-U", &self.user, "-c", &terminate,
        ])
        .await?;

        let output = run_docker(&[
            "exec",
            "-e",
            &env,
            container,
            "psql",
            "-U",
            &self.user,
            "-c",
            &format!("DROP DATABASE IF EXISTS {db};"),
        ])
        .await?;

        if !output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "failed to delete database {db}: {}",
                output.stderr_string()
            )));
        }
        Ok(())
    }

    async fn exists(&self, container: &str, db: &str) -> Result<bool> {
        let env = self.pgpassword_env();
        let query = format!("SELECT 1 FROM pg_database WHERE datname = '{db}';");
        let output = run_docker(&[
            "exec", "-e", &env, container, "psql", "-U", &self.user, "-tAc", &query,
        ])
        .await?;
        Ok(output.status_success && output.stdout_string().trim() == "1")
    }

    async fn size(&self, container: &str, db: &str) -> Result<u64> {
        let env = self.pgpassword_env();
        let query = format!("SELECT pg_database_size('{db}');");
        let output = run_docker(&[
            "exec", "-e", &env, container, "psql", "-U", &self.user, "-tAc", &query,
        ])
        .await?;
        if !output.status_success {
            return Err(AdapterError::NotFound(format!("database {db} not found")));
        }
        output
            .stdout_string()
            .trim()
            .parse::<u64>()
            .map_err(|_| AdapterError::CommandFailed(format!("could not parse size of {db}")))
    }
}
