//! C3 `RepositoryHost` adapter — GitHub template-repo and branch management.
//!
//! Grounded on `github_service.py`: `POST /repos/{owner}/{repo}/generate`
//! to create from template, and `create_branch`'s 422-as-success handling
//! when the branch reference already exists.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AdapterError, Result};

const BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub owner: String,
    pub name: String,
    pub clone_url: String,
    pub ssh_url: String,
    pub default_branch: String,
}

#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn create_from_template(
        &self,
        template_owner: &str,
        template_repo: &str,
        new_owner: &str,
        new_repo: &str,
    ) -> Result<RepoInfo>;
    async fn delete(&self, owner: &str, repo: &str) -> Result<()>;
    async fn branch_create(
        &self,
        owner: &str,
        repo: &str,
        new_branch: &str,
        from_branch: &str,
    ) -> Result<()>;
    async fn branch_delete(&self, owner: &str, repo: &str, name: &str) -> Result<()>;
}

pub struct GitHubRepositoryHost {
    http: reqwest::Client,
    token: String,
}

impl GitHubRepositoryHost {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn error_message(response: reqwest::Response) -> String {
        match response.json::<serde_json::Value>().await {
            Ok(body) => body["message"].as_str().unwrap_or("unknown error").to_string(),
            Err(_) => "unknown error".to_string(),
        }
    }

    async fn get_branch_sha(&self, owner: &str, repo: &str, branch: &str) -> Result<Option<String>> {
        let response = self
            .http
            .get(format!("{BASE_URL}/repos/{owner}/{repo}/branches/{branch}"))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(AdapterError::Http)?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let body: serde_json::Value = response.json().await.map_err(AdapterError::Http)?;
                Ok(body["commit"]["sha"].as_str().map(str::to_string))
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            _ => Err(AdapterError::Upstream(Self::error_message(response).await)),
        }
    }
}

#[async_trait]
impl RepositoryHost for GitHubRepositoryHost {
    async fn create_from_template(
        &self,
        template_owner: &str,
        template_repo: &str,
        new_owner: &str,
        new_repo: &str,
    ) -> Result<RepoInfo> {
        let response = self
            .http
            .post(format!(
                "{BASE_URL}/repos/{template_owner}/{template_repo}/generate"
            ))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({
                "owner": new_owner,
                "name": new_repo,
                "private": true,
                "include_all_branches": false,
            }))
            .send()
            .await
            .map_err(AdapterError::Http)?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(AdapterError::Upstream(Self::error_message(response).await));
        }

        let body: serde_json::Value = response.json().await.map_err(AdapterError::Http)?;
        Ok(RepoInfo {
            owner: new_owner.to_string(),
            name: new_repo.to_string(),
            clone_url: body["clone_url"].as_str().unwrap_or_default().to_string(),
            ssh_url: body["ssh_url"].as_str().unwrap_or_default().to_string(),
            default_branch: body["default_branch"]
                .as_str()
                .unwrap_or("main")
                .to_string(),
        })
    }

    async fn delete(&self, owner: &str, repo: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{BASE_URL}/repos/{owner}/{repo}"))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(AdapterError::Http)?;

        match response.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            _ => Err(AdapterError::Upstream(Self::error_message(response).await)),
        }
    }

    async fn branch_create(
        &self,
        owner: &str,
        repo: &str,
        new_branch: &str,
        from_branch: &str,
    ) -> Result<()> {
        let sha = self
            .get_branch_sha(owner, repo, from_branch)
            .await?
            .ok_or_else(|| {
                AdapterError::NotFound(format!("source branch '{from_branch}' not found"))
            })?;

        let response = self
            .http
            .post(format!("{BASE_URL}/repos/{owner}/{repo}/git/refs"))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({
                "ref": format!("refs/heads/{new_branch}"),
                "sha": sha,
            }))
            .send()
            .await
            .map_err(AdapterError::Http)?;

        match response.status() {
            reqwest::StatusCode::CREATED => Ok(()),
            reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
                let message = Self::error_message(response).await;
                if message.contains("Reference already exists") {
                    Ok(())
                } else {
                    Err(AdapterError::Upstream(message))
                }
            }
            _ => Err(AdapterError::Upstream(Self::error_message(response).await)),
        }
    }

    async fn branch_delete(&self, owner: &str, repo: &str, name: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!(
                "{BASE_URL}/repos/{owner}/{repo}/git/refs/heads/{name}"
            ))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(AdapterError::Http)?;

        match response.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            _ => Err(AdapterError::Upstream(Self::error_message(response).await)),
        }
    }
}
