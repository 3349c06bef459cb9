//! C3 `IdentityProvider` adapter — Microsoft Entra External ID (CIAM) app
//! registration, via the Graph API client-credentials flow.
//!
//! Grounded on `azure_service.py::AzureService`: client-credentials token
//! acquisition, `POST /applications` then `POST /servicePrincipals`, and a
//! bounded 3-attempt retry on `addPassword` (Graph occasionally rejects the
//! first secret request right after an application is created, before it
//! has propagated).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AdapterError, Result};

const GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_URL: &str = "https://login.microsoftonline.com";

#[derive(Debug, Clone)]
pub struct AppRegistration {
    pub app_id: String,
    pub object_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub authority: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_app_registration(
        &self,
        display_name: &str,
        redirect_uris: &[String],
    ) -> Result<AppRegistration>;
    async fn update_redirect_uris(&self, object_id: &str, uris: &[String]) -> Result<()>;
    async fn delete(&self, object_id: &str) -> Result<()>;
}

pub struct AzureIdentityProvider {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    ciam_authority: Option<String>,
}

impl AzureIdentityProvider {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        ciam_authority: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ciam_authority,
        }
    }

    fn authority(&self) -> String {
        self.ciam_authority
            .clone()
            .unwrap_or_else(|| format!("{LOGIN_URL}/{}", self.tenant_id))
    }

    async fn access_token(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let url = format!("{LOGIN_URL}/{}/oauth2/v2.0/token", self.tenant_id);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", "https://graph.microsoft.com/.default"),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(AdapterError::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream(format!(
                "failed to authenticate with Azure: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(AdapterError::Http)?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl IdentityProvider for AzureIdentityProvider {
    async fn create_app_registration(
        &self,
        display_name: &str,
        redirect_uris: &[String],
    ) -> Result<AppRegistration> {
        let token = self.access_token().await?;

        let app_body = json!({
            "displayName": display_name,
            "signInAudience": "AzureADMyOrg",
            "web": {
                "redirectUris": redirect_uris,
                "implicitGrantSettings": {
                    "enableIdTokenIssuance": true,
                    "enableAccessTokenIssuance": false,
                },
            },
            "requiredResourceAccess": [{
                "resourceAppId": "00000003-0000-0000-c000-000000000000",
                "resourceAccess": [
                    {"id": "37f7f235-527c-4136-accd-4a02d197296e", "type": "Scope"},
                    {"id": "14dad69e-099b-42c9-810b-d002981feec1", "type": "Scope"},
                    {"id": "64a6cdd6-aab1-4aaf-94b8-3cc8405e90d0", "type": "Scope"},
                    {"id": "e1fe6dd8-ba31-4d61-89e7-88639da4683d", "type": "Scope"},
                ],
            }],
        });

        let response = self
            .http
            .post(format!("{GRAPH_URL}/applications"))
            .bearer_auth(&token)
            .json(&app_body)
            .send()
            .await
            .map_err(AdapterError::Http)?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(AdapterError::Upstream(format!(
                "failed to create Azure app registration: {}",
                response.text().await.unwrap_or_default()
            )));
        }

        let app: serde_json::Value = response.json().await.map_err(AdapterError::Http)?;
        let app_id = app["appId"]
            .as_str()
            .ok_or_else(|| AdapterError::Upstream("app registration response missing appId".into()))?
            .to_string();
        let object_id = app["id"]
            .as_str()
            .ok_or_else(|| AdapterError::Upstream("app registration response missing id".into()))?
            .to_string();

        // Give Graph a moment to propagate the new application before
        // requesting a service principal and secret for it.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let _ = self
            .http
            .post(format!("{GRAPH_URL}/servicePrincipals"))
            .bearer_auth(&token)
            .json(&json!({ "appId": app_id }))
            .send()
            .await
            .map_err(AdapterError::Http)?;

        let mut client_secret = None;
        for attempt in 0..3 {
            let response = self
                .http
                .post(format!("{GRAPH_URL}/applications/{object_id}/addPassword"))
                .bearer_auth(&token)
                .json(&json!({
                    "passwordCredential": {
                        "displayName": "App Factory Generated Secret",
                        "endDateTime": "2099-12-31T23:59:59Z",
                    }
                }))
                .send()
                .await
                .map_err(AdapterError::Http)?;

            if response.status().is_success() {
                let body: serde_json::Value = response.json().await.map_err(AdapterError::Http)?;
                client_secret = body["secretText"].as_str().map(str::to_string);
                break;
            }

            tracing::warn!(attempt, object_id, "addPassword attempt failed, retrying");
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        }

        let client_secret = client_secret
            .ok_or_else(|| AdapterError::Upstream("failed to create Azure client secret".into()))?;

        Ok(AppRegistration {
            app_id,
            object_id,
            client_secret,
            tenant_id: self.tenant_id.clone(),
            authority: self.authority(),
        })
    }

    async fn update_redirect_uris(&self, object_id: &str, uris: &[String]) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .patch(format!("{GRAPH_URL}/applications/{object_id}"))
            .bearer_auth(&token)
            .json(&json!({ "web": { "redirectUris": uris } }))
            .send()
            .await
            .map_err(AdapterError::Http)?;

        if response.status() != reqwest::StatusCode::NO_CONTENT {
            return Err(AdapterError::Upstream(format!(
                "failed to update redirect URIs for {object_id}: {}",
                response.text().await.unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .delete(format!("{GRAPH_URL}/applications/{object_id}"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(AdapterError::Http)?;

        match response.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status => Err(AdapterError::Upstream(format!(
                "failed to delete app registration {object_id}: {status}"
            ))),
        }
    }
}
