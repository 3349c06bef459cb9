//! Identity-provider client for the portal login flow.
//!
//! Grounded on `original_source/portal/backend/app/auth/entra.py`'s
//! `EntraAuthService`: authorization-code redirect against an OAuth2
//! authority, code-for-token exchange, best-effort user info enrichment
//! via Microsoft Graph, and a fallback chain for extracting an email
//! address out of whatever claims/fields are actually present. The
//! manual id_token decode (no signature check) is carried over from the
//! original too — the access token returned alongside it is itself
//! opaque to us and never forwarded to the client, so we only trust the
//! claims enough to seed a user record, not to authorize anything.

use serde::Deserialize;
use thiserror::Error;

use crate::config::GatewayConfig;

const GRAPH_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";
const DEFAULT_SCOPE: &str = "openid profile email";

#[derive(Debug, Error)]
pub enum IdpError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("malformed id token")]
    MalformedIdToken,
}

#[derive(Debug, Clone)]
pub struct ExchangedIdentity {
    pub subject: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Clone)]
pub struct IdentityPortalClient {
    authority: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    tenant_id: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl IdentityPortalClient {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            authority: config.idp_authority.clone(),
            client_id: config.idp_client_id.clone(),
            client_secret: config.idp_client_secret.clone(),
            tenant_id: config.idp_tenant_id.clone(),
            redirect_uri: format!("https://{}/auth/callback", config.base_domain),
            http: reqwest::Client::new(),
        }
    }

    fn authority(&self) -> Result<&str, IdpError> {
        self.authority.as_deref().ok_or(IdpError::NotConfigured)
    }

    fn client_id(&self) -> Result<&str, IdpError> {
        self.client_id.as_deref().ok_or(IdpError::NotConfigured)
    }

    fn client_secret(&self) -> Result<&str, IdpError> {
        self.client_secret.as_deref().ok_or(IdpError::NotConfigured)
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, IdpError> {
        let authority = self.authority()?;
        let client_id = self.client_id()?;
        Ok(format!(
            "{authority}/{tenant}/oauth2/v2.0/authorize?client_id={client_id}&response_type=code&redirect_uri={redirect}&scope={scope}&response_mode=query&prompt=select_account&state={state}",
            tenant = self.tenant_id,
            redirect = urlencoding::encode(&self.redirect_uri),
            scope = urlencoding::encode(DEFAULT_SCOPE),
            state = urlencoding::encode(state),
        ))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<ExchangedIdentity, IdpError> {
        let authority = self.authority()?;
        let client_id = self.client_id()?;
        let client_secret = self.client_secret()?;

        let token_url = format!("{authority}/{tenant}/oauth2/v2.0/token", tenant = self.tenant_id);
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("scope", DEFAULT_SCOPE),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| IdpError::ExchangeFailed(err.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdpError::ExchangeFailed(body));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|err| IdpError::ExchangeFailed(err.to_string()))?;

        let claims = decode_id_token(&token_response.id_token)?;

        let mut email = claims
            .preferred_username
            .or(claims.email)
            .or(claims.upn)
            .or(claims.unique_name);
        let mut display_name = claims.name.clone();

        if email.is_none() || display_name.is_none() {
            if let Ok(profile) = self.fetch_graph_profile(&token_response.access_token).await {
                email = email.or(profile.mail).or(profile.user_principal_name);
                display_name = display_name.or(profile.display_name);
            }
        }

        let email = email.ok_or(IdpError::MalformedIdToken)?;
        let display_name = display_name.unwrap_or_else(|| email.clone());

        Ok(ExchangedIdentity {
            subject: claims.oid.or(claims.sub).ok_or(IdpError::MalformedIdToken)?,
            email,
            display_name,
        })
    }

    async fn fetch_graph_profile(&self, access_token: &str) -> Result<GraphProfile, IdpError> {
        self.http
            .get(GRAPH_ME_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| IdpError::ExchangeFailed(err.to_string()))?
            .json::<GraphProfile>()
            .await
            .map_err(|err| IdpError::ExchangeFailed(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    oid: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    unique_name: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphProfile {
    mail: Option<String>,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, IdpError> {
    use base64::Engine;

    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or(IdpError::MalformedIdToken)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| IdpError::MalformedIdToken)?;
    serde_json::from_slice(&decoded).map_err(|_| IdpError::MalformedIdToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_client() -> IdentityPortalClient {
        IdentityPortalClient {
            authority: Some("https://login.microsoftonline.com".to_string()),
            client_id: Some("client-id".to_string()),
            client_secret: Some("secret".to_string()),
            tenant_id: "common".to_string(),
            redirect_uri: "https://kanban.example.com/auth/callback".to_string(),
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn authorize_url_includes_state_and_redirect() {
        let client = configured_client();
        let url = client.authorize_url("xyz").unwrap();
        assert!(url.contains("state=xyz"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2F"));
    }

    #[test]
    fn unconfigured_client_reports_not_configured() {
        let client = IdentityPortalClient {
            authority: None,
            client_id: None,
            client_secret: None,
            tenant_id: "common".to_string(),
            redirect_uri: String::new(),
            http: reqwest::Client::new(),
        };
        assert!(matches!(client.authorize_url("x"), Err(IdpError::NotConfigured)));
    }
}
