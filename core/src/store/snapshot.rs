//! On-disk shape of the state store: one JSON document holding every
//! collection, keyed by id. Matches the teacher's `StoredAuthState`
//! (`gateway/src/auth/store.rs`) in spirit — a single serializable struct
//! the store reads wholesale at startup and rewrites wholesale on every
//! mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ApiToken, AppTemplate, Membership, Sandbox, Team, User, Workspace};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub users: HashMap<Uuid, User>,
    pub workspaces: HashMap<Uuid, Workspace>,
    pub sandboxes: HashMap<Uuid, Sandbox>,
    pub teams: HashMap<Uuid, Team>,
    pub memberships: HashMap<Uuid, Membership>,
    pub api_tokens: HashMap<Uuid, ApiToken>,
    pub app_templates: HashMap<Uuid, AppTemplate>,
}
