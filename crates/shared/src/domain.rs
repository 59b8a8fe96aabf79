use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest image accepted for upload (10 MiB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);
    };
}

id_newtype!(UserId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// What the auth provider reports on every session change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<SessionUser>,
    pub is_loading: bool,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            user: None,
            is_loading: true,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            user: None,
            is_loading: false,
        }
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self {
            user: Some(user),
            is_loading: false,
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::loading()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis: String,
    pub timestamp: DateTime<Utc>,
}
