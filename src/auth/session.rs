//! Session management for authentication

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::users::{AccountStatus, Role, UserProfile};

/// Tokens issued by the auth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The user ID
    pub user_id: String,

    /// The token type
    pub token_type: String,

    /// The expiry time in seconds
    pub expires_in: i64,

    /// The expiry timestamp
    pub expires_at: Option<i64>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

impl Session {
    /// Create a new session
    pub fn new(access_token: String, refresh_token: String, user_id: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            user_id,
            token_type: "bearer".to_string(),
            expires_in,
            expires_at: Some(now_secs() + expires_in),
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => now_secs() >= expires_at,
            None => false,
        }
    }
}

/// The signed-in account as seen by the UI layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(default = "active")]
    pub status: AccountStatus,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

fn active() -> AccountStatus {
    AccountStatus::Active
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// "First Last", or the email when no name is on file
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }

    /// Fails with `Error::Forbidden` unless this is an active admin
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() && self.is_active() {
            Ok(())
        } else {
            log::warn!("{} ({}) may not {}", self.email, self.role, action);
            Err(Error::forbidden(format!("only administrators may {}", action)))
        }
    }
}

impl From<&UserProfile> for SessionUser {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            email: profile.email.clone(),
            role: profile.role,
            status: profile.status,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
        }
    }
}

/// Where session loading stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Session data has not arrived yet
    Loading,
    /// Loaded; `None` means nobody is signed in
    Ready(Option<SessionUser>),
}

/// The single application-wide session store.
///
/// Clones share state. [`SessionState::set`] is the only way to change it;
/// observers use [`SessionState::watch`] or [`SessionState::ready`].
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Arc<watch::Sender<SessionPhase>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Starts in [`SessionPhase::Loading`]
    pub fn new() -> Self {
        let (phase, _) = watch::channel(SessionPhase::Loading);
        Self {
            phase: Arc::new(phase),
        }
    }

    pub fn set(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
    }

    pub fn current(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// The signed-in user, if loading finished and someone is signed in
    pub fn user(&self) -> Option<SessionUser> {
        match &*self.phase.borrow() {
            SessionPhase::Ready(user) => user.clone(),
            SessionPhase::Loading => None,
        }
    }

    pub fn watch(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Wait until loading finishes
    pub async fn ready(&self) -> Option<SessionUser> {
        let mut rx = self.watch();
        loop {
            let phase = rx.borrow_and_update().clone();
            if let SessionPhase::Ready(user) = phase {
                return user;
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

/// Cookie carrying the JSON-serialized session user so server-rendered
/// pages can pick the initial redirect without asking the auth provider
pub struct SessionCookie;

impl SessionCookie {
    pub const NAME: &'static str = "herbarium_session";

    /// Seven days
    pub const MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

    pub fn encode(user: &SessionUser) -> Result<String> {
        let json = serde_json::to_vec(user)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(value: &str) -> Result<SessionUser> {
        let bytes = URL_SAFE_NO_PAD
            .decode(value.trim())
            .map_err(|e| Error::auth(format!("Malformed session cookie: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `Set-Cookie` value establishing the session
    pub fn set_header(user: &SessionUser) -> Result<String> {
        Ok(format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Lax",
            Self::NAME,
            Self::encode(user)?,
            Self::MAX_AGE_SECS
        ))
    }

    /// `Set-Cookie` value removing the session
    pub fn clear_header() -> String {
        format!("{}=; Path=/; Max-Age=0; SameSite=Lax", Self::NAME)
    }

    /// Find and decode the session cookie in a `Cookie` request header.
    /// A malformed value is treated as signed out.
    pub fn from_cookie_header(header: &str) -> Option<SessionUser> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == Self::NAME)
            .and_then(|(_, value)| match Self::decode(value) {
                Ok(user) => Some(user),
                Err(e) => {
                    log::warn!("Ignoring session cookie: {}", e);
                    None
                }
            })
    }
}
