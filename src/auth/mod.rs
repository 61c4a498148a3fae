//! Authentication against the managed auth provider

mod session;
mod types;

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};
use crate::store::DocumentStore;
use crate::users::{AccountStatus, Role, UserDirectory, UserProfile};

pub use session::*;
pub use types::*;

type TokenListener = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Client for sign-up, sign-in and sign-out.
///
/// Keeps the provider tokens privately and publishes the signed-in
/// [`SessionUser`] through a shared [`SessionState`].
pub struct AuthClient<S: DocumentStore + ?Sized> {
    /// The base URL for the backend project
    url: String,

    /// The anonymous API key
    key: String,

    /// HTTP client used for requests
    client: Client,

    request_timeout: Option<Duration>,

    /// The current session
    session: Arc<Mutex<Option<Session>>>,

    users: UserDirectory<S>,

    state: SessionState,

    /// Told about every access token change, e.g. to authorize store requests
    token_listener: Option<TokenListener>,
}

impl<S: DocumentStore + ?Sized> AuthClient<S> {
    /// Create a new AuthClient
    pub fn new(url: &str, key: &str, client: Client, users: UserDirectory<S>, state: SessionState) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            client,
            request_timeout: None,
            session: Arc::new(Mutex::new(None)),
            users,
            state,
            token_listener: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_token_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(Option<String>) + Send + Sync + 'static,
    {
        self.token_listener = Some(Arc::new(listener));
        self
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    fn request<'a>(&'a self, builder: FetchBuilder<'a>) -> FetchBuilder<'a> {
        builder.api_key(&self.key).timeout(self.request_timeout)
    }

    /// Send the request, turning provider errors into user-facing text
    async fn send(&self, builder: FetchBuilder<'_>) -> Result<reqwest::Response> {
        let response = builder.execute_raw().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: AuthErrorBody = response.json().await.unwrap_or_default();
        log::warn!(
            "Auth request failed with {}: {:?} {:?}",
            status,
            body.code(),
            body.detail()
        );
        Err(Error::auth(describe_auth_error(body.code(), body.detail())))
    }

    fn store_session(&self, session: Option<Session>) {
        let token = session.as_ref().map(|s| s.access_token.clone());
        match self.session.lock() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
        if let Some(listener) = &self.token_listener {
            listener(token);
        }
    }

    /// The shared session store this client updates
    pub fn session_state(&self) -> &SessionState {
        &self.state
    }

    /// Get the current session
    pub fn current_session(&self) -> Option<Session> {
        match self.session.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Finish session loading from a previously issued cookie value
    pub fn restore(&self, cookie_header: Option<&str>) {
        let user = cookie_header.and_then(SessionCookie::from_cookie_header);
        log::debug!("Restored session: {:?}", user.as_ref().map(|u| &u.email));
        self.state.set(SessionPhase::Ready(user));
    }

    /// Create the auth account and a pending profile. The user must verify
    /// their email and be approved before they can sign in.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<UserProfile> {
        let url = self.get_auth_url("/signup");
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": {
                "firstName": request.first_name,
                "lastName": request.last_name,
            }
        });

        let response: Value = self
            .send(self.request(Fetch::post(&self.client, &url)).json(&body)?)
            .await?
            .json()
            .await?;

        // Confirmation-required deployments answer with the bare user,
        // auto-confirm ones wrap it next to the tokens
        let user_id = response
            .get("user")
            .and_then(|u| u.get("id"))
            .or_else(|| response.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| Error::auth("Registration did not return a user id"))?;

        let profile = UserProfile::new(
            user_id,
            &request.email,
            &request.first_name,
            &request.last_name,
            request.role.unwrap_or(Role::Researcher),
        );
        self.users.create_user_profile(profile).await
    }

    /// Sign in with email and password. Unverified emails and accounts that
    /// are not Active are rejected and leave nobody signed in.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser> {
        let url = self.get_auth_url("/token");
        let body = json!({ "email": email, "password": password });

        let grant: TokenResponse = self
            .send(
                self.request(Fetch::post(&self.client, &url))
                    .query_param("grant_type", "password")
                    .json(&body)?,
            )
            .await?
            .json()
            .await?;

        if !grant.user.is_confirmed() {
            return Err(Error::auth(describe_auth_error(Some("email_not_confirmed"), None)));
        }

        let mut session = Session::new(
            grant.access_token.clone(),
            grant.refresh_token.clone(),
            grant.user.id.clone(),
            grant.expires_in,
        );
        match read_claims(&grant.access_token) {
            Ok(claims) => session.expires_at = Some(claims.exp),
            Err(e) => log::debug!("Could not read access token claims: {}", e),
        }
        // The profile read needs the user's token
        self.store_session(Some(session));

        match self.load_active_profile(&grant.user.id).await {
            Ok(profile) => {
                if let Err(e) = self.users.touch_last_login(&profile.id).await {
                    log::warn!("Could not record last login for {}: {}", profile.id, e);
                }
                let user = SessionUser::from(&profile);
                log::info!("Signed in {} as {}", user.email, user.role);
                self.state.set(SessionPhase::Ready(Some(user.clone())));
                Ok(user)
            }
            Err(e) => {
                self.store_session(None);
                Err(e)
            }
        }
    }

    async fn load_active_profile(&self, user_id: &str) -> Result<UserProfile> {
        let profile = self
            .users
            .get_user_profile(user_id)
            .await?
            .ok_or_else(|| Error::auth("No profile found for this account."))?;

        match profile.status {
            AccountStatus::Active => Ok(profile),
            AccountStatus::Pending => Err(Error::auth("Your account is awaiting approval.")),
            AccountStatus::Inactive => Err(Error::auth("Your account has been deactivated.")),
        }
    }

    /// Sign out the current user. Local state is cleared even when the
    /// provider call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let token = self
            .current_session()
            .map(|s| s.access_token)
            .ok_or(Error::NotSignedIn)?;

        let url = self.get_auth_url("/logout");
        let result = self
            .send(self.request(Fetch::post(&self.client, &url)).bearer_auth(&token))
            .await;

        self.store_session(None);
        self.state.set(SessionPhase::Ready(None));

        if let Err(e) = &result {
            log::warn!("Provider sign-out failed, cleared local session anyway: {}", e);
        }
        result.map(|_| ())
    }

    /// Email a password reset link, optionally landing on `redirect_to`
    pub async fn send_password_reset(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        let mut url = self.get_auth_url("/recover");
        if let Some(redirect_to) = redirect_to {
            url.push_str(&format!("?redirect_to={}", urlencoding::encode(redirect_to)));
        }
        self.send(
            self.request(Fetch::post(&self.client, &url))
                .json(&json!({ "email": email }))?,
        )
        .await?;
        Ok(())
    }
}
