//! Role-gated routing

use std::time::Duration;

use crate::auth::{SessionPhase, SessionState, SessionUser};
use crate::users::Role;

/// Top-level page subtrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Public landing page
    Landing,
    AdminHome,
    ResearcherHome,
    GuestHome,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::AdminHome => "/admin/dashboard",
            Route::ResearcherHome => "/researcher/dashboard",
            Route::GuestHome => "/guest/dashboard",
        }
    }

    /// Where a signed-in user of `role` belongs
    pub fn home_for(role: Role) -> Route {
        match role {
            Role::Admin => Route::AdminHome,
            Role::Researcher => Route::ResearcherHome,
            Role::Guest => Route::GuestHome,
        }
    }

    /// Initial redirect for server-rendered pages, from the session cookie alone
    pub fn initial(user: Option<&SessionUser>) -> Route {
        match user {
            Some(user) if user.is_active() => Route::home_for(user.role),
            _ => Route::Landing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Session data still loading
    Checking,
    /// Render the gated subtree
    Authorized,
    Redirecting(Route),
}

/// Gate for one page subtree, parameterized by the roles it admits
#[derive(Debug, Clone)]
pub struct RoleGuard {
    allowed: Vec<Role>,
    timeout: Duration,
}

impl RoleGuard {
    pub fn new(allowed: &[Role]) -> Self {
        Self {
            allowed: allowed.to_vec(),
            timeout: Duration::from_secs(10),
        }
    }

    /// How long [`RoleGuard::resolve`] waits for session data
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    /// Transition for the current session phase
    pub fn evaluate(&self, phase: &SessionPhase) -> GuardState {
        match phase {
            SessionPhase::Loading => GuardState::Checking,
            SessionPhase::Ready(None) => GuardState::Redirecting(Route::Landing),
            SessionPhase::Ready(Some(user)) if !user.is_active() => {
                GuardState::Redirecting(Route::Landing)
            }
            SessionPhase::Ready(Some(user)) if self.allows(user.role) => GuardState::Authorized,
            SessionPhase::Ready(Some(user)) => GuardState::Redirecting(Route::home_for(user.role)),
        }
    }

    /// Wait for the session to load and decide. Falls back to the landing
    /// page when nothing arrives within the timeout, so the guard never
    /// stays in `Checking`.
    pub async fn resolve(&self, session: &SessionState) -> GuardState {
        match tokio::time::timeout(self.timeout, session.ready()).await {
            Ok(user) => self.evaluate(&SessionPhase::Ready(user)),
            Err(_) => {
                log::warn!(
                    "Session data not available after {:?}, redirecting to landing",
                    self.timeout
                );
                GuardState::Redirecting(Route::Landing)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::AccountStatus;

    fn user(role: Role, status: AccountStatus) -> SessionUser {
        SessionUser {
            id: "u-1".to_string(),
            email: "u@uni.edu".to_string(),
            role,
            status,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn transitions() {
        let guard = RoleGuard::new(&[Role::Admin]);
        assert_eq!(guard.evaluate(&SessionPhase::Loading), GuardState::Checking);
        assert_eq!(
            guard.evaluate(&SessionPhase::Ready(None)),
            GuardState::Redirecting(Route::Landing)
        );
        assert_eq!(
            guard.evaluate(&SessionPhase::Ready(Some(user(Role::Admin, AccountStatus::Active)))),
            GuardState::Authorized
        );
        assert_eq!(
            guard.evaluate(&SessionPhase::Ready(Some(user(
                Role::Researcher,
                AccountStatus::Active
            )))),
            GuardState::Redirecting(Route::ResearcherHome)
        );
        assert_eq!(
            guard.evaluate(&SessionPhase::Ready(Some(user(Role::Admin, AccountStatus::Pending)))),
            GuardState::Redirecting(Route::Landing)
        );
    }

    #[test]
    fn shared_subtree_admits_several_roles() {
        let guard = RoleGuard::new(&[Role::Admin, Role::Researcher]);
        assert_eq!(
            guard.evaluate(&SessionPhase::Ready(Some(user(
                Role::Researcher,
                AccountStatus::Active
            )))),
            GuardState::Authorized
        );
        assert_eq!(
            guard.evaluate(&SessionPhase::Ready(Some(user(Role::Guest, AccountStatus::Active)))),
            GuardState::Redirecting(Route::GuestHome)
        );
    }

    #[tokio::test]
    async fn resolve_waits_for_session() {
        let session = SessionState::new();
        let guard = RoleGuard::new(&[Role::Researcher]).with_timeout(Duration::from_secs(5));

        let setter = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set(SessionPhase::Ready(Some(user(Role::Researcher, AccountStatus::Active))));
        });

        assert_eq!(guard.resolve(&session).await, GuardState::Authorized);
    }

    #[tokio::test]
    async fn resolve_times_out_to_landing() {
        let session = SessionState::new();
        let guard = RoleGuard::new(&[Role::Admin]).with_timeout(Duration::from_millis(30));
        assert_eq!(
            guard.resolve(&session).await,
            GuardState::Redirecting(Route::Landing)
        );
    }

    #[test]
    fn initial_route_from_cookie() {
        assert_eq!(Route::initial(None), Route::Landing);
        let admin = user(Role::Admin, AccountStatus::Active);
        assert_eq!(Route::initial(Some(&admin)).path(), "/admin/dashboard");
    }
}
