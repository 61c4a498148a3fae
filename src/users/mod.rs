//! User profiles and admin account management

mod types;

use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::SessionUser;
use crate::error::{Error, Result};
use crate::specimen::Fetched;
use crate::store::{decode, decode_all, timestamp_now, DocumentStore, Query, SortOrder};

pub use types::*;

/// Profile documents keyed by the auth provider's user id
pub struct UserDirectory<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore + ?Sized> Clone for UserDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized> UserDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            collection: "users".to_string(),
        }
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    /// `Ok(None)` when no profile exists for `id`
    pub async fn get_user_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        let document = self.store.fetch(&self.collection, id).await.map_err(|e| {
            log::error!("Failed to read user profile {}: {}", id, e);
            e
        })?;
        document.map(decode).transpose()
    }

    /// Store a profile under the auth provider's id
    pub async fn create_user_profile(&self, profile: UserProfile) -> Result<UserProfile> {
        if profile.id.is_empty() {
            return Err(Error::general("User profile needs the auth user id"));
        }
        let mut document = serde_json::to_value(&profile)?;
        if let Value::Object(fields) = &mut document {
            fields
                .entry("createdAt".to_string())
                .or_insert_with(|| Value::String(timestamp_now()));
        }

        let stored = self.store.insert(&self.collection, document).await.map_err(|e| {
            log::error!("Failed to create user profile {}: {}", profile.id, e);
            e
        })?;
        log::info!("Created {} profile for {}", profile.role, profile.email);
        decode(stored)
    }

    /// Profile edits by the owner
    pub async fn update_user_profile(&self, id: &str, patch: ProfilePatch) -> Result<()> {
        self.write(id, serde_json::to_value(&patch)?).await
    }

    /// Every profile, newest first, optionally only one role
    pub async fn list_users(&self, role: Option<Role>) -> Fetched<Vec<UserProfile>> {
        let mut query = Query::new().order("createdAt", SortOrder::Descending);
        if let Some(role) = role {
            query = query.eq("role", role.as_str());
        }
        match self
            .store
            .query(&self.collection, &query)
            .await
            .and_then(decode_all::<UserProfile>)
        {
            Ok(users) => Fetched::ok(users),
            Err(e) => {
                log::error!("Failed to list users: {}", e);
                Fetched::failed(e)
            }
        }
    }

    /// Approve, deactivate or reactivate an account. Admin only.
    pub async fn set_user_status(
        &self,
        actor: &SessionUser,
        id: &str,
        status: AccountStatus,
    ) -> Result<()> {
        actor.require_admin("change account status")?;
        self.write(id, json!({ "status": status })).await?;
        log::info!("{} set {} to {}", actor.email, id, status);
        Ok(())
    }

    /// Remove a profile. Admin only; admins cannot remove themselves.
    pub async fn delete_user(&self, actor: &SessionUser, id: &str) -> Result<()> {
        actor.require_admin("delete users")?;
        if actor.id == id {
            return Err(Error::forbidden("administrators cannot delete their own account"));
        }
        if !self.store.delete(&self.collection, id).await? {
            return Err(Error::not_found(format!("user {}", id)));
        }
        log::info!("{} deleted user {}", actor.email, id);
        Ok(())
    }

    /// Record a successful sign-in
    pub async fn touch_last_login(&self, id: &str) -> Result<()> {
        self.write(id, json!({ "lastLogin": timestamp_now() })).await
    }

    async fn write(&self, id: &str, patch: Value) -> Result<()> {
        let updated = self
            .store
            .update(&self.collection, id, patch, None)
            .await
            .map_err(|e| {
                log::error!("Failed to update user {}: {}", id, e);
                e
            })?;
        match updated {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("user {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn admin() -> SessionUser {
        SessionUser {
            id: "admin-1".to_string(),
            email: "curator@uni.edu".to_string(),
            role: Role::Admin,
            status: AccountStatus::Active,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    async fn directory_with(profiles: &[(&str, Role)]) -> UserDirectory<MemoryStore> {
        let users = UserDirectory::new(Arc::new(MemoryStore::new()));
        for (id, role) in profiles {
            users
                .create_user_profile(UserProfile::new(id, &format!("{}@uni.edu", id), "", "", *role))
                .await
                .unwrap();
        }
        users
    }

    #[tokio::test]
    async fn registration_starts_pending() {
        let users = directory_with(&[("u-1", Role::Researcher)]).await;
        let profile = users.get_user_profile("u-1").await.unwrap().unwrap();
        assert_eq!(profile.status, AccountStatus::Pending);
        assert!(profile.created_at.is_some());
        assert!(users.get_user_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_approves_account() {
        let users = directory_with(&[("u-1", Role::Researcher)]).await;
        users
            .set_user_status(&admin(), "u-1", AccountStatus::Active)
            .await
            .unwrap();
        assert!(users.get_user_profile("u-1").await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn researchers_cannot_manage_accounts() {
        let users = directory_with(&[("u-1", Role::Researcher), ("u-2", Role::Guest)]).await;
        let researcher = SessionUser {
            role: Role::Researcher,
            ..admin()
        };
        assert!(matches!(
            users.set_user_status(&researcher, "u-2", AccountStatus::Inactive).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            users.delete_user(&researcher, "u-2").await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            users.delete_user(&admin(), "admin-1").await,
            Err(Error::Forbidden(_))
        ));
        users.delete_user(&admin(), "u-2").await.unwrap();
        assert!(users.get_user_profile("u-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_role() {
        let users = directory_with(&[
            ("u-1", Role::Researcher),
            ("u-2", Role::Guest),
            ("u-3", Role::Researcher),
        ])
        .await;
        let researchers = users.list_users(Some(Role::Researcher)).await;
        assert!(researchers.is_ok());
        assert_eq!(researchers.value.len(), 2);
        assert_eq!(users.list_users(None).await.value.len(), 3);
    }

    #[tokio::test]
    async fn profile_edit_and_last_login() {
        let users = directory_with(&[("u-1", Role::Researcher)]).await;
        users
            .update_user_profile(
                "u-1",
                ProfilePatch {
                    institution: Some("University Herbarium".to_string()),
                    specializations: Some(vec!["Lichens".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        users.touch_last_login("u-1").await.unwrap();

        let profile = users.get_user_profile("u-1").await.unwrap().unwrap();
        assert_eq!(profile.institution, "University Herbarium");
        assert_eq!(profile.specializations, vec!["Lichens"]);
        assert!(profile.last_login.is_some());

        assert!(matches!(
            users.touch_last_login("ghost").await,
            Err(Error::NotFound(_))
        ));
    }
}
