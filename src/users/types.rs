//! User profile documents

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which part of the application an account may reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Researcher,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Researcher => "researcher",
            Role::Guest => "guest",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            "guest" => Ok(Role::Guest),
            other => Err(Error::general(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only `Active` accounts reach authenticated pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    /// Awaiting email verification or admin approval
    #[default]
    Pending,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "Active",
            AccountStatus::Pending => "Pending",
            AccountStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account record, keyed by the auth provider's user id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub last_name: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub role: Role,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub status: AccountStatus,
    /// Path of the uploaded photo, empty for the placeholder
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub profile_photo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,

    // Researcher extension
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub department: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub institution: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub bio: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub specializations: Vec<String>,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub publication_count: u32,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub herbaria_samples: u32,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub collaborators: u32,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub active_funding: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub research_focus: String,
}

impl UserProfile {
    /// A fresh registration: pending until verified or approved
    pub fn new(id: &str, email: &str, first_name: &str, last_name: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role,
            status: AccountStatus::Pending,
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Partial profile edit; only `Some` fields are written
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specializations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub herbaria_samples: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_funding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_focus: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names() {
        let profile = UserProfile::new("u-1", "ana@uni.edu", "Ana", "Silva", Role::Researcher);
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["role"], "researcher");
        assert_eq!(value["status"], "Pending");
        assert_eq!(value["firstName"], "Ana");
        assert_eq!(value["publicationCount"], 0);
        assert!(value.get("lastLogin").is_none());
    }

    #[test]
    fn decodes_sparse_document() {
        let profile: UserProfile = serde_json::from_value(json!({
            "id": "u-2",
            "email": "admin@uni.edu",
            "role": "admin",
            "status": "Active",
            "specializations": ["Bryophytes"]
        }))
        .unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert!(profile.is_active());
        assert_eq!(profile.specializations, vec!["Bryophytes"]);
        assert_eq!(profile.full_name(), "");
    }

    #[test]
    fn null_columns_fall_back_to_defaults() {
        let profile: UserProfile = serde_json::from_value(json!({
            "id": "u-3",
            "email": "guest@uni.edu",
            "firstName": null,
            "role": null,
            "status": null,
            "bio": null,
            "specializations": null,
            "publicationCount": null
        }))
        .unwrap();
        assert_eq!(profile.role, Role::Researcher);
        assert_eq!(profile.status, AccountStatus::Pending);
        assert!(profile.specializations.is_empty());
        assert_eq!(profile.publication_count, 0);
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Guest".parse::<Role>().unwrap(), Role::Guest);
        assert!("curator".parse::<Role>().is_err());
    }
}
