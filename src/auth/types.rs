//! Wire types for the auth provider

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::users::Role;

/// Token grant response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

fn bearer() -> String {
    "bearer".to_string()
}

/// User data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// The user ID
    pub id: String,

    /// The user's email address
    pub email: Option<String>,

    /// Set once the email has been confirmed
    pub email_confirmed_at: Option<String>,

    /// The last sign-in time
    pub last_sign_in_at: Option<String>,

    /// The user metadata
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl AuthUser {
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Registration details
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Defaults to researcher
    pub role: Option<Role>,
}

/// Error body; older deployments use `error`/`error_description`, newer
/// ones `error_code`/`msg`
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AuthErrorBody {
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub msg: Option<String>,
    pub error_description: Option<String>,
    pub message: Option<String>,
}

impl AuthErrorBody {
    pub fn code(&self) -> Option<&str> {
        self.error_code.as_deref().or(self.error.as_deref())
    }

    pub fn detail(&self) -> Option<&str> {
        self.msg
            .as_deref()
            .or(self.error_description.as_deref())
            .or(self.message.as_deref())
    }
}

/// Maps provider error codes (and the legacy free-text messages) to the
/// text shown to users
pub fn describe_auth_error(code: Option<&str>, detail: Option<&str>) -> &'static str {
    match code {
        Some("invalid_credentials") => return "Invalid email or password.",
        Some("email_not_confirmed") => return "Please verify your email before signing in.",
        Some("user_already_exists") | Some("email_exists") => {
            return "An account with this email already exists."
        }
        Some("weak_password") => return "Password is too weak. Use at least 6 characters.",
        Some("email_address_invalid") | Some("validation_failed") => {
            return "Please enter a valid email address."
        }
        Some("over_email_send_rate_limit") | Some("over_request_rate_limit") => {
            return "Too many attempts. Please try again later."
        }
        Some("user_not_found") => return "No account found with this email.",
        Some("user_banned") => return "This account has been disabled.",
        _ => {}
    }

    let detail = detail.unwrap_or_default().to_ascii_lowercase();
    if detail.contains("invalid login credentials") {
        "Invalid email or password."
    } else if detail.contains("email not confirmed") {
        "Please verify your email before signing in."
    } else if detail.contains("already registered") {
        "An account with this email already exists."
    } else {
        "Authentication failed. Please try again."
    }
}

/// Claims read from the access token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: i64,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Read the claims without verifying the signature. The provider already
/// verified the token; this only extracts expiry and subject.
pub fn read_claims(token: &str) -> Result<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    #[test]
    fn codes_map_to_human_text() {
        assert_eq!(
            describe_auth_error(Some("invalid_credentials"), None),
            "Invalid email or password."
        );
        assert_eq!(
            describe_auth_error(Some("invalid_grant"), Some("Invalid login credentials")),
            "Invalid email or password."
        );
        assert_eq!(
            describe_auth_error(None, Some("User already registered")),
            "An account with this email already exists."
        );
        assert_eq!(
            describe_auth_error(Some("unexpected_failure"), None),
            "Authentication failed. Please try again."
        );
    }

    #[test]
    fn claims_are_read_without_the_signing_key() {
        let token = encode(
            &Header::default(),
            &json!({ "sub": "u-1", "exp": 1_900_000_000i64, "email": "ana@uni.edu", "role": "authenticated" }),
            &EncodingKey::from_secret(b"provider-secret"),
        )
        .unwrap();

        let claims = read_claims(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.exp, 1_900_000_000);
        assert_eq!(claims.email.as_deref(), Some("ana@uni.edu"));
    }

    #[test]
    fn garbage_token_is_an_error() {
        assert!(read_claims("not.a.jwt").is_err());
    }
}
