//! Credential context for one authenticated org session.

use serde::Deserialize;
use shared::crypto::token_fingerprint;
use shared::validation::{validate_instance_url, validate_salesforce_id};
use validator::Validate;

/// Org identity plus the OAuth session used to reach it.
///
/// Supplied by the OAuth layer on every request that creates a job and
/// rebuilt from the persisted job inside background tasks. It is always
/// passed explicitly; nothing reads it from ambient state.
#[derive(Clone, PartialEq, Eq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CredentialContext {
    #[validate(custom(function = "validate_salesforce_id"))]
    pub org_id: String,

    #[validate(length(min = 1, max = 255, message = "Org name must not be empty"))]
    pub org_name: String,

    #[validate(length(min = 1, max = 255, message = "Username must not be empty"))]
    pub username: String,

    #[validate(custom(function = "validate_instance_url"))]
    pub instance_url: String,

    #[validate(length(min = 1, message = "Access token must not be empty"))]
    pub access_token: String,
}

impl CredentialContext {
    /// Instance URL without a trailing slash, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.instance_url.trim_end_matches('/')
    }

    /// Log-safe identifier of the access token.
    pub fn token_fingerprint(&self) -> String {
        token_fingerprint(&self.access_token)
    }
}

impl std::fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialContext")
            .field("org_id", &self.org_id)
            .field("org_name", &self.org_name)
            .field("username", &self.username)
            .field("instance_url", &self.instance_url)
            .field("access_token", &format_args!("<{}>", self.token_fingerprint()))
            .finish()
    }
}
