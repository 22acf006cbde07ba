//! Credential cache abstractions
//!
//! The engine never stores secrets itself. When the server rejects a bind
//! it asks a [`CredentialCache`] for a remembered credential, then for an
//! interactive one, and hands accepted credentials back for persisting.
//! Implementations:
//! - Terminal prompt with an in-process cache (interactive use)
//! - Static credentials from the configuration file
//! - No credentials at all

pub mod static_credentials;
pub mod terminal;

use async_trait::async_trait;
use thiserror::Error;

pub use static_credentials::{NoCredentials, StaticCredentials};
pub use terminal::TerminalPrompt;

/// Annotation shown when a previous attempt was rejected
pub const INVALID_AUTH_ANNOTATION: &str = "Invalid authorization information.";

/// What is being authenticated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// `scheme://host:port` of the server
    pub site: String,
    /// Bind DN or SASL user currently configured
    pub identity: String,
    /// SASL realm, if any
    pub realm: String,
}

/// Identity and secret to bind with
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    /// Whether the caller wants the credential remembered
    pub keep: bool,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("keep", &self.keep)
            .finish()
    }
}

/// Why no credential was obtained from a prompt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// The user declined to enter credentials
    #[error("canceled by user")]
    Canceled,

    /// This source cannot supply credentials
    #[error("credentials unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Previously remembered credential for this server, if any
    async fn check_cached(&self, info: &AuthInfo) -> Option<Credential>;

    /// Ask for a credential. `annotation` explains why a retry is needed.
    async fn prompt(
        &self,
        info: &AuthInfo,
        annotation: Option<&str>,
    ) -> Result<Credential, PromptError>;

    /// Remember a credential that the server accepted
    async fn persist(&self, info: &AuthInfo, credential: &Credential);
}
