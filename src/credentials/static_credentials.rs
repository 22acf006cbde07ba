//! Non-interactive credential sources.
//!
//! `StaticCredentials` offers one configured identity as the cached
//! credential; `NoCredentials` never offers anything. Neither can prompt,
//! so a rejected bind ends with the server's authentication error.

use async_trait::async_trait;

use super::{AuthInfo, Credential, CredentialCache, PromptError};

/// Credential taken from the configuration file
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl CredentialCache for StaticCredentials {
    async fn check_cached(&self, _info: &AuthInfo) -> Option<Credential> {
        Some(Credential {
            username: self.username.clone(),
            password: self.password.clone(),
            keep: false,
        })
    }

    async fn prompt(
        &self,
        info: &AuthInfo,
        _annotation: Option<&str>,
    ) -> Result<Credential, PromptError> {
        Err(PromptError::Unavailable(format!(
            "static credentials for {} were rejected",
            info.site
        )))
    }

    async fn persist(&self, _info: &AuthInfo, _credential: &Credential) {}
}

/// Never supplies credentials
#[derive(Debug, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialCache for NoCredentials {
    async fn check_cached(&self, _info: &AuthInfo) -> Option<Credential> {
        None
    }

    async fn prompt(
        &self,
        _info: &AuthInfo,
        _annotation: Option<&str>,
    ) -> Result<Credential, PromptError> {
        Err(PromptError::Unavailable(
            "no credential source configured".to_string(),
        ))
    }

    async fn persist(&self, _info: &AuthInfo, _credential: &Credential) {}
}
