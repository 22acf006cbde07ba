//! Session lifecycle: connect, bind with credential retry, reconnect on
//! configuration drift, close.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::credentials::{AuthInfo, CredentialCache, PromptError, INVALID_AUTH_ANNOTATION};
use crate::directory::{DirectoryConnection, DirectoryConnector, ProtocolError, ResultCode};
use crate::error::{LdapFsError, Result};
use crate::server::{AuthMode, ServerConfig};

const CANCELED_MESSAGE: &str = "LDAP connection canceled.";

/// Owns the one directory session of a worker
pub struct ConnectionManager {
    connector: Arc<dyn DirectoryConnector>,
    credentials: Arc<dyn CredentialCache>,
    /// Configuration derived from the request that opened the session
    requested: Option<ServerConfig>,
    /// Configuration actually bound with (credentials may be substituted)
    server: Option<ServerConfig>,
    connection: Option<Box<dyn DirectoryConnection>>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        credentials: Arc<dyn CredentialCache>,
    ) -> Self {
        Self {
            connector,
            credentials,
            requested: None,
            server: None,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Effective configuration of the current (or last attempted) session
    pub fn server(&self) -> Option<&ServerConfig> {
        self.server.as_ref()
    }

    /// Make sure a session configured like `config` is open.
    ///
    /// `url` is the display form of the request, used in error messages.
    pub async fn ensure_session(&mut self, config: ServerConfig, url: &str) -> Result<()> {
        if self.is_connected() {
            if self.requested.as_ref() == Some(&config) {
                return Ok(());
            }
            info!("Server configuration changed, reconnecting to {}", config.site());
            self.close().await;
        }

        self.requested = Some(config.clone());
        self.server = Some(config);
        self.open(url).await
    }

    /// Connect and bind using the stored configuration
    pub async fn open(&mut self, url: &str) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let mut server = self
            .server
            .clone()
            .ok_or_else(|| LdapFsError::Internal("No server configured".to_string()))?;

        info!("Connecting to {}", server.site());
        let mut conn = self.connector.connect(&server).await.map_err(|e| {
            warn!("Connection to {} failed: {}", server.site(), e);
            LdapFsError::CannotConnect(if e.message.is_empty() {
                e.code.description().to_string()
            } else {
                e.message
            })
        })?;

        let mut info = AuthInfo {
            site: server.site(),
            identity: server.identity_hint().to_string(),
            realm: server.realm.clone(),
        };
        let mut cached = self.credentials.check_cached(&info).await;
        let mut first_auth = true;

        loop {
            debug!(
                "Binding to {} as {:?} ({:?})",
                info.site,
                server.identity_hint(),
                server.auth
            );
            let err = match conn.bind(&server).await {
                Ok(()) => break,
                Err(err) => err,
            };

            if !err.code.is_credential_failure() {
                warn!("Bind to {} failed: {}", info.site, err);
                conn.close().await;
                return Err(map_error(&err, true, url));
            }

            if first_auth {
                if let Some(credential) = cached.take() {
                    debug!("Retrying bind with cached credentials");
                    server.set_credentials(&credential.username, &credential.password);
                    continue;
                }
            }

            let annotation = if first_auth {
                None
            } else {
                Some(INVALID_AUTH_ANNOTATION)
            };
            match self.credentials.prompt(&info, annotation).await {
                Ok(credential) => {
                    if credential.keep {
                        self.credentials.persist(&info, &credential).await;
                    }
                    server.set_credentials(&credential.username, &credential.password);
                    info.identity = credential.username;
                    first_auth = false;
                }
                Err(PromptError::Canceled) => {
                    info!("Authentication to {} canceled", info.site);
                    conn.close().await;
                    return Err(LdapFsError::UserCanceled(CANCELED_MESSAGE.to_string()));
                }
                Err(PromptError::Unavailable(reason)) => {
                    debug!("No credentials available: {}", reason);
                    conn.close().await;
                    return Err(map_error(&err, true, url));
                }
            }
        }

        info!(
            "Connected to {}{}",
            info.site,
            match server.auth {
                AuthMode::Anonymous => " (anonymous)",
                _ => "",
            }
        );
        self.server = Some(server);
        self.connection = Some(conn);
        Ok(())
    }

    /// Release the transport; idempotent
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
            debug!("Connection closed");
        }
    }

    /// The live connection
    pub fn connection(&mut self) -> Result<&mut dyn DirectoryConnection> {
        match self.connection.as_mut() {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(LdapFsError::Internal("No open session".to_string())),
        }
    }

    /// Translate a failed operation and end the session.
    ///
    /// A success code is re-derived from the connection's last error.
    pub async fn fail(&mut self, err: ProtocolError, url: &str) -> LdapFsError {
        let connected = self.is_connected();
        let mut err = err;
        if connected && err.code.is_success() {
            if let Some(last) = self.connection.as_ref().and_then(|c| c.last_error()) {
                err = last.clone();
            }
        }
        let mapped = map_error(&err, connected, url);
        self.close().await;
        mapped
    }
}

/// Error Mapper: diagnostic text is only available with a live session
fn map_error(err: &ProtocolError, connected: bool, url: &str) -> LdapFsError {
    let extra = connected.then_some(err.message.as_str());
    LdapFsError::from_result_code(err.code, extra, url).unwrap_or_else(|| {
        LdapFsError::Internal(format!(
            "{}: {} reported without an error",
            url,
            ResultCode::SUCCESS
        ))
    })
}
