//! Effective server settings of one request
//!
//! A [`ServerConfig`] is derived from every incoming request URL. The
//! session compares it with the one it was opened with and reconnects on
//! any difference, so equality covers exactly the settings that influence
//! the connection or the bind.

use std::time::Duration;

use crate::ldap_url::LdapUrl;

pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_SSL_PORT: u16 = 636;

/// Transport security
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    None,
    /// `ldaps://`
    Ssl,
    /// StartTLS on a plain connection
    Tls,
}

/// Bind mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Anonymous,
    Simple,
    Sasl,
}

/// Fallback values for settings the request URL does not carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDefaults {
    pub page_size: u32,
    pub size_limit: u32,
    pub time_limit: u32,
    pub version: u32,
    pub connect_timeout: Duration,
    pub tls_verify: bool,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            page_size: 0,
            size_limit: 0,
            time_limit: 0,
            version: 3,
            connect_timeout: Duration::from_secs(30),
            tls_verify: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub bind_dn: String,
    /// SASL authentication identity
    pub user: String,
    pub password: String,
    pub realm: String,
    pub mech: String,
    pub version: u32,
    pub security: Security,
    pub auth: AuthMode,
    pub size_limit: u32,
    pub time_limit: u32,
    /// 0 disables paging
    pub page_size: u32,
    pub connect_timeout: Duration,
    pub tls_verify: bool,
}

impl ServerConfig {
    pub fn from_url(url: &LdapUrl, defaults: &ServerDefaults) -> Self {
        let security = if url.has_extension("x-tls") {
            Security::Tls
        } else if url.scheme() == "ldaps" {
            Security::Ssl
        } else {
            Security::None
        };

        let port = url.port().unwrap_or(match security {
            Security::Ssl => DEFAULT_SSL_PORT,
            _ => DEFAULT_PORT,
        });

        let bind_dn = url
            .extension_value("bindname")
            .filter(|dn| !dn.is_empty())
            .unwrap_or(url.user())
            .to_string();

        let auth = if url.has_extension("x-sasl") {
            AuthMode::Sasl
        } else if !bind_dn.is_empty() || !url.password().is_empty() {
            AuthMode::Simple
        } else {
            AuthMode::Anonymous
        };

        let numeric = |name: &str, fallback: u32| {
            url.extension_value(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            host: url.host().to_string(),
            port,
            bind_dn,
            user: url.user().to_string(),
            password: url.password().to_string(),
            realm: url.extension_value("x-realm").unwrap_or_default().to_string(),
            mech: url.extension_value("x-mech").unwrap_or_default().to_string(),
            version: numeric("x-ver", defaults.version),
            security,
            auth,
            size_limit: numeric("x-sizelimit", defaults.size_limit),
            time_limit: numeric("x-timelimit", defaults.time_limit),
            page_size: numeric("x-pagesize", defaults.page_size),
            connect_timeout: defaults.connect_timeout,
            tls_verify: defaults.tls_verify,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self.security {
            Security::Ssl => "ldaps",
            _ => "ldap",
        }
    }

    /// Connection URL handed to the client library
    pub fn connection_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// Key under which credentials for this server are remembered
    pub fn site(&self) -> String {
        self.connection_url()
    }

    /// Identity offered to the credential cache
    pub fn identity_hint(&self) -> &str {
        match self.auth {
            AuthMode::Sasl => &self.user,
            _ => &self.bind_dn,
        }
    }

    /// Substitute credentials obtained from the cache or a prompt
    pub fn set_credentials(&mut self, identity: &str, password: &str) {
        match self.auth {
            AuthMode::Sasl => self.user = identity.to_string(),
            _ => {
                self.bind_dn = identity.to_string();
                self.auth = AuthMode::Simple;
            }
        }
        self.password = password.to_string();
    }
}

impl PartialEq for ServerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.bind_dn == other.bind_dn
            && self.user == other.user
            && self.password == other.password
            && self.realm == other.realm
            && self.mech == other.mech
            && self.version == other.version
            && self.security == other.security
            && self.auth == other.auth
            && self.size_limit == other.size_limit
            && self.time_limit == other.time_limit
            && self.page_size == other.page_size
    }
}

impl Eq for ServerConfig {}
