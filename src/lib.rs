//! ldap-fs: LDAP directories through filesystem verbs
//!
//! Directory entries are presented as files and directories and can be
//! listed, stat'ed, read as LDIF, written with an LDIF change stream and
//! deleted.
//!
//! # Architecture
//!
//! - **Request URLs**: every verb is addressed by an RFC 4516 LDAP URL
//!   ([`ldap_url::LdapUrl`]); the server settings are derived from it
//!   ([`server::ServerConfig`]).
//! - **Directory seam**: the protocol client sits behind the
//!   [`directory::DirectoryConnector`] and [`directory::DirectoryConnection`]
//!   traits; [`directory::ldap::Ldap3Connector`] is the production backend.
//! - **Worker**: [`worker::LdapWorker`] owns the session (connect, bind with
//!   credential retry, reconnect on configuration change) and runs the
//!   paged search, listing and change-stream engines.
//! - **Credentials**: bind credentials come from a
//!   [`credentials::CredentialCache`] (terminal prompt, static or none).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ldap_fs::credentials::NoCredentials;
//! use ldap_fs::directory::ldap::Ldap3Connector;
//! use ldap_fs::ldap_url::LdapUrl;
//! use ldap_fs::server::ServerDefaults;
//! use ldap_fs::worker::{BufferedReply, LdapWorker, Request};
//!
//! # async fn example() -> ldap_fs::Result<()> {
//! let mut worker = LdapWorker::new(
//!     Arc::new(Ldap3Connector),
//!     Arc::new(NoCredentials),
//!     ServerDefaults::default(),
//! );
//!
//! let url = LdapUrl::parse("ldap://localhost/dc=example,dc=org")?;
//! let mut reply = BufferedReply::new();
//! worker.list_dir(&Request::new(url), &mut reply).await?;
//! worker.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod directory;
pub mod env;
pub mod error;
pub mod ldap_url;
pub mod ldif;
pub mod server;
pub mod worker;

pub use error::{LdapFsError, Result};
