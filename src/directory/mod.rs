//! Directory client seam
//!
//! The wire protocol is supplied by a client library. The engine only talks
//! to it through [`DirectoryConnector`] (opening transports) and
//! [`DirectoryConnection`] (operations on one live connection), mirroring
//! the primitive set of an LDAP client: bind, search with per-message
//! events, abandon, add, modify, delete and rename.

pub mod controls;
pub mod dn;
pub mod ldap;
pub mod result_code;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::server::ServerConfig;

pub use controls::{Control, PAGED_RESULTS_OID};
pub use dn::Dn;
pub use result_code::{ProtocolError, ResultCode};

/// Result of a directory primitive
pub type OpResult<T> = std::result::Result<T, ProtocolError>;

/// Search breadth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// The base entry itself
    #[default]
    Base,
    /// Immediate children of the base
    One,
    /// The base and all descendants
    Sub,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Base => "base",
            Scope::One => "one",
            Scope::Sub => "sub",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "base" => Ok(Scope::Base),
            "one" => Ok(Scope::One),
            "sub" => Ok(Scope::Sub),
            other => Err(format!("Unknown search scope: {}", other)),
        }
    }
}

/// One attribute of an entry with all of its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Directory entry as returned by a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    pub dn: Dn,
    pub attributes: Vec<Attribute>,
}

impl LdapEntry {
    pub fn new(dn: impl Into<Dn>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Append a value, creating the attribute if needed
    pub fn add_value(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
        {
            Some(attr) => attr.values.push(value),
            None => self.attributes.push(Attribute::new(name, vec![value])),
        }
    }

    pub fn values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.values.as_slice())
    }
}

/// Kind of one modify operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}

/// One step of an atomic modify call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: String,
    pub values: Vec<Vec<u8>>,
}

/// Protocol-level search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub base: Dn,
    pub scope: Scope,
    pub filter: String,
    pub attributes: Vec<String>,
    /// Server-side size limit, 0 for none
    pub size_limit: u32,
    /// Server-side time limit in seconds, 0 for none
    pub time_limit: u32,
}

/// Handle of an outstanding search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchId(pub u64);

/// One event of an outstanding search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Entry(LdapEntry),
    /// The search completed successfully; carries the response controls
    Done { controls: Vec<Control> },
}

/// Opens transport connections to a directory server
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Establish the transport (no bind).
    ///
    /// Failures carry the transport's diagnostic text.
    async fn connect(&self, server: &ServerConfig) -> OpResult<Box<dyn DirectoryConnection>>;
}

/// Operations on one live directory connection
///
/// Operations are strictly serialized by the caller. Controls set with
/// [`set_controls`](DirectoryConnection::set_controls) apply to every
/// following operation until replaced.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Authenticate using the credentials and mechanism of `server`
    async fn bind(&mut self, server: &ServerConfig) -> OpResult<()>;

    /// Replace the server and client controls sent with later operations
    fn set_controls(&mut self, server: &[Control], client: &[Control]);

    /// Start a search; results are pulled with `next_event`
    async fn search(&mut self, params: &SearchParams) -> OpResult<SearchId>;

    /// Wait (without timeout) for the next event of a search.
    ///
    /// A search that completes with a non-success code yields `Err`.
    async fn next_event(&mut self, id: SearchId) -> OpResult<SearchEvent>;

    /// Abandon an outstanding search
    async fn abandon(&mut self, id: SearchId) -> OpResult<()>;

    async fn add(&mut self, dn: &Dn, attributes: &[Attribute]) -> OpResult<()>;

    /// Apply all modifications as one atomic modify request
    async fn modify(&mut self, dn: &Dn, mods: &[Modification]) -> OpResult<()>;

    async fn delete(&mut self, dn: &Dn) -> OpResult<()>;

    async fn rename(
        &mut self,
        dn: &Dn,
        new_rdn: &str,
        new_superior: Option<&Dn>,
        delete_old_rdn: bool,
    ) -> OpResult<()>;

    /// Most recent failure seen on this connection, if any
    fn last_error(&self) -> Option<&ProtocolError>;

    /// Release the transport (unbind)
    async fn close(&mut self);
}
