//! LDAP request URLs (RFC 4516)
//!
//! `ldap[s]://[user[:password]@]host[:port]/dn?attributes?scope?filter?extensions`
//!
//! Every filesystem verb receives one of these. Besides naming the DN it
//! carries the search parameters and the per-request server settings
//! (`bindname`, `x-sasl`, `x-pagesize`, ...) as extensions.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::directory::{Dn, Scope};
use crate::error::{LdapFsError, Result};

/// Filter used when the URL does not carry one
pub const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Characters escaped in the DN path and query components
const COMPONENT: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'?').add(b'#');

/// Characters escaped in extension values (commas separate extensions)
const EXTENSION: &AsciiSet = &COMPONENT.add(b',');

/// One URL extension, `[!]name[=value]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub value: String,
    pub critical: bool,
}

/// Parsed LDAP URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapUrl {
    scheme: String,
    host: String,
    port: Option<u16>,
    user: String,
    password: String,
    dn: Dn,
    attributes: Vec<String>,
    scope: Scope,
    filter: String,
    extensions: Vec<Extension>,
    has_query: bool,
}

impl LdapUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| LdapFsError::WorkerDefined(format!("Malformed URL {}: {}", input, e)))?;

        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "ldap" && scheme != "ldaps" {
            return Err(LdapFsError::WorkerDefined(format!(
                "Unsupported protocol {} in {}",
                scheme, input
            )));
        }

        let host = url.host_str().unwrap_or_default().to_string();
        let path = decode(url.path())?;
        let dn = Dn::new(path.trim_start_matches('/'));

        let mut parsed = Self {
            scheme,
            host,
            port: url.port(),
            user: decode(url.username())?,
            password: url.password().map(decode).transpose()?.unwrap_or_default(),
            dn,
            attributes: Vec::new(),
            scope: Scope::Base,
            filter: String::new(),
            extensions: Vec::new(),
            has_query: false,
        };

        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            parsed.has_query = true;
            parsed.parse_query(query)?;
        }

        Ok(parsed)
    }

    fn parse_query(&mut self, query: &str) -> Result<()> {
        let mut parts = query.splitn(4, '?');

        if let Some(attrs) = parts.next() {
            self.attributes = attrs
                .split(',')
                .map(decode)
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(|attr| attr.trim().to_string())
                .filter(|attr| !attr.is_empty())
                .collect();
        }
        if let Some(scope) = parts.next() {
            self.scope = decode(scope)?
                .parse()
                .map_err(LdapFsError::WorkerDefined)?;
        }
        if let Some(filter) = parts.next() {
            self.filter = decode(filter)?.trim().to_string();
        }
        if let Some(exts) = parts.next() {
            for raw in exts.split(',').filter(|e| !e.trim().is_empty()) {
                let (critical, raw) = match raw.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, raw),
                };
                let (name, value) = match raw.find('=') {
                    Some(pos) => (&raw[..pos], &raw[pos + 1..]),
                    None => (raw, ""),
                };
                self.extensions.push(Extension {
                    name: decode(name)?.trim().to_string(),
                    value: decode(value)?,
                    critical,
                });
            }
        }
        Ok(())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: Vec<String>) {
        self.attributes = attributes;
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
    }

    /// Search filter, defaulting to `(objectClass=*)`
    pub fn filter(&self) -> &str {
        if self.filter.is_empty() {
            DEFAULT_FILTER
        } else {
            &self.filter
        }
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    /// Whether the request URL carried a query at all
    pub fn has_query(&self) -> bool {
        self.has_query
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn extension(&self, name: &str) -> Option<&Extension> {
        self.extensions
            .iter()
            .find(|ext| ext.name.eq_ignore_ascii_case(name))
    }

    pub fn extension_value(&self, name: &str) -> Option<&str> {
        self.extension(name).map(|ext| ext.value.as_str())
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extension(name).is_some()
    }

    /// Set (or replace) a non-critical extension
    pub fn set_extension(&mut self, name: &str, value: &str) {
        match self
            .extensions
            .iter_mut()
            .find(|ext| ext.name.eq_ignore_ascii_case(name))
        {
            Some(ext) => ext.value = value.to_string(),
            None => self.extensions.push(Extension {
                name: name.to_string(),
                value: value.to_string(),
                critical: false,
            }),
        }
    }

    /// Serialized URL without the password
    pub fn display(&self) -> String {
        let mut out = format!("{}://", self.scheme);
        if !self.user.is_empty() {
            out.push_str(&utf8_percent_encode(&self.user, EXTENSION).to_string());
            out.push('@');
        }
        out.push_str(&self.host);
        if let Some(port) = self.port {
            out.push_str(&format!(":{}", port));
        }
        out.push('/');
        out.push_str(&utf8_percent_encode(self.dn.as_str(), COMPONENT).to_string());

        let mut query = String::from("?");
        query.push_str(&utf8_percent_encode(&self.attributes.join(","), COMPONENT).to_string());
        query.push('?');
        query.push_str(self.scope.as_str());
        query.push('?');
        if self.filter() != DEFAULT_FILTER {
            query.push_str(&utf8_percent_encode(&self.filter, COMPONENT).to_string());
        }
        query.push('?');
        let exts: Vec<String> = self
            .extensions
            .iter()
            .map(|ext| {
                let mut item = String::new();
                if ext.critical {
                    item.push('!');
                }
                item.push_str(&utf8_percent_encode(&ext.name, EXTENSION).to_string());
                if !ext.value.is_empty() {
                    item.push('=');
                    item.push_str(&utf8_percent_encode(&ext.value, EXTENSION).to_string());
                }
                item
            })
            .collect();
        query.push_str(&exts.join(","));

        out.push_str(query.trim_end_matches(|c| c == '?' || c == ','));
        out
    }
}

impl fmt::Display for LdapUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

fn decode(s: &str) -> Result<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| LdapFsError::WorkerDefined(format!("Invalid URL encoding in {}: {}", s, e)))
}
