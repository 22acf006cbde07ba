//! Common test utilities and fixtures
//!
//! [`MockDirectory`] is an in-memory directory implementing the connection
//! seams. It honours the paged results control (cookies are decimal
//! offsets), supports `(attr=value)` and `(attr=*)` filters and records
//! every operation it receives so tests can check exact call sequences.
//! [`ScriptedCredentials`] answers prompts from a script.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};

use ldap_fs::credentials::{AuthInfo, Credential, CredentialCache, PromptError};
use ldap_fs::directory::{
    Attribute, Control, DirectoryConnection, DirectoryConnector, Dn, LdapEntry, ModOp,
    Modification, OpResult, ProtocolError, ResultCode, Scope, SearchEvent, SearchId,
    SearchParams,
};
use ldap_fs::ldap_url::LdapUrl;
use ldap_fs::server::{AuthMode, ServerConfig, ServerDefaults};
use ldap_fs::worker::{LdapWorker, Request};

// ============================================================================
// Operation log
// ============================================================================

/// One call received by the mock directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    Bind { dn: String, password: String },
    Search {
        base: String,
        scope: Scope,
        attributes: Vec<String>,
        /// Cookie of the paging control, if one was sent
        cookie: Option<Vec<u8>>,
    },
    Abandon,
    Add(String),
    Modify(String),
    Delete(String),
    Rename { dn: String, new_rdn: String },
    Close,
}

impl Op {
    pub fn is_search(&self) -> bool {
        matches!(self, Op::Search { .. })
    }
}

// ============================================================================
// Directory state
// ============================================================================

#[derive(Default)]
struct State {
    /// Entries in insertion order
    entries: Vec<LdapEntry>,
    /// Accepted simple binds: DN -> password
    accounts: HashMap<String, String>,
    allow_anonymous: bool,
    /// Every bind succeeds, whatever the identity
    accept_any_bind: bool,
    connect_error: Option<ProtocolError>,
    bind_error: Option<ProtocolError>,
    /// Forced failures for writes to a DN
    write_errors: HashMap<String, ProtocolError>,
    ops: Vec<Op>,
    connections: usize,
}

impl State {
    fn position(&self, dn: &Dn) -> Option<usize> {
        let wanted = dn.normalized();
        self.entries.iter().position(|e| e.dn.normalized() == wanted)
    }

    fn exists(&self, dn: &Dn) -> bool {
        dn.is_empty() || self.position(dn).is_some()
    }
}

/// Shared in-memory directory; clones see the same data and log
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<State>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        let dir = Self::default();
        dir.state.lock().unwrap().allow_anonymous = true;
        dir
    }

    /// Insert an entry built from `attr: value` pairs
    pub fn with_entry(self, dn: &str, attrs: &[(&str, &str)]) -> Self {
        let mut entry = LdapEntry::new(dn);
        for (name, value) in attrs {
            entry.add_value(name, *value);
        }
        self.state.lock().unwrap().entries.push(entry);
        self
    }

    /// Require a simple bind with this account
    pub fn with_account(self, dn: &str, password: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.allow_anonymous = false;
            state.accounts.insert(dn.to_string(), password.to_string());
        }
        self
    }

    /// Accept every bind, so any server configuration can connect
    pub fn accepting_any_bind(self) -> Self {
        self.state.lock().unwrap().accept_any_bind = true;
        self
    }

    pub fn fail_connect(self, err: ProtocolError) -> Self {
        self.state.lock().unwrap().connect_error = Some(err);
        self
    }

    pub fn fail_bind(self, err: ProtocolError) -> Self {
        self.state.lock().unwrap().bind_error = Some(err);
        self
    }

    pub fn fail_write(self, dn: &str, err: ProtocolError) -> Self {
        self.state
            .lock()
            .unwrap()
            .write_errors
            .insert(Dn::new(dn).normalized(), err);
        self
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    pub fn searches(&self) -> Vec<Op> {
        self.ops().into_iter().filter(Op::is_search).collect()
    }

    /// Write operations only
    pub fn writes(&self) -> Vec<Op> {
        self.ops()
            .into_iter()
            .filter(|op| {
                matches!(
                    op,
                    Op::Add(_) | Op::Modify(_) | Op::Delete(_) | Op::Rename { .. }
                )
            })
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn entry(&self, dn: &str) -> Option<LdapEntry> {
        let state = self.state.lock().unwrap();
        state.position(&Dn::new(dn)).map(|i| state.entries[i].clone())
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.entry(dn).is_some()
    }
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn connect(&self, _server: &ServerConfig) -> OpResult<Box<dyn DirectoryConnection>> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Connect);
        if let Some(err) = state.connect_error.clone() {
            return Err(err);
        }
        state.connections += 1;
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            server_controls: Vec::new(),
            searches: HashMap::new(),
            next_id: 1,
            last_error: None,
        }))
    }
}

// ============================================================================
// Connection
// ============================================================================

enum Pending {
    Event(SearchEvent),
    Error(ProtocolError),
}

pub struct MockConnection {
    state: Arc<Mutex<State>>,
    server_controls: Vec<Control>,
    searches: HashMap<SearchId, VecDeque<Pending>>,
    next_id: u64,
    last_error: Option<ProtocolError>,
}

impl MockConnection {
    fn record<T>(&mut self, result: OpResult<T>) -> OpResult<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    fn write_error(state: &State, dn: &Dn) -> Option<ProtocolError> {
        state.write_errors.get(&dn.normalized()).cloned()
    }
}

fn in_scope(base: &Dn, scope: Scope, dn: &Dn) -> bool {
    let base = base.normalized();
    let dn_norm = dn.normalized();
    match scope {
        Scope::Base => dn_norm == base,
        Scope::One => dn.parent().map(|p| p.normalized()) == Some(base),
        Scope::Sub => {
            dn_norm == base || base.is_empty() || dn_norm.ends_with(&format!(",{}", base))
        }
    }
}

fn matches_filter(entry: &LdapEntry, filter: &str) -> bool {
    let inner = filter.trim().trim_start_matches('(').trim_end_matches(')');
    let Some((name, value)) = inner.split_once('=') else {
        return true;
    };
    if name.eq_ignore_ascii_case("objectClass") && value == "*" {
        return true;
    }
    match entry.values(name) {
        None => false,
        Some(_) if value == "*" => true,
        Some(values) => values
            .iter()
            .any(|v| String::from_utf8_lossy(v).eq_ignore_ascii_case(value)),
    }
}

fn project_attributes(entry: &LdapEntry, attributes: &[String]) -> LdapEntry {
    let mut out = LdapEntry::new(entry.dn.clone());
    for attr in &entry.attributes {
        let wanted = attributes.is_empty()
            || attributes.iter().any(|a| a == "*")
            || attributes.iter().any(|a| a.eq_ignore_ascii_case(&attr.name));
        if wanted {
            out.attributes.push(attr.clone());
        }
    }
    out
}

#[async_trait]
impl DirectoryConnection for MockConnection {
    async fn bind(&mut self, server: &ServerConfig) -> OpResult<()> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(Op::Bind {
                dn: server.bind_dn.clone(),
                password: server.password.clone(),
            });
            if let Some(err) = state.bind_error.clone() {
                Err(err)
            } else if state.accept_any_bind {
                Ok(())
            } else if server.auth == AuthMode::Anonymous && state.allow_anonymous {
                Ok(())
            } else {
                match state.accounts.get(&server.bind_dn) {
                    Some(password) if *password == server.password => Ok(()),
                    _ if state.allow_anonymous && server.bind_dn.is_empty() => Ok(()),
                    _ => Err(ProtocolError::new(
                        ResultCode::INVALID_CREDENTIALS,
                        "invalid credentials",
                    )),
                }
            }
        };
        self.record(result)
    }

    fn set_controls(&mut self, server: &[Control], _client: &[Control]) {
        self.server_controls = server.to_vec();
    }

    async fn search(&mut self, params: &SearchParams) -> OpResult<SearchId> {
        let paging = self
            .server_controls
            .iter()
            .find_map(Control::parse_paged_results);

        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Search {
            base: params.base.to_string(),
            scope: params.scope,
            attributes: params.attributes.clone(),
            cookie: paging.as_ref().map(|(_, cookie)| cookie.clone()),
        });

        let mut events = VecDeque::new();
        if !state.exists(&params.base) {
            events.push_back(Pending::Error(ProtocolError::new(
                ResultCode::NO_SUCH_OBJECT,
                "no such object",
            )));
        } else {
            let matching: Vec<LdapEntry> = state
                .entries
                .iter()
                .filter(|e| in_scope(&params.base, params.scope, &e.dn))
                .filter(|e| matches_filter(e, &params.filter))
                .map(|e| project_attributes(e, &params.attributes))
                .collect();

            let mut controls = Vec::new();
            let page: Vec<LdapEntry> = match &paging {
                Some((size, cookie)) if *size > 0 => {
                    let offset: usize = std::str::from_utf8(cookie)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    let end = (offset + *size as usize).min(matching.len());
                    let next = if end < matching.len() {
                        end.to_string().into_bytes()
                    } else {
                        Vec::new()
                    };
                    controls.push(Control::paged_results(matching.len() as u32, &next));
                    matching[offset.min(end)..end].to_vec()
                }
                _ => matching,
            };

            for entry in page {
                events.push_back(Pending::Event(SearchEvent::Entry(entry)));
            }
            events.push_back(Pending::Event(SearchEvent::Done { controls }));
        }
        drop(state);

        let id = SearchId(self.next_id);
        self.next_id += 1;
        self.searches.insert(id, events);
        Ok(id)
    }

    async fn next_event(&mut self, id: SearchId) -> OpResult<SearchEvent> {
        let next = self.searches.get_mut(&id).and_then(VecDeque::pop_front);
        let result = match next {
            Some(Pending::Event(event)) => {
                if matches!(event, SearchEvent::Done { .. }) {
                    self.searches.remove(&id);
                }
                Ok(event)
            }
            Some(Pending::Error(err)) => {
                self.searches.remove(&id);
                Err(err)
            }
            None => Err(ProtocolError::new(ResultCode::PARAM_ERROR, "unknown search")),
        };
        self.record(result)
    }

    async fn abandon(&mut self, id: SearchId) -> OpResult<()> {
        self.state.lock().unwrap().ops.push(Op::Abandon);
        self.searches.remove(&id);
        Ok(())
    }

    async fn add(&mut self, dn: &Dn, attributes: &[Attribute]) -> OpResult<()> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(Op::Add(dn.to_string()));
            if let Some(err) = Self::write_error(&state, dn) {
                Err(err)
            } else if state.position(dn).is_some() {
                Err(ProtocolError::new(ResultCode::ALREADY_EXISTS, "entry exists"))
            } else {
                state.entries.push(LdapEntry {
                    dn: dn.clone(),
                    attributes: attributes.to_vec(),
                });
                Ok(())
            }
        };
        self.record(result)
    }

    async fn modify(&mut self, dn: &Dn, mods: &[Modification]) -> OpResult<()> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(Op::Modify(dn.to_string()));
            if let Some(err) = Self::write_error(&state, dn) {
                Err(err)
            } else if let Some(i) = state.position(dn) {
                let entry = &mut state.entries[i];
                for m in mods {
                    apply_modification(entry, m);
                }
                Ok(())
            } else {
                Err(ProtocolError::new(ResultCode::NO_SUCH_OBJECT, "no such object"))
            }
        };
        self.record(result)
    }

    async fn delete(&mut self, dn: &Dn) -> OpResult<()> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(Op::Delete(dn.to_string()));
            if let Some(err) = Self::write_error(&state, dn) {
                Err(err)
            } else if let Some(i) = state.position(dn) {
                state.entries.remove(i);
                Ok(())
            } else {
                Err(ProtocolError::new(ResultCode::NO_SUCH_OBJECT, "no such object"))
            }
        };
        self.record(result)
    }

    async fn rename(
        &mut self,
        dn: &Dn,
        new_rdn: &str,
        new_superior: Option<&Dn>,
        _delete_old_rdn: bool,
    ) -> OpResult<()> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(Op::Rename {
                dn: dn.to_string(),
                new_rdn: new_rdn.to_string(),
            });
            match state.position(dn) {
                Some(i) => {
                    let parent = new_superior.cloned().or_else(|| dn.parent()).unwrap_or_default();
                    state.entries[i].dn = parent.child(new_rdn);
                    Ok(())
                }
                None => Err(ProtocolError::new(ResultCode::NO_SUCH_OBJECT, "no such object")),
            }
        };
        self.record(result)
    }

    fn last_error(&self) -> Option<&ProtocolError> {
        self.last_error.as_ref()
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().ops.push(Op::Close);
        self.searches.clear();
    }
}

fn apply_modification(entry: &mut LdapEntry, m: &Modification) {
    let existing = entry
        .attributes
        .iter()
        .position(|a| a.name.eq_ignore_ascii_case(&m.attribute));
    match (m.op, existing) {
        (ModOp::Add, Some(i)) => entry.attributes[i].values.extend(m.values.iter().cloned()),
        (ModOp::Add, None) | (ModOp::Replace, None) => {
            if !m.values.is_empty() {
                entry
                    .attributes
                    .push(Attribute::new(m.attribute.clone(), m.values.clone()));
            }
        }
        (ModOp::Replace, Some(i)) => {
            if m.values.is_empty() {
                entry.attributes.remove(i);
            } else {
                entry.attributes[i].values = m.values.clone();
            }
        }
        (ModOp::Delete, Some(i)) => {
            if m.values.is_empty() {
                entry.attributes.remove(i);
            } else {
                entry.attributes[i].values.retain(|v| !m.values.contains(v));
            }
        }
        (ModOp::Delete, None) => {}
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Default)]
struct CredentialState {
    cached: Option<Credential>,
    answers: VecDeque<Result<Credential, PromptError>>,
    /// Annotation passed to each prompt
    prompts: Vec<Option<String>>,
    persisted: Vec<Credential>,
}

/// Credential cache answering prompts from a script
#[derive(Clone, Default)]
pub struct ScriptedCredentials {
    state: Arc<Mutex<CredentialState>>,
}

impl ScriptedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cached(self, username: &str, password: &str) -> Self {
        self.state.lock().unwrap().cached = Some(credential(username, password, false));
        self
    }

    pub fn answer(self, username: &str, password: &str, keep: bool) -> Self {
        self.state
            .lock()
            .unwrap()
            .answers
            .push_back(Ok(credential(username, password, keep)));
        self
    }

    pub fn cancel(self) -> Self {
        self.state
            .lock()
            .unwrap()
            .answers
            .push_back(Err(PromptError::Canceled));
        self
    }

    pub fn prompts(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().prompts.clone()
    }

    pub fn persisted(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .persisted
            .iter()
            .map(|c| c.username.clone())
            .collect()
    }
}

fn credential(username: &str, password: &str, keep: bool) -> Credential {
    Credential {
        username: username.to_string(),
        password: password.to_string(),
        keep,
    }
}

#[async_trait]
impl CredentialCache for ScriptedCredentials {
    async fn check_cached(&self, _info: &AuthInfo) -> Option<Credential> {
        self.state.lock().unwrap().cached.clone()
    }

    async fn prompt(
        &self,
        _info: &AuthInfo,
        annotation: Option<&str>,
    ) -> Result<Credential, PromptError> {
        let mut state = self.state.lock().unwrap();
        state.prompts.push(annotation.map(str::to_string));
        state
            .answers
            .pop_front()
            .unwrap_or(Err(PromptError::Canceled))
    }

    async fn persist(&self, _info: &AuthInfo, credential: &Credential) {
        self.state.lock().unwrap().persisted.push(credential.clone());
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Small tree:
///
/// ```text
/// dc=example,dc=org
/// ├── ou=people
/// │   ├── cn=alice
/// │   └── cn=bob
/// └── ou=groups
///     └── cn=admins
/// ```
pub fn sample_directory() -> MockDirectory {
    MockDirectory::new()
        .with_entry("dc=example,dc=org", &[("objectClass", "domain"), ("dc", "example")])
        .with_entry(
            "ou=people,dc=example,dc=org",
            &[("objectClass", "organizationalUnit"), ("ou", "people")],
        )
        .with_entry(
            "cn=alice,ou=people,dc=example,dc=org",
            &[("objectClass", "person"), ("cn", "alice"), ("sn", "Liddell")],
        )
        .with_entry(
            "cn=bob,ou=people,dc=example,dc=org",
            &[("objectClass", "person"), ("cn", "bob"), ("sn", "Builder")],
        )
        .with_entry(
            "ou=groups,dc=example,dc=org",
            &[("objectClass", "organizationalUnit"), ("ou", "groups")],
        )
        .with_entry(
            "cn=admins,ou=groups,dc=example,dc=org",
            &[("objectClass", "groupOfNames"), ("cn", "admins")],
        )
}

pub fn worker(directory: &MockDirectory) -> LdapWorker {
    worker_with(directory, ScriptedCredentials::new(), ServerDefaults::default())
}

pub fn worker_with(
    directory: &MockDirectory,
    credentials: ScriptedCredentials,
    defaults: ServerDefaults,
) -> LdapWorker {
    LdapWorker::new(
        Arc::new(directory.clone()),
        Arc::new(credentials),
        defaults,
    )
}

pub fn request(url: &str) -> Request {
    Request::new(LdapUrl::parse(url).expect("valid test URL"))
}

/// Change stream delivered in chunks of `chunk` bytes
pub fn ldif_stream(
    ldif: &str,
    chunk: usize,
) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin {
    let chunks: Vec<std::io::Result<Bytes>> = ldif
        .as_bytes()
        .chunks(chunk.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks)
}
