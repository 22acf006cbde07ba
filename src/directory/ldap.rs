//! Directory connection backed by the `ldap3` crate
//!
//! Uses the async API: the connection driver is spawned on the current
//! runtime and every operation goes through the cloned `Ldap` handle.
//! Searches are streamed so entries reach the caller as they arrive; each
//! outstanding stream is kept until it finishes or is abandoned.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ldap3::controls::RawControl;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, SearchEntry,
    SearchOptions, SearchStream,
};
use tracing::{debug, trace, warn};

use super::{
    Attribute, Control, DirectoryConnection, DirectoryConnector, Dn, LdapEntry, ModOp,
    Modification, OpResult, ProtocolError, ResultCode, Scope, SearchEvent, SearchId, SearchParams,
};
use crate::server::{AuthMode, Security, ServerConfig};

type Stream = SearchStream<'static, String, Vec<String>>;

/// Opens `ldap3` connections
#[derive(Debug, Default, Clone)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, server: &ServerConfig) -> OpResult<Box<dyn DirectoryConnection>> {
        let url = server.connection_url();
        let settings = LdapConnSettings::new()
            .set_conn_timeout(server.connect_timeout)
            .set_starttls(server.security == Security::Tls)
            .set_no_tls_verify(!server.tls_verify);

        if server.version != 3 {
            warn!(
                "Protocol version {} requested for {}; only version 3 is spoken",
                server.version, url
            );
        }
        debug!("Connecting to {}", url);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| ProtocolError::new(ResultCode::CONNECT_ERROR, e.to_string()))?;
        ldap3::drive!(conn);

        Ok(Box::new(Ldap3Connection::new(ldap)))
    }
}

/// One live `ldap3` connection
pub struct Ldap3Connection {
    ldap: Ldap,
    server_controls: Vec<RawControl>,
    searches: HashMap<SearchId, Stream>,
    next_search: u64,
    last_error: Option<ProtocolError>,
}

impl Ldap3Connection {
    fn new(ldap: Ldap) -> Self {
        Self {
            ldap,
            server_controls: Vec::new(),
            searches: HashMap::new(),
            next_search: 1,
            last_error: None,
        }
    }

    /// Handle with the current server controls attached to the next request
    fn handle(&mut self) -> &mut Ldap {
        if !self.server_controls.is_empty() {
            self.ldap.with_controls(self.server_controls.clone());
        }
        &mut self.ldap
    }

    fn record<T>(&mut self, result: OpResult<T>) -> OpResult<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    fn check(&mut self, result: Result<LdapResult, LdapError>) -> OpResult<()> {
        let result = result.map_err(protocol_error).and_then(|res| {
            if res.rc == 0 {
                Ok(())
            } else {
                Err(ProtocolError::new(ResultCode(res.rc), res.text))
            }
        });
        self.record(result)
    }
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn bind(&mut self, server: &ServerConfig) -> OpResult<()> {
        let result = match server.auth {
            AuthMode::Anonymous => self.ldap.simple_bind("", "").await,
            AuthMode::Simple => {
                self.ldap
                    .simple_bind(&server.bind_dn, &server.password)
                    .await
            }
            AuthMode::Sasl => {
                if !server.mech.is_empty() && !server.mech.eq_ignore_ascii_case("EXTERNAL") {
                    let err = ProtocolError::new(
                        ResultCode::AUTH_UNKNOWN,
                        format!("SASL mechanism {} is not supported", server.mech),
                    );
                    return self.record(Err(err));
                }
                self.ldap.sasl_external_bind().await
            }
        };
        self.check(result)
    }

    fn set_controls(&mut self, server: &[Control], client: &[Control]) {
        self.server_controls = server
            .iter()
            .map(|ctrl| RawControl {
                ctype: ctrl.oid.clone(),
                crit: ctrl.critical,
                val: ctrl.value.clone(),
            })
            .collect();
        if !client.is_empty() {
            warn!(
                "Ignoring {} client control(s): not supported by the client library",
                client.len()
            );
        }
    }

    async fn search(&mut self, params: &SearchParams) -> OpResult<SearchId> {
        let scope = match params.scope {
            Scope::Base => ldap3::Scope::Base,
            Scope::One => ldap3::Scope::OneLevel,
            Scope::Sub => ldap3::Scope::Subtree,
        };
        let options = SearchOptions::new()
            .sizelimit(clamp_limit(params.size_limit))
            .timelimit(clamp_limit(params.time_limit));

        let ldap = self.handle();
        ldap.with_search_options(options);
        let stream = ldap
            .streaming_search(
                params.base.as_str(),
                scope,
                &params.filter,
                params.attributes.clone(),
            )
            .await
            .map_err(protocol_error);
        let stream = self.record(stream)?;

        let id = SearchId(self.next_search);
        self.next_search += 1;
        trace!("Search {:?} started on {}", id, params.base);
        self.searches.insert(id, stream);
        Ok(id)
    }

    async fn next_event(&mut self, id: SearchId) -> OpResult<SearchEvent> {
        let Some(stream) = self.searches.get_mut(&id) else {
            return Err(ProtocolError::new(
                ResultCode::PARAM_ERROR,
                format!("Unknown search {:?}", id),
            ));
        };

        loop {
            match stream.next().await {
                Ok(Some(entry)) => {
                    if entry.is_ref() || entry.is_intermediate() {
                        continue;
                    }
                    return Ok(SearchEvent::Entry(convert_entry(SearchEntry::construct(
                        entry,
                    ))));
                }
                Ok(None) => break,
                Err(e) => {
                    self.searches.remove(&id);
                    return self.record(Err(protocol_error(e)));
                }
            }
        }

        let result = stream.finish().await;
        self.searches.remove(&id);
        if result.rc != 0 {
            return self.record(Err(ProtocolError::new(ResultCode(result.rc), result.text)));
        }

        let controls = result
            .ctrls
            .into_iter()
            .map(|ldap3::controls::Control(_, raw)| Control::new(raw.ctype, raw.crit, raw.val))
            .collect();
        Ok(SearchEvent::Done { controls })
    }

    async fn abandon(&mut self, id: SearchId) -> OpResult<()> {
        let Some(mut stream) = self.searches.remove(&id) else {
            return Ok(());
        };
        let msgid = stream.ldap_handle().last_id();
        trace!("Abandoning search {:?} (message {})", id, msgid);
        let result = self.ldap.abandon(msgid).await.map_err(protocol_error);
        self.record(result)
    }

    async fn add(&mut self, dn: &Dn, attributes: &[Attribute]) -> OpResult<()> {
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .iter()
            .map(|attr| {
                (
                    attr.name.as_bytes().to_vec(),
                    attr.values.iter().cloned().collect(),
                )
            })
            .collect();
        let result = self.handle().add(dn.as_str(), attrs).await;
        self.check(result)
    }

    async fn modify(&mut self, dn: &Dn, mods: &[Modification]) -> OpResult<()> {
        let mods: Vec<Mod<Vec<u8>>> = mods
            .iter()
            .map(|m| {
                let attr = m.attribute.as_bytes().to_vec();
                let values: HashSet<Vec<u8>> = m.values.iter().cloned().collect();
                match m.op {
                    ModOp::Add => Mod::Add(attr, values),
                    ModOp::Delete => Mod::Delete(attr, values),
                    ModOp::Replace => Mod::Replace(attr, values),
                }
            })
            .collect();
        let result = self.handle().modify(dn.as_str(), mods).await;
        self.check(result)
    }

    async fn delete(&mut self, dn: &Dn) -> OpResult<()> {
        let result = self.handle().delete(dn.as_str()).await;
        self.check(result)
    }

    async fn rename(
        &mut self,
        dn: &Dn,
        new_rdn: &str,
        new_superior: Option<&Dn>,
        delete_old_rdn: bool,
    ) -> OpResult<()> {
        let result = self
            .handle()
            .modifydn(
                dn.as_str(),
                new_rdn,
                delete_old_rdn,
                new_superior.map(|sup| sup.as_str()),
            )
            .await;
        self.check(result)
    }

    fn last_error(&self) -> Option<&ProtocolError> {
        self.last_error.as_ref()
    }

    async fn close(&mut self) {
        self.searches.clear();
        if let Err(e) = self.ldap.unbind().await {
            debug!("Unbind failed: {}", e);
        }
    }
}

fn convert_entry(entry: SearchEntry) -> LdapEntry {
    let mut converted = LdapEntry::new(entry.dn);
    for (name, values) in entry.attrs {
        for value in values {
            converted.add_value(&name, value);
        }
    }
    for (name, values) in entry.bin_attrs {
        for value in values {
            converted.add_value(&name, value);
        }
    }
    converted
}

/// Size and time limits above `i32::MAX` mean "as large as possible"
fn clamp_limit(limit: u32) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

fn protocol_error(err: LdapError) -> ProtocolError {
    let code = match &err {
        LdapError::LdapResult { result } => {
            return ProtocolError::new(ResultCode(result.rc), result.text.clone())
        }
        LdapError::Io { .. } | LdapError::EndOfStream => ResultCode::SERVER_DOWN,
        LdapError::Timeout { .. } => ResultCode::TIMEOUT,
        _ => ResultCode::LOCAL_ERROR,
    };
    ProtocolError::new(code, err.to_string())
}
