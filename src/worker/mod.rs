//! Filesystem verbs on top of one directory session
//!
//! [`LdapWorker`] serves one request at a time. Every verb first makes
//! sure the session matches the server described by the request URL
//! (reconnecting when it does not), then runs the matching engine and
//! reports through a [`Reply`].

pub mod apply;
pub mod listing;
pub mod projector;
pub mod reply;
pub mod search;
pub mod session;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, info, warn};

use crate::credentials::CredentialCache;
use crate::directory::{Control, DirectoryConnector, SearchEvent, SearchParams};
use crate::error::{LdapFsError, Result};
use crate::ldap_url::LdapUrl;
use crate::ldif::render_entry;
use crate::server::{ServerConfig, ServerDefaults};

pub use apply::{ApplyState, ChangeApplier};
pub use listing::{ListMode, ListingContext};
pub use projector::{project, FileType, FsEntry, LEAF_SUFFIX, TEXT_MIME};
pub use reply::{BufferedReply, ConsoleReply, Reply};
pub use search::{PagedSearch, SearchRequest};
pub use session::ConnectionManager;

const SERVER_CONTROL_KEY: &str = "SERVER_CTRL";
const CLIENT_CONTROL_KEY: &str = "CLIENT_CTRL";

/// One filesystem request: the target URL plus caller metadata
#[derive(Debug, Clone)]
pub struct Request {
    pub url: LdapUrl,
    pub metadata: HashMap<String, String>,
}

impl Request {
    pub fn new(url: LdapUrl) -> Self {
        Self {
            url,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Server and client controls from `SERVER_CTRL0..n` / `CLIENT_CTRL0..n`.
///
/// Numbering stops at the first missing index. Values that do not parse
/// as a control are skipped.
pub fn controls_from_metadata(metadata: &HashMap<String, String>) -> (Vec<Control>, Vec<Control>) {
    (
        numbered_controls(metadata, SERVER_CONTROL_KEY),
        numbered_controls(metadata, CLIENT_CONTROL_KEY),
    )
}

fn numbered_controls(metadata: &HashMap<String, String>, prefix: &str) -> Vec<Control> {
    let mut controls = Vec::new();
    for i in 0.. {
        let Some(spec) = metadata.get(&format!("{}{}", prefix, i)) else {
            break;
        };
        match Control::parse_spec(spec) {
            Some(control) => {
                debug!("{}{}: oid {} critical {}", prefix, i, control.oid, control.critical);
                controls.push(control);
            }
            None => warn!("Ignoring malformed {}{}: {:?}", prefix, i, spec),
        }
    }
    controls
}

/// Directory worker: one session, one request at a time
pub struct LdapWorker {
    session: ConnectionManager,
    defaults: ServerDefaults,
}

impl LdapWorker {
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        credentials: Arc<dyn CredentialCache>,
        defaults: ServerDefaults,
    ) -> Self {
        Self {
            session: ConnectionManager::new(connector, credentials),
            defaults,
        }
    }

    pub fn session(&self) -> &ConnectionManager {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Reconnect if the request targets a different server configuration
    async fn change_check(&mut self, url: &LdapUrl) -> Result<ServerConfig> {
        let config = ServerConfig::from_url(url, &self.defaults);
        self.session.ensure_session(config.clone(), &url.display()).await?;
        Ok(config)
    }

    /// Read: every matching entry rendered as LDIF
    pub async fn get(&mut self, req: &Request, reply: &mut dyn Reply) -> Result<()> {
        let url = &req.url;
        debug!("get({})", url);
        let config = self.change_check(url).await?;
        let (server_controls, client_controls) = controls_from_metadata(&req.metadata);

        reply.mime_type(TEXT_MIME);

        let request = SearchRequest {
            params: SearchParams {
                base: url.dn().clone(),
                scope: url.scope(),
                filter: url.filter().to_string(),
                attributes: url.attributes().to_vec(),
                size_limit: config.size_limit,
                time_limit: config.time_limit,
            },
            server_controls,
            client_controls,
            page_size: config.page_size,
        };

        let shown = url.display();
        let mut search = PagedSearch::start(&mut self.session, request, shown).await?;
        let mut processed = 0u64;
        while let Some(entry) = search.next(&mut self.session).await? {
            let rendered = render_entry(&entry);
            reply.data(&rendered)?;
            processed += rendered.len() as u64;
            reply.processed_size(processed);
        }

        reply.total_size(processed);
        reply.data(&[])?;
        info!(
            "Read {} entries ({} bytes, {} page(s)) from {}",
            search.entries(),
            processed,
            search.pages(),
            url
        );
        Ok(())
    }

    /// Stat: confirm the entry exists and describe it
    pub async fn stat(&mut self, req: &Request, reply: &mut dyn Reply) -> Result<()> {
        let url = &req.url;
        debug!("stat({})", url);
        let config = self.change_check(url).await?;
        let shown = url.display();

        let params = SearchParams {
            base: url.dn().clone(),
            scope: url.scope(),
            filter: url.filter().to_string(),
            attributes: vec!["dn".to_string()],
            size_limit: config.size_limit,
            time_limit: config.time_limit,
        };

        let conn = self.session.connection()?;
        conn.set_controls(&[], &[]);
        let started = conn.search(&params).await;
        let id = match started {
            Ok(id) => id,
            Err(e) => return Err(self.session.fail(e, &shown).await),
        };

        let event = self.session.connection()?.next_event(id).await;
        match event {
            Ok(SearchEvent::Entry(_)) => {
                let abandoned = self.session.connection()?.abandon(id).await;
                if let Err(e) = abandoned {
                    return Err(self.session.fail(e, &shown).await);
                }
            }
            Ok(SearchEvent::Done { .. }) => return Err(LdapFsError::DoesNotExist(shown)),
            Err(e) => return Err(self.session.fail(e, &shown).await),
        }

        let is_directory = !matches!(
            url.extension_value("x-dir"),
            Some(mode) if mode.eq_ignore_ascii_case("base")
        );
        reply.stat_entry(project(url.dn(), url, is_directory))?;
        Ok(())
    }

    /// List: children of the URL's DN
    pub async fn list_dir(&mut self, req: &Request, reply: &mut dyn Reply) -> Result<u64> {
        let url = &req.url;
        debug!("list_dir({})", url);
        let config = self.change_check(url).await?;
        let (server_controls, client_controls) = controls_from_metadata(&req.metadata);

        let ctx = ListingContext {
            server_controls,
            client_controls,
            page_size: config.page_size,
            size_limit: config.size_limit,
            time_limit: config.time_limit,
        };
        listing::list_dir(&mut self.session, url, &ctx, reply).await
    }

    /// Write: apply an LDIF change stream; returns the records applied
    pub async fn put<S>(&mut self, req: &Request, input: S, overwrite: bool) -> Result<usize>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let url = &req.url;
        debug!("put({}, overwrite={})", url, overwrite);
        self.change_check(url).await?;
        let (server_controls, client_controls) = controls_from_metadata(&req.metadata);

        ChangeApplier::new(
            &mut self.session,
            url.display(),
            server_controls,
            client_controls,
            overwrite,
        )
        .run(input)
        .await
    }

    /// Delete the URL's entry
    pub async fn del(&mut self, req: &Request) -> Result<()> {
        let url = &req.url;
        debug!("del({})", url);
        self.change_check(url).await?;
        let (server_controls, client_controls) = controls_from_metadata(&req.metadata);
        let shown = url.display();

        let conn = self.session.connection()?;
        conn.set_controls(&server_controls, &client_controls);
        let result = conn.delete(url.dn()).await;
        match result {
            Ok(()) => {
                info!("Deleted {}", url.dn());
                Ok(())
            }
            Err(e) => Err(self.session.fail(e, &shown).await),
        }
    }

    /// End the session
    pub async fn close(&mut self) {
        self.session.close().await;
    }
}
