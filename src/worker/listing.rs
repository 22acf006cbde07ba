//! Directory listings
//!
//! Flat mode lists the children of the URL's DN as leaf files. Sub mode
//! (`x-dir=sub`) lists every child as a directory and peeks one level
//! further: the first grandchild found is listed too, then that nested
//! lookup is abandoned. The view is two levels deep at most.

use tracing::{debug, warn};

use super::projector::project;
use super::reply::Reply;
use super::search::{PagedSearch, SearchRequest};
use super::session::ConnectionManager;
use crate::directory::{Control, Dn, LdapEntry, Scope, SearchEvent, SearchParams};
use crate::error::Result;
use crate::ldap_url::{LdapUrl, DEFAULT_FILTER};

/// Listing mode selected by the `x-dir` extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Flat,
    Sub,
}

impl ListMode {
    pub fn from_url(url: &LdapUrl) -> Self {
        match url.extension_value("x-dir") {
            Some(mode) if mode.eq_ignore_ascii_case("sub") => ListMode::Sub,
            _ => ListMode::Flat,
        }
    }
}

/// Controls and limits shared by all searches of one listing
pub struct ListingContext {
    pub server_controls: Vec<Control>,
    pub client_controls: Vec<Control>,
    pub page_size: u32,
    pub size_limit: u32,
    pub time_limit: u32,
}

/// List the children of `url`, emitting one entry per child (plus the
/// nested entries in sub mode). Returns the number of entries emitted.
pub async fn list_dir(
    session: &mut ConnectionManager,
    url: &LdapUrl,
    ctx: &ListingContext,
    reply: &mut dyn Reply,
) -> Result<u64> {
    let mode = ListMode::from_url(url);
    let dn_only = vec!["dn".to_string()];

    // Without an explicit query the children are listed
    let scope = if url.has_query() {
        url.scope()
    } else {
        Scope::One
    };
    let attributes = match mode {
        ListMode::Sub => dn_only.clone(),
        ListMode::Flat => url.attributes().to_vec(),
    };

    // Leaves point at the entry itself
    let mut leaf_url = url.clone();
    leaf_url.set_attributes(Vec::new());
    leaf_url.set_extension("x-dir", "base");

    // Directories keep the listing mode so they can be listed in turn
    let mut dir_url = url.clone();
    dir_url.set_scope(Scope::One);

    let request = SearchRequest {
        params: SearchParams {
            base: url.dn().clone(),
            scope,
            filter: url.filter().to_string(),
            attributes,
            size_limit: ctx.size_limit,
            time_limit: ctx.time_limit,
        },
        server_controls: ctx.server_controls.clone(),
        client_controls: ctx.client_controls.clone(),
        page_size: ctx.page_size,
    };

    let shown = url.display();
    let mut search = PagedSearch::start(session, request, shown.clone()).await?;
    let mut total = 0u64;

    while let Some(entry) = search.next(session).await? {
        total += 1;
        match mode {
            ListMode::Flat => reply.list_entry(project(&entry.dn, &leaf_url, false))?,
            ListMode::Sub => {
                reply.list_entry(project(&entry.dn, &dir_url, true))?;
                if let Some(child) = first_child(session, &entry.dn, ctx, &dn_only).await? {
                    reply.list_entry(project(&child.dn, &dir_url, true))?;
                    total += 1;
                }
            }
        }
        debug!("Listed {} entries of {}", total, shown);
    }

    Ok(total)
}

/// First entry one level below `base`; the lookup is abandoned after it.
///
/// Failures of the nested lookup only end the peek, not the listing.
async fn first_child(
    session: &mut ConnectionManager,
    base: &Dn,
    ctx: &ListingContext,
    attributes: &[String],
) -> Result<Option<LdapEntry>> {
    let params = SearchParams {
        base: base.clone(),
        scope: Scope::One,
        filter: DEFAULT_FILTER.to_string(),
        attributes: attributes.to_vec(),
        size_limit: ctx.size_limit,
        time_limit: ctx.time_limit,
    };

    let conn = session.connection()?;
    conn.set_controls(&ctx.server_controls, &ctx.client_controls);
    let id = match conn.search(&params).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Nested search under {} failed: {}", base, e);
            return Ok(None);
        }
    };

    match conn.next_event(id).await {
        Ok(SearchEvent::Entry(entry)) => {
            if let Err(e) = conn.abandon(id).await {
                warn!("Abandoning nested search under {} failed: {}", base, e);
            }
            Ok(Some(entry))
        }
        Ok(SearchEvent::Done { .. }) => Ok(None),
        Err(e) => {
            warn!("Nested search under {} failed: {}", base, e);
            Ok(None)
        }
    }
}
