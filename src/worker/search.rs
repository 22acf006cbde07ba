//! Paged search driver
//!
//! A [`PagedSearch`] is pulled one entry at a time. When a page completes
//! and the server returned a paging control with a non-empty cookie, the
//! same search is reissued with that cookie, so only the current page is
//! ever outstanding. The session is passed to every call instead of being
//! held, which lets callers run other operations between entries.

use tracing::{debug, trace};

use super::session::ConnectionManager;
use crate::directory::{Control, LdapEntry, SearchEvent, SearchId, SearchParams};
use crate::error::Result;

/// Everything needed to (re)issue a search
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub params: SearchParams,
    pub server_controls: Vec<Control>,
    pub client_controls: Vec<Control>,
    /// 0 disables paging
    pub page_size: u32,
}

pub struct PagedSearch {
    request: SearchRequest,
    /// Display URL for error messages
    url: String,
    id: Option<SearchId>,
    cookie: Vec<u8>,
    pages: usize,
    entries: u64,
}

impl PagedSearch {
    /// Issue the first page
    pub async fn start(
        session: &mut ConnectionManager,
        request: SearchRequest,
        url: String,
    ) -> Result<Self> {
        let mut search = Self {
            request,
            url,
            id: None,
            cookie: Vec::new(),
            pages: 0,
            entries: 0,
        };
        search.issue(session).await?;
        Ok(search)
    }

    async fn issue(&mut self, session: &mut ConnectionManager) -> Result<()> {
        let mut controls = self.request.server_controls.clone();
        if self.request.page_size > 0 {
            controls.push(Control::paged_results(self.request.page_size, &self.cookie));
        }

        let params = &self.request.params;
        debug!(
            "Searching {} scope={} filter={} page={}",
            params.base,
            params.scope,
            params.filter,
            self.pages + 1
        );

        let conn = session.connection()?;
        conn.set_controls(&controls, &self.request.client_controls);
        let result = conn.search(params).await;
        match result {
            Ok(id) => {
                self.id = Some(id);
                self.pages += 1;
                Ok(())
            }
            Err(e) => Err(session.fail(e, &self.url).await),
        }
    }

    /// Next entry across all pages; `None` at the natural end
    pub async fn next(&mut self, session: &mut ConnectionManager) -> Result<Option<LdapEntry>> {
        loop {
            let Some(id) = self.id else {
                return Ok(None);
            };

            let event = session.connection()?.next_event(id).await;
            match event {
                Ok(SearchEvent::Entry(entry)) => {
                    self.entries += 1;
                    trace!("Search entry {}", entry.dn);
                    return Ok(Some(entry));
                }
                Ok(SearchEvent::Done { controls }) => {
                    self.id = None;
                    if let Some(cookie) = self.continuation(&controls) {
                        self.cookie = cookie;
                        self.issue(session).await?;
                        continue;
                    }
                    debug!(
                        "Search finished: {} entries in {} page(s)",
                        self.entries, self.pages
                    );
                    return Ok(None);
                }
                Err(e) => {
                    self.id = None;
                    return Err(session.fail(e, &self.url).await);
                }
            }
        }
    }

    /// Cookie of the next page, if paging continues
    fn continuation(&self, controls: &[Control]) -> Option<Vec<u8>> {
        if self.request.page_size == 0 {
            return None;
        }
        let (estimate, cookie) = controls.iter().find_map(Control::parse_paged_results)?;
        debug!("Paging control: estimated size {}, cookie {} bytes", estimate, cookie.len());
        (estimate >= 0 && !cookie.is_empty()).then_some(cookie)
    }

    /// Stop the outstanding page early
    pub async fn abandon(&mut self, session: &mut ConnectionManager) -> Result<()> {
        if let Some(id) = self.id.take() {
            let result = session.connection()?.abandon(id).await;
            if let Err(e) = result {
                return Err(session.fail(e, &self.url).await);
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn pages(&self) -> usize {
        self.pages
    }
}
