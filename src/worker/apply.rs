//! Change-stream applier
//!
//! Feeds an LDIF change stream chunk by chunk into the parser and applies
//! every record the moment it is complete. Records already applied stay
//! applied when a later one fails.

use std::io;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::session::ConnectionManager;
use crate::directory::{Control, ResultCode};
use crate::error::{LdapFsError, Result};
use crate::ldif::{ChangeRecord, LdifError, LdifEvent, LdifParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    AwaitingData,
    Parsing,
    Done,
    Failed,
}

pub struct ChangeApplier<'a> {
    session: &'a mut ConnectionManager,
    url: String,
    overwrite: bool,
    server_controls: Vec<Control>,
    client_controls: Vec<Control>,
    parser: LdifParser,
    state: ApplyState,
    applied: usize,
}

impl<'a> ChangeApplier<'a> {
    pub fn new(
        session: &'a mut ConnectionManager,
        url: String,
        server_controls: Vec<Control>,
        client_controls: Vec<Control>,
        overwrite: bool,
    ) -> Self {
        Self {
            session,
            url,
            overwrite,
            server_controls,
            client_controls,
            parser: LdifParser::new(),
            state: ApplyState::AwaitingData,
            applied: 0,
        }
    }

    /// Consume a whole input stream; returns the number of records applied
    pub async fn run<S>(mut self, mut input: S) -> Result<usize>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        while let Some(chunk) = input.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.state = ApplyState::Failed;
                    return Err(e.into());
                }
            };
            self.feed(&chunk).await?;
        }
        self.finish().await?;
        Ok(self.applied)
    }

    /// Parse one chunk, applying every record it completes
    pub async fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.ensure_active()?;
        self.state = ApplyState::Parsing;
        self.parser.feed(chunk);
        self.drain().await?;
        self.state = ApplyState::AwaitingData;
        Ok(())
    }

    /// End of input: flush the final record
    pub async fn finish(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = ApplyState::Parsing;
        self.parser.finish();
        self.drain().await?;
        self.state = ApplyState::Done;
        info!("Applied {} change record(s) to {}", self.applied, self.url);
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            ApplyState::Done | ApplyState::Failed => Err(LdapFsError::Internal(format!(
                "change stream already {:?}",
                self.state
            ))),
            _ => Ok(()),
        }
    }

    async fn drain(&mut self) -> Result<()> {
        loop {
            let event = match self.parser.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(LdifError::InvalidLine { line, reason }) => {
                    self.state = ApplyState::Failed;
                    return Err(LdapFsError::InvalidInput { line, reason });
                }
                Err(LdifError::Incomplete) => {
                    self.state = ApplyState::Failed;
                    return Err(LdapFsError::Internal("The LDIF parser failed.".to_string()));
                }
            };

            match event {
                LdifEvent::Control(control) => {
                    debug!("Control {} for following operations", control.oid);
                    self.server_controls.push(control);
                }
                LdifEvent::Record(record) => {
                    if let Err(e) = self.apply(record).await {
                        self.state = ApplyState::Failed;
                        return Err(e);
                    }
                    self.applied += 1;
                }
            }
        }
    }

    async fn apply(&mut self, record: ChangeRecord) -> Result<()> {
        let conn = self.session.connection()?;
        conn.set_controls(&self.server_controls, &self.client_controls);

        let result = match &record {
            ChangeRecord::Delete { dn } => {
                debug!("Deleting {}", dn);
                conn.delete(dn).await
            }
            ChangeRecord::Rename {
                dn,
                new_rdn,
                new_superior,
                delete_old_rdn,
            } => {
                debug!(
                    "Renaming {} to {} (new superior {:?}, delete old rdn {})",
                    dn, new_rdn, new_superior, delete_old_rdn
                );
                conn.rename(dn, new_rdn, new_superior.as_ref(), *delete_old_rdn)
                    .await
            }
            ChangeRecord::Modify { dn, modifications } => {
                debug!("Modifying {} ({} operations)", dn, modifications.len());
                conn.modify(dn, modifications).await
            }
            ChangeRecord::Add { dn, attributes } => {
                debug!("Adding {}", dn);
                let added = conn.add(dn, attributes).await;
                match added {
                    Err(e) if e.code == ResultCode::ALREADY_EXISTS && self.overwrite => {
                        info!("{} already exists, deleting it first", dn);
                        let deleted = conn.delete(dn).await;
                        match deleted {
                            Ok(()) => conn.add(dn, attributes).await,
                            Err(e) => Err(e),
                        }
                    }
                    other => other,
                }
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "Change to {} ending at line {} failed: {}",
                    record.dn(),
                    self.parser.line_number(),
                    e
                );
                Err(self.session.fail(e, &self.url).await)
            }
        }
    }
}
