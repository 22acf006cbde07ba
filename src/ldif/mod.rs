//! Incremental LDIF (RFC 2849) change parser
//!
//! Input arrives in arbitrary chunks through [`LdifParser::feed`]; the
//! caller pulls completed items with [`LdifParser::next_event`] until it
//! returns `Ok(None)`, then feeds more data or calls
//! [`LdifParser::finish`] at end of input. A record is only handed out
//! once its terminating blank line (or the end of input) has been seen.
//!
//! Folded lines need one line of lookahead, so a logical line is complete
//! only when the following physical line has arrived.

pub mod writer;

use std::collections::VecDeque;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::trace;

use crate::directory::{Attribute, Control, Dn, ModOp, Modification};

pub use writer::render_entry;

/// One change decoded from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Add {
        dn: Dn,
        attributes: Vec<Attribute>,
    },
    Modify {
        dn: Dn,
        modifications: Vec<Modification>,
    },
    Delete {
        dn: Dn,
    },
    Rename {
        dn: Dn,
        new_rdn: String,
        new_superior: Option<Dn>,
        delete_old_rdn: bool,
    },
}

impl ChangeRecord {
    pub fn dn(&self) -> &Dn {
        match self {
            ChangeRecord::Add { dn, .. }
            | ChangeRecord::Modify { dn, .. }
            | ChangeRecord::Delete { dn }
            | ChangeRecord::Rename { dn, .. } => dn,
        }
    }
}

/// Item produced by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdifEvent {
    /// `control:` line; applies to the operations that follow
    Control(Control),
    Record(ChangeRecord),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LdifError {
    /// Malformed input; `line` is 1-based
    #[error("line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    /// End of input inside a record that never became complete
    #[error("incomplete record at end of input")]
    Incomplete,
}

/// Record being assembled
#[derive(Debug)]
enum Builder {
    /// Between records
    Idle,
    /// `dn:` seen, kind not decided yet
    Header { dn: Dn },
    Add {
        dn: Dn,
        attributes: Vec<Attribute>,
    },
    Delete {
        dn: Dn,
    },
    Modify {
        dn: Dn,
        modifications: Vec<Modification>,
        current: Option<Modification>,
    },
    Rename {
        dn: Dn,
        new_rdn: Option<String>,
        new_superior: Option<Dn>,
        delete_old_rdn: bool,
    },
}

/// Logical line waiting for possible continuation lines
struct PendingLine {
    line: usize,
    data: Vec<u8>,
}

/// Resumable LDIF parser
pub struct LdifParser {
    buffer: Vec<u8>,
    pending: Option<PendingLine>,
    /// Physical lines consumed so far
    line: usize,
    eof: bool,
    seen_dn: bool,
    builder: Builder,
    events: VecDeque<LdifEvent>,
}

impl Default for LdifParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LdifParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            pending: None,
            line: 0,
            eof: false,
            seen_dn: false,
            builder: Builder::Idle,
            events: VecDeque::new(),
        }
    }

    /// Append a chunk of input
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Signal end of input
    pub fn finish(&mut self) {
        self.eof = true;
    }

    /// Number of physical lines consumed
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Next completed item, `Ok(None)` when more input is needed (or, after
    /// `finish`, when the input is exhausted).
    pub fn next_event(&mut self) -> Result<Option<LdifEvent>, LdifError> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            match self.next_logical_line() {
                Some(pending) => self.process_line(pending.line, &pending.data)?,
                None if self.eof => {
                    self.end_of_input()?;
                    return Ok(self.events.pop_front());
                }
                None => return Ok(None),
            }
        }
    }

    /// Take one physical line from the buffer, without its terminator
    fn next_physical_line(&mut self) -> Option<Vec<u8>> {
        let mut line = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                line
            }
            None if self.eof && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
            None => return None,
        };
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.line += 1;
        Some(line)
    }

    /// Assemble the next logical line, unfolding continuation lines
    fn next_logical_line(&mut self) -> Option<PendingLine> {
        // Blank lines are never continued; release them without lookahead
        if self.pending.as_ref().is_some_and(|p| p.data.is_empty()) {
            return self.pending.take();
        }
        while let Some(physical) = self.next_physical_line() {
            match &mut self.pending {
                Some(pending) if !pending.data.is_empty() && physical.first() == Some(&b' ') => {
                    pending.data.extend_from_slice(&physical[1..]);
                }
                _ => {
                    let next = PendingLine {
                        line: self.line,
                        data: physical,
                    };
                    let blank = next.data.is_empty();
                    match self.pending.replace(next) {
                        Some(done) => return Some(done),
                        None if blank => return self.pending.take(),
                        None => {}
                    }
                }
            }
        }
        if self.eof {
            return self.pending.take();
        }
        None
    }

    fn process_line(&mut self, line: usize, data: &[u8]) -> Result<(), LdifError> {
        if data.is_empty() {
            return self.end_record(line);
        }
        if data[0] == b'#' {
            return Ok(());
        }
        if data == b"-" {
            return self.close_modify_group(line);
        }

        let (name, value) = split_line(line, data)?;
        trace!("LDIF line {}: {}", line, name);
        let lname = name.to_ascii_lowercase();

        let builder = std::mem::replace(&mut self.builder, Builder::Idle);
        self.builder = match builder {
            Builder::Idle => match lname.as_str() {
                "version" if !self.seen_dn => {
                    if text(line, &value)?.trim() != "1" {
                        return Err(invalid(line, "unsupported LDIF version"));
                    }
                    Builder::Idle
                }
                "version" => return Err(invalid(line, "version must precede the first entry")),
                "dn" => {
                    self.seen_dn = true;
                    Builder::Header {
                        dn: Dn::new(text(line, &value)?.trim()),
                    }
                }
                _ => return Err(invalid(line, &format!("expected dn, found {}", name))),
            },

            Builder::Header { dn } => match lname.as_str() {
                "control" => {
                    let spec = text(line, &value)?;
                    let control = Control::parse_spec(&spec)
                        .ok_or_else(|| invalid(line, "malformed control"))?;
                    self.events.push_back(LdifEvent::Control(control));
                    Builder::Header { dn }
                }
                "changetype" => match text(line, &value)?.trim().to_ascii_lowercase().as_str() {
                    "add" => Builder::Add {
                        dn,
                        attributes: Vec::new(),
                    },
                    "delete" => Builder::Delete { dn },
                    "modify" => Builder::Modify {
                        dn,
                        modifications: Vec::new(),
                        current: None,
                    },
                    "modrdn" | "moddn" => Builder::Rename {
                        dn,
                        new_rdn: None,
                        new_superior: None,
                        delete_old_rdn: false,
                    },
                    other => return Err(invalid(line, &format!("unknown changetype {}", other))),
                },
                "dn" => return Err(invalid(line, "dn without a preceding blank line")),
                _ => {
                    let mut attributes = Vec::new();
                    add_value(&mut attributes, name, value);
                    Builder::Add { dn, attributes }
                }
            },

            Builder::Add { dn, mut attributes } => match lname.as_str() {
                "dn" | "changetype" | "control" => {
                    return Err(invalid(line, &format!("unexpected {} in entry", name)))
                }
                _ => {
                    add_value(&mut attributes, name, value);
                    Builder::Add { dn, attributes }
                }
            },

            Builder::Delete { .. } => {
                return Err(invalid(line, "delete record takes no further lines"))
            }

            Builder::Modify {
                dn,
                modifications,
                current: None,
            } => {
                let op = match lname.as_str() {
                    "add" => ModOp::Add,
                    "delete" => ModOp::Delete,
                    "replace" => ModOp::Replace,
                    _ => {
                        return Err(invalid(
                            line,
                            &format!("expected add, delete or replace, found {}", name),
                        ))
                    }
                };
                let attribute = text(line, &value)?.trim().to_string();
                if attribute.is_empty() {
                    return Err(invalid(line, "modify operation without attribute"));
                }
                Builder::Modify {
                    dn,
                    modifications,
                    current: Some(Modification {
                        op,
                        attribute,
                        values: Vec::new(),
                    }),
                }
            }

            Builder::Modify {
                dn,
                modifications,
                current: Some(mut current),
            } => {
                if !current.attribute.eq_ignore_ascii_case(name) {
                    return Err(invalid(
                        line,
                        &format!(
                            "attribute {} does not match modify group {}",
                            name, current.attribute
                        ),
                    ));
                }
                current.values.push(value);
                Builder::Modify {
                    dn,
                    modifications,
                    current: Some(current),
                }
            }

            Builder::Rename {
                dn,
                new_rdn,
                new_superior,
                delete_old_rdn,
            } => match lname.as_str() {
                "newrdn" => Builder::Rename {
                    dn,
                    new_rdn: Some(text(line, &value)?.trim().to_string()),
                    new_superior,
                    delete_old_rdn,
                },
                "newsuperior" => Builder::Rename {
                    dn,
                    new_rdn,
                    new_superior: Some(Dn::new(text(line, &value)?.trim())),
                    delete_old_rdn,
                },
                "deleteoldrdn" => {
                    let flag = match text(line, &value)?.trim() {
                        "0" => false,
                        "1" => true,
                        _ => return Err(invalid(line, "deleteoldrdn must be 0 or 1")),
                    };
                    Builder::Rename {
                        dn,
                        new_rdn,
                        new_superior,
                        delete_old_rdn: flag,
                    }
                }
                _ => return Err(invalid(line, &format!("unexpected {} in modrdn record", name))),
            },
        };
        Ok(())
    }

    fn close_modify_group(&mut self, line: usize) -> Result<(), LdifError> {
        match &mut self.builder {
            Builder::Modify {
                modifications,
                current,
                ..
            } => {
                if let Some(done) = current.take() {
                    modifications.push(done);
                }
                Ok(())
            }
            _ => Err(invalid(line, "'-' outside of a modify record")),
        }
    }

    /// Blank line: the record in progress is complete
    fn end_record(&mut self, line: usize) -> Result<(), LdifError> {
        match self.complete_record() {
            Ok(Some(record)) => {
                self.events.push_back(LdifEvent::Record(record));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(reason) => Err(invalid(line, reason)),
        }
    }

    fn end_of_input(&mut self) -> Result<(), LdifError> {
        match self.complete_record() {
            Ok(Some(record)) => {
                self.events.push_back(LdifEvent::Record(record));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => Err(LdifError::Incomplete),
        }
    }

    fn complete_record(&mut self) -> Result<Option<ChangeRecord>, &'static str> {
        let record = match std::mem::replace(&mut self.builder, Builder::Idle) {
            Builder::Idle => return Ok(None),
            Builder::Header { .. } => return Err("entry without changes"),
            Builder::Add { dn, attributes } => ChangeRecord::Add { dn, attributes },
            Builder::Delete { dn } => ChangeRecord::Delete { dn },
            Builder::Modify {
                dn,
                mut modifications,
                current,
            } => {
                modifications.extend(current);
                ChangeRecord::Modify { dn, modifications }
            }
            Builder::Rename {
                dn,
                new_rdn,
                new_superior,
                delete_old_rdn,
            } => ChangeRecord::Rename {
                dn,
                new_rdn: new_rdn.ok_or("modrdn record without newrdn")?,
                new_superior,
                delete_old_rdn,
            },
        };
        Ok(Some(record))
    }
}

fn invalid(line: usize, reason: &str) -> LdifError {
    LdifError::InvalidLine {
        line,
        reason: reason.to_string(),
    }
}

/// Split `name: value`, `name:: base64` and reject `name:< url`
fn split_line(line: usize, data: &[u8]) -> Result<(&str, Vec<u8>), LdifError> {
    let colon = data
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| invalid(line, "missing ':'"))?;

    let name = std::str::from_utf8(&data[..colon])
        .map_err(|_| invalid(line, "attribute name is not valid UTF-8"))?
        .trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | ';' | '.' | '_'))
    {
        return Err(invalid(line, "invalid attribute name"));
    }

    let rest = &data[colon + 1..];
    let value = match rest.first() {
        Some(b':') => {
            let encoded: Vec<u8> = rest[1..]
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(encoded)
                .map_err(|_| invalid(line, "invalid base64 value"))?
        }
        Some(b'<') => return Err(invalid(line, "URL values are not supported")),
        _ => {
            let start = rest.iter().take_while(|&&b| b == b' ').count();
            rest[start..].to_vec()
        }
    };
    Ok((name, value))
}

fn text(line: usize, value: &[u8]) -> Result<String, LdifError> {
    String::from_utf8(value.to_vec()).map_err(|_| invalid(line, "value is not valid UTF-8"))
}

/// Add-record values; empty values are skipped
fn add_value(attributes: &mut Vec<Attribute>, name: &str, value: Vec<u8>) {
    if value.is_empty() {
        return;
    }
    match attributes
        .iter_mut()
        .find(|attr| attr.name.eq_ignore_ascii_case(name))
    {
        Some(attr) => attr.values.push(value),
        None => attributes.push(Attribute::new(name, vec![value])),
    }
}
