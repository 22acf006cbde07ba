//! Output side of the filesystem verbs
//!
//! Verbs report through a [`Reply`]: the mimetype and data chunks of a
//! read (a zero-length chunk marks the end), size progress, and the
//! entries produced by list and stat.

use std::io::{self, Write};

use super::projector::FsEntry;

pub trait Reply: Send {
    fn mime_type(&mut self, mime: &str);

    /// Payload chunk; empty means end of data
    fn data(&mut self, data: &[u8]) -> io::Result<()>;

    fn processed_size(&mut self, bytes: u64);

    fn total_size(&mut self, bytes: u64);

    fn list_entry(&mut self, entry: FsEntry) -> io::Result<()>;

    fn stat_entry(&mut self, entry: FsEntry) -> io::Result<()>;
}

/// Collects everything in memory
#[derive(Debug, Default)]
pub struct BufferedReply {
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
    /// Set once the end-of-data chunk arrived
    pub finished: bool,
    pub processed: u64,
    pub total: Option<u64>,
    pub entries: Vec<FsEntry>,
    pub stat: Option<FsEntry>,
}

impl BufferedReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }
}

impl Reply for BufferedReply {
    fn mime_type(&mut self, mime: &str) {
        self.mime_type = Some(mime.to_string());
    }

    fn data(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            self.finished = true;
        } else {
            self.data.extend_from_slice(data);
        }
        Ok(())
    }

    fn processed_size(&mut self, bytes: u64) {
        self.processed = bytes;
    }

    fn total_size(&mut self, bytes: u64) {
        self.total = Some(bytes);
    }

    fn list_entry(&mut self, entry: FsEntry) -> io::Result<()> {
        self.entries.push(entry);
        Ok(())
    }

    fn stat_entry(&mut self, entry: FsEntry) -> io::Result<()> {
        self.stat = Some(entry);
        Ok(())
    }
}

/// Writes data verbatim and entries as `mode name url` lines
pub struct ConsoleReply<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> ConsoleReply<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_entry(&mut self, entry: &FsEntry) -> io::Result<()> {
        writeln!(self.out, "{:o} {} {}", entry.mode(), entry.name, entry.url)
    }
}

impl<W: Write + Send> Reply for ConsoleReply<W> {
    fn mime_type(&mut self, _mime: &str) {}

    fn data(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return self.out.flush();
        }
        self.out.write_all(data)
    }

    fn processed_size(&mut self, _bytes: u64) {}

    fn total_size(&mut self, _bytes: u64) {}

    fn list_entry(&mut self, entry: FsEntry) -> io::Result<()> {
        self.write_entry(&entry)
    }

    fn stat_entry(&mut self, entry: FsEntry) -> io::Result<()> {
        self.write_entry(&entry)?;
        self.out.flush()
    }
}
