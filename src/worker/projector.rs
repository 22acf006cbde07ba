//! Projection of directory entries onto filesystem entries

use crate::directory::{Dn, Scope};
use crate::ldap_url::LdapUrl;

/// Suffix marking leaf entries
pub const LEAF_SUFFIX: &str = ".ldif";

/// Mimetype of leaf entries
pub const TEXT_MIME: &str = "text/plain";

const DIR_PERMISSIONS: u32 = 0o500;
const FILE_PERMISSIONS: u32 = 0o400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Directory,
    File,
}

/// Filesystem view of one directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub file_type: FileType,
    pub permissions: u32,
    pub mime_type: Option<String>,
    /// Canonical URL of the entry, without password
    pub url: String,
}

impl FsEntry {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// `st_mode` style value: file type bits plus permissions
    pub fn mode(&self) -> u32 {
        let kind = match self.file_type {
            FileType::Directory => libc::S_IFDIR,
            FileType::File => libc::S_IFREG,
        };
        kind as u32 | self.permissions
    }
}

/// Project `dn` into a filesystem entry, deriving its URL from `request`
pub fn project(dn: &Dn, request: &LdapUrl, is_directory: bool) -> FsEntry {
    let mut name = file_name(&dn.first_rdn_value().unwrap_or_default());

    let mut url = request.clone();
    url.set_dn(dn.clone());

    if is_directory {
        url.set_scope(Scope::One);
        FsEntry {
            name,
            file_type: FileType::Directory,
            permissions: DIR_PERMISSIONS,
            mime_type: None,
            url: url.display(),
        }
    } else {
        name.push_str(LEAF_SUFFIX);
        url.set_scope(Scope::Base);
        FsEntry {
            name,
            file_type: FileType::File,
            permissions: FILE_PERMISSIONS,
            mime_type: Some(TEXT_MIME.to_string()),
            url: url.display(),
        }
    }
}

/// Path-safe name: spaces become underscores, while `/` and NUL keep
/// their DN escape form so one entry never becomes a nested path.
fn file_name(value: &str) -> String {
    let mut name = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' => name.push('_'),
            '/' => name.push_str(r"\2F"),
            '\0' => name.push_str(r"\00"),
            c => name.push(c),
        }
    }
    name
}
