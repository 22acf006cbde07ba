//! LDIF rendering of search results

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::directory::LdapEntry;

/// Maximum length of an output line before folding
const FOLD_WIDTH: usize = 76;

/// Render one entry as an LDIF content record followed by an empty line
pub fn render_entry(entry: &LdapEntry) -> Vec<u8> {
    let mut out = Vec::new();
    write_line(&mut out, "dn", entry.dn.as_str().as_bytes());
    for attr in &entry.attributes {
        for value in &attr.values {
            write_line(&mut out, &attr.name, value);
        }
    }
    out.push(b'\n');
    out
}

fn write_line(out: &mut Vec<u8>, name: &str, value: &[u8]) {
    let mut line = name.as_bytes().to_vec();
    if is_safe(value) {
        line.push(b':');
        if !value.is_empty() {
            line.push(b' ');
            line.extend_from_slice(value);
        }
    } else {
        line.extend_from_slice(b":: ");
        line.extend_from_slice(STANDARD.encode(value).as_bytes());
    }
    fold(out, &line);
}

/// Whether a value can be written verbatim (RFC 2849 SAFE-STRING)
fn is_safe(value: &[u8]) -> bool {
    match value.first() {
        None => return true,
        Some(b' ' | b':' | b'<') => return false,
        Some(_) => {}
    }
    if value.last() == Some(&b' ') {
        return false;
    }
    value
        .iter()
        .all(|&b| b.is_ascii() && !matches!(b, b'\0' | b'\n' | b'\r'))
}

/// Write `line` folded at `FOLD_WIDTH`; continuation lines start with a space
fn fold(out: &mut Vec<u8>, line: &[u8]) {
    let mut rest = line;
    let mut width = FOLD_WIDTH;
    while rest.len() > width {
        let (head, tail) = rest.split_at(width);
        out.extend_from_slice(head);
        out.extend_from_slice(b"\n ");
        rest = tail;
        width = FOLD_WIDTH - 1;
    }
    out.extend_from_slice(rest);
    out.push(b'\n');
}
