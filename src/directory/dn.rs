//! Distinguished names
//!
//! A DN is kept as the string the server (or the request URL) supplied.
//! Component splitting honours backslash escapes and quoted values, so
//! `cn=Doe\, John,dc=example` has two components.

use std::fmt;

/// Distinguished name identifying one node of the directory tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dn(String);

impl Dn {
    pub fn new(dn: impl Into<String>) -> Self {
        Self(dn.into())
    }

    /// The root of the tree (empty DN)
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Relative distinguished names, most specific first
    pub fn rdns(&self) -> Vec<&str> {
        let mut parts = Vec::new();
        let mut start = 0;
        let mut escaped = false;
        let mut quoted = false;

        for (idx, c) in self.0.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => quoted = !quoted,
                ',' | ';' if !quoted => {
                    parts.push(self.0[start..idx].trim());
                    start = idx + c.len_utf8();
                }
                _ => {}
            }
        }

        let last = self.0[start..].trim();
        if !last.is_empty() || !parts.is_empty() {
            parts.push(last);
        }
        parts
    }

    /// The first (leftmost) relational component, e.g. `cn=John Doe`
    pub fn first_rdn(&self) -> Option<&str> {
        self.rdns().into_iter().next().filter(|rdn| !rdn.is_empty())
    }

    /// Unescaped value of the first relational component
    pub fn first_rdn_value(&self) -> Option<String> {
        let rdn = self.first_rdn()?;
        let value = match find_unescaped(rdn, '=') {
            Some(pos) => &rdn[pos + 1..],
            None => rdn,
        };
        Some(unescape_value(value.trim()))
    }

    /// DN of the parent node, `None` for the root
    pub fn parent(&self) -> Option<Dn> {
        let rdns = self.rdns();
        if rdns.is_empty() {
            return None;
        }
        Some(Dn(rdns[1..].join(",")))
    }

    /// DN of a direct child named by `rdn`
    pub fn child(&self, rdn: &str) -> Dn {
        if self.is_empty() {
            Dn(rdn.to_string())
        } else {
            Dn(format!("{},{}", rdn, self.0))
        }
    }

    /// Case- and whitespace-insensitive comparison key
    pub fn normalized(&self) -> String {
        self.rdns()
            .iter()
            .map(|rdn| match find_unescaped(rdn, '=') {
                Some(pos) => format!(
                    "{}={}",
                    rdn[..pos].trim().to_lowercase(),
                    rdn[pos + 1..].trim().to_lowercase()
                ),
                None => rdn.to_lowercase(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dn {
    fn from(dn: &str) -> Self {
        Dn::new(dn)
    }
}

impl From<String> for Dn {
    fn from(dn: String) -> Self {
        Dn(dn)
    }
}

fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == needle {
            return Some(idx);
        }
    }
    None
}

/// Remove DN escaping (`\,`, `\2C`, surrounding quotes) from a value
fn unescape_value(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(b) => {
                    out.push(b);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
