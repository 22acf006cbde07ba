//! Protocol controls
//!
//! Controls travel with requests (server controls) or steer the client
//! library (client controls). The simple paged results control is the only
//! one the engine builds and inspects itself; its value is encoded and
//! decoded by `ldap3`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ldap3::controls::{PagedResults, RawControl};

/// OID of the simple paged results control (RFC 2696)
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// LDAP control: OID, criticality and optional opaque value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(oid: impl Into<String>, critical: bool, value: Option<Vec<u8>>) -> Self {
        Self {
            oid: oid.into(),
            critical,
            value,
        }
    }

    /// Parse the textual control form `oid [true|false] [: value | :: base64]`.
    ///
    /// This is the syntax of the LDIF `control:` line and of the
    /// `SERVER_CTRL{n}` / `CLIENT_CTRL{n}` request metadata.
    pub fn parse_spec(spec: &str) -> Option<Self> {
        let (head, value) = match spec.find(':') {
            Some(pos) => {
                let rest = &spec[pos + 1..];
                let value = match rest.strip_prefix(':') {
                    Some(encoded) => STANDARD.decode(encoded.trim()).ok()?,
                    None => rest.trim_start().as_bytes().to_vec(),
                };
                (&spec[..pos], Some(value))
            }
            None => (spec, None),
        };

        let mut head = head.trim();
        let mut critical = false;
        if let Some(oid) = head.strip_suffix(" true") {
            critical = true;
            head = oid.trim_end();
        } else if let Some(oid) = head.strip_suffix(" false") {
            head = oid.trim_end();
        }

        if head.is_empty() || head.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::new(head, critical, value))
    }

    /// Build a paged results request control
    pub fn paged_results(page_size: u32, cookie: &[u8]) -> Self {
        let raw = RawControl::from(PagedResults {
            size: i32::try_from(page_size).unwrap_or(i32::MAX),
            cookie: cookie.to_vec(),
        });
        Self::new(raw.ctype, raw.crit, raw.val)
    }

    /// Decode a paged results response: `(estimated total, cookie)`.
    ///
    /// Returns `None` when this is not a paging control or carries no value.
    pub fn parse_paged_results(&self) -> Option<(i64, Vec<u8>)> {
        if self.oid != PAGED_RESULTS_OID {
            return None;
        }
        let raw = RawControl {
            ctype: self.oid.clone(),
            crit: self.critical,
            val: Some(self.value.clone()?),
        };
        let paged = raw.parse::<PagedResults>();
        Some((i64::from(paged.size), paged.cookie))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec_oid_only() {
        let ctrl = Control::parse_spec("1.2.3.4").unwrap();
        assert_eq!(ctrl.oid, "1.2.3.4");
        assert!(!ctrl.critical);
        assert_eq!(ctrl.value, None);
    }

    #[test]
    fn test_parse_spec_critical_with_value() {
        let ctrl = Control::parse_spec("1.2.3.4 true: hello").unwrap();
        assert_eq!(ctrl.oid, "1.2.3.4");
        assert!(ctrl.critical);
        assert_eq!(ctrl.value.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_parse_spec_base64_value() {
        let ctrl = Control::parse_spec("1.2.3.4 false:: aGVsbG8=").unwrap();
        assert!(!ctrl.critical);
        assert_eq!(ctrl.value.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_parse_spec_rejects_garbage() {
        assert!(Control::parse_spec("").is_none());
        assert!(Control::parse_spec("1.2.3 maybe").is_none());
        assert!(Control::parse_spec("1.2.3:: !!!").is_none());
    }

    #[test]
    fn test_paged_request_encoding() {
        let ctrl = Control::paged_results(100, b"");
        assert_eq!(ctrl.oid, PAGED_RESULTS_OID);
        assert!(!ctrl.critical);
        // SEQUENCE { INTEGER, OCTET STRING }
        assert_eq!(ctrl.value.as_deref().and_then(|v| v.first()), Some(&0x30));
    }

    #[test]
    fn test_paged_response_decoding() {
        let ctrl = Control::paged_results(250, b"cookie-1");
        assert_eq!(ctrl.parse_paged_results(), Some((250, b"cookie-1".to_vec())));
    }

    #[test]
    fn test_paged_page_size_is_clamped() {
        let ctrl = Control::paged_results(u32::MAX, b"");
        assert_eq!(
            ctrl.parse_paged_results(),
            Some((i64::from(i32::MAX), Vec::new()))
        );
    }

    #[test]
    fn test_other_control_is_not_paging() {
        let ctrl = Control::new("1.2.3", false, Some(vec![0x30, 0x00]));
        assert_eq!(ctrl.parse_paged_results(), None);
        let empty = Control::new(PAGED_RESULTS_OID, false, None);
        assert_eq!(empty.parse_paged_results(), None);
    }
}
