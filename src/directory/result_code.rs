//! LDAP result codes
//!
//! Server codes come from RFC 4511; the client-side codes (0x51 and up)
//! follow the values used by the OpenLDAP client library so that transport
//! failures can travel through the same channel as server results.

use std::fmt;

/// Numeric LDAP result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const OPERATIONS_ERROR: ResultCode = ResultCode(1);
    pub const PROTOCOL_ERROR: ResultCode = ResultCode(2);
    pub const TIME_LIMIT_EXCEEDED: ResultCode = ResultCode(3);
    pub const SIZE_LIMIT_EXCEEDED: ResultCode = ResultCode(4);
    pub const STRONG_AUTH_NOT_SUPPORTED: ResultCode = ResultCode(7);
    pub const STRONG_AUTH_REQUIRED: ResultCode = ResultCode(8);
    pub const NO_SUCH_ATTRIBUTE: ResultCode = ResultCode(16);
    pub const NO_SUCH_OBJECT: ResultCode = ResultCode(32);
    pub const INVALID_DN_SYNTAX: ResultCode = ResultCode(34);
    pub const INAPPROPRIATE_AUTH: ResultCode = ResultCode(48);
    pub const INVALID_CREDENTIALS: ResultCode = ResultCode(49);
    pub const INSUFFICIENT_ACCESS: ResultCode = ResultCode(50);
    pub const BUSY: ResultCode = ResultCode(51);
    pub const UNAVAILABLE: ResultCode = ResultCode(52);
    pub const UNWILLING_TO_PERFORM: ResultCode = ResultCode(53);
    pub const OBJECT_CLASS_VIOLATION: ResultCode = ResultCode(65);
    pub const NOT_ALLOWED_ON_NONLEAF: ResultCode = ResultCode(66);
    pub const ALREADY_EXISTS: ResultCode = ResultCode(68);
    pub const OTHER: ResultCode = ResultCode(80);

    // Client-side codes
    pub const SERVER_DOWN: ResultCode = ResultCode(0x51);
    pub const LOCAL_ERROR: ResultCode = ResultCode(0x52);
    pub const ENCODING_ERROR: ResultCode = ResultCode(0x53);
    pub const DECODING_ERROR: ResultCode = ResultCode(0x54);
    pub const TIMEOUT: ResultCode = ResultCode(0x55);
    pub const AUTH_UNKNOWN: ResultCode = ResultCode(0x56);
    pub const FILTER_ERROR: ResultCode = ResultCode(0x57);
    pub const USER_CANCELLED: ResultCode = ResultCode(0x58);
    pub const PARAM_ERROR: ResultCode = ResultCode(0x59);
    pub const NO_MEMORY: ResultCode = ResultCode(0x5a);
    pub const CONNECT_ERROR: ResultCode = ResultCode(0x5b);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Codes that better credentials could resolve
    pub fn is_credential_failure(self) -> bool {
        matches!(
            self,
            Self::INVALID_CREDENTIALS
                | Self::INSUFFICIENT_ACCESS
                | Self::INAPPROPRIATE_AUTH
                | Self::UNWILLING_TO_PERFORM
        )
    }

    /// Human readable description of the code
    pub fn description(self) -> &'static str {
        match self.0 {
            0 => "Success",
            1 => "Operations error",
            2 => "Protocol error",
            3 => "Time limit exceeded",
            4 => "Size limit exceeded",
            5 => "Compare false",
            6 => "Compare true",
            7 => "Authentication method not supported",
            8 => "Strong(er) authentication required",
            10 => "Referral",
            11 => "Administrative limit exceeded",
            12 => "Critical extension is unavailable",
            13 => "Confidentiality required",
            14 => "SASL bind in progress",
            16 => "No such attribute",
            17 => "Undefined attribute type",
            18 => "Inappropriate matching",
            19 => "Constraint violation",
            20 => "Type or value exists",
            21 => "Invalid syntax",
            32 => "No such object",
            33 => "Alias problem",
            34 => "Invalid DN syntax",
            36 => "Alias dereferencing problem",
            48 => "Inappropriate authentication",
            49 => "Invalid credentials",
            50 => "Insufficient access",
            51 => "Server is busy",
            52 => "Server is unavailable",
            53 => "Server is unwilling to perform",
            54 => "Loop detected",
            64 => "Naming violation",
            65 => "Object class violation",
            66 => "Operation not allowed on non-leaf",
            67 => "Operation not allowed on RDN",
            68 => "Already exists",
            69 => "Cannot modify object class",
            80 => "Internal (implementation specific) error",
            0x51 => "Can't contact LDAP server",
            0x52 => "Local error",
            0x53 => "Encoding error",
            0x54 => "Decoding error",
            0x55 => "Timed out",
            0x56 => "Unknown authentication method",
            0x57 => "Bad search filter",
            0x58 => "User cancelled operation",
            0x59 => "Bad parameter to an ldap routine",
            0x5a => "Out of memory",
            0x5b => "Connect error",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.0)
    }
}

impl From<u32> for ResultCode {
    fn from(code: u32) -> Self {
        ResultCode(code)
    }
}

/// Failure reported by a directory connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProtocolError {
    pub code: ResultCode,
    /// Diagnostic text supplied by the server or transport (may be empty)
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(code: ResultCode) -> Self {
        Self::new(code, String::new())
    }
}
