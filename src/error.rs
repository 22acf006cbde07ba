use std::io;
use thiserror::Error;

use crate::directory::ResultCode;

/// Main error type for ldap-fs operations
#[derive(Error, Debug)]
pub enum LdapFsError {
    #[error("Could not connect: {0}")]
    CannotConnect(String),

    #[error("Authentication failed: {0}")]
    CannotAuthenticate(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    UserCanceled(String),

    #[error("Entry already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Entry does not exist: {0}")]
    DoesNotExist(String),

    #[error("Server timeout: {0}")]
    ServerTimeout(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid LDIF file in line {line}: {reason}")]
    InvalidInput { line: usize, reason: String },

    #[error("{0}")]
    WorkerDefined(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Generic failure kinds, independent of the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CannotConnect,
    CannotAuthenticate,
    AccessDenied,
    UserCanceled,
    FileAlreadyExists,
    DoesNotExist,
    ServerTimeout,
    OutOfMemory,
    Internal,
    InvalidInput,
    WorkerDefined,
    Io,
    Config,
}

impl LdapFsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LdapFsError::CannotConnect(_) => ErrorKind::CannotConnect,
            LdapFsError::CannotAuthenticate(_) => ErrorKind::CannotAuthenticate,
            LdapFsError::AccessDenied(_) => ErrorKind::AccessDenied,
            LdapFsError::UserCanceled(_) => ErrorKind::UserCanceled,
            LdapFsError::FileAlreadyExists(_) => ErrorKind::FileAlreadyExists,
            LdapFsError::DoesNotExist(_) => ErrorKind::DoesNotExist,
            LdapFsError::ServerTimeout(_) => ErrorKind::ServerTimeout,
            LdapFsError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            LdapFsError::Internal(_) => ErrorKind::Internal,
            LdapFsError::InvalidInput { .. } => ErrorKind::InvalidInput,
            LdapFsError::WorkerDefined(_) => ErrorKind::WorkerDefined,
            LdapFsError::Io(_) => ErrorKind::Io,
            LdapFsError::Config(_) => ErrorKind::Config,
        }
    }

    /// Cancellation is reported separately so callers can stay quiet about it
    pub fn is_user_canceled(&self) -> bool {
        matches!(self, LdapFsError::UserCanceled(_))
    }

    /// Convert error to libc errno, used as the process exit status
    pub fn to_errno(&self) -> i32 {
        match self {
            LdapFsError::CannotConnect(_) => libc::ECONNREFUSED,
            LdapFsError::CannotAuthenticate(_) => libc::EPERM,
            LdapFsError::AccessDenied(_) => libc::EACCES,
            LdapFsError::UserCanceled(_) => libc::ECANCELED,
            LdapFsError::FileAlreadyExists(_) => libc::EEXIST,
            LdapFsError::DoesNotExist(_) => libc::ENOENT,
            LdapFsError::ServerTimeout(_) => libc::ETIMEDOUT,
            LdapFsError::OutOfMemory(_) => libc::ENOMEM,
            LdapFsError::Internal(_) => libc::EIO,
            LdapFsError::InvalidInput { .. } => libc::EINVAL,
            LdapFsError::WorkerDefined(_) => libc::EIO,
            LdapFsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            LdapFsError::Config(_) => libc::EINVAL,
        }
    }

    /// Translate an LDAP result code into the generic taxonomy.
    ///
    /// `extra` is the diagnostic text of the live session, if any; `url` is
    /// the display form of the request URL. Returns `None` for success.
    pub fn from_result_code(code: ResultCode, extra: Option<&str>, url: &str) -> Option<Self> {
        if code.is_success() {
            return None;
        }

        let extra = extra
            .filter(|text| !text.is_empty())
            .map(|text| format!("\nAdditional info: {}", text))
            .unwrap_or_default();
        let msg = format!("{}{}", url, extra);

        let err = match code {
            ResultCode::AUTH_UNKNOWN
            | ResultCode::INVALID_CREDENTIALS
            | ResultCode::STRONG_AUTH_NOT_SUPPORTED => LdapFsError::CannotAuthenticate(msg),
            ResultCode::ALREADY_EXISTS => LdapFsError::FileAlreadyExists(msg),
            ResultCode::INSUFFICIENT_ACCESS => LdapFsError::AccessDenied(msg),
            ResultCode::CONNECT_ERROR | ResultCode::SERVER_DOWN => LdapFsError::CannotConnect(msg),
            ResultCode::TIMEOUT => LdapFsError::ServerTimeout(msg),
            ResultCode::PARAM_ERROR => LdapFsError::Internal(msg),
            ResultCode::NO_MEMORY => LdapFsError::OutOfMemory(msg),
            _ => LdapFsError::WorkerDefined(format!(
                "LDAP server returned the error: {} {}\nThe LDAP URL was: {}",
                code.description(),
                extra,
                url
            )),
        };
        Some(err)
    }
}

/// Result type alias for ldap-fs operations
pub type Result<T> = std::result::Result<T, LdapFsError>;
