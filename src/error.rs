//! [`Error`] type for the failures a principal operation can report
//!
//! Every failure is classified into an [`ErrorKind`] so orchestration code can decide between
//! retrying, surfacing the problem to an operator, or aborting, without inspecting backend
//! specific details.

use strum::{Display, IntoStaticStr};

/// Errors this library can encounter
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The backend configuration is missing a required key or holds an unusable value
    #[error("Configuration error for `{key}`: {message}")]
    Configuration {
        /// Offending configuration key
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// The attribute template could not be compiled or rendered
    #[error("Template error: {0}")]
    Template(String),

    /// The KDC or directory could not be reached, or an operation timed out
    #[error("KDC connection error: {0}")]
    KdcConnection(String),

    /// The administrator credential was rejected
    #[error("Administrator authentication error: {0}")]
    AdminAuthentication(String),

    /// The principal container is missing, invalid or unreachable
    #[error("Principal container error: {0}")]
    Container(String),

    /// A principal expected to exist does not
    #[error("Principal not found: {0}")]
    NotFound(String),

    /// A principal about to be created already exists
    #[error("Principal already exists: {0}")]
    Conflict(String),

    /// A principal name could not be parsed
    #[error("Invalid principal name: {0}")]
    InvalidPrincipal(String),

    /// The backend rejected an operation for a reason outside of the other categories, for
    /// instance an entry lacking a mandatory attribute
    #[error("Directory error: {message} (code: {code})")]
    Directory {
        /// Backend result code
        code: u32,
        /// Backend diagnostic message
        message: String,
    },

    /// An operation was issued on a handler that isn't open
    #[error("Operation handler is not open")]
    NotOpen,

    /// `open` was called on a handler that is already open
    #[error("Operation handler is already open")]
    AlreadyOpen,

    /// `open` was called on a handler that has been closed
    #[error("Operation handler has been closed and cannot be reopened")]
    Closed,
}

/// Failure classification of an [`Error`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[allow(clippy::exhaustive_enums)]
pub enum ErrorKind {
    /// Bad or missing backend configuration. Never retried automatically
    #[strum(serialize = "ConfigurationError")]
    Configuration,
    /// Malformed attribute template, a kind of configuration error
    #[strum(serialize = "TemplateError")]
    Template,
    /// Network or transport failure. Safe to retry with backoff
    #[strum(serialize = "KDCConnectionError")]
    KdcConnection,
    /// Bad administrator credential. Fatal until an operator fixes it
    #[strum(serialize = "AdminAuthenticationError")]
    AdminAuthentication,
    /// Target container missing or invalid. Fatal until fixed
    #[strum(serialize = "ContainerError")]
    Container,
    /// Expected principal is absent
    #[strum(serialize = "NotFoundError")]
    NotFound,
    /// Principal already exists
    #[strum(serialize = "ConflictError")]
    Conflict,
    /// Malformed principal name supplied by the caller
    #[strum(serialize = "InvalidPrincipalError")]
    InvalidPrincipal,
    /// Backend rejected the operation
    #[strum(serialize = "DirectoryError")]
    Directory,
    /// The handler lifecycle was not respected
    #[strum(serialize = "UsageError")]
    Usage,
}

impl ErrorKind {
    /// Whether this kind is a configuration problem that needs an operator
    pub fn is_configuration(self) -> bool {
        matches!(self, Self::Configuration | Self::Template | Self::Container)
    }
}

impl Error {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Template(_) => ErrorKind::Template,
            Self::KdcConnection(_) => ErrorKind::KdcConnection,
            Self::AdminAuthentication(_) => ErrorKind::AdminAuthentication,
            Self::Container(_) => ErrorKind::Container,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidPrincipal(_) => ErrorKind::InvalidPrincipal,
            Self::Directory { .. } => ErrorKind::Directory,
            Self::NotOpen | Self::AlreadyOpen | Self::Closed => ErrorKind::Usage,
        }
    }

    /// Whether the caller may retry the failed operation
    ///
    /// Only transport failures are retryable. Writes are not guaranteed idempotent, so callers
    /// should re-check state with `principal_exists` before retrying a create.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::KdcConnection
    }

    /// Whether this error is a configuration problem
    pub fn is_configuration(&self) -> bool {
        self.kind().is_configuration()
    }

    pub(crate) fn configuration(key: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.to_owned(),
            message: message.into(),
        }
    }
}

/// Helper type for errors sent from this library
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_configuration_class() {
        let error = Error::Template("unterminated #if".to_owned());
        assert_eq!(error.kind(), ErrorKind::Template);
        assert!(error.is_configuration());
        assert!(!error.is_retryable());
    }

    #[test]
    fn only_connection_errors_are_retryable() {
        assert!(Error::KdcConnection("timed out".to_owned()).is_retryable());
        assert!(!Error::AdminAuthentication("bad password".to_owned()).is_retryable());
        assert!(!Error::Container("ou=missing".to_owned()).is_retryable());
        assert!(!Error::NotOpen.is_retryable());
    }

    #[test]
    fn kind_names() {
        assert_eq!(
            Error::KdcConnection(String::new()).kind().to_string(),
            "KDCConnectionError"
        );
        let name: &'static str = Error::configuration("ldap_url", "missing").kind().into();
        assert_eq!(name, "ConfigurationError");
    }

    #[test]
    fn messages_carry_detail() {
        let error = Error::configuration("ldap_url", "required key is missing");
        assert_eq!(
            error.to_string(),
            "Configuration error for `ldap_url`: required key is missing"
        );
        let error = Error::Directory {
            code: 19,
            message: "constraint violation".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "Directory error: constraint violation (code: 19)"
        );
    }
}
