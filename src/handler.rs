//! The [`KerberosOperationHandler`] contract every backend implements, and backend selection
//! through [`KdcType`]

use std::mem;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    ad::ActiveDirectoryHandler,
    config::{keys, BackendConfig},
    credential::KerberosCredential,
    error::{Error, Result},
    mit::MitKdcHandler,
};

/// Principal lifecycle operations against a KDC backend
///
/// A handler goes through `Unopened → Open → Closed`. Principal operations are only valid while
/// open and fail with [`Error::NotOpen`] otherwise. Closing an unopened handler leaves it
/// unopened. `Closed` is terminal: a new handler must be constructed to open another session.
///
/// A handler owns a single backend session and issues blocking calls in the order they are made.
/// It can be moved across threads but is not meant to be shared between them. Run one handler
/// per concurrent operation instead.
///
/// ```no_run
/// use kerberos_ops::{BackendConfig, KdcType, KerberosCredential, config::keys};
///
/// # fn example() -> kerberos_ops::Result<()> {
/// let config = BackendConfig::new()
///     .with(keys::LDAP_URL, "ldaps://dc.example.org")
///     .with(keys::CONTAINER_DN, "ou=services,dc=example,dc=org");
/// let admin = KerberosCredential::new("admin@EXAMPLE.ORG", "hunter2");
///
/// let mut handler = KdcType::ActiveDirectory.handler();
/// handler.open(&admin, "EXAMPLE.ORG", &config)?;
/// if !handler.principal_exists("HTTP/web.example.org")? {
///     handler.create_principal("HTTP/web.example.org", "s3cr3t", true)?;
/// }
/// handler.close()?;
/// # Ok(())
/// # }
/// ```
pub trait KerberosOperationHandler: Send {
    /// Open a session
    ///
    /// Validates `config`, connects to the backend and authenticates as `credential`. Principals
    /// given without a realm later on are resolved in `realm`.
    ///
    /// Fails with a configuration-class error naming the offending key before any connection
    /// attempt, with [`Error::KdcConnection`] if the backend cannot be reached and with
    /// [`Error::AdminAuthentication`] if the credential is rejected. On failure nothing stays
    /// allocated and the handler remains unopened.
    fn open(
        &mut self,
        credential: &KerberosCredential,
        realm: &str,
        config: &BackendConfig,
    ) -> Result<()>;

    /// Release the session
    ///
    /// Closing a handler that was never opened or is already closed succeeds without doing
    /// anything.
    fn close(&mut self) -> Result<()>;

    /// Whether a session is open
    fn is_open(&self) -> bool;

    /// Check that the administrator credential is still accepted and can reach the principal
    /// container, without modifying anything
    fn test_administrator_credentials(&mut self) -> Result<()>;

    /// Check whether a principal exists
    ///
    /// An absent principal is `Ok(false)`, not an error.
    fn principal_exists(&mut self, principal: &str) -> Result<bool>;

    /// Create a principal
    ///
    /// Fails with [`Error::Conflict`] if it already exists.
    #[doc(alias = "addprinc")]
    fn create_principal(&mut self, principal: &str, password: &str, is_service: bool)
        -> Result<()>;

    /// Change the password of an existing principal
    ///
    /// Fails with [`Error::NotFound`] if it doesn't exist.
    #[doc(alias = "cpw")]
    fn set_principal_password(&mut self, principal: &str, password: &str) -> Result<()>;

    /// Delete a principal
    ///
    /// Deleting an absent principal succeeds.
    #[doc(alias = "delprinc")]
    fn remove_principal(&mut self, principal: &str) -> Result<()>;
}

/// Lifecycle state of a handler holding a session of type `S`
#[derive(Debug)]
pub(crate) enum SessionState<S> {
    Unopened,
    Open(S),
    Closed,
}

impl<S> SessionState<S> {
    /// Fail unless a session can be opened
    pub(crate) fn check_openable(&self) -> Result<()> {
        match self {
            Self::Unopened => Ok(()),
            Self::Open(_) => Err(Error::AlreadyOpen),
            Self::Closed => Err(Error::Closed),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The open session
    pub(crate) fn session(&mut self) -> Result<&mut S> {
        match self {
            Self::Open(session) => Ok(session),
            Self::Unopened | Self::Closed => Err(Error::NotOpen),
        }
    }

    /// Move an open session to `Closed` and return it. No-op otherwise
    pub(crate) fn close(&mut self) -> Option<S> {
        if !self.is_open() {
            return None;
        }
        match mem::replace(self, Self::Closed) {
            Self::Open(session) => Some(session),
            Self::Unopened | Self::Closed => None,
        }
    }
}

/// Supported KDC backends
///
/// Parsed from the [`keys::KDC_TYPE`] configuration value, `active-directory` or `mit-kdc`.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[non_exhaustive]
pub enum KdcType {
    /// Active Directory, driven over LDAP
    ActiveDirectory,
    /// MIT krb5, driven through the `kadmin` command line client
    MitKdc,
}

impl KdcType {
    /// Read the backend type from `config`
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        config
            .parse(keys::KDC_TYPE)?
            .ok_or_else(|| Error::configuration(keys::KDC_TYPE, "required key is missing"))
    }

    /// Construct an unopened handler for this backend
    pub fn handler(self) -> Box<dyn KerberosOperationHandler> {
        match self {
            Self::ActiveDirectory => Box::new(ActiveDirectoryHandler::new()),
            Self::MitKdc => Box::new(MitKdcHandler::new()),
        }
    }
}
