//! Administrator [`KerberosCredential`]

use std::fmt;

use getset::Getters;

/// Credential used to authenticate against the KDC administrative interface
///
/// Only used for the administrative bind. It is never persisted, and its [`Debug`]
/// representation redacts the password.
#[derive(Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct KerberosCredential {
    /// Administrator principal
    principal: String,
    /// Administrator password
    password: String,
    /// Keytab holding the administrator key
    #[getset(skip)]
    keytab_path: Option<String>,
}

impl KerberosCredential {
    /// Create a credential from an administrator principal and password
    pub fn new(principal: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            password: password.into(),
            keytab_path: None,
        }
    }

    /// Attach a keytab path
    pub fn with_keytab(mut self, keytab_path: impl Into<String>) -> Self {
        self.keytab_path = Some(keytab_path.into());
        self
    }

    /// Keytab holding the administrator key
    pub fn keytab_path(&self) -> Option<&str> {
        self.keytab_path.as_deref()
    }

    /// Whether both the principal and the password are set
    pub fn is_complete(&self) -> bool {
        !self.principal.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for KerberosCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KerberosCredential")
            .field("principal", &self.principal)
            .field("password", &"<redacted>")
            .field("keytab_path", &self.keytab_path)
            .finish()
    }
}
