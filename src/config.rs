//! Backend configuration passed to [`KerberosOperationHandler::open`]
//!
//! [`KerberosOperationHandler::open`]: crate::KerberosOperationHandler::open

use std::{collections::HashMap, fmt::Display, str::FromStr};

use crate::error::{Error, Result};

/// Recognized configuration keys
pub mod keys {
    /// Backend type tag, parsed into a [`KdcType`][`crate::KdcType`]
    pub const KDC_TYPE: &str = "kdc_type";

    /// Directory URL, `ldap://` or `ldaps://`
    pub const LDAP_URL: &str = "ldap_url";
    /// Distinguished name of the container principals are created in
    pub const CONTAINER_DN: &str = "container_dn";
    /// Custom attribute template used when creating principals
    pub const CREATE_ATTRIBUTES_TEMPLATE: &str = "ad_create_attributes_template";
    /// How passwords are encoded before being written, see
    /// [`PasswordEncoding`][`crate::ad::PasswordEncoding`]
    pub const PASSWORD_ENCODING: &str = "password_encoding";
    /// Attribute holding the principal password
    pub const PASSWORD_ATTRIBUTE: &str = "password_attribute";
    /// Timeout of directory operations, in seconds
    pub const LDAP_TIMEOUT: &str = "ldap_timeout";

    /// Path to the `kadmin` executable
    pub const KADMIN_PATH: &str = "kadmin_path";
    /// Host of the kadmin server
    pub const ADMIN_SERVER_HOST: &str = "admin_server_host";
}

/// Backend-specific configuration
///
/// A mapping from configuration keys to values. Unknown keys are ignored by the backends, and
/// blank values are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendConfig {
    values: HashMap<String, String>,
}

impl BackendConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key` to `value`
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_owned(), value.into());
    }

    /// Get the value of `key`, if set and not blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Get the raw value of `key`, without trimming
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse the value of `key`, if present
    pub(crate) fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|error| Error::configuration(key, format!("{value:?}: {error}")))
            })
            .transpose()
    }
}

impl From<HashMap<String, String>> for BackendConfig {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BackendConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
