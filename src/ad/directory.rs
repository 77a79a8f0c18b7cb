//! Directory transport used by the Active Directory backend
//!
//! [`DirectoryConnector`] and [`DirectoryConnection`] are the seam between the backend and the
//! LDAP client. [`Ldap3Connector`] is the production implementation, built on `ldap3`. Tests
//! substitute their own to simulate directory contents and failures.

use std::{collections::HashSet, time::Duration};

use ldap3::{LdapConn, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use url::Url;

/// LDAP result codes the backend classifies
pub mod result_code {
    /// `noSuchObject`
    pub const NO_SUCH_OBJECT: u32 = 32;
    /// `invalidDNSyntax`
    pub const INVALID_DN_SYNTAX: u32 = 34;
    /// `invalidCredentials`
    pub const INVALID_CREDENTIALS: u32 = 49;
    /// `insufficientAccessRights`
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    /// `entryAlreadyExists`
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Result of a directory call
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Failures reported by a [`DirectoryConnection`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DirectoryError {
    /// The directory URL can't be used
    #[error("invalid directory URL: {0}")]
    InvalidUrl(String),
    /// The transport could not be established or was lost
    #[error("directory unreachable: {0}")]
    Unreachable(String),
    /// The operation did not complete in time
    #[error("directory operation timed out")]
    Timeout,
    /// The directory answered with a non-success result code
    #[error("{message} (result code {code})")]
    Rejected {
        /// LDAP result code, see [`result_code`]
        code: u32,
        /// Diagnostic message sent by the directory
        message: String,
    },
}

impl DirectoryError {
    /// Result code of a [`DirectoryError::Rejected`]
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<LdapError> for DirectoryError {
    fn from(error: LdapError) -> Self {
        match error {
            LdapError::LdapResult { result } => Self::Rejected {
                code: result.rc,
                message: result.text,
            },
            LdapError::Timeout { .. } => Self::Timeout,
            LdapError::UrlParsing { .. } | LdapError::UnknownScheme { .. } => {
                Self::InvalidUrl(error.to_string())
            }
            _ => Self::Unreachable(error.to_string()),
        }
    }
}

/// Search scope
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum SearchScope {
    /// Only the base entry
    Base,
    /// The base entry and everything below it
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Attributes of an entry to add: names with their raw values
pub type EntryAttributes = Vec<(String, Vec<Vec<u8>>)>;

/// Establishes [`DirectoryConnection`]s
pub trait DirectoryConnector: Send {
    /// Connect to the directory at `url`
    ///
    /// `timeout` bounds connection establishment and every operation issued on the returned
    /// connection.
    fn connect(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>>;
}

/// An established directory connection
///
/// Calls are blocking and issued in order.
pub trait DirectoryConnection: Send {
    /// Authenticate with a simple bind
    fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<()>;

    /// Search below `base`, returning the distinguished names of matching entries
    fn search(&mut self, base: &str, scope: SearchScope, filter: &str)
        -> DirectoryResult<Vec<String>>;

    /// Add an entry
    fn add(&mut self, dn: &str, attributes: EntryAttributes) -> DirectoryResult<()>;

    /// Replace all values of `attribute` on the entry at `dn`
    fn replace(&mut self, dn: &str, attribute: &str, values: Vec<Vec<u8>>) -> DirectoryResult<()>;

    /// Delete the entry at `dn`
    fn delete(&mut self, dn: &str) -> DirectoryResult<()>;

    /// Terminate the connection
    fn unbind(&mut self) -> DirectoryResult<()>;
}

/// [`DirectoryConnector`] backed by `ldap3`'s synchronous client
///
/// `ldaps://` URLs use TLS. Server certificates are verified.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Create a connector
    pub fn new() -> Self {
        Self
    }
}

impl DirectoryConnector for Ldap3Connector {
    fn connect(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        let settings = LdapConnSettings::new().set_conn_timeout(timeout);
        let conn = LdapConn::with_settings(settings, url.as_str())?;
        Ok(Box::new(Ldap3Connection { conn, timeout }))
    }
}

struct Ldap3Connection {
    conn: LdapConn,
    timeout: Duration,
}

impl Ldap3Connection {
    fn conn(&mut self) -> &mut LdapConn {
        self.conn.with_timeout(self.timeout)
    }
}

fn value_set(values: Vec<Vec<u8>>) -> HashSet<Vec<u8>> {
    values.into_iter().collect()
}

impl DirectoryConnection for Ldap3Connection {
    fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<()> {
        self.conn().simple_bind(dn, password)?.success()?;
        Ok(())
    }

    fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> DirectoryResult<Vec<String>> {
        // "1.1" requests no attributes, only the entry names
        let (entries, _) = self
            .conn()
            .search(base, scope.into(), filter, vec!["1.1"])?
            .success()?;
        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect())
    }

    fn add(&mut self, dn: &str, attributes: EntryAttributes) -> DirectoryResult<()> {
        let attributes = attributes
            .into_iter()
            .map(|(name, values)| (name.into_bytes(), value_set(values)))
            .collect();
        self.conn().add(dn, attributes)?.success()?;
        Ok(())
    }

    fn replace(&mut self, dn: &str, attribute: &str, values: Vec<Vec<u8>>) -> DirectoryResult<()> {
        let modification = Mod::Replace(attribute.as_bytes().to_vec(), value_set(values));
        self.conn().modify(dn, vec![modification])?.success()?;
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        self.conn().delete(dn)?.success()?;
        Ok(())
    }

    fn unbind(&mut self) -> DirectoryResult<()> {
        self.conn.unbind()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ldap3::LdapResult;

    use super::*;

    fn ldap_result(rc: u32, text: &str) -> LdapError {
        LdapError::LdapResult {
            result: LdapResult {
                rc,
                matched: String::new(),
                text: text.to_owned(),
                refs: vec![],
                ctrls: vec![],
            },
        }
    }

    #[test]
    fn result_codes_are_kept() {
        let error = DirectoryError::from(ldap_result(
            result_code::INVALID_CREDENTIALS,
            "80090308: LdapErr: DSID-0C09042A",
        ));
        assert_eq!(error.code(), Some(result_code::INVALID_CREDENTIALS));
        assert!(error.to_string().contains("DSID-0C09042A"));
    }

    #[test]
    fn transport_failures() {
        let error = DirectoryError::from(LdapError::UnknownScheme("ftp".to_owned()));
        assert!(matches!(error, DirectoryError::InvalidUrl(_)));

        let error = DirectoryError::from(LdapError::EndOfStream);
        assert!(matches!(error, DirectoryError::Unreachable(_)));
        assert_eq!(error.code(), None);
    }

    #[test]
    fn unreachable_server() {
        let url = Url::parse("ldap://127.0.0.1:1").unwrap();
        let result = Ldap3Connector::new().connect(&url, Duration::from_secs(2));
        assert!(matches!(
            result.err(),
            Some(DirectoryError::Unreachable(_) | DirectoryError::Timeout)
        ));
    }
}
