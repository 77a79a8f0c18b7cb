//! Kerberos [`Principal`] names

use std::{fmt, str::FromStr};

use getset::Getters;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Minimum number of digest characters kept by [`truncated_identifier`]
pub const MIN_DIGEST_LENGTH: usize = 8;

/// A Kerberos principal name, `primary[/instance][@REALM]`
///
/// The realm may be left out when parsing and resolved later with
/// [`Principal::with_default_realm`]. Realms are always stored uppercase.
///
/// ```
/// use kerberos_ops::Principal;
///
/// let princ: Principal = "nn/c6501.ambari.apache.org@hdp01.local".parse().unwrap();
/// assert_eq!(princ.primary(), "nn");
/// assert_eq!(princ.instance(), Some("c6501.ambari.apache.org"));
/// assert_eq!(princ.normalized(), "nn/c6501.ambari.apache.org@HDP01.LOCAL");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Getters)]
pub struct Principal {
    /// First component of the name
    #[getset(get = "pub")]
    primary: String,
    /// Second component, usually a host FQDN for service principals
    instance: Option<String>,
    /// Realm, uppercase
    realm: Option<String>,
}

impl Principal {
    /// Parse a principal name
    ///
    /// The primary must not be empty. An instance or realm separator must be followed by a
    /// non-empty component.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.chars().any(char::is_control) {
            return Err(Error::InvalidPrincipal(format!(
                "{name:?} contains control characters"
            )));
        }

        let (name_part, realm) = match name.split_once('@') {
            Some((_, realm)) if realm.contains('@') => {
                return Err(Error::InvalidPrincipal(format!(
                    "{name:?} contains more than one realm separator"
                )));
            }
            Some((_, "")) => {
                return Err(Error::InvalidPrincipal(format!("{name:?} has an empty realm")));
            }
            Some((name_part, realm)) => (name_part, Some(realm.to_uppercase())),
            None => (name, None),
        };

        let (primary, instance) = match name_part.split_once('/') {
            Some((_, "")) => {
                return Err(Error::InvalidPrincipal(format!(
                    "{name:?} has an empty instance"
                )));
            }
            Some((primary, instance)) => (primary, Some(instance.to_owned())),
            None => (name_part, None),
        };
        if primary.is_empty() {
            return Err(Error::InvalidPrincipal(format!(
                "{name:?} has an empty primary"
            )));
        }

        Ok(Self {
            primary: primary.to_owned(),
            instance,
            realm,
        })
    }

    /// Set the realm if the principal didn't carry one
    pub fn with_default_realm(mut self, realm: &str) -> Self {
        if self.realm.is_none() && !realm.is_empty() {
            self.realm = Some(realm.to_uppercase());
        }
        self
    }

    /// Instance component
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Realm, uppercase
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Whether this principal has an instance component, as service principals do
    pub fn has_instance(&self) -> bool {
        self.instance.is_some()
    }

    /// `primary` or `primary/instance`, without the realm
    pub fn name(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}/{}", self.primary, instance),
            None => self.primary.clone(),
        }
    }

    /// `primary[/instance]@REALM`, or just the name when no realm is known
    pub fn normalized(&self) -> String {
        match &self.realm {
            Some(realm) => format!("{}@{}", self.name(), realm),
            None => self.name(),
        }
    }

    /// Hex encoded SHA-1 of [`Principal::normalized`]
    pub fn digest(&self) -> String {
        hex::encode(Sha1::digest(self.normalized().as_bytes()))
    }

    /// `primary-digest` shortened to at most `limit` characters
    ///
    /// See [`truncated_identifier`].
    pub fn account_name(&self, limit: usize) -> String {
        truncated_identifier(&self.primary, &self.digest(), limit)
    }
}

impl FromStr for Principal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// Build an identifier of at most `limit` characters from a primary name and a digest
///
/// When `primary-digest` fits, it is returned as is. Otherwise the result is a prefix of
/// `primary` of at most `limit - 1 - MIN_DIGEST_LENGTH` characters, a dash, and as many digest
/// characters as fit in the remaining space. The same inputs always yield the same identifier.
pub fn truncated_identifier(primary: &str, digest: &str, limit: usize) -> String {
    let full = format!("{primary}-{digest}");
    if full.chars().count() <= limit {
        return full;
    }

    let primary_budget = limit.saturating_sub(MIN_DIGEST_LENGTH + 1);
    let primary: String = primary.chars().take(primary_budget).collect();
    if primary.is_empty() {
        return digest.chars().take(limit).collect();
    }
    let digest_budget = limit - primary.chars().count() - 1;
    let digest: String = digest.chars().take(digest_budget).collect();
    format!("{primary}-{digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_service_principal() -> Result<()> {
        let princ = Principal::parse("nn/c6501.ambari.apache.org@HDP01.LOCAL")?;
        assert_eq!(princ.primary(), "nn");
        assert_eq!(princ.instance(), Some("c6501.ambari.apache.org"));
        assert_eq!(princ.realm(), Some("HDP01.LOCAL"));
        assert_eq!(princ.name(), "nn/c6501.ambari.apache.org");
        assert!(princ.has_instance());
        Ok(())
    }

    #[test]
    fn realm_is_uppercased_and_defaulted() -> Result<()> {
        let princ = Principal::parse("hdfs@hdp01.local")?;
        assert_eq!(princ.realm(), Some("HDP01.LOCAL"));

        let princ = Principal::parse("hdfs")?;
        assert_eq!(princ.realm(), None);
        assert_eq!(princ.normalized(), "hdfs");
        let princ = princ.with_default_realm("hdp01.local");
        assert_eq!(princ.normalized(), "hdfs@HDP01.LOCAL");

        let princ = Principal::parse("hdfs@OTHER.REALM")?.with_default_realm("HDP01.LOCAL");
        assert_eq!(princ.realm(), Some("OTHER.REALM"));
        Ok(())
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for name in ["", "@HDP01.LOCAL", "/host@HDP01.LOCAL", "nn/@R", "nn@", "a@b@c", "a\nb"] {
            assert!(
                matches!(Principal::parse(name), Err(Error::InvalidPrincipal(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn digest_of_normalized_name() -> Result<()> {
        let princ =
            Principal::parse("nn/c6501.ambari.apache.org")?.with_default_realm("HDP01.LOCAL");
        assert_eq!(princ.digest(), "995e1580db28198e7fda1417ab5d894c877937d2");
        Ok(())
    }

    #[test]
    fn account_name_fits_limit() -> Result<()> {
        let princ = Principal::parse("nn/c6501.ambari.apache.org@HDP01.LOCAL")?;
        assert_eq!(princ.account_name(20), "nn-995e1580db28198e7");

        let princ = Principal::parse("averyveryverylongserviceprimary/host@HDP01.LOCAL")?;
        let account = princ.account_name(20);
        assert_eq!(account.chars().count(), 20);
        assert!(account.starts_with("averyveryve-"));
        assert_eq!(account, princ.account_name(20));
        Ok(())
    }

    #[test]
    fn truncated_identifier_edge_cases() {
        assert_eq!(truncated_identifier("nn", "abcd", 20), "nn-abcd");
        assert_eq!(truncated_identifier("nn", "0123456789abcdef", 5), "01234");
        assert_eq!(
            truncated_identifier("ŝervicé", "0123456789abcdef0123", 12),
            "ŝer-01234567"
        );
    }
}
