//! [`TemplateContext`] holding the values available to attribute templates

use std::{borrow::Cow, collections::HashMap, fmt};

use crate::principal::{truncated_identifier, Principal};

/// Default length limit of [`TemplateContext`]'s `principal_account_name`, matching Active
/// Directory's `sAMAccountName`
pub const DEFAULT_ACCOUNT_NAME_LIMIT: usize = 20;

/// Length limit of Active Directory's `cn`, which names a principal's entry
pub const COMMON_NAME_LIMIT: usize = 64;

/// Variables every [`TemplateContext`] defines
pub(crate) const VARIABLES: &[&str] = &[
    "principal_name",
    "principal_primary",
    "principal_instance",
    "principal_digest",
    "principal_container_dn",
    "principal_account_name",
    "normalized_principal",
    "realm",
    "is_service",
    "password",
];

/// A template variable value
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum Value {
    /// Text
    Text(String),
    /// Boolean flag, usable in `#if`
    Flag(bool),
}

impl Value {
    /// Truthiness used by `#if`: flags as is, text when non-empty
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Text(text) => !text.is_empty(),
            Self::Flag(flag) => *flag,
        }
    }

    /// Textual form of the value
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Flag(flag) => Cow::Owned(flag.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

/// Values a template is rendered with
///
/// | variable | value |
/// |---|---|
/// | `principal_name` | `primary` or `primary/instance` |
/// | `principal_primary` | `primary` |
/// | `principal_instance` | `instance`, empty if absent |
/// | `principal_digest` | hex SHA-1 of `normalized_principal` |
/// | `principal_container_dn` | container the entry is created in |
/// | `principal_account_name` | `primary-digest` bounded to the account name limit |
/// | `normalized_principal` | `primary[/instance]@REALM` |
/// | `realm` | the principal realm |
/// | `is_service` | whether a service principal is being created |
/// | `password` | clear-text password, encoded later by the backend |
#[derive(Clone, PartialEq, Eq)]
pub struct TemplateContext {
    primary: String,
    digest: String,
    values: HashMap<&'static str, Value>,
}

impl TemplateContext {
    /// Build a context for creating `principal` in `container_dn`
    pub fn new(
        principal: &Principal,
        container_dn: &str,
        is_service: bool,
        password: &str,
    ) -> Self {
        let digest = principal.digest();
        let values = HashMap::from([
            ("principal_name", Value::from(principal.name())),
            ("principal_primary", Value::from(principal.primary().as_str())),
            (
                "principal_instance",
                Value::from(principal.instance().unwrap_or_default()),
            ),
            ("principal_digest", Value::from(digest.as_str())),
            ("principal_container_dn", Value::from(container_dn)),
            (
                "principal_account_name",
                Value::from(principal.account_name(DEFAULT_ACCOUNT_NAME_LIMIT)),
            ),
            ("normalized_principal", Value::from(principal.normalized())),
            ("realm", Value::from(principal.realm().unwrap_or_default())),
            ("is_service", Value::from(is_service)),
            ("password", Value::from(password)),
        ]);
        Self {
            primary: principal.primary().clone(),
            digest,
            values,
        }
    }

    /// Recompute `principal_account_name` with a different length limit
    pub fn with_account_name_limit(mut self, limit: usize) -> Self {
        let account_name = truncated_identifier(&self.primary, &self.digest, limit);
        self.values
            .insert("principal_account_name", Value::from(account_name));
        self
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub(crate) fn primary(&self) -> &str {
        &self.primary
    }

    pub(crate) fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut values: Vec<_> = self
            .values
            .iter()
            .map(|(name, value)| {
                if *name == "password" {
                    (*name, Value::from("<redacted>"))
                } else {
                    (*name, value.clone())
                }
            })
            .collect();
        values.sort_by_key(|(name, _)| *name);
        f.debug_struct("TemplateContext")
            .field("values", &values)
            .finish()
    }
}
