//! Active Directory backend, driven over LDAP
//!
//! Principals are directory entries created in a configured container. Entries are rendered from
//! an [`AttributeTemplate`], either [`default_template_source`] or the one set through
//! [`keys::CREATE_ATTRIBUTES_TEMPLATE`].

use std::time::Duration;

use bitflags::bitflags;
use indoc::formatdoc;
use ldap3::{dn_escape, ldap_escape};
use log::{debug, info, warn};
use strum::{Display, EnumString, IntoStaticStr};
use url::Url;

pub mod directory;

pub use directory::{
    result_code, DirectoryConnection, DirectoryConnector, DirectoryError, DirectoryResult,
    EntryAttributes, Ldap3Connector, SearchScope,
};

use crate::{
    config::{keys, BackendConfig},
    credential::KerberosCredential,
    error::{Error, Result},
    handler::{KerberosOperationHandler, SessionState},
    principal::Principal,
    template::{AttributeSet, AttributeTemplate, TemplateContext, COMMON_NAME_LIMIT},
};

/// Attribute the password is written to unless [`keys::PASSWORD_ATTRIBUTE`] says otherwise
pub const DEFAULT_PASSWORD_ATTRIBUTE: &str = "unicodePwd";

/// Timeout of directory operations unless [`keys::LDAP_TIMEOUT`] says otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

bitflags! {
    /// Flags of the `userAccountControl` attribute
    ///
    /// See the `userAccountControl` documentation in the Active Directory schema reference
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct UserAccountControl: u32 {
        /// The logon script is run
        const Script = 0x0001;
        /// The account is disabled
        const AccountDisable = 0x0002;
        /// The home folder is required
        const HomedirRequired = 0x0008;
        /// The account is locked out
        const Lockout = 0x0010;
        /// No password is required
        const PasswdNotreqd = 0x0020;
        /// The user can't change the password
        const PasswdCantChange = 0x0040;
        /// Default account type, representing a typical user
        const NormalAccount = 0x0200;
        /// The password never expires
        const DontExpirePassword = 0x0001_0000;
        /// A smart card is required to log on
        const SmartcardRequired = 0x0004_0000;
        /// The account is trusted for Kerberos delegation
        const TrustedForDelegation = 0x0008_0000;
        /// The account's credentials can't be delegated
        const NotDelegated = 0x0010_0000;
        /// Only DES encryption types are used for this account
        const UseDesKeyOnly = 0x0020_0000;
        /// Kerberos pre-authentication is not required
        const DontReqPreauth = 0x0040_0000;
    }
}

impl UserAccountControl {
    /// Flags of principals created by the default template: a normal account whose password
    /// never expires
    pub const PRINCIPAL_DEFAULT: Self = Self::NormalAccount.union(Self::DontExpirePassword);
}

/// How passwords are encoded before being written to the directory
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[non_exhaustive]
pub enum PasswordEncoding {
    /// Quoted, then UTF-16LE encoded, as `unicodePwd` requires
    #[default]
    UnicodePwd,
    /// UTF-8, unquoted, for directories accepting clear-text `userPassword`-like attributes
    Plain,
}

impl PasswordEncoding {
    /// Encode `password`
    ///
    /// ```
    /// use kerberos_ops::ad::PasswordEncoding;
    ///
    /// let encoded = PasswordEncoding::UnicodePwd.encode("pw");
    /// assert_eq!(encoded, b"\"\0p\0w\0\"\0");
    /// ```
    pub fn encode(self, password: &str) -> Vec<u8> {
        match self {
            Self::UnicodePwd => format!("\"{password}\"")
                .encode_utf16()
                .flat_map(u16::to_le_bytes)
                .collect(),
            Self::Plain => password.as_bytes().to_vec(),
        }
    }

    /// Decode a value produced by [`PasswordEncoding::encode`], keeping the quotes `UnicodePwd`
    /// added
    ///
    /// Returns `None` if `encoded` isn't valid in this encoding.
    pub fn decode(self, encoded: &[u8]) -> Option<String> {
        match self {
            Self::UnicodePwd => {
                if encoded.len() % 2 != 0 {
                    return None;
                }
                let units: Vec<u16> = encoded
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).ok()
            }
            Self::Plain => String::from_utf8(encoded.to_vec()).ok(),
        }
    }
}

/// Source of the template used when [`keys::CREATE_ATTRIBUTES_TEMPLATE`] isn't set
///
/// It renders `objectClass`, `cn`, `servicePrincipalName` for services only,
/// `userPrincipalName`, `unicodePwd`, `accountExpires` and `userAccountControl`. `cn` is
/// truncated to [`COMMON_NAME_LIMIT`] characters.
pub fn default_template_source() -> String {
    formatdoc! {r#"
        {{
          "objectClass": ["top", "person", "organizationalPerson", "user"],
          "cn": "${{principal_name.truncate({cn_limit})}}",
          #if( $is_service )
          "servicePrincipalName": "$principal_name",
          #end
          "userPrincipalName": "$normalized_principal",
          "{password_attribute}": "$password",
          "accountExpires": "0",
          "userAccountControl": "{account_control}"
        }}
        "#,
        cn_limit = COMMON_NAME_LIMIT,
        password_attribute = DEFAULT_PASSWORD_ATTRIBUTE,
        account_control = UserAccountControl::PRINCIPAL_DEFAULT.bits(),
    }
}

/// Active Directory settings, read from a [`BackendConfig`]
#[derive(Clone, Debug)]
pub struct AdConfig {
    ldap_url: String,
    container_dn: String,
    template: AttributeTemplate,
    password_encoding: PasswordEncoding,
    password_attribute: String,
    timeout: Duration,
}

impl AdConfig {
    /// Read and validate the settings
    ///
    /// Fails with [`Error::Container`] if [`keys::LDAP_URL`] is missing or if
    /// [`keys::CONTAINER_DN`] is missing or isn't a distinguished name, and with
    /// [`Error::Template`] if a custom template doesn't compile.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let ldap_url = config
            .get(keys::LDAP_URL)
            .ok_or_else(|| Error::Container(format!("`{}` is not configured", keys::LDAP_URL)))?
            .to_owned();

        let container_dn = config
            .get(keys::CONTAINER_DN)
            .ok_or_else(|| {
                Error::Container(format!("`{}` is not configured", keys::CONTAINER_DN))
            })?
            .to_owned();
        if !is_distinguished_name(&container_dn) {
            return Err(Error::Container(format!(
                "`{container_dn}` is not a valid distinguished name"
            )));
        }

        let template = match config.get_raw(keys::CREATE_ATTRIBUTES_TEMPLATE) {
            Some(source) if !source.trim().is_empty() => AttributeTemplate::compile(source)?,
            _ => AttributeTemplate::compile(&default_template_source())?,
        };

        let timeout = config
            .parse::<u64>(keys::LDAP_TIMEOUT)?
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        if timeout.is_zero() {
            return Err(Error::configuration(keys::LDAP_TIMEOUT, "must be at least 1 second"));
        }

        Ok(Self {
            ldap_url,
            container_dn,
            template,
            password_encoding: config.parse(keys::PASSWORD_ENCODING)?.unwrap_or_default(),
            password_attribute: config
                .get(keys::PASSWORD_ATTRIBUTE)
                .unwrap_or(DEFAULT_PASSWORD_ATTRIBUTE)
                .to_owned(),
            timeout,
        })
    }

    /// Directory URL
    pub fn ldap_url(&self) -> &str {
        &self.ldap_url
    }

    /// Container principals are created in
    pub fn container_dn(&self) -> &str {
        &self.container_dn
    }

    /// Template entries are rendered from
    pub fn template(&self) -> &AttributeTemplate {
        &self.template
    }

    /// Password encoding
    pub fn password_encoding(&self) -> PasswordEncoding {
        self.password_encoding
    }

    /// Attribute holding the password
    pub fn password_attribute(&self) -> &str {
        &self.password_attribute
    }

    /// Timeout of directory operations
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Check the syntax of a distinguished name: comma separated RDNs, each made of one or more
/// `+` separated `type=value` pairs
fn is_distinguished_name(dn: &str) -> bool {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return false,
                }
            }
            ',' | '+' => components.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    components.push(current);

    components.iter().all(|component| {
        let Some((attribute, value)) = component.split_once('=') else {
            return false;
        };
        let attribute = attribute.trim();
        let is_descriptor = attribute.starts_with(|c: char| c.is_ascii_alphabetic())
            && attribute.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        let is_oid = !attribute.is_empty()
            && attribute.split('.').all(|arc| {
                !arc.is_empty() && arc.chars().all(|c| c.is_ascii_digit())
            });
        (is_descriptor || is_oid) && !value.trim().is_empty()
    })
}

/// Translate a directory failure that no operation-specific rule covers
fn directory_escape_hatch(error: DirectoryError) -> Error {
    let error = match error {
        DirectoryError::InvalidUrl(message) | DirectoryError::Unreachable(message) => {
            Error::KdcConnection(message)
        }
        DirectoryError::Timeout => {
            Error::KdcConnection("directory operation timed out".to_owned())
        }
        DirectoryError::Rejected {
            code: result_code::INVALID_CREDENTIALS,
            message,
        } => Error::AdminAuthentication(message),
        DirectoryError::Rejected { code, message } => Error::Directory { code, message },
    };
    warn!("Active Directory operation failed: {error}");
    error
}

/// [`KerberosOperationHandler`] for Active Directory
///
/// ```no_run
/// use kerberos_ops::{
///     ad::ActiveDirectoryHandler, config::keys, BackendConfig, KerberosCredential,
///     KerberosOperationHandler,
/// };
///
/// # fn example() -> kerberos_ops::Result<()> {
/// let mut handler = ActiveDirectoryHandler::new();
/// handler.open(
///     &KerberosCredential::new("admin@EXAMPLE.ORG", "hunter2"),
///     "EXAMPLE.ORG",
///     &BackendConfig::new()
///         .with(keys::LDAP_URL, "ldaps://dc.example.org")
///         .with(keys::CONTAINER_DN, "ou=services,dc=example,dc=org"),
/// )?;
/// handler.set_principal_password("HTTP/web.example.org", "n3w-s3cr3t")?;
/// # Ok(())
/// # }
/// ```
pub struct ActiveDirectoryHandler {
    connector: Box<dyn DirectoryConnector>,
    state: SessionState<Session>,
}

struct Session {
    conn: Box<dyn DirectoryConnection>,
    config: AdConfig,
    realm: String,
}

impl ActiveDirectoryHandler {
    /// Create a handler connecting through [`Ldap3Connector`]
    pub fn new() -> Self {
        Self::with_connector(Box::new(Ldap3Connector::new()))
    }

    /// Create a handler connecting through `connector`
    pub fn with_connector(connector: Box<dyn DirectoryConnector>) -> Self {
        Self {
            connector,
            state: SessionState::Unopened,
        }
    }

    /// Settings of the open session
    pub fn config(&self) -> Option<&AdConfig> {
        match &self.state {
            SessionState::Open(session) => Some(&session.config),
            SessionState::Unopened | SessionState::Closed => None,
        }
    }

    fn connect(
        &self,
        credential: &KerberosCredential,
        config: &AdConfig,
    ) -> Result<Box<dyn DirectoryConnection>> {
        let url = Url::parse(config.ldap_url()).map_err(|error| {
            directory_escape_hatch(DirectoryError::InvalidUrl(format!(
                "{}: {error}",
                config.ldap_url()
            )))
        })?;
        if !matches!(url.scheme(), "ldap" | "ldaps") {
            return Err(directory_escape_hatch(DirectoryError::InvalidUrl(format!(
                "unsupported scheme `{}`, expected `ldap` or `ldaps`",
                url.scheme()
            ))));
        }

        debug!("Connecting to {url}");
        let mut conn = self
            .connector
            .connect(&url, config.timeout())
            .map_err(directory_escape_hatch)?;

        debug!("Binding as {}", credential.principal());
        if let Err(error) = conn.simple_bind(credential.principal(), credential.password()) {
            if let Err(unbind_error) = conn.unbind() {
                debug!("Unbind after failed bind: {unbind_error}");
            }
            return Err(directory_escape_hatch(error));
        }
        Ok(conn)
    }
}

impl Default for ActiveDirectoryHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    fn resolve(&self, principal: &str) -> Result<Principal> {
        Ok(Principal::parse(principal)?.with_default_realm(&self.realm))
    }

    /// Distinguished name of the entry of `principal`, if any
    fn find(&mut self, principal: &Principal) -> Result<Option<String>> {
        let filter = format!(
            "(&(objectClass=user)(userPrincipalName={}))",
            ldap_escape(&principal.normalized())
        );
        debug!("Searching {} for {filter}", self.config.container_dn);
        let entries = self
            .conn
            .search(&self.config.container_dn, SearchScope::Subtree, &filter)
            .map_err(|error| self.container_escape_hatch(error))?;
        Ok(entries.into_iter().next())
    }

    fn container_escape_hatch(&self, error: DirectoryError) -> Error {
        match error {
            DirectoryError::Rejected {
                code: result_code::NO_SUCH_OBJECT | result_code::INVALID_DN_SYNTAX,
                message,
            } => {
                let error = Error::Container(format!("{}: {message}", self.config.container_dn));
                warn!("Active Directory operation failed: {error}");
                error
            }
            other => directory_escape_hatch(other),
        }
    }

    /// Entry attributes to send for `attributes`, with the password attribute encoded
    fn entry_attributes(&self, attributes: &AttributeSet) -> EntryAttributes {
        attributes
            .iter()
            .map(|attribute| {
                let is_password = attribute
                    .name()
                    .eq_ignore_ascii_case(&self.config.password_attribute);
                let values = attribute
                    .values()
                    .iter()
                    .map(|value| {
                        if is_password {
                            self.config.password_encoding.encode(value)
                        } else {
                            value.as_bytes().to_vec()
                        }
                    })
                    .collect();
                (attribute.name().clone(), values)
            })
            .collect()
    }
}

impl KerberosOperationHandler for ActiveDirectoryHandler {
    fn open(
        &mut self,
        credential: &KerberosCredential,
        realm: &str,
        config: &BackendConfig,
    ) -> Result<()> {
        self.state.check_openable()?;

        let config = AdConfig::from_config(config)?;
        if !credential.is_complete() {
            return Err(Error::AdminAuthentication(
                "administrator principal and password are required".to_owned(),
            ));
        }

        let conn = self.connect(credential, &config)?;
        info!(
            "Opened Active Directory session on {} for realm {realm}",
            config.ldap_url()
        );
        self.state = SessionState::Open(Session {
            conn,
            config,
            realm: realm.to_uppercase(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.state.close() {
            if let Err(error) = session.conn.unbind() {
                debug!("Unbind failed while closing: {error}");
            }
            info!(
                "Closed Active Directory session on {}",
                session.config.ldap_url()
            );
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn test_administrator_credentials(&mut self) -> Result<()> {
        let session = self.state.session()?;
        let container_dn = session.config.container_dn.clone();
        debug!("Reading {container_dn}");
        let entries = session
            .conn
            .search(&container_dn, SearchScope::Base, "(objectClass=*)")
            .map_err(|error| match error {
                DirectoryError::Rejected {
                    code: result_code::INSUFFICIENT_ACCESS_RIGHTS,
                    message,
                } => Error::AdminAuthentication(message),
                other => session.container_escape_hatch(other),
            })?;
        if entries.is_empty() {
            return Err(Error::Container(format!(
                "{container_dn} is not visible to the administrator"
            )));
        }
        Ok(())
    }

    fn principal_exists(&mut self, principal: &str) -> Result<bool> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?;
        Ok(session.find(&principal)?.is_some())
    }

    fn create_principal(
        &mut self,
        principal: &str,
        password: &str,
        is_service: bool,
    ) -> Result<()> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?;
        if session.find(&principal)?.is_some() {
            return Err(Error::Conflict(principal.normalized()));
        }

        let context =
            TemplateContext::new(&principal, &session.config.container_dn, is_service, password);
        let attributes = session.config.template.render(&context)?;
        let cn = attributes
            .value("cn")
            .ok_or_else(|| Error::Template("rendered attributes have no `cn`".to_owned()))?;
        let dn = format!("cn={},{}", dn_escape(cn), session.config.container_dn);
        let entry = session.entry_attributes(&attributes);

        debug!("Adding {dn}");
        session.conn.add(&dn, entry).map_err(|error| match error {
            DirectoryError::Rejected {
                code: result_code::ENTRY_ALREADY_EXISTS,
                message,
            } => Error::Conflict(format!("{dn}: {message}")),
            other => session.container_escape_hatch(other),
        })
    }

    fn set_principal_password(&mut self, principal: &str, password: &str) -> Result<()> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?;
        let dn = session
            .find(&principal)?
            .ok_or_else(|| Error::NotFound(principal.normalized()))?;

        let encoded = session.config.password_encoding.encode(password);
        debug!("Replacing {} of {dn}", session.config.password_attribute);
        session
            .conn
            .replace(&dn, &session.config.password_attribute, vec![encoded])
            .map_err(|error| match error {
                DirectoryError::Rejected {
                    code: result_code::NO_SUCH_OBJECT,
                    ..
                } => Error::NotFound(principal.normalized()),
                other => directory_escape_hatch(other),
            })
    }

    fn remove_principal(&mut self, principal: &str) -> Result<()> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?;
        let Some(dn) = session.find(&principal)? else {
            debug!("{} is already absent", principal.normalized());
            return Ok(());
        };

        debug!("Deleting {dn}");
        match session.conn.delete(&dn) {
            Ok(())
            | Err(DirectoryError::Rejected {
                code: result_code::NO_SUCH_OBJECT,
                ..
            }) => Ok(()),
            Err(error) => Err(directory_escape_hatch(error)),
        }
    }
}
