//! Kerberos principal lifecycle management
//!
//! Create, verify, re-key and delete Kerberos principals against different KDC backends through
//! one [`KerberosOperationHandler`] contract. Supported backends are listed in [`KdcType`]:
//!
//! * Active Directory, over LDAP, see [`ad`]
//! * MIT krb5, through the `kadmin` command line client, see [`mit`]
//!
//! ```no_run
//! use kerberos_ops::{
//!     config::keys, BackendConfig, KdcType, KerberosCredential, SecurePasswordGenerator,
//! };
//!
//! # fn example() -> kerberos_ops::Result<()> {
//! let config = BackendConfig::new()
//!     .with(keys::KDC_TYPE, "active-directory")
//!     .with(keys::LDAP_URL, "ldaps://dc.example.org")
//!     .with(keys::CONTAINER_DN, "ou=hadoop,dc=example,dc=org");
//! let admin = KerberosCredential::new("admin@EXAMPLE.ORG", "vErYsEcUrE");
//!
//! let mut handler = KdcType::from_config(&config)?.handler();
//! handler.open(&admin, "EXAMPLE.ORG", &config)?;
//!
//! let password = SecurePasswordGenerator::new().generate();
//! if handler.principal_exists("nn/namenode.example.org")? {
//!     handler.set_principal_password("nn/namenode.example.org", &password)?;
//! } else {
//!     handler.create_principal("nn/namenode.example.org", &password, true)?;
//! }
//! handler.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every failure is an [`Error`] classified into an [`ErrorKind`]. Callers decide between
//! retrying ([`Error::is_retryable`]), asking an operator to fix the configuration
//! ([`Error::is_configuration`]) or handling a principal-level outcome such as
//! [`Error::Conflict`] or [`Error::NotFound`]. Nothing is retried internally.
//!
//! # About thread safety
//!
//! Handlers are `Send` but hold a single blocking session each. Use one handler per concurrent
//! operation rather than sharing one across threads.
//!
//! # Logging
//!
//! Operations are logged through the [`log`] facade. Passwords never are.

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod principal;
pub use principal::Principal;

pub mod credential;
pub use credential::KerberosCredential;

pub mod config;
pub use config::BackendConfig;

pub mod template;
pub use template::{Attribute, AttributeSet, AttributeTemplate, TemplateContext};

pub mod handler;
pub use handler::{KdcType, KerberosOperationHandler};

pub mod ad;
pub use ad::ActiveDirectoryHandler;

pub mod mit;
pub use mit::MitKdcHandler;

pub mod password;
pub use password::SecurePasswordGenerator;
