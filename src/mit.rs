//! MIT krb5 backend, driven through the `kadmin` command line client

use std::{
    io,
    process::{Command, Stdio},
};

use getset::{CopyGetters, Getters};
use log::{debug, info, warn};

use crate::{
    config::{keys, BackendConfig},
    credential::KerberosCredential,
    error::{Error, ErrorKind, Result},
    handler::{KerberosOperationHandler, SessionState},
    principal::Principal,
};

/// Executable run unless [`keys::KADMIN_PATH`] says otherwise
pub const DEFAULT_KADMIN_PATH: &str = "kadmin";

/// Output of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq, Getters, CopyGetters)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    #[getset(get_copy = "pub")]
    status: Option<i32>,
    /// Standard output
    #[getset(get = "pub")]
    stdout: String,
    /// Standard error
    #[getset(get = "pub")]
    stderr: String,
}

impl CommandOutput {
    /// Create a command output
    pub fn new(status: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs the `kadmin` executable
///
/// Implemented for closures taking the program and its arguments, which is convenient in tests.
pub trait CommandRunner: Send {
    /// Run `program` with `args` until it exits
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

impl<F> CommandRunner for F
where
    F: FnMut(&str, &[String]) -> io::Result<CommandOutput> + Send,
{
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        self(program, args)
    }
}

/// [`CommandRunner`] spawning processes
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a runner
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(CommandOutput::new(
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ))
    }
}

/// MIT settings, read from a [`BackendConfig`]
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct MitConfig {
    /// Path to the `kadmin` executable
    kadmin_path: String,
    /// Admin server to contact instead of the one `krb5.conf` names for the realm
    admin_server_host: Option<String>,
}

impl MitConfig {
    /// Read the settings
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            kadmin_path: config
                .get(keys::KADMIN_PATH)
                .unwrap_or(DEFAULT_KADMIN_PATH)
                .to_owned(),
            admin_server_host: config.get(keys::ADMIN_SERVER_HOST).map(str::to_owned),
        })
    }
}

/// Known `kadmin` diagnostics and how they are classified
///
/// `kadmin -q` reports failed queries on stderr while still exiting successfully, so stderr is
/// matched regardless of the exit status.
const KADMIN_MESSAGES: &[(&str, ErrorKind)] = &[
    ("Client not found in Kerberos database", ErrorKind::AdminAuthentication),
    ("Incorrect password", ErrorKind::AdminAuthentication),
    ("Password incorrect", ErrorKind::AdminAuthentication),
    ("Operation requires", ErrorKind::AdminAuthentication),
    ("Insufficient authorization", ErrorKind::AdminAuthentication),
    ("Cannot contact any KDC", ErrorKind::KdcConnection),
    ("Cannot resolve network address", ErrorKind::KdcConnection),
    ("Cannot resolve servers", ErrorKind::KdcConnection),
    ("Communication failure with server", ErrorKind::KdcConnection),
    ("GSS-API (or Kerberos) error", ErrorKind::KdcConnection),
    ("Missing parameters in krb5.conf", ErrorKind::Configuration),
    ("Principal or policy already exists", ErrorKind::Conflict),
    ("Principal does not exist", ErrorKind::NotFound),
    ("Illegal principal name", ErrorKind::InvalidPrincipal),
    ("Malformed representation of principal", ErrorKind::InvalidPrincipal),
];

/// Helper function to "raise" an error from `kadmin` output
fn kadmin_escape_hatch(output: &CommandOutput) -> Result<()> {
    let message = output.stderr().trim();
    let kind = KADMIN_MESSAGES
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, kind)| *kind);

    let error = match kind {
        None if output.success() => return Ok(()),
        None => Error::Directory {
            code: output.status().map_or(u32::MAX, |status| status as u32),
            message: message.to_owned(),
        },
        Some(ErrorKind::AdminAuthentication) => Error::AdminAuthentication(message.to_owned()),
        Some(ErrorKind::KdcConnection) => Error::KdcConnection(message.to_owned()),
        Some(ErrorKind::Conflict) => Error::Conflict(message.to_owned()),
        Some(ErrorKind::NotFound) => Error::NotFound(message.to_owned()),
        Some(ErrorKind::InvalidPrincipal) => Error::InvalidPrincipal(message.to_owned()),
        Some(_) => Error::configuration(keys::ADMIN_SERVER_HOST, message),
    };
    warn!("kadmin failed: {error}");
    Err(error)
}

/// Quote an argument of a `kadmin` query
fn quote(argument: &str) -> String {
    format!("\"{}\"", argument.replace('"', "\"\""))
}

/// [`KerberosOperationHandler`] for MIT krb5, running `kadmin` for each operation
///
/// Opening verifies the administrator credential by looking up the administrator principal.
/// No connection is held between operations.
///
/// The administrator password and principal passwords are passed to `kadmin` as arguments.
pub struct MitKdcHandler {
    runner: Box<dyn CommandRunner>,
    state: SessionState<Session>,
}

struct Session {
    config: MitConfig,
    admin: KerberosCredential,
    realm: String,
}

impl MitKdcHandler {
    /// Create a handler spawning `kadmin` processes
    pub fn new() -> Self {
        Self::with_runner(Box::new(ProcessRunner::new()))
    }

    /// Create a handler running `kadmin` through `runner`
    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            state: SessionState::Unopened,
        }
    }
}

impl Default for MitKdcHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    fn resolve(&self, principal: &str) -> Result<Principal> {
        Ok(Principal::parse(principal)?.with_default_realm(&self.realm))
    }

    /// Run a query. `description` is logged in place of the query, which may hold a password
    fn kadmin(
        &self,
        runner: &mut dyn CommandRunner,
        description: &str,
        query: String,
    ) -> Result<CommandOutput> {
        let mut args = vec![
            "-p".to_owned(),
            self.admin.principal().clone(),
            "-w".to_owned(),
            self.admin.password().clone(),
        ];
        if !self.realm.is_empty() {
            args.extend(["-r".to_owned(), self.realm.clone()]);
        }
        if let Some(host) = self.config.admin_server_host() {
            args.extend(["-s".to_owned(), host.clone()]);
        }
        args.extend(["-q".to_owned(), query]);

        debug!("Running {} -q {description}", self.config.kadmin_path());
        let output = runner
            .run(self.config.kadmin_path(), &args)
            .map_err(|error| {
                let error = Error::KdcConnection(format!(
                    "failed to run {}: {error}",
                    self.config.kadmin_path()
                ));
                warn!("{error}");
                error
            })?;
        kadmin_escape_hatch(&output)?;
        Ok(output)
    }

    fn get_principal(&self, runner: &mut dyn CommandRunner, principal: &str) -> Result<bool> {
        let query = format!("get_principal {}", quote(principal));
        let output = match self.kadmin(runner, &query, query.clone()) {
            Ok(output) => output,
            Err(Error::NotFound(_)) => return Ok(false),
            Err(error) => return Err(error),
        };
        Ok(output.stdout().lines().any(|line| {
            line.trim()
                .strip_prefix("Principal:")
                .is_some_and(|name| name.trim() == principal)
        }))
    }
}

impl KerberosOperationHandler for MitKdcHandler {
    fn open(
        &mut self,
        credential: &KerberosCredential,
        realm: &str,
        config: &BackendConfig,
    ) -> Result<()> {
        self.state.check_openable()?;

        let config = MitConfig::from_config(config)?;
        if !credential.is_complete() {
            return Err(Error::AdminAuthentication(
                "administrator principal and password are required".to_owned(),
            ));
        }

        let session = Session {
            config,
            admin: credential.clone(),
            realm: realm.to_uppercase(),
        };
        let admin = session.resolve(credential.principal())?.normalized();
        if !session.get_principal(self.runner.as_mut(), &admin)? {
            return Err(Error::AdminAuthentication(format!(
                "{admin} is not visible to itself"
            )));
        }

        info!("Opened kadmin session for realm {}", session.realm);
        self.state = SessionState::Open(session);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(session) = self.state.close() {
            info!("Closed kadmin session for realm {}", session.realm);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn test_administrator_credentials(&mut self) -> Result<()> {
        let session = self.state.session()?;
        let admin = session.resolve(session.admin.principal())?.normalized();
        if session.get_principal(self.runner.as_mut(), &admin)? {
            Ok(())
        } else {
            Err(Error::AdminAuthentication(format!(
                "{admin} is not visible to itself"
            )))
        }
    }

    fn principal_exists(&mut self, principal: &str) -> Result<bool> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?.normalized();
        session.get_principal(self.runner.as_mut(), &principal)
    }

    fn create_principal(
        &mut self,
        principal: &str,
        password: &str,
        is_service: bool,
    ) -> Result<()> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?.normalized();
        debug!("Creating {principal} (service: {is_service})");
        session.kadmin(
            self.runner.as_mut(),
            &format!("add_principal -pw <redacted> {}", quote(&principal)),
            format!("add_principal -pw {} {}", quote(password), quote(&principal)),
        )?;
        Ok(())
    }

    fn set_principal_password(&mut self, principal: &str, password: &str) -> Result<()> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?.normalized();
        session.kadmin(
            self.runner.as_mut(),
            &format!("change_password -pw <redacted> {}", quote(&principal)),
            format!(
                "change_password -pw {} {}",
                quote(password),
                quote(&principal)
            ),
        )?;
        Ok(())
    }

    fn remove_principal(&mut self, principal: &str) -> Result<()> {
        let session = self.state.session()?;
        let principal = session.resolve(principal)?.normalized();
        let query = format!("delete_principal -force {}", quote(&principal));
        match session.kadmin(self.runner.as_mut(), &query, query.clone()) {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }
}
