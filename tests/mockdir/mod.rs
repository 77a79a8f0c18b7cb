//! In-memory directory standing in for Active Directory
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use kerberos_ops::ad::{
    result_code, DirectoryConnection, DirectoryConnector, DirectoryError, DirectoryResult,
    EntryAttributes, PasswordEncoding, SearchScope,
};
use url::Url;

pub const CONTAINER_DN: &str = "ou=HDP,DC=HDP01,DC=LOCAL";
pub const ADMIN_PRINCIPAL: &str = "cluser_admin@HDP01.LOCAL";
pub const ADMIN_PASSWORD: &str = "Hadoop12345";
pub const LDAP_URL: &str = "ldaps://10.0.100.4";
pub const REALM: &str = "HDP01.LOCAL";

#[derive(Debug, Default)]
pub struct State {
    pub containers: Vec<String>,
    pub entries: BTreeMap<String, EntryAttributes>,
    pub admin: (String, String),
    pub connects: Vec<(Url, Duration)>,
    pub unbinds: usize,
    pub fail_connect: Option<DirectoryError>,
    pub fail_next_add: Option<DirectoryError>,
}

#[derive(Clone, Debug)]
pub struct MockDirectory {
    state: Arc<Mutex<State>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                containers: vec![CONTAINER_DN.to_owned()],
                admin: (ADMIN_PRINCIPAL.to_owned(), ADMIN_PASSWORD.to_owned()),
                ..State::default()
            })),
        }
    }

    pub fn connector(&self) -> Box<dyn DirectoryConnector> {
        Box::new(self.clone())
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Values of `attribute` on the entry at `dn`, as UTF-8
    pub fn values(&self, dn: &str, attribute: &str) -> Vec<String> {
        self.raw_values(dn, attribute)
            .iter()
            .map(|value| String::from_utf8_lossy(value).into_owned())
            .collect()
    }

    pub fn raw_values(&self, dn: &str, attribute: &str) -> Vec<Vec<u8>> {
        self.state()
            .entries
            .get(dn)
            .and_then(|attributes| {
                attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values.clone())
            })
            .unwrap_or_default()
    }

    /// Decoded `unicodePwd` of the entry at `dn`
    pub fn password(&self, dn: &str) -> Option<String> {
        let values = self.raw_values(dn, "unicodePwd");
        PasswordEncoding::UnicodePwd.decode(values.first()?)
    }

    pub fn attribute_names(&self, dn: &str) -> Vec<String> {
        self.state()
            .entries
            .get(dn)
            .map(|attributes| attributes.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }
}

impl DirectoryConnector for MockDirectory {
    fn connect(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> DirectoryResult<Box<dyn DirectoryConnection>> {
        let mut state = self.state();
        state.connects.push((url.clone(), timeout));
        if let Some(error) = state.fail_connect.clone() {
            return Err(error);
        }
        Ok(Box::new(MockConnection {
            directory: self.clone(),
            bound: false,
        }))
    }
}

struct MockConnection {
    directory: MockDirectory,
    bound: bool,
}

fn rejected(code: u32, message: &str) -> DirectoryError {
    DirectoryError::Rejected {
        code,
        message: message.to_owned(),
    }
}

fn is_below(dn: &str, base: &str) -> bool {
    dn.to_ascii_lowercase()
        .ends_with(&format!(",{}", base.to_ascii_lowercase()))
}

impl MockConnection {
    fn check_bound(&self) -> DirectoryResult<()> {
        if self.bound {
            Ok(())
        } else {
            Err(rejected(
                1,
                "000004DC: LdapErr: DSID-0C090A5C, a successful bind must be completed",
            ))
        }
    }
}

impl DirectoryConnection for MockConnection {
    fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<()> {
        let state = self.directory.state();
        if state.admin.0 == dn && state.admin.1 == password {
            self.bound = true;
            Ok(())
        } else {
            Err(rejected(
                result_code::INVALID_CREDENTIALS,
                "80090308: LdapErr: DSID-0C09042A, comment: AcceptSecurityContext error, data 52e",
            ))
        }
    }

    fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> DirectoryResult<Vec<String>> {
        self.check_bound()?;
        let state = self.directory.state();
        if !state.containers.iter().any(|container| container == base) {
            return Err(rejected(result_code::NO_SUCH_OBJECT, "0000208D: NameErr: DSID-03100241"));
        }
        match scope {
            SearchScope::Base => Ok(vec![base.to_owned()]),
            SearchScope::Subtree => {
                let upn = filter
                    .split_once("(userPrincipalName=")
                    .and_then(|(_, rest)| rest.split_once(')'))
                    .map(|(upn, _)| upn)
                    .unwrap_or_default();
                Ok(state
                    .entries
                    .iter()
                    .filter(|(dn, _)| is_below(dn, base))
                    .filter(|(_, attributes)| {
                        attributes.iter().any(|(name, values)| {
                            name == "userPrincipalName"
                                && values.iter().any(|v| v == upn.as_bytes())
                        })
                    })
                    .map(|(dn, _)| dn.clone())
                    .collect())
            }
        }
    }

    fn add(&mut self, dn: &str, attributes: EntryAttributes) -> DirectoryResult<()> {
        self.check_bound()?;
        let mut state = self.directory.state();
        if let Some(error) = state.fail_next_add.take() {
            return Err(error);
        }
        if state.entries.contains_key(dn) {
            return Err(rejected(
                result_code::ENTRY_ALREADY_EXISTS,
                "00000524: UpdErr: DSID-031A11E2",
            ));
        }
        if !state.containers.iter().any(|container| is_below(dn, container)) {
            return Err(rejected(result_code::NO_SUCH_OBJECT, "0000208D: NameErr: DSID-03100241"));
        }
        state.entries.insert(dn.to_owned(), attributes);
        Ok(())
    }

    fn replace(&mut self, dn: &str, attribute: &str, values: Vec<Vec<u8>>) -> DirectoryResult<()> {
        self.check_bound()?;
        let mut state = self.directory.state();
        let Some(attributes) = state.entries.get_mut(dn) else {
            return Err(rejected(result_code::NO_SUCH_OBJECT, "0000208D: NameErr: DSID-03100241"));
        };
        attributes.retain(|(name, _)| !name.eq_ignore_ascii_case(attribute));
        attributes.push((attribute.to_owned(), values));
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        self.check_bound()?;
        match self.directory.state().entries.remove(dn) {
            Some(_) => Ok(()),
            None => Err(rejected(result_code::NO_SUCH_OBJECT, "0000208D: NameErr: DSID-03100241")),
        }
    }

    fn unbind(&mut self) -> DirectoryResult<()> {
        self.bound = false;
        self.directory.state().unbinds += 1;
        Ok(())
    }
}
