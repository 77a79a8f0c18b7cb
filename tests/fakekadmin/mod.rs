//! Scripted `kadmin` standing in for a MIT krb5 admin server
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use kerberos_ops::mit::{CommandOutput, CommandRunner};

pub const ADMIN_PRINCIPAL: &str = "admin/admin@EXAMPLE.ORG";
pub const ADMIN_PASSWORD: &str = "vErYsEcUrE";
pub const REALM: &str = "EXAMPLE.ORG";

#[derive(Debug, Default)]
pub struct State {
    /// Principal name to password
    pub principals: BTreeMap<String, String>,
    pub unreachable: bool,
    pub calls: Vec<(String, Vec<String>)>,
}

#[derive(Clone, Debug)]
pub struct FakeKadmin {
    state: Arc<Mutex<State>>,
}

impl FakeKadmin {
    pub fn new() -> Self {
        let mut principals = BTreeMap::new();
        principals.insert(ADMIN_PRINCIPAL.to_owned(), ADMIN_PASSWORD.to_owned());
        Self {
            state: Arc::new(Mutex::new(State {
                principals,
                ..State::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn runner(&self) -> Box<dyn CommandRunner> {
        let kadmin = self.clone();
        Box::new(move |program: &str, args: &[String]| kadmin.run(program, args))
    }

    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let mut state = self.state();
        state.calls.push((program.to_owned(), args.to_vec()));

        if state.unreachable {
            return Ok(failure(
                "kadmin: Cannot contact any KDC for requested realm while initializing kadmin interface",
            ));
        }
        let option = |name: &str| {
            args.iter()
                .position(|arg| arg == name)
                .and_then(|index| args.get(index + 1))
                .cloned()
                .unwrap_or_default()
        };
        let admin = option("-p");
        match state.principals.get(&admin) {
            None => {
                return Ok(failure(
                    "kadmin: Client not found in Kerberos database while initializing kadmin interface",
                ))
            }
            Some(password) if *password != option("-w") => {
                return Ok(failure(
                    "kadmin: Incorrect password while initializing kadmin interface",
                ))
            }
            Some(_) => {}
        }

        let query = tokenize(&option("-q"));
        let words: Vec<&str> = query.iter().map(String::as_str).collect();
        Ok(match words.as_slice() {
            ["get_principal", name] => match state.principals.get(*name) {
                Some(_) => CommandOutput::new(
                    Some(0),
                    format!("Principal: {name}\nExpiration date: [never]\n"),
                    "",
                ),
                None => query_error(format!(
                    "get_principal: Principal does not exist while retrieving \"{name}\"."
                )),
            },
            ["add_principal", "-pw", password, name] => {
                if state.principals.contains_key(*name) {
                    query_error(format!(
                        "add_principal: Principal or policy already exists while creating \"{name}\"."
                    ))
                } else {
                    state
                        .principals
                        .insert((*name).to_owned(), (*password).to_owned());
                    CommandOutput::new(
                        Some(0),
                        format!("Principal \"{name}\" created.\n"),
                        format!(
                            "WARNING: no policy specified for {name}; defaulting to no policy\n"
                        ),
                    )
                }
            }
            ["change_password", "-pw", password, name] => {
                match state.principals.get_mut(*name) {
                    Some(current) => {
                        *current = (*password).to_owned();
                        CommandOutput::new(
                            Some(0),
                            format!("Password for \"{name}\" changed.\n"),
                            "",
                        )
                    }
                    None => query_error(format!(
                        "change_password: Principal does not exist while changing password for \"{name}\"."
                    )),
                }
            }
            ["delete_principal", "-force", name] => match state.principals.remove(*name) {
                Some(_) => CommandOutput::new(
                    Some(0),
                    format!("Principal \"{name}\" deleted.\n"),
                    "",
                ),
                None => query_error(format!(
                    "delete_principal: Principal does not exist while deleting principal \"{name}\""
                )),
            },
            _ => query_error(format!("kadmin: Unknown request \"{}\"", option("-q"))),
        })
    }
}

fn failure(stderr: &str) -> CommandOutput {
    CommandOutput::new(Some(1), "", stderr)
}

/// `kadmin -q` reports failed requests on stderr but still exits with 0
fn query_error(stderr: String) -> CommandOutput {
    CommandOutput::new(Some(0), "", stderr)
}

/// Split a query the way kadmin does: on whitespace, with `"` quoting and `""` for a literal quote
fn tokenize(query: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = query.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
