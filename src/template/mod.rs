//! Attribute templates describing the directory entry created for a principal
//!
//! A template is text in a small language that renders to a JSON object mapping attribute names
//! to a value or an array of values:
//!
//! ```
//! use kerberos_ops::{AttributeTemplate, Principal, TemplateContext};
//!
//! let template = AttributeTemplate::compile(r#"{
//!     "cn": "$principal_name",
//!     #if( $is_service )
//!     "servicePrincipalName": "$principal_name",
//!     #end
//!     "sAMAccountName": "${principal_primary.toUpperCase()}"
//! }"#).unwrap();
//!
//! let principal: Principal = "HTTP/web.example.org@EXAMPLE.ORG".parse().unwrap();
//! let context = TemplateContext::new(&principal, "ou=services,dc=example,dc=org", true, "pw");
//! let attributes = template.render(&context).unwrap();
//! assert_eq!(attributes.len(), 3);
//! assert_eq!(attributes.value("sAMAccountName"), Some("HTTP"));
//! ```
//!
//! The language is plain text interleaved with:
//!
//! * references: `$name` or `${name}`, optionally followed by transforms, as in
//!   `$name.substring(0,20)` or `${name.toLowerCase()}`. The transforms are `substring`,
//!   `toLowerCase`, `toUpperCase` and `truncate`, which bounds a value to a number of characters
//!   by replacing its tail with `primary-digest`
//! * `#set( $name = "text with $references" )`, also accepting `'literal'`, `$other` and
//!   `true`/`false` as values
//! * `#if( $flag ) ... #elseif( !$other ) ... #else ... #end`
//!
//! Templates can only look up variables, apply allow-listed string transforms, bind local
//! variables and branch on conditions. Substituted values are JSON-escaped, so a principal name
//! or a password can never add attributes to the rendered entry.

mod attributes;
mod context;
pub(crate) mod parser;

use std::{borrow::Cow, collections::HashMap, sync::Arc};

pub use attributes::{Attribute, AttributeSet};
pub use context::{TemplateContext, Value, COMMON_NAME_LIMIT, DEFAULT_ACCOUNT_NAME_LIMIT};
use parser::{Condition, Expr, Node, Reference, Transform};

use crate::{
    error::{Error, Result},
    principal::truncated_identifier,
};

/// A compiled attribute template
///
/// Compiled once, immutable afterwards. Cloning is cheap and clones share the compiled form.
#[derive(Clone, Debug)]
pub struct AttributeTemplate {
    nodes: Arc<[Node]>,
}

impl AttributeTemplate {
    /// Compile template source
    ///
    /// Syntax errors, unsupported transforms and references to unknown variables are reported
    /// as [`Error::Template`].
    pub fn compile(source: &str) -> Result<Self> {
        let nodes = parser::parse(source)?;

        let mut defined: Vec<&str> = context::VARIABLES.to_vec();
        collect_set_names(&nodes, &mut defined);
        let mut referenced = Vec::new();
        collect_references(&nodes, &mut referenced);
        if let Some(unknown) = referenced.iter().find(|name| !defined.contains(*name)) {
            return Err(Error::Template(format!("unknown variable `${unknown}`")));
        }

        Ok(Self {
            nodes: nodes.into(),
        })
    }

    /// Render the template into an [`AttributeSet`]
    ///
    /// Rendering is pure: it only reads `context`.
    pub fn render(&self, context: &TemplateContext) -> Result<AttributeSet> {
        let mut scope = Scope {
            context,
            locals: HashMap::new(),
        };
        let mut rendered = String::new();
        scope.render(&self.nodes, &mut rendered)?;
        AttributeSet::from_json(&rendered)
    }
}

struct Scope<'a> {
    context: &'a TemplateContext,
    locals: HashMap<String, Value>,
}

impl Scope<'_> {
    fn render(&mut self, nodes: &[Node], out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Reference(reference) => {
                    let value = self.evaluate(reference)?;
                    out.push_str(&json_escape(&value.as_text()));
                }
                Node::Set { name, value } => {
                    let value = self.expression(value)?;
                    self.locals.insert(name.clone(), value);
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for branch in branches {
                        if self.condition(&branch.condition)? {
                            taken = Some(&branch.body);
                            break;
                        }
                    }
                    self.render(taken.unwrap_or(otherwise), out)?;
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.locals
            .get(name)
            .or_else(|| self.context.get(name))
            .cloned()
            .ok_or_else(|| Error::Template(format!("variable `${name}` is not defined")))
    }

    fn evaluate(&self, reference: &Reference) -> Result<Value> {
        let value = self.lookup(&reference.name)?;
        if reference.transforms.is_empty() {
            return Ok(value);
        }
        let mut text = value.as_text().into_owned();
        for transform in &reference.transforms {
            text = self.transform(*transform, &text);
        }
        Ok(Value::Text(text))
    }

    fn transform(&self, transform: Transform, text: &str) -> String {
        match transform {
            Transform::Substring(start, end) => {
                let len = end.map_or(usize::MAX, |end| end - start);
                text.chars().skip(start).take(len).collect()
            }
            Transform::ToLowerCase => text.to_lowercase(),
            Transform::ToUpperCase => text.to_uppercase(),
            Transform::Truncate(limit) if text.chars().count() <= limit => text.to_owned(),
            Transform::Truncate(limit) => {
                truncated_identifier(self.context.primary(), self.context.digest(), limit)
            }
        }
    }

    fn condition(&self, condition: &Condition) -> Result<bool> {
        Ok(self.evaluate(&condition.reference)?.is_truthy() != condition.negated)
    }

    fn expression(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Interpolated(nodes) => {
                let mut text = String::new();
                for node in nodes {
                    match node {
                        Node::Text(literal) => text.push_str(literal),
                        Node::Reference(reference) => {
                            text.push_str(&self.evaluate(reference)?.as_text());
                        }
                        Node::Set { .. } | Node::If { .. } => {}
                    }
                }
                Ok(Value::Text(text))
            }
            Expr::Literal(literal) => Ok(Value::Text(literal.clone())),
            Expr::Reference(reference) => self.evaluate(reference),
            Expr::Flag(flag) => Ok(Value::Flag(*flag)),
        }
    }
}

/// Escape `text` for inclusion inside a JSON string literal
fn json_escape(text: &str) -> Cow<'_, str> {
    if !text
        .chars()
        .any(|c| c == '"' || c == '\\' || c.is_control())
    {
        return Cow::Borrowed(text);
    }
    let quoted = serde_json::Value::String(text.to_owned()).to_string();
    Cow::Owned(quoted[1..quoted.len() - 1].to_owned())
}

fn collect_set_names<'a>(nodes: &'a [Node], names: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Set { name, .. } => names.push(name),
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    collect_set_names(&branch.body, names);
                }
                collect_set_names(otherwise, names);
            }
            Node::Text(_) | Node::Reference(_) => {}
        }
    }
}

fn collect_references<'a>(nodes: &'a [Node], names: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Reference(reference) => names.push(&reference.name),
            Node::Set { value, .. } => match value {
                Expr::Interpolated(parts) => collect_references(parts, names),
                Expr::Reference(reference) => names.push(&reference.name),
                Expr::Literal(_) | Expr::Flag(_) => {}
            },
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    names.push(&branch.condition.reference.name);
                    collect_references(&branch.body, names);
                }
                collect_references(otherwise, names);
            }
        }
    }
}
