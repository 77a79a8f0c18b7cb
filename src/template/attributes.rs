//! Rendered directory [`AttributeSet`]

use getset::Getters;
use serde_json::Value as Json;

use crate::error::{Error, Result};

/// A directory attribute with one or more values
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
pub struct Attribute {
    /// Attribute name
    #[getset(get = "pub")]
    name: String,
    values: Vec<String>,
}

impl Attribute {
    /// Create an attribute
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Attribute values
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// First value
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Ordered set of attributes describing a directory entry
///
/// Attributes keep the order they were declared in. Lookups are case-insensitive, as attribute
/// names are in LDAP.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
}

impl AttributeSet {
    /// Parse the JSON object a template renders to
    ///
    /// Each member is an attribute. String, number and boolean members yield a single value,
    /// arrays yield one value per element. `null` members, and empty strings, are dropped.
    pub(crate) fn from_json(rendered: &str) -> Result<Self> {
        let json: Json = serde_json::from_str(rendered).map_err(|error| {
            Error::Template(format!("rendered template is not valid JSON: {error}"))
        })?;
        let Json::Object(members) = json else {
            return Err(Error::Template(
                "rendered template must be a JSON object".to_owned(),
            ));
        };

        let mut attributes = Vec::with_capacity(members.len());
        for (name, value) in members {
            let mut values = match value {
                Json::Null => continue,
                Json::Array(items) => items
                    .into_iter()
                    .map(|item| scalar(&name, item))
                    .collect::<Result<Vec<_>>>()?,
                other => vec![scalar(&name, other)?],
            };
            values.retain(|value| !value.is_empty());
            if !values.is_empty() {
                attributes.push(Attribute { name, values });
            }
        }
        Ok(Self { attributes })
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether there are no attributes
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Find an attribute by name
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
    }

    /// First value of an attribute
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::first)
    }

    /// Whether an attribute is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over attributes in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

fn scalar(name: &str, value: Json) -> Result<String> {
    match value {
        Json::String(text) => Ok(text),
        Json::Number(number) => Ok(number.to_string()),
        Json::Bool(flag) => Ok(flag.to_string()),
        Json::Null => Ok(String::new()),
        Json::Array(_) | Json::Object(_) => Err(Error::Template(format!(
            "attribute `{name}` must be a string or an array of strings"
        ))),
    }
}
