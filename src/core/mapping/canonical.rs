//! Canonical business keys
//!
//! A canonical key is an ordered list of `(FieldName, value)` pairs rendered as
//! `Name=value` joined with `|`. Backslash, `|` and `=` inside values are
//! backslash-escaped, so rendering is injective and [`CanonicalKey::parse`]
//! recovers the exact field list.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building or parsing a canonical key
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// A required field was absent or blank
    #[error("{0} is required but was blank")]
    MissingField(String),

    /// Field names are ASCII alphanumeric
    #[error("Invalid key field name '{0}'")]
    InvalidFieldName(String),

    /// A key must have at least one field
    #[error("Canonical key has no fields")]
    Empty,

    /// Serialized text is not a canonical key
    #[error("Malformed canonical key '{key}': {reason}")]
    Malformed { key: String, reason: String },

    /// The requested field does not occur in the key
    #[error("Canonical key has no field '{0}'")]
    NoSuchField(String),

    /// A combination of fields breaks a resource-specific rule
    #[error("{0}")]
    Invalid(String),
}

/// An ordered, validated list of key fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey {
    fields: Vec<(String, String)>,
}

impl CanonicalKey {
    /// Start a new key
    pub fn builder() -> CanonicalKeyBuilder {
        CanonicalKeyBuilder::default()
    }

    /// Start a new key that begins with this key's fields
    ///
    /// Used to compose scopes, e.g. an episode key extends its patient key.
    pub fn extend(&self) -> CanonicalKeyBuilder {
        CanonicalKeyBuilder {
            fields: self.fields.clone(),
            error: None,
        }
    }

    /// Fields in key order
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field with the given name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// A copy of this key with one field's value substituted
    ///
    /// # Errors
    ///
    /// Returns an error if the field is absent or the new value is blank.
    pub fn with_replaced(&self, name: &str, value: &str) -> Result<Self, KeyError> {
        if value.trim().is_empty() {
            return Err(KeyError::MissingField(name.to_string()));
        }
        let mut fields = self.fields.clone();
        let slot = fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| KeyError::NoSuchField(name.to_string()))?;
        slot.1 = value.to_string();
        Ok(Self { fields })
    }

    /// Whether `other` equals this key or extends it with further fields
    pub fn is_prefix_of(&self, other: &CanonicalKey) -> bool {
        other.fields.len() >= self.fields.len() && other.fields[..self.fields.len()] == self.fields[..]
    }

    /// Parse a serialized key
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a well-formed canonical key.
    pub fn parse(text: &str) -> Result<Self, KeyError> {
        let malformed = |reason: &str| KeyError::Malformed {
            key: text.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = Vec::new();
        let mut name = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = text.chars();

        let mut finish = |name: &mut String, value: &mut String, in_value: &mut bool| {
            if !*in_value {
                return Err(malformed("field without '='"));
            }
            validate_name(name)?;
            if value.is_empty() {
                return Err(malformed("empty value"));
            }
            fields.push((std::mem::take(name), std::mem::take(value)));
            *in_value = false;
            Ok(())
        };

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if !in_value {
                        return Err(malformed("escape inside a field name"));
                    }
                    match chars.next() {
                        Some(escaped @ ('\\' | '|' | '=')) => value.push(escaped),
                        Some(_) => return Err(malformed("unknown escape sequence")),
                        None => return Err(malformed("dangling escape")),
                    }
                }
                '=' if !in_value => in_value = true,
                '=' => return Err(malformed("unescaped '=' in value")),
                '|' => finish(&mut name, &mut value, &mut in_value)?,
                c if in_value => value.push(c),
                c => name.push(c),
            }
        }
        if text.is_empty() {
            return Err(KeyError::Empty);
        }
        finish(&mut name, &mut value, &mut in_value)?;

        Ok(Self { fields })
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{name}=")?;
            for c in value.chars() {
                if matches!(c, '\\' | '|' | '=') {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for CanonicalKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Builder for [`CanonicalKey`]
///
/// The first contract violation is remembered and reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct CanonicalKeyBuilder {
    fields: Vec<(String, String)>,
    error: Option<KeyError>,
}

impl CanonicalKeyBuilder {
    /// Append a field that must be present and non-blank
    pub fn required(mut self, name: &str, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        if value.trim().is_empty() {
            self.fail(KeyError::MissingField(name.to_string()));
        } else {
            self.push(name, value);
        }
        self
    }

    /// Append a field that is omitted when absent or blank
    pub fn optional(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.push(name, value);
        }
        self
    }

    /// Finish the key
    ///
    /// # Errors
    ///
    /// Returns the first recorded violation, or [`KeyError::Empty`] if no field was added.
    pub fn build(self) -> Result<CanonicalKey, KeyError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.fields.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(CanonicalKey {
            fields: self.fields,
        })
    }

    fn push(&mut self, name: &str, value: &str) {
        match validate_name(name) {
            Ok(()) => self.fields.push((name.to_string(), value.to_string())),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: KeyError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

fn validate_name(name: &str) -> Result<(), KeyError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(KeyError::InvalidFieldName(name.to_string()));
    }
    Ok(())
}
