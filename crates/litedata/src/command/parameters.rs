//! Command parameters and their binding to compiled statements.
//!
//! Placeholders are matched as follows:
//!
//! - named (`:name`, `@name`, `$name`): the parameter with the same name,
//!   with or without its prefix character; the prefix itself is ignored, so
//!   a parameter named `@id` also satisfies `:id`
//! - numbered (`?NNN`): the NNN-th unnamed parameter
//! - anonymous (`?`): the next unnamed parameter, counting only anonymous
//!   placeholders, so named and anonymous placeholders can be mixed

use crate::error::{Error, Result};
use crate::native::RawStatement;
use crate::types::{FieldType, SqliteTypeMap, SqliteValue, Value};

const NAME_PREFIXES: [char; 3] = [':', '@', '$'];

fn strip_prefix(name: &str) -> &str {
    name.strip_prefix(NAME_PREFIXES).unwrap_or(name)
}

/// A value bound to one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: Option<String>,
    value: Value,
    field_type: Option<FieldType>,
}

impl Parameter {
    /// Named parameter.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
            field_type: None,
        }
    }

    /// Unnamed parameter for `?` placeholders.
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
            field_type: None,
        }
    }

    /// Force the representation the value is bound as.
    #[must_use]
    pub const fn with_field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub const fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
    }

    pub const fn field_type(&self) -> Option<FieldType> {
        self.field_type
    }

    fn matches(&self, placeholder: &str) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| strip_prefix(name) == strip_prefix(placeholder))
    }

    fn bind(&self, statement: &RawStatement, index: usize) -> Result<()> {
        let Some(map) = SqliteTypeMap::for_value(&self.value, self.field_type) else {
            return statement.bind_null(index);
        };
        match map.write(&self.value)? {
            SqliteValue::Null => statement.bind_null(index),
            SqliteValue::Integer(v) => statement.bind_int64(index, v),
            SqliteValue::Real(v) => statement.bind_double(index, v),
            SqliteValue::Text(v) => statement.bind_text(index, &v),
            SqliteValue::Blob(v) => statement.bind_blob(index, &v),
        }
    }
}

/// Ordered parameter collection of a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    items: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any existing one with the same name.
    pub fn add(&mut self, parameter: Parameter) -> &mut Self {
        if let Some(name) = parameter.name.as_deref() {
            if let Some(existing) = self.items.iter_mut().find(|p| p.matches(name)) {
                *existing = parameter;
                return self;
            }
        }
        self.items.push(parameter);
        self
    }

    /// Add or replace a named parameter.
    pub fn add_with_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.add(Parameter::new(name, value))
    }

    /// Append an unnamed parameter.
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.items.push(Parameter::positional(value));
        self
    }

    /// Look up a named parameter (prefix optional).
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| p.matches(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.items.iter_mut().find(|p| p.matches(name))
    }

    /// Remove a named parameter.
    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let index = self.items.iter().position(|p| p.matches(name))?;
        Some(self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    fn positional(&self, index: usize) -> Option<&Parameter> {
        self.items
            .iter()
            .filter(|p| p.name.is_none())
            .nth(index.checked_sub(1)?)
    }

    /// Bind every placeholder of `statement`.
    ///
    /// A placeholder without a matching parameter is a usage error naming it.
    pub(crate) fn bind(&self, statement: &RawStatement) -> Result<()> {
        let mut anonymous = 0;
        for index in 1..=statement.bind_parameter_count() {
            let placeholder = statement.bind_parameter_name(index);
            let parameter = match placeholder.as_deref() {
                Some(name) => match name.strip_prefix('?') {
                    Some(number) => number.parse().ok().and_then(|n| self.positional(n)),
                    None => self.get(name),
                },
                None => {
                    anonymous += 1;
                    self.positional(anonymous)
                }
            };
            let Some(parameter) = parameter else {
                let name = placeholder.unwrap_or_else(|| format!("?{index}"));
                return Err(Error::invalid_operation(
                    "execute",
                    format!("no value supplied for parameter {name}"),
                ));
            };
            parameter.bind(statement, index)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<P: Into<Value>> FromIterator<P> for Parameters {
    /// Collect unnamed parameters.
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Parameter::positional).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_lookup_ignores_prefix() {
        let mut params = Parameters::new();
        params.add_with_value("@id", 1_i64).add_with_value("name", "x");
        assert!(params.get(":id").is_some());
        assert!(params.get("id").is_some());
        assert!(params.get("$name").is_some());
        assert!(params.get("missing").is_none());
    }

    #[test]
    fn test_add_replaces_same_name() {
        let mut params = Parameters::new();
        params.add_with_value(":a", 1_i64);
        params.add_with_value("@a", 2_i64);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("a").unwrap().value(), &Value::Int64(2));
    }

    #[test]
    fn test_positional_skips_named() {
        let mut params = Parameters::new();
        params.push(10_i64).add_with_value(":a", 0_i64).push(20_i64);
        assert_eq!(params.positional(1).unwrap().value(), &Value::Int64(10));
        assert_eq!(params.positional(2).unwrap().value(), &Value::Int64(20));
        assert!(params.positional(3).is_none());
        assert!(params.positional(0).is_none());
    }

    #[test]
    fn test_from_iterator_and_remove() {
        let mut params: Parameters = [1_i32, 2, 3].into_iter().collect();
        assert_eq!(params.len(), 3);
        assert!(params.remove("x").is_none());
        params.add(Parameter::new("x", Value::Null).with_field_type(FieldType::String));
        assert_eq!(params.remove("x").unwrap().field_type(), Some(FieldType::String));
        params.clear();
        assert!(params.is_empty());
    }
}
