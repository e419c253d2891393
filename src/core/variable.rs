//! Variable resolution and `{{ expr }}` template rendering
//!
//! Every host sees one merged JSON object: cluster-wide variables, then the
//! host's own variables, then facts derived from the inventory (name,
//! addresses, arch, roles and the `groups` role index). Action arguments
//! that are strings are themselves templates rendered against that object.

use crate::core::host::Host;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Variable lookup and rendering failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VariableError {
    #[error("variable `{0}` is not defined")]
    Undefined(String),

    #[error("variable `{key}` should be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("failed to render template `{template}`: {reason}")]
    Template { template: String, reason: String },
}

/// Source of the merged variables for a host
pub trait VariableResolver: Send + Sync {
    fn get(&self, host: &Host) -> Result<Value, VariableError>;
}

/// Resolver backed by the cluster configuration and inventory
#[derive(Debug, Clone, Default)]
pub struct InventoryVariables {
    globals: Map<String, Value>,
    hosts: Vec<Host>,
}

impl InventoryVariables {
    pub fn new(globals: Map<String, Value>, hosts: Vec<Host>) -> Self {
        Self { globals, hosts }
    }

    fn groups(&self) -> Value {
        let mut groups: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for host in &self.hosts {
            groups
                .entry("all")
                .or_default()
                .push(Value::String(host.name.clone()));
            for role in &host.roles {
                groups
                    .entry(role.as_str())
                    .or_default()
                    .push(Value::String(host.name.clone()));
            }
        }
        Value::Object(
            groups
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::Array(v)))
                .collect(),
        )
    }
}

impl VariableResolver for InventoryVariables {
    fn get(&self, host: &Host) -> Result<Value, VariableError> {
        let mut vars = self.globals.clone();
        for (key, value) in &host.vars {
            vars.insert(key.clone(), value.clone());
        }

        vars.insert("inventory_name".into(), Value::String(host.name.clone()));
        vars.insert("address".into(), Value::String(host.address.clone()));
        vars.insert(
            "internal_address".into(),
            Value::String(host.internal_address().to_string()),
        );
        vars.insert("arch".into(), Value::String(host.arch.to_string()));
        vars.insert("port".into(), Value::from(host.port));
        vars.insert("user".into(), Value::String(host.user.clone()));
        vars.insert(
            "roles".into(),
            Value::Array(
                host.roles
                    .iter()
                    .map(|r| Value::String(r.as_str().to_string()))
                    .collect(),
            ),
        );
        vars.insert("groups".into(), self.groups());

        Ok(Value::Object(vars))
    }
}

/// Look up a dotted path (`a.b.0.c`) in a variables object
pub fn lookup<'a>(vars: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(vars, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Read a string argument and render it as a template
pub fn string_var(vars: &Value, args: &Value, key: &str) -> Result<String, VariableError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(VariableError::Undefined(key.to_string())),
        Some(Value::String(template)) => parse_string(vars, template),
        Some(_) => Err(VariableError::WrongType {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Like [`string_var`] but an undefined key yields `None`
pub fn optional_string_var(
    vars: &Value,
    args: &Value,
    key: &str,
) -> Result<Option<String>, VariableError> {
    match string_var(vars, args, key) {
        Ok(value) => Ok(Some(value)),
        Err(VariableError::Undefined(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Read a list-of-strings argument, rendering each element
///
/// A string argument is rendered first; if the result is a JSON array of
/// strings it is used as the list, otherwise it is a single element.
pub fn string_slice_var(
    vars: &Value,
    args: &Value,
    key: &str,
) -> Result<Vec<String>, VariableError> {
    let wrong_type = || VariableError::WrongType {
        key: key.to_string(),
        expected: "a list of strings",
    };

    match args.get(key) {
        None | Some(Value::Null) => Err(VariableError::Undefined(key.to_string())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => parse_string(vars, s),
                _ => Err(wrong_type()),
            })
            .collect(),
        Some(Value::String(template)) => {
            let rendered = parse_string(vars, template)?;
            if rendered.trim_start().starts_with('[') {
                serde_json::from_str::<Vec<String>>(&rendered).map_err(|_| wrong_type())
            } else {
                Ok(vec![rendered])
            }
        }
        Some(_) => Err(wrong_type()),
    }
}

/// Render `{{ expr }}` placeholders against `vars`
///
/// An expression is a dotted path optionally followed by filters:
/// `default('x')` substitutes a literal when the path is undefined and
/// `join(', ')` joins a list.
pub fn parse_string(vars: &Value, template: &str) -> Result<String, VariableError> {
    if !template.contains("{{") {
        return Ok(template.to_string());
    }

    let pattern = Regex::new(r"\{\{\s*(.+?)\s*\}\}").map_err(|e| VariableError::Template {
        template: template.to_string(),
        reason: e.to_string(),
    })?;

    let mut failure = None;
    let rendered = pattern.replace_all(template, |caps: &Captures| {
        match evaluate(vars, &caps[1]) {
            Ok(value) => value,
            Err(err) => {
                failure.get_or_insert(err);
                String::new()
            }
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(rendered.into_owned()),
    }
}

fn evaluate(vars: &Value, expression: &str) -> Result<String, VariableError> {
    let mut parts = expression.split('|').map(str::trim);
    let path = parts.next().unwrap_or_default();
    let mut value = lookup(vars, path).cloned();

    for filter in parts {
        let (name, argument) = parse_filter(filter).ok_or_else(|| VariableError::Template {
            template: expression.to_string(),
            reason: format!("malformed filter `{}`", filter),
        })?;
        value = match name {
            "default" => value.or(Some(Value::String(argument))),
            "join" => match value {
                Some(Value::Array(items)) => Some(Value::String(
                    items.iter().map(to_text).collect::<Vec<_>>().join(&argument),
                )),
                other => other,
            },
            _ => {
                return Err(VariableError::Template {
                    template: expression.to_string(),
                    reason: format!("unknown filter `{}`", name),
                })
            }
        };
    }

    value
        .map(|v| to_text(&v))
        .ok_or_else(|| VariableError::Undefined(path.to_string()))
}

/// Split `name('arg')` into its name and unquoted argument
fn parse_filter(filter: &str) -> Option<(&str, String)> {
    let open = filter.find('(')?;
    let inner = filter[open + 1..].strip_suffix(')')?.trim();
    let argument = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(inner);
    Some((filter[..open].trim(), argument.to_string()))
}

fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
