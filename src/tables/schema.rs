//! Declared output schema: tables of typed columns, and the named patterns
//! pattern-derived columns draw from. Consumed as JSON.

use crate::error::{Error, Result};
use crate::namespace::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Name of the pattern that replaces the built-in data pattern.
pub const DATA_PATTERN_NAME: &str = "default";

/// Prefix reserved for the tables the harness writes itself.
pub const ADMIN_PREFIX: &str = "admin_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    /// Value used when a missing variable is defaulted.
    pub fn neutral(self) -> Value {
        match self {
            ColumnType::Text => Value::Text(String::new()),
            ColumnType::Integer => Value::Int(0),
            ColumnType::Real => Value::Real(0.0),
        }
    }

    /// Convert `value` to this type; `None` when it cannot be represented.
    pub fn cast(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ColumnType::Text, v) => Some(Value::Text(v.to_string())),
            (ColumnType::Integer, Value::Int(i)) => Some(Value::Int(*i)),
            (ColumnType::Integer, Value::Real(r)) if r.is_finite() => Some(Value::Int(r.trunc() as i64)),
            (ColumnType::Integer, Value::Text(s)) => s.trim().parse().ok().map(Value::Int),
            (ColumnType::Real, Value::Int(i)) => Some(Value::Real(*i as f64)),
            (ColumnType::Real, Value::Real(r)) => Some(Value::Real(*r)),
            (ColumnType::Real, Value::Text(s)) => s.trim().parse().ok().map(Value::Real),
            _ => None,
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
        })
    }
}

/// Which namespace a column's variable resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    /// Measurements of the run: resource usage, exit status, captured text
    Sys,
    /// Harness parameters: solver, limits, declared files
    Main,
    /// `name: value` lines picked from standard output
    Data,
    /// Content of a file left behind by the run
    File,
    /// Named directive of the invocation
    Dir,
    /// Positional argument of the invocation
    Param,
    /// Values written by invocation hooks
    User,
    /// `pattern.group` of a named pattern, one value per match
    Regexp,
}

/// What to do when a column's variable cannot be resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackAction {
    /// Neutral value of the column type
    #[default]
    None,
    /// Neutral value plus a diagnostic
    Warning,
    /// Abort population of the table
    Error,
    /// Literal value cast to the column type
    Default(Value),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableScope {
    /// Populated once after the run
    #[default]
    Invocation,
    /// Populated on every poll of the running invocation
    Poll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub kind: VarKind,
    pub variable: String,
    #[serde(default)]
    pub action: FallbackAction,
}

impl ColumnDescriptor {
    pub fn new(name: &str, ty: ColumnType, kind: VarKind, variable: &str) -> Self {
        Self {
            name: name.to_string(),
            ty,
            kind,
            variable: variable.to_string(),
            action: FallbackAction::None,
        }
    }

    pub fn with_action(mut self, action: FallbackAction) -> Self {
        self.action = action;
        self
    }

    /// `(pattern, group)` of a regexp column.
    pub fn pattern_ref(&self) -> Option<(&str, &str)> {
        if self.kind != VarKind::Regexp {
            return None;
        }
        self.variable.split_once('.')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default)]
    pub scope: TableScope,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            scope: TableScope::Invocation,
            columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDescriptor {
    pub name: String,
    pub regex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
    #[serde(default)]
    pub patterns: Vec<PatternDescriptor>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Schema {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read schema {}: {}", path.display(), e)))?;
        let schema: Schema = serde_json::from_str(&data)
            .map_err(|e| Error::config(format!("malformed schema {}: {}", path.display(), e)))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn pattern(&self, name: &str) -> Option<&PatternDescriptor> {
        self.patterns.iter().find(|p| p.name == name)
    }

    pub fn tables_in(&self, scope: TableScope) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter().filter(move |t| t.scope == scope)
    }

    /// Every table and pattern must be usable before the first invocation runs.
    pub fn validate(&self) -> Result<()> {
        let mut compiled = Vec::with_capacity(self.patterns.len());
        let mut pattern_names = HashSet::new();
        for p in &self.patterns {
            if !is_identifier(&p.name) {
                return Err(Error::config(format!("invalid pattern name '{}'", p.name)));
            }
            if !pattern_names.insert(p.name.as_str()) {
                return Err(Error::config(format!("pattern '{}' declared twice", p.name)));
            }
            let re = Regex::new(&p.regex)
                .map_err(|e| Error::config(format!("pattern '{}': {}", p.name, e)))?;
            compiled.push((p.name.as_str(), re));
        }
        if let Some((_, re)) = compiled.iter().find(|(n, _)| *n == DATA_PATTERN_NAME) {
            let groups: HashSet<&str> = re.capture_names().flatten().collect();
            if !groups.contains("varname") || !groups.contains("value") {
                return Err(Error::config(format!(
                    "pattern '{}' must define the groups 'varname' and 'value'",
                    DATA_PATTERN_NAME
                )));
            }
        }

        let mut table_names = HashSet::new();
        for t in &self.tables {
            if !is_identifier(&t.name) {
                return Err(Error::config(format!("invalid table name '{}'", t.name)));
            }
            if t.name.starts_with(ADMIN_PREFIX) {
                return Err(Error::config(format!(
                    "table '{}': the prefix '{}' is reserved",
                    t.name, ADMIN_PREFIX
                )));
            }
            if !table_names.insert(t.name.as_str()) {
                return Err(Error::config(format!("table '{}' declared twice", t.name)));
            }
            if t.columns.is_empty() {
                return Err(Error::config(format!("table '{}' has no columns", t.name)));
            }

            let mut column_names = HashSet::new();
            for c in &t.columns {
                if !is_identifier(&c.name) {
                    return Err(Error::config(format!("table '{}': invalid column name '{}'", t.name, c.name)));
                }
                if !column_names.insert(c.name.as_str()) {
                    return Err(Error::config(format!("table '{}': column '{}' declared twice", t.name, c.name)));
                }
                if let FallbackAction::Default(v) = &c.action {
                    if c.ty.cast(v).is_none() {
                        return Err(Error::config(format!(
                            "table '{}', column '{}': default '{}' is not {}",
                            t.name, c.name, v, c.ty
                        )));
                    }
                }
                if c.kind != VarKind::Regexp {
                    continue;
                }
                let (pattern, group) = c.pattern_ref().ok_or_else(|| {
                    Error::config(format!(
                        "table '{}', column '{}': '{}' is not of the form pattern.group",
                        t.name, c.name, c.variable
                    ))
                })?;
                let (_, re) = compiled.iter().find(|(n, _)| *n == pattern).ok_or_else(|| {
                    Error::config(format!("table '{}', column '{}': unknown pattern '{}'", t.name, c.name, pattern))
                })?;
                if !re.capture_names().flatten().any(|g| g == group) {
                    return Err(Error::config(format!(
                        "table '{}', column '{}': pattern '{}' has no group '{}'",
                        t.name, c.name, pattern, group
                    )));
                }
            }
        }
        Ok(())
    }
}
