//! Invocation lists: one JSON array of `{ "id", "args", "params" }` objects.

use crate::error::{Error, Result};
use crate::namespace::{Namespace, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    /// Argument vector passed verbatim to the solver
    #[serde(default)]
    pub args: Vec<String>,
    /// Named directives, on top of those read from `args`
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Invocation {
    pub fn new(id: &str, args: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            params: BTreeMap::new(),
        }
    }

    /// Load and check an invocation list.
    pub fn load_all(path: &Path) -> Result<Vec<Invocation>> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read tests {}: {}", path.display(), e)))?;
        let list: Vec<Invocation> = serde_json::from_str(&data)
            .map_err(|e| Error::config(format!("malformed tests {}: {}", path.display(), e)))?;
        check_ids(&list)?;
        Ok(list)
    }

    /// Directives given as `-name value` or `--name value` in `args`.
    pub fn directives(&self) -> Vec<(&str, &str)> {
        self.args
            .windows(2)
            .filter_map(|w| {
                let name = w[0].strip_prefix("--").or_else(|| w[0].strip_prefix('-'))?;
                let is_name = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
                (is_name && !w[1].starts_with('-')).then_some((name, w[1].as_str()))
            })
            .collect()
    }

    /// Fill the param namespace: positional arguments under `"0"`, `"1"`, ...
    /// then directives, explicit params last.
    pub fn fill_params(&self, param: &mut Namespace) {
        for (i, arg) in self.args.iter().enumerate() {
            param.set(i.to_string(), arg.as_str());
        }
        for (name, value) in self.directives() {
            param.set(name, value);
        }
        for (name, value) in &self.params {
            param.set(name.as_str(), value.clone());
        }
    }
}

pub fn check_ids(list: &[Invocation]) -> Result<()> {
    let mut seen = HashSet::new();
    for inv in list {
        if inv.id.trim().is_empty() {
            return Err(Error::config("invocation with an empty id"));
        }
        if !seen.insert(inv.id.as_str()) {
            return Err(Error::config(format!("invocation '{}' listed twice", inv.id)));
        }
    }
    Ok(())
}
