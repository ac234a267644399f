//! Measurements picked out of a finished run: `name: value` data lines,
//! named pattern matches, declared side files and the captured text itself.

use super::{Namespaces, Schema, VarKind, DATA_PATTERN_NAME, PATTERN_KEYS};
use crate::error::{Error, Result};
use crate::namespace::{Key, Namespace};
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Built-in data pattern: lines like ` >  nodes expanded: 1200`.
pub const DEFAULT_DATA_PATTERN: &str =
    r" >[\t ]*(?P<varname>[a-zA-Z ]+):[ ]+(?P<value>([0-9]+\.[0-9]+|[0-9]+))";

#[derive(Debug, Clone)]
pub struct Extractor {
    data: Regex,
    patterns: Vec<(String, Regex)>,
    files: Vec<String>,
}

impl Extractor {
    pub fn new(schema: &Schema) -> Result<Self> {
        let compile = |name: &str, src: &str| {
            Regex::new(src).map_err(|e| Error::config(format!("pattern '{}': {}", name, e)))
        };
        let data = match schema.pattern(DATA_PATTERN_NAME) {
            Some(p) => compile(&p.name, &p.regex)?,
            None => compile(DATA_PATTERN_NAME, DEFAULT_DATA_PATTERN)?,
        };
        let patterns = schema
            .patterns
            .iter()
            .filter(|p| p.name != DATA_PATTERN_NAME)
            .map(|p| Ok((p.name.clone(), compile(&p.name, &p.regex)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut files: Vec<String> = schema
            .tables
            .iter()
            .flat_map(|t| &t.columns)
            .filter(|c| c.kind == VarKind::File)
            .map(|c| c.variable.clone())
            .collect();
        files.sort();
        files.dedup();

        Ok(Self { data, patterns, files })
    }

    /// Every data-pattern match stores `value` under the right-trimmed `varname`.
    pub fn extract_data(&self, text: &str, data: &mut Namespace) {
        for caps in self.data.captures_iter(text) {
            let (Some(name), Some(value)) = (caps.name("varname"), caps.name("value")) else {
                continue;
            };
            data.set(name.as_str().trim_end(), value.as_str());
        }
    }

    /// Every match of a named pattern becomes one `(match, group)` entry per
    /// named group. Groups that did not take part store empty text.
    pub fn extract_patterns(&self, text: &str, regexp: &mut Namespace) {
        for (name, re) in &self.patterns {
            let groups: Vec<&str> = re.capture_names().flatten().collect();
            for (index, caps) in re.captures_iter(text).enumerate() {
                for group in &groups {
                    let value = caps.name(group).map(|m| m.as_str().trim_end()).unwrap_or("");
                    regexp.insert(name, vec![Key::from(index), Key::from(*group)], value);
                }
            }
            if regexp.contains(name) {
                regexp.set_key_names(name, &PATTERN_KEYS);
            }
        }
    }

    /// Content of every declared file, relative to `cwd`. Missing files stay absent.
    pub fn read_files(&self, cwd: &Path, file: &mut Namespace) {
        for name in &self.files {
            let path = cwd.join(name);
            match std::fs::read(&path) {
                Ok(bytes) => file.set(name.as_str(), String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => debug!(path = %path.display(), error = %e, "declared file not available"),
            }
        }
    }

    /// Fill the data, regexp, file and sys namespaces from one run's output.
    pub fn apply(&self, stdout: &str, stderr: &str, cwd: &Path, ns: &mut Namespaces) {
        self.extract_data(stdout, &mut ns.data);
        self.extract_patterns(stdout, &mut ns.regexp);
        self.read_files(cwd, &mut ns.file);
        ns.sys.set("stdout", stdout);
        ns.sys.set("stderr", stderr);
    }
}
