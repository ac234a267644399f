//! Table population: declared columns resolved against the namespaces of one
//! invocation, producing typed rows for the sink.

pub mod admin;
mod extract;
mod populate;
mod schema;

pub use extract::{Extractor, DEFAULT_DATA_PATTERN};
pub use populate::{populate, TableRows};
pub use schema::{
    ColumnDescriptor, ColumnType, FallbackAction, PatternDescriptor, Schema, TableDescriptor,
    TableScope, VarKind, ADMIN_PREFIX, DATA_PATTERN_NAME,
};

use crate::namespace::Namespace;

/// Sub-key names of every pattern attribute in the regexp namespace.
pub const PATTERN_KEYS: [&str; 2] = ["match", "group"];

/// The namespaces of one invocation (or one parsed file).
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    pub sys: Namespace,
    pub main: Namespace,
    pub data: Namespace,
    pub file: Namespace,
    /// Positional arguments (`"0"`, `"1"`, ...) and named directives
    pub param: Namespace,
    pub user: Namespace,
    pub regexp: Namespace,
}

/// Where a column looks for its variable.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// One value under the variable name
    Scalar(&'a Namespace),
    /// One value per match under `pattern.group`
    Pattern(&'a Namespace),
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, kind: VarKind) -> Source<'_> {
        match kind {
            VarKind::Sys => Source::Scalar(&self.sys),
            VarKind::Main => Source::Scalar(&self.main),
            VarKind::Data => Source::Scalar(&self.data),
            VarKind::File => Source::Scalar(&self.file),
            VarKind::Dir | VarKind::Param => Source::Scalar(&self.param),
            VarKind::User => Source::Scalar(&self.user),
            VarKind::Regexp => Source::Pattern(&self.regexp),
        }
    }

    pub fn clear(&mut self) {
        for ns in [
            &mut self.sys,
            &mut self.main,
            &mut self.data,
            &mut self.file,
            &mut self.param,
            &mut self.user,
            &mut self.regexp,
        ] {
            ns.clear();
        }
    }
}
