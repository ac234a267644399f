//! Column resolution, fallback actions and cardinality replication.

use super::{ColumnDescriptor, FallbackAction, Namespaces, Source, TableDescriptor, PATTERN_KEYS};
use crate::error::{Error, Result};
use crate::namespace::{Key, NamespaceError, Value};
use tracing::warn;

/// Rows of one populate call plus the diagnostics raised by warning fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub rows: Vec<Vec<Value>>,
    pub warnings: Vec<String>,
}

enum Resolved {
    Scalar(Value),
    Matches(Vec<Value>),
}

struct Resolver<'a> {
    table: &'a TableDescriptor,
    warnings: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn cast(&self, column: &ColumnDescriptor, value: &Value) -> Result<Value> {
        column.ty.cast(value).ok_or_else(|| Error::Cast {
            table: self.table.name.clone(),
            column: column.name.clone(),
            value: value.to_string(),
            ty: column.ty.to_string(),
        })
    }

    fn fallback(&mut self, column: &ColumnDescriptor) -> Result<Value> {
        match &column.action {
            FallbackAction::None => Ok(column.ty.neutral()),
            FallbackAction::Warning => {
                let msg = format!(
                    "table '{}': variable '{}' of column '{}' was not available",
                    self.table.name, column.variable, column.name
                );
                warn!(table = %self.table.name, column = %column.name, variable = %column.variable, "variable not available");
                self.warnings.push(msg);
                Ok(column.ty.neutral())
            }
            FallbackAction::Error => Err(Error::MissingValue {
                table: self.table.name.clone(),
                column: column.name.clone(),
                variable: column.variable.clone(),
            }),
            FallbackAction::Default(v) => self.cast(column, v),
        }
    }

    fn resolve(&mut self, column: &ColumnDescriptor, ns: &Namespaces) -> Result<Resolved> {
        match ns.source(column.kind) {
            Source::Scalar(space) => match space.get(&column.variable) {
                Ok(v) => Ok(Resolved::Scalar(self.cast(column, v)?)),
                Err(NamespaceError::NotFound(_)) => Ok(Resolved::Scalar(self.fallback(column)?)),
                Err(e) => Err(e.into()),
            },
            Source::Pattern(space) => {
                let (pattern, group) = column.pattern_ref().ok_or_else(|| {
                    Error::config(format!("column '{}': '{}' is not pattern.group", column.name, column.variable))
                })?;
                if !space.contains(pattern) {
                    return Ok(Resolved::Scalar(self.fallback(column)?));
                }
                let wanted = Key::from(group);
                let values = space
                    .project(pattern, &PATTERN_KEYS[1..])?
                    .into_iter()
                    .filter(|(k, _)| k.first() == Some(&wanted))
                    .map(|(_, v)| self.cast(column, v))
                    .collect::<Result<Vec<_>>>()?;
                if values.is_empty() {
                    return Ok(Resolved::Scalar(self.fallback(column)?));
                }
                Ok(Resolved::Matches(values))
            }
        }
    }
}

/// Resolve every column of `table` and replicate the result into as many rows
/// as the pattern-derived columns have matches.
///
/// Pattern columns with more than one match must agree on their count.
/// Scalar columns, and pattern columns with a single match, are repeated on
/// every row.
pub fn populate(table: &TableDescriptor, ns: &Namespaces) -> Result<TableRows> {
    let mut resolver = Resolver {
        table,
        warnings: Vec::new(),
    };
    let resolved = table
        .columns
        .iter()
        .map(|c| resolver.resolve(c, ns))
        .collect::<Result<Vec<_>>>()?;

    let mut cardinality = 1;
    let mut leader: Option<(&str, usize)> = None;
    for (column, r) in table.columns.iter().zip(&resolved) {
        let Resolved::Matches(values) = r else {
            continue;
        };
        let count = values.len();
        if count <= 1 {
            continue;
        }
        match leader {
            Some((first, first_count)) if first_count != count => {
                return Err(Error::Cardinality {
                    table: table.name.clone(),
                    first: first.to_string(),
                    first_count,
                    second: column.name.clone(),
                    second_count: count,
                });
            }
            Some(_) => {}
            None => leader = Some((column.name.as_str(), count)),
        }
        cardinality = cardinality.max(count);
    }

    let rows = (0..cardinality)
        .map(|i| {
            resolved
                .iter()
                .map(|r| match r {
                    Resolved::Scalar(v) => v.clone(),
                    Resolved::Matches(values) if values.len() == 1 => values[0].clone(),
                    Resolved::Matches(values) => values[i].clone(),
                })
                .collect()
        })
        .collect();

    Ok(TableRows {
        rows,
        warnings: resolver.warnings,
    })
}
