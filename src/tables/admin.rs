//! Bookkeeping tables the harness writes for every solver, built directly
//! rather than through column resolution.

use super::{ColumnDescriptor, ColumnType, TableDescriptor, VarKind};
use crate::namespace::{Namespace, Value};
use crate::process::TimelineEntry;
use chrono::{DateTime, Utc};

pub const PARAMS: &str = "admin_params";
pub const TESTS: &str = "admin_tests";
pub const TIME: &str = "admin_time";
pub const STATUS: &str = "admin_status";
pub const TIMELINE: &str = "admin_timeline";
pub const VERSION: &str = "admin_version";
pub const HOST: &str = "admin_host";

/// Status recorded for an invocation that never started.
pub const NOT_LAUNCHED_STATUS: i64 = -1;

fn table(name: &str, columns: &[(&str, ColumnType)]) -> TableDescriptor {
    TableDescriptor::new(
        name,
        columns
            .iter()
            .map(|(c, ty)| ColumnDescriptor::new(c, *ty, VarKind::Sys, c))
            .collect(),
    )
}

pub fn descriptor(name: &str) -> Option<TableDescriptor> {
    use ColumnType::{Integer, Real, Text};
    let t = match name {
        PARAMS => table(
            PARAMS,
            &[
                ("solver", Text),
                ("tests", Text),
                ("db", Text),
                ("check", Real),
                ("timeout", Real),
                ("memory", Integer),
            ],
        ),
        TESTS => table(TESTS, &[("id", Text), ("args", Text)]),
        TIME => table(
            TIME,
            &[("id", Text), ("starttime", Text), ("endtime", Text), ("elapsedseconds", Real)],
        ),
        STATUS => table(STATUS, &[("id", Text), ("status", Integer)]),
        TIMELINE => table(
            TIMELINE,
            &[
                ("id", Text),
                ("pid", Integer),
                ("cmdline", Text),
                ("starttime", Text),
                ("endtime", Text),
                ("elapsedseconds", Real),
            ],
        ),
        VERSION => table(VERSION, &[("program", Text), ("version", Text)]),
        HOST => table(
            HOST,
            &[
                ("hostname", Text),
                ("os", Text),
                ("kernel", Text),
                ("cpu", Text),
                ("cpus", Integer),
                ("memory", Integer),
                ("swap", Integer),
            ],
        ),
        _ => return None,
    };
    Some(t)
}

fn stamp(t: DateTime<Utc>) -> Value {
    Value::Text(t.to_rfc3339())
}

/// One row from the harness parameters held in the main namespace.
pub fn params_row(main: &Namespace) -> Vec<Value> {
    let text = |k: &str| main.get(k).cloned().unwrap_or_else(|_| ColumnType::Text.neutral());
    let cast = |k: &str, ty: ColumnType| {
        main.get(k)
            .ok()
            .and_then(|v| ty.cast(v))
            .unwrap_or_else(|| ty.neutral())
    };
    vec![
        text("solver"),
        text("tests"),
        text("db"),
        cast("check", ColumnType::Real),
        cast("timeout", ColumnType::Real),
        cast("memory", ColumnType::Integer),
    ]
}

pub fn tests_row(id: &str, args: &[String]) -> Vec<Value> {
    vec![Value::from(id), Value::from(args.join(" "))]
}

pub fn time_row(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Value> {
    let elapsed = (end - start).num_milliseconds() as f64 / 1000.0;
    vec![Value::from(id), stamp(start), stamp(end), Value::Real(elapsed)]
}

pub fn status_row(id: &str, status: i64) -> Vec<Value> {
    vec![Value::from(id), Value::Int(status)]
}

pub fn timeline_rows(id: &str, entries: &[TimelineEntry]) -> Vec<Vec<Value>> {
    entries
        .iter()
        .map(|e| {
            vec![
                Value::from(id),
                Value::from(e.pid),
                Value::from(e.cmdline.as_str()),
                stamp(e.start),
                e.end.map(stamp).unwrap_or_else(|| ColumnType::Text.neutral()),
                Value::Real(e.elapsed.unwrap_or(0.0)),
            ]
        })
        .collect()
}

pub fn version_row() -> Vec<Value> {
    vec![
        Value::from(env!("CARGO_PKG_NAME")),
        Value::from(env!("CARGO_PKG_VERSION")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn every_admin_table_has_a_descriptor() {
        for name in [PARAMS, TESTS, TIME, STATUS, TIMELINE, VERSION, HOST] {
            let d = descriptor(name).unwrap();
            assert_eq!(d.name, name);
        }
        assert!(descriptor("runs").is_none());
    }

    #[test]
    fn rows_match_their_descriptors() {
        let mut main = Namespace::new();
        main.set("solver", "ida");
        main.set("timeout", 10i64);
        main.set("memory", 1024u64);
        let params = params_row(&main);
        assert_eq!(params.len(), descriptor(PARAMS).unwrap().columns.len());
        assert_eq!(params[3], Value::Real(0.0));
        assert_eq!(params[4], Value::Real(10.0));

        let start = Utc::now();
        let time = time_row("t1", start, start + Duration::milliseconds(2500));
        assert_eq!(time.len(), descriptor(TIME).unwrap().columns.len());
        assert_eq!(time[3], Value::Real(2.5));

        let entry = TimelineEntry {
            pid: 42,
            cmdline: "./ida".into(),
            start,
            end: None,
            elapsed: None,
        };
        let rows = timeline_rows("t1", &[entry]);
        assert_eq!(rows[0].len(), descriptor(TIMELINE).unwrap().columns.len());
        assert_eq!(rows[0][1], Value::Int(42));
        assert_eq!(version_row().len(), 2);
        assert_eq!(tests_row("t1", &["-d".into(), "3".into()])[1], Value::from("-d 3"));
    }
}
