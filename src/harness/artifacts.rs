//! Per-solver directory layout, output-prefix substitution, and moving the
//! captured output into `results/`.

use crate::error::{Error, Result};
use crate::namespace::Namespace;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `<directory>/<solver>/{results,config,log}` plus the solver database.
#[derive(Debug, Clone)]
pub struct SolverLayout {
    pub root: PathBuf,
    pub results: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
    pub database: PathBuf,
}

impl SolverLayout {
    /// Create the layout; an existing target directory is refused so earlier
    /// results are never mixed with new ones.
    pub fn create(directory: &Path, solver: &str) -> Result<Self> {
        let root = directory.join(solver);
        if root.exists() {
            return Err(Error::config(format!(
                "target directory {} already exists",
                root.display()
            )));
        }
        let layout = Self {
            results: root.join("results"),
            config: root.join("config"),
            log: root.join("log"),
            database: root.join(format!("{}.db", solver)),
            root,
        };
        for dir in [&layout.results, &layout.config, &layout.log] {
            fs::create_dir_all(dir)?;
        }
        Ok(layout)
    }

    /// Copy a declared input file into `config/`.
    pub fn keep_copy(&self, file: &Path) -> Result<PathBuf> {
        let name = file
            .file_name()
            .ok_or_else(|| Error::config(format!("{} is not a file", file.display())))?;
        let dest = self.config.join(name);
        fs::copy(file, &dest)
            .map_err(|e| Error::config(format!("cannot copy {}: {}", file.display(), e)))?;
        Ok(dest)
    }
}

/// Replace every `$name` in `template` with the scalar attribute `name` of
/// the given namespaces. Longer names go first so `$timeout` is not read as
/// `$time` followed by `out`.
pub fn substitute(template: &str, spaces: &[&Namespace]) -> String {
    let mut vars: Vec<(&str, String)> = spaces
        .iter()
        .copied()
        .flat_map(|ns| ns.names().filter_map(move |n| ns.get(n).ok().map(|v| (n, v.to_string()))))
        .collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("${}", name), &value);
    }
    out
}

fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    fs::copy(src, dest)?;
    fs::remove_file(src)
}

/// Move `src` into `results`, bzip2-compressed to `<name>.bz2` when
/// `compress` is set. Returns the final path.
pub fn store_output(src: &Path, results: &Path, compress: bool) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| Error::config(format!("{} is not a file", src.display())))?;
    if !compress {
        let dest = results.join(name);
        move_file(src, &dest)?;
        return Ok(dest);
    }

    let mut dest_name = name.to_os_string();
    dest_name.push(".bz2");
    let dest = results.join(dest_name);
    let mut input = File::open(src)?;
    let mut encoder = BzEncoder::new(File::create(&dest)?, Compression::best());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(src)?;
    debug!(from = %src.display(), to = %dest.display(), "output compressed");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::read::BzDecoder;
    use std::io::Read;

    #[test]
    fn longest_placeholder_wins() {
        let mut sys = Namespace::new();
        sys.set("name", "ida");
        sys.set("index", "t3");
        sys.set("time", "12:00");
        let mut main = Namespace::new();
        main.set("timeout", 60i64);
        assert_eq!(
            substitute("$name.$index.$timeout.$time", &[&sys, &main]),
            "ida.t3.60.12:00"
        );
        assert_eq!(substitute("$unknown", &[&sys]), "$unknown");
    }

    #[test]
    fn existing_target_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SolverLayout::create(dir.path(), "ida").unwrap();
        assert!(layout.results.is_dir());
        assert!(layout.config.is_dir());
        assert!(layout.log.is_dir());
        assert_eq!(layout.database, dir.path().join("ida").join("ida.db"));
        assert!(matches!(SolverLayout::create(dir.path(), "ida"), Err(Error::Config(_))));
    }

    #[test]
    fn stores_plain_and_compressed_output() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        fs::create_dir(&results).unwrap();

        let plain = dir.path().join("t1.log");
        fs::write(&plain, "solved\n").unwrap();
        let moved = store_output(&plain, &results, false).unwrap();
        assert!(!plain.exists());
        assert_eq!(fs::read_to_string(moved).unwrap(), "solved\n");

        let packed = dir.path().join("t1.err");
        fs::write(&packed, "warning\n").unwrap();
        let moved = store_output(&packed, &results, true).unwrap();
        assert_eq!(moved, results.join("t1.err.bz2"));
        let mut text = String::new();
        BzDecoder::new(File::open(moved).unwrap()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "warning\n");
    }
}
