//! File Discovery (C3, spec §4.1). Turns an input path into a lexicographically
//! ordered list of absolute `.csl` paths. Deliberately does not recurse into
//! subdirectories — multi-directory projects are expected to pass an explicit
//! list of directories, not rely on implicit recursion (kept this way per the
//! determinism invariant: recursion order across platforms/filesystems is not
//! guaranteed, a single flat sort is).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::DiscoverError;

pub const CSL_EXTENSION: &str = "csl";

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn discover(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, DiscoverError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DiscoverError::NotFound { path: path.to_path_buf() }
        } else {
            DiscoverError::Stat { path: path.to_path_buf(), source }
        }
    })?;

    if metadata.is_file() {
        if !has_csl_extension(path) {
            return Err(DiscoverError::NotCsl { path: path.to_path_buf() });
        }
        let absolute = absolutize(path)?;
        debug!(file = %absolute.display(), "discovered single file");
        return Ok(vec![absolute]);
    }

    let entries = fs::read_dir(path)
        .map_err(|source| DiscoverError::ReadDir { path: path.to_path_buf(), source })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DiscoverError::ReadDir { path: path.to_path_buf(), source })?;
        let entry_path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if !file_type.is_file() || !has_csl_extension(&entry_path) {
            continue;
        }
        files.push(absolutize(&entry_path)?);
    }

    files.sort();
    debug!(count = files.len(), "discovered files in directory");
    Ok(files)
}

fn has_csl_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(CSL_EXTENSION))
}

fn absolutize(path: &Path) -> Result<PathBuf, DiscoverError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir()
            .map_err(|source| DiscoverError::Stat { path: path.to_path_buf(), source })?;
        Ok(cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn lexicographic_order_across_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.csl", "a.csl", "m.csl"] {
            let mut f = File::create(dir.path().join(name)).unwrap();
            writeln!(f, "k: \"from-{}\"", name.trim_end_matches(".csl")).unwrap();
        }
        File::create(dir.path().join("ignore.txt")).unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a.csl", "m.csl", "z.csl"]);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn single_file_must_be_csl() {
        let dir = tempfile::tempdir().unwrap();
        let not_csl = dir.path().join("notes.txt");
        File::create(&not_csl).unwrap();
        assert!(matches!(discover(&not_csl), Err(DiscoverError::NotCsl { .. })));
    }

    #[test]
    fn does_not_recurse_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("top.csl")).unwrap();
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();
        File::create(sub.join("nested.csl")).unwrap();

        let files = discover(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name().unwrap(), "top.csl");
    }
}
