//! Scratch-directory helpers for exercising the compile pipeline without
//! hand-managing temp files in every test (`project-util` feature, mirrors
//! the teacher's own fixture-building helpers).

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway directory of `.csl` files, cleaned up on drop.
pub struct ScratchProject {
    dir: TempDir,
}

impl ScratchProject {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self { dir: tempfile::tempdir()? })
    }

    /// Writes `contents` to `name` inside the scratch directory, creating
    /// parent directories as needed, and returns the written path.
    pub fn write_file(&self, name: impl AsRef<Path>, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for ScratchProject {
    fn default() -> Self {
        Self::new().expect("failed to create scratch directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_file_under_root() {
        let project = ScratchProject::new().unwrap();
        let path = project.write_file("nested/app.csl", "name: \"x\"\n").unwrap();
        assert!(path.starts_with(project.root()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name: \"x\"\n");
    }
}
