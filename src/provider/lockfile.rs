//! Lockfile Resolver (C8, spec §4.7). Maps a provider type name to a
//! checksum-verified absolute binary path. A missing or malformed checksum
//! field is a fatal error, never a silent skip — the lockfile exists
//! specifically so provider binaries can't be swapped out from under a
//! build.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::LockfileError;

const CHECKSUM_PREFIX: &str = "sha256:";

#[derive(Debug, Deserialize)]
struct LockfileEntry {
    #[allow(dead_code)]
    alias: Option<String>,
    #[serde(rename = "type")]
    type_name: String,
    #[allow(dead_code)]
    version: Option<String>,
    os: Option<String>,
    arch: Option<String>,
    path: PathBuf,
    checksum: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LockfileDocument {
    #[serde(default)]
    providers: Vec<LockfileEntry>,
}

/// A loaded, unverified lockfile. Checksum verification happens lazily in
/// [`Lockfile::resolve_binary`], once per requested provider type, so a
/// lockfile with many entries doesn't pay hashing cost for unused ones.
///
/// The `providers` array may carry several entries for the same type (one
/// per os/arch combination, spec §6); `resolve_binary` picks the entry
/// matching the platform this process is running on.
pub struct Lockfile {
    base_dir: PathBuf,
    entries: Vec<LockfileEntry>,
}

impl Lockfile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LockfileError> {
        let path = path.as_ref();
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let text = std::fs::read_to_string(path).map_err(|_| LockfileError::Missing { path: path.to_path_buf() })?;
        let doc: LockfileDocument =
            serde_json::from_str(&text).map_err(|source| LockfileError::Parse { path: path.to_path_buf(), source })?;
        Ok(Self { base_dir, entries: doc.providers })
    }

    /// Resolves `provider_type` to an absolute, checksum-verified binary
    /// path. Relative `path` entries in the lockfile are resolved against
    /// the lockfile's own directory. When several entries declare the same
    /// type for different platforms, the one matching
    /// [`std::env::consts::OS`]/[`std::env::consts::ARCH`] wins; an entry
    /// with no `os`/`arch` field at all matches any platform.
    pub fn resolve_binary(&self, provider_type: &str) -> Result<PathBuf, LockfileError> {
        let matches_platform = |entry: &&LockfileEntry| {
            entry.os.as_deref().map_or(true, |os| os == std::env::consts::OS)
                && entry.arch.as_deref().map_or(true, |arch| arch == std::env::consts::ARCH)
        };
        let entry = self
            .entries
            .iter()
            .filter(|e| e.type_name == provider_type)
            .find(matches_platform)
            .ok_or_else(|| LockfileError::EntryNotFound { type_name: provider_type.to_string() })?;

        let checksum_field = entry
            .checksum
            .as_ref()
            .ok_or_else(|| LockfileError::ChecksumMissing { type_name: provider_type.to_string() })?;

        let expected_hex = checksum_field.strip_prefix(CHECKSUM_PREFIX).ok_or_else(|| {
            LockfileError::ChecksumMalformed { type_name: provider_type.to_string(), value: checksum_field.clone() }
        })?;
        if expected_hex.len() != 64 || !expected_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LockfileError::ChecksumMalformed {
                type_name: provider_type.to_string(),
                value: checksum_field.clone(),
            });
        }

        let binary_path = if entry.path.is_absolute() { entry.path.clone() } else { self.base_dir.join(&entry.path) };

        let bytes = std::fs::read(&binary_path).map_err(|_| LockfileError::BinaryMissing {
            type_name: provider_type.to_string(),
            path: binary_path.clone(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let found_hex = hex::encode(hasher.finalize());

        if !found_hex.eq_ignore_ascii_case(expected_hex) {
            return Err(LockfileError::ChecksumMismatch {
                type_name: provider_type.to_string(),
                path: binary_path,
                expected: expected_hex.to_string(),
                found: found_hex,
            });
        }

        Ok(binary_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_binary(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn resolves_with_matching_checksum() {
        let dir = tempfile::tempdir().unwrap();
        write_binary(dir.path(), "my-provider", b"hello provider");
        let mut hasher = Sha256::new();
        hasher.update(b"hello provider");
        let checksum = format!("sha256:{}", hex::encode(hasher.finalize()));

        let lockfile_path = dir.path().join("nomos.lock.json");
        std::fs::write(
            &lockfile_path,
            format!(
                r#"{{"providers":[{{"alias":"cfg","type":"http","version":"1.0.0","path":"my-provider","checksum":"{checksum}"}}]}}"#
            ),
        )
        .unwrap();

        let lockfile = Lockfile::load(&lockfile_path).unwrap();
        let resolved = lockfile.resolve_binary("http").unwrap();
        assert_eq!(resolved, dir.path().join("my-provider"));
    }

    #[test]
    fn picks_entry_matching_current_platform() {
        let dir = tempfile::tempdir().unwrap();
        write_binary(dir.path(), "my-provider", b"hello provider");
        let mut hasher = Sha256::new();
        hasher.update(b"hello provider");
        let checksum = format!("sha256:{}", hex::encode(hasher.finalize()));

        let lockfile_path = dir.path().join("nomos.lock.json");
        std::fs::write(
            &lockfile_path,
            format!(
                r#"{{"providers":[
                    {{"type":"http","os":"not-a-real-os","arch":"not-a-real-arch","path":"wrong-binary","checksum":"{checksum}"}},
                    {{"type":"http","os":"{os}","arch":"{arch}","path":"my-provider","checksum":"{checksum}"}}
                ]}}"#,
                os = std::env::consts::OS,
                arch = std::env::consts::ARCH,
            ),
        )
        .unwrap();

        let lockfile = Lockfile::load(&lockfile_path).unwrap();
        let resolved = lockfile.resolve_binary("http").unwrap();
        assert_eq!(resolved, dir.path().join("my-provider"));
    }

    #[test]
    fn rejects_mismatched_checksum() {
        let dir = tempfile::tempdir().unwrap();
        write_binary(dir.path(), "my-provider", b"hello provider");
        let lockfile_path = dir.path().join("nomos.lock.json");
        std::fs::write(
            &lockfile_path,
            r#"{"providers":[{"type":"http","path":"my-provider","checksum":"sha256:0000000000000000000000000000000000000000000000000000000000000000"}]}"#,
        )
        .unwrap();

        let lockfile = Lockfile::load(&lockfile_path).unwrap();
        let err = lockfile.resolve_binary("http").unwrap_err();
        assert!(matches!(err, LockfileError::ChecksumMalformed { .. } | LockfileError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_checksum_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_binary(dir.path(), "my-provider", b"x");
        let lockfile_path = dir.path().join("nomos.lock.json");
        std::fs::write(&lockfile_path, r#"{"providers":[{"type":"http","path":"my-provider"}]}"#).unwrap();

        let lockfile = Lockfile::load(&lockfile_path).unwrap();
        let err = lockfile.resolve_binary("http").unwrap_err();
        assert!(matches!(err, LockfileError::ChecksumMissing { .. }));
    }

    #[test]
    fn unknown_type_errors() {
        let dir = tempfile::tempdir().unwrap();
        let lockfile_path = dir.path().join("nomos.lock.json");
        std::fs::write(&lockfile_path, r#"{"providers":[]}"#).unwrap();
        let lockfile = Lockfile::load(&lockfile_path).unwrap();
        assert!(matches!(lockfile.resolve_binary("missing"), Err(LockfileError::EntryNotFound { .. })));
    }
}
