//! Locating cel-go sources in the Go module cache
//!
//! The cel-go version is whatever the `go.mod` passed on the command line
//! pins, so regenerating after a dependency bump picks up the new tests.

use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const CEL_GO_MODULE: &str = "github.com/google/cel-go";

/// A file read from the pinned cel-go module
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFile {
    /// `github.com/google/cel-go@<version>/<path>`
    pub provenance: String,
    pub text: String,
}

/// Read `file` (relative to the module root) from the cel-go version
/// pinned in `go_mod`
pub fn read_cel_go_file(go_mod: &Path, file: &str) -> Result<UpstreamFile> {
    let cache = module_cache().ok_or_else(|| {
        Error::Upstream("cannot resolve go module cache, GOPATH and GOMODCACHE empty".into())
    })?;
    read_from_cache(&cache, go_mod, file)
}

pub fn read_from_cache(cache: &Path, go_mod: &Path, file: &str) -> Result<UpstreamFile> {
    let go_mod_text = std::fs::read_to_string(go_mod)
        .map_err(|e| Error::Upstream(format!("failed to read go.mod: {}", e)))?;
    let version = pinned_version(&go_mod_text)?;

    let module = format!("{}@{}", CEL_GO_MODULE, version);
    let module_dir = cache.join(&module);
    if let Err(e) = std::fs::metadata(&module_dir) {
        return Err(Error::Upstream(format!(
            "cannot resolve {} in go module cache: {}",
            module_dir.display(),
            e
        )));
    }
    let text = std::fs::read_to_string(module_dir.join(file)).map_err(|e| {
        Error::Upstream(format!(
            "cannot read {} in {}: {}",
            file,
            module_dir.display(),
            e
        ))
    })?;
    tracing::info!(module = %module, file, "read upstream source");
    Ok(UpstreamFile {
        provenance: format!("{}/{}", module, file),
        text,
    })
}

/// Version following the first mention of the cel-go module
pub fn pinned_version(go_mod: &str) -> Result<String> {
    let start = go_mod
        .find(CEL_GO_MODULE)
        .ok_or_else(|| Error::Upstream(format!("{} not in go.mod", CEL_GO_MODULE)))?;
    let rest = go_mod
        .get(start + CEL_GO_MODULE.len() + 1..)
        .unwrap_or_default();
    let line = rest
        .find('\n')
        .map(|end| &rest[..end])
        .ok_or_else(|| Error::Upstream("unexpected go.mod structure".into()))?;
    line.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::Upstream("unexpected go.mod structure".into()))
}

/// `GOMODCACHE`, else `$GOPATH/pkg/mod`, else whatever `go env` reports
pub fn module_cache() -> Option<PathBuf> {
    if let Some(cache) = env::var_os("GOMODCACHE").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(cache));
    }
    if let Some(gopath) = env::var_os("GOPATH").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(gopath).join("pkg/mod"));
    }
    let output = Command::new("go").args(["env", "GOMODCACHE"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let cache = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!cache.is_empty()).then(|| PathBuf::from(cache))
}
