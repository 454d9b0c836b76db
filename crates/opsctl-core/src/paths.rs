use crate::error::{OpsError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const OPSCTL_DIR: &str = ".opsctl";
pub const CONFIG_FILE: &str = ".opsctl/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve an executable reference against the project root.
///
/// Absolute paths and bare command names (no path separator) are returned
/// unchanged; relative paths are joined onto `root`.
pub fn resolve_executable(root: &Path, executable: &str) -> PathBuf {
    let p = Path::new(executable);
    if p.is_absolute() || !executable.contains('/') {
        return p.to_path_buf();
    }
    root.join(p)
}

// ---------------------------------------------------------------------------
// Action id validation
// ---------------------------------------------------------------------------

static ACTION_ID_RE: OnceLock<Regex> = OnceLock::new();

fn action_id_re() -> &'static Regex {
    ACTION_ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_action_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !action_id_re().is_match(id) {
        return Err(OpsError::InvalidActionId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
