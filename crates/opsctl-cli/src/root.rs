use opsctl_core::paths::OPSCTL_DIR;
use std::path::{Path, PathBuf};

/// Resolve the opsctl project root.
///
/// Priority:
/// 1. `--root` flag / `OPSCTL_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.opsctl/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(&cwd)
}

fn resolve_from(start: &Path) -> PathBuf {
    find_upward(start, OPSCTL_DIR)
        .or_else(|| find_upward(start, ".git"))
        .unwrap_or_else(|| start.to_path_buf())
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}
