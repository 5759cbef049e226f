use std::path::{Path, PathBuf};

use door_core::paths::DOOR_DIR;

/// Resolve the scanner root directory.
///
/// Priority:
/// 1. `--root` flag / `DOOR_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.door/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_door_root(&cwd).unwrap_or(cwd)
}

fn find_door_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DOOR_DIR).is_dir())
        .map(Path::to_path_buf)
}
