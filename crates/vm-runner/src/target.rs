//! Target discovery and selection.
//!
//! A target is a subdirectory of the VM root that contains the marker file
//! (a `Vagrantfile` by default). Its name is the directory name.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::VmError;

/// One isolated test target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: String,
    pub dir: PathBuf,
}

/// Find all targets under `root`, sorted by name.
pub fn discover_targets(root: &Path, marker_file: &str) -> Result<Vec<Target>, VmError> {
    let discovery_err = |source| VmError::Discovery {
        path: root.to_path_buf(),
        source,
    };

    let mut targets = Vec::new();
    for entry in fs::read_dir(root).map_err(discovery_err)? {
        let entry = entry.map_err(discovery_err)?;
        let dir = entry.path();
        if !dir.join(marker_file).is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        debug!(target_name = %name, "discovered target");
        targets.push(Target { name, dir });
    }
    targets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(targets)
}

/// Narrow `targets` to the `selected` names.
///
/// An empty selection keeps every target. Returns the kept targets and the
/// selected names that matched nothing.
pub fn select_targets(targets: Vec<Target>, selected: &[String]) -> (Vec<Target>, Vec<String>) {
    if selected.is_empty() {
        return (targets, Vec::new());
    }
    let unknown = selected
        .iter()
        .filter(|name| !targets.iter().any(|t| &t.name == *name))
        .cloned()
        .collect();
    let kept = targets
        .into_iter()
        .filter(|t| selected.contains(&t.name))
        .collect();
    (kept, unknown)
}
