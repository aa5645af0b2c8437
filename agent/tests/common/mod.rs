use std::path::PathBuf;

use anyhow::Context;

pub mod run;

/// Creates a fresh working directory for the test `name`, under the system temp directory.
///
/// Leftovers of a previous run are removed first.
pub fn empty_temp_dir(name: &str) -> anyhow::Result<PathBuf> {
    let dir = std::env::temp_dir().join("tributary-agent-tests").join(name);
    if dir.exists() {
        std::fs::remove_dir_all(&dir).with_context(|| format!("could not clear {}", dir.display()))?;
    }
    std::fs::create_dir_all(&dir).with_context(|| format!("could not create {}", dir.display()))?;
    Ok(dir)
}
