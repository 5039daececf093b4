//! Cross-platform path helpers: `~` expansion and the default data
//! directory the daemon and CLI agree on absent explicit configuration.

use std::env;
use std::path::{Path, PathBuf};

/// Expands a leading `~` (or `~/...`) to the user's home directory.
/// Paths without a leading `~` are returned unchanged.
pub fn expand_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(stripped)
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

/// Default root for all persisted node state (`capsule.db`, `qvl.db`,
/// `identity.key`, the control socket) absent an explicit `data_dir`.
pub fn default_data_dir() -> PathBuf {
    expand_path("~/.capsule")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_tilde_prefixed_path() {
        env::set_var("HOME", "/home/tester");
        let expanded = expand_path("~/.capsule/identity.key");
        assert_eq!(expanded, PathBuf::from("/home/tester/.capsule/identity.key"));
    }

    #[test]
    fn leaves_absolute_path_unchanged() {
        let expanded = expand_path("/var/lib/capsule");
        assert_eq!(expanded, PathBuf::from("/var/lib/capsule"));
    }
}
