//! API token discovery.
//!
//! Nothing here runs implicitly: call [`discover_api_key`] once at start-up
//! and hand the result to the conversation or config.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable checked after an explicit token
pub const API_KEY_ENV: &str = "NAI_API_KEY";

/// Token file name looked up in the home and working directories
pub const TOKEN_FILE_NAME: &str = ".naitoken";

/// Resolve a token: explicit value, then `NAI_API_KEY`, then `~/.naitoken`,
/// then `./.naitoken`. Whitespace is trimmed and empty values are skipped.
pub fn discover_api_key(explicit: Option<&str>) -> Option<String> {
    let env_value = std::env::var(API_KEY_ENV).ok();
    let home_file = dirs::home_dir().map(|home| home.join(TOKEN_FILE_NAME));
    let local_file = PathBuf::from(TOKEN_FILE_NAME);

    resolve_api_key(explicit, env_value.as_deref(), home_file.as_deref(), Some(&local_file))
}

/// Same priority order as [`discover_api_key`], with every source injected
pub fn resolve_api_key(
    explicit: Option<&str>,
    env_value: Option<&str>,
    home_file: Option<&Path>,
    local_file: Option<&Path>,
) -> Option<String> {
    if let Some(key) = non_empty(explicit) {
        return Some(key);
    }
    if let Some(key) = non_empty(env_value) {
        debug!(source = API_KEY_ENV, "Using API token from environment");
        return Some(key);
    }

    [home_file, local_file].into_iter().flatten().find_map(|path| {
        let key = non_empty(fs::read_to_string(path).ok().as_deref())?;
        debug!(source = %path.display(), "Using API token from file");
        Some(key)
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
