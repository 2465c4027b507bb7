//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Maximum length of an error message persisted to a deployment row.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1000;

/// Truncate a string to `max` characters, trimming from the end.
pub fn truncate_end(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_end_short_string() {
        assert_eq!(truncate_end("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_end_long_string() {
        assert_eq!(truncate_end("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_end_multibyte() {
        // Truncation counts characters, not bytes
        assert_eq!(truncate_end("héllo wörld", 5), "héllo");
    }
}
