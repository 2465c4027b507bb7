//! URL minter
//!
//! Produces a unique public URL for a deployment from the project name and
//! the platform domain, with bounded collision retry and a deterministic
//! fallback.

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::errors::OrchestratorError;
use crate::store::Store;

const SUFFIX_LEN: usize = 5;
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_NAME_LEN: usize = 20;
const MAX_MINT_ATTEMPTS: usize = 5;

/// Sanitize a project name into a hostname label fragment.
///
/// Lowercase, whitespace to `-`, strip anything outside `[a-z0-9-]`,
/// collapse runs of `-`, trim leading/trailing `-`, truncate to 20 chars.
pub fn sanitize_project_name(name: &str) -> String {
    let lowered = name.to_lowercase();

    let mapped: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();

    let mut collapsed = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed
        .trim_matches('-')
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_CHARSET.len());
            SUFFIX_CHARSET[idx] as char
        })
        .collect()
}

/// Mints collision-free public URLs against the active deployment set.
pub struct UrlMinter {
    store: Arc<Store>,
}

impl UrlMinter {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Produce a unique `https://` URL for the deployment.
    ///
    /// Candidates are `<sanitized>-<rand5>.<domain>`; after five collisions
    /// the minter falls back to `deploy-<id>.<domain>`, which is unique by
    /// construction. A colliding fallback is fatal.
    pub async fn mint(
        &self,
        project_name: &str,
        platform_domain: &str,
        deployment_id: &str,
    ) -> Result<String, OrchestratorError> {
        let sanitized = sanitize_project_name(project_name);

        if !sanitized.is_empty() {
            for _ in 0..MAX_MINT_ATTEMPTS {
                let candidate =
                    format!("https://{}-{}.{}", sanitized, random_suffix(), platform_domain);
                if self.store.count_active_by_url(&candidate).await? == 0 {
                    info!("Minted deployment URL {}", candidate);
                    return Ok(candidate);
                }
            }
            warn!(
                "URL minting exhausted {} attempts for project '{}', falling back",
                MAX_MINT_ATTEMPTS, project_name
            );
        }

        let fallback = format!("https://deploy-{}.{}", deployment_id, platform_domain);
        if self.store.count_active_by_url(&fallback).await? > 0 {
            return Err(OrchestratorError::MintError(format!(
                "fallback URL {} is already taken",
                fallback
            )));
        }

        info!("Minted fallback deployment URL {}", fallback);
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_lowercases_and_dashes() {
        assert_eq!(sanitize_project_name("My Cool App"), "my-cool-app");
    }

    #[test]
    fn test_sanitize_strips_disallowed_and_collapses() {
        assert_eq!(sanitize_project_name("a!!b  c__d"), "ab-cd");
        assert_eq!(sanitize_project_name("--weird--name--"), "weird-name");
    }

    #[test]
    fn test_sanitize_truncates_to_twenty() {
        let name = "a".repeat(40);
        assert_eq!(sanitize_project_name(&name).len(), 20);
    }

    #[test]
    fn test_sanitize_single_char_name() {
        assert_eq!(sanitize_project_name("x"), "x");
    }

    #[test]
    fn test_sanitize_only_disallowed_chars_is_empty() {
        assert_eq!(sanitize_project_name("!@#$%^&*"), "");
    }

    #[test]
    fn test_random_suffix_shape() {
        for _ in 0..32 {
            let suffix = random_suffix();
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(suffix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }
}
