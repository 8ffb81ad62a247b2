//! Directory-keyed account resolution.
//!
//! A repository path is matched against every account's `watched_dirs` to
//! decide which identity and token drive the session. The resolver is a
//! plain function over the configuration so the selection policy stays
//! independently testable, with no hidden "current user" state.

use tracing::{debug, info, warn};

use crate::config::{Account, ValetConfig};
use crate::errors::{ConfigError, SessionError};

/// Resolve the account responsible for `repo_path`.
///
/// Lookup order:
/// 1. Providers, then accounts within each provider, in document order;
///    the first account whose `watched_dirs` contains `repo_path` wins.
///    Matching is an exact string comparison, not path normalization.
/// 2. The `[application]` default account when no account claims the path.
///
/// Several accounts may legally claim the same directory; the first in
/// document order wins, and every claimant is named in a warning so the
/// ambiguity is visible rather than silently resolved.
pub fn resolve_account<'a>(
    config: &'a ValetConfig,
    repo_path: &str,
) -> Result<&'a Account, ConfigError> {
    let claimants: Vec<&Account> = config
        .providers
        .iter()
        .flat_map(|p| p.accounts.iter())
        .filter(|a| a.watched_dirs.iter().any(|d| d == repo_path))
        .collect();

    if claimants.len() > 1 {
        let names: Vec<String> = claimants
            .iter()
            .map(|a| format!("{}/{}", a.provider, a.id))
            .collect();
        warn!(
            repo_path,
            claimants = %names.join(", "),
            "multiple accounts watch this directory; using the first in document order"
        );
    }

    if let Some(account) = claimants.first().copied() {
        info!(
            repo_path,
            provider = %account.provider,
            account = %account.id,
            "using watched-directory account"
        );
        return Ok(account);
    }

    let default = config
        .default_account()
        .ok_or_else(|| ConfigError::DefaultAccountMissing {
            provider: config.application.default_provider.clone(),
            account: config.application.default_account.clone(),
        })?;
    debug!(
        repo_path,
        provider = %default.provider,
        account = %default.id,
        "no account watches this directory; using default account"
    );
    Ok(default)
}

/// Check the resolved account against the repository's local identity.
///
/// A mismatch means commits would be recorded under a different author
/// than the account about to push them, so the session must stop before
/// any mutation.
pub fn verify_identity(
    account: &Account,
    repo_name: &str,
    repo_email: &str,
) -> Result<(), SessionError> {
    if account.full_name != repo_name || account.email != repo_email {
        return Err(SessionError::IdentityMismatch {
            account_name: account.full_name.clone(),
            account_email: account.email.clone(),
            repo_name: repo_name.to_string(),
            repo_email: repo_email.to_string(),
        });
    }
    debug!(account = %account.id, "repository identity matches resolved account");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValetConfig;

    fn two_account_config() -> ValetConfig {
        ValetConfig::from_toml_str(
            r#"
[application]
default_provider = "github"
default_account = "a0"

[[provider]]
name = "github"

[[provider.account]]
id = "a0"
full_name = "Default User"
email = "default@example.com"
token = "t0"
commit_log_path = "/tmp/log0.txt"

[[provider.account]]
id = "a1"
full_name = "Watched User"
email = "watched@example.com"
token = "t1"
commit_log_path = "/tmp/log1.txt"
watched_dirs = ["/repo/x"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_watched_dir_resolves_watching_account() {
        let config = two_account_config();
        let account = resolve_account(&config, "/repo/x").unwrap();
        assert_eq!(account.id, "a1");
    }

    #[test]
    fn test_unwatched_dir_falls_back_to_default() {
        let config = two_account_config();
        let account = resolve_account(&config, "/repo/y").unwrap();
        assert_eq!(account.id, "a0");
    }

    #[test]
    fn test_match_is_exact_not_normalized() {
        let config = two_account_config();
        // A trailing slash is a different string, so it misses the claim.
        let account = resolve_account(&config, "/repo/x/").unwrap();
        assert_eq!(account.id, "a0");
    }

    // Duplicate claims are legal; the first account in document order wins.
    #[test]
    fn test_duplicate_claim_first_in_document_order_wins() {
        let config = ValetConfig::from_toml_str(
            r#"
[application]
default_provider = "github"
default_account = "first"

[[provider]]
name = "github"

[[provider.account]]
id = "first"
full_name = "First"
email = "first@example.com"
token = "t"
commit_log_path = "/tmp/l.txt"
watched_dirs = ["/repo/shared"]

[[provider]]
name = "gitlab"

[[provider.account]]
id = "second"
full_name = "Second"
email = "second@example.com"
token = "t"
commit_log_path = "/tmp/l.txt"
watched_dirs = ["/repo/shared"]
"#,
        )
        .unwrap();

        let account = resolve_account(&config, "/repo/shared").unwrap();
        assert_eq!(account.id, "first");
        assert_eq!(account.provider, "github");
    }

    #[test]
    fn test_unresolvable_default_is_an_error() {
        let mut config = two_account_config();
        config.application.default_account = "missing".into();
        let result = resolve_account(&config, "/repo/y");
        assert!(matches!(
            result,
            Err(ConfigError::DefaultAccountMissing { .. })
        ));
    }

    #[test]
    fn test_verify_identity_match() {
        let config = two_account_config();
        let account = resolve_account(&config, "/repo/x").unwrap();
        verify_identity(account, "Watched User", "watched@example.com").unwrap();
    }

    #[test]
    fn test_verify_identity_mismatch() {
        let config = two_account_config();
        let account = resolve_account(&config, "/repo/x").unwrap();
        let result = verify_identity(account, "Impostor", "watched@example.com");
        assert!(matches!(result, Err(SessionError::IdentityMismatch { .. })));
    }
}
