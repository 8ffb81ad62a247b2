//! TOML-based configuration system for GitValet.
//!
//! The document maps providers to accounts and names a default account for
//! repositories no account claims. Providers and accounts are arrays of
//! tables rather than maps so the document order survives parsing; the
//! account resolver's first-match-wins rule depends on it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level GitValet configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValetConfig {
    /// Application-wide settings, including the default account pointer.
    pub application: ApplicationConfig,

    /// Providers in document order, each carrying its accounts.
    #[serde(rename = "provider", default)]
    pub providers: Vec<ProviderConfig>,

    /// Optional path-rewrite rules applied when staging a single file.
    #[serde(rename = "rewrite", default)]
    pub rewrites: Vec<RewriteRule>,
}

/// The `[application]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Provider holding the default account.
    pub default_provider: String,

    /// Account id used when no account's `watched_dirs` claims the
    /// repository path.
    pub default_account: String,
}

// ---------------------------------------------------------------------------
// Providers & accounts
// ---------------------------------------------------------------------------

/// One `[[provider]]` table: a hosting service and its accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name, e.g. `github`.
    pub name: String,

    /// Accounts in document order.
    #[serde(rename = "account", default)]
    pub accounts: Vec<Account>,
}

/// One credential/identity entry usable for commits and pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Provider username, e.g. `coolgeek`. Also the username sent with
    /// the push token.
    pub id: String,

    /// Display name recorded as commit author, e.g. `Esther Arkin`.
    pub full_name: String,

    /// Email recorded as commit author.
    pub email: String,

    /// Personal access token for pushes.
    pub token: String,

    /// Plain-text file whose full content becomes the commit message.
    pub commit_log_path: PathBuf,

    /// Repository paths this account claims (exact string match).
    #[serde(default)]
    pub watched_dirs: Vec<String>,

    /// Name of the provider this account belongs to (populated after
    /// parsing, not part of the document).
    #[serde(skip)]
    pub provider: String,
}

// ---------------------------------------------------------------------------
// Path-rewrite rules
// ---------------------------------------------------------------------------

/// One `[[rewrite]]` table: a staging path-rewrite convention.
///
/// When the repository root ends with `repo_suffix` and a single staged
/// file carries `extension`, the relative path is moved under `prefix` if
/// the rewritten file exists there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    /// Trailing path components identifying the repository, e.g.
    /// `statiq/note`.
    pub repo_suffix: String,

    /// File extension (without dot) the rule applies to, e.g. `md`.
    pub extension: String,

    /// Subtree the relative path is moved under, e.g. `input/posts`.
    pub prefix: String,
}

// ---------------------------------------------------------------------------
// Loading & validating
// ---------------------------------------------------------------------------

impl ValetConfig {
    /// Load a [`ValetConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse a [`ValetConfig`] from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: ValetConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.link_providers();
        debug!(
            providers = config.providers.len(),
            rewrites = config.rewrites.len(),
            "configuration parsed"
        );
        Ok(config)
    }

    /// Validate that all required fields are present and the default
    /// account pointer resolves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "provider.name".into(),
                    detail: "provider name must not be empty".into(),
                });
            }
            for account in &provider.accounts {
                if account.id.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("provider.{}.account.id", provider.name),
                        detail: "account id must not be empty".into(),
                    });
                }
                if account.full_name.is_empty() || account.email.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("account.{}", account.id),
                        detail: "full_name and email must not be empty".into(),
                    });
                }
            }
        }

        for rule in &self.rewrites {
            if rule.repo_suffix.is_empty() || rule.prefix.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "rewrite".into(),
                    detail: "repo_suffix and prefix must not be empty".into(),
                });
            }
        }

        if self.default_account().is_none() {
            return Err(ConfigError::DefaultAccountMissing {
                provider: self.application.default_provider.clone(),
                account: self.application.default_account.clone(),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// The account named by the `[application]` default pointer, if it
    /// resolves.
    pub fn default_account(&self) -> Option<&Account> {
        self.find_account(
            &self.application.default_provider,
            &self.application.default_account,
        )
    }

    /// Look up an account by provider name and account id.
    pub fn find_account(&self, provider: &str, id: &str) -> Option<&Account> {
        self.providers
            .iter()
            .find(|p| p.name == provider)
            .and_then(|p| p.accounts.iter().find(|a| a.id == id))
    }

    /// Stamp each account with the name of its enclosing provider.
    fn link_providers(&mut self) {
        for provider in &mut self.providers {
            for account in &mut provider.accounts {
                account.provider = provider.name.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[application]
default_provider = "github"
default_account = "coolgeek"

[[provider]]
name = "github"

[[provider.account]]
id = "coolgeek"
full_name = "Esther Arkin"
email = "esther@example.com"
token = "ghp_default"
commit_log_path = "/home/esther/commit_log.txt"
watched_dirs = []

[[provider.account]]
id = "worklogin"
full_name = "Esther Arkin"
email = "esther.arkin@corp.example.com"
token = "ghp_work"
commit_log_path = "/home/esther/work_commit_log.txt"
watched_dirs = ["/home/esther/src/widget", "/home/esther/src/gadget"]

[[provider]]
name = "gitlab"

[[provider.account]]
id = "esther"
full_name = "Esther Arkin"
email = "esther@gitlab.example.com"
token = "glpat_xyz"
commit_log_path = "/home/esther/commit_log.txt"
watched_dirs = ["/home/esther/src/widget"]

[[rewrite]]
repo_suffix = "statiq/note"
extension = "md"
prefix = "input/posts"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = ValetConfig::from_toml_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.application.default_provider, "github");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].accounts.len(), 2);
        assert_eq!(config.providers[0].accounts[1].id, "worklogin");
        assert_eq!(config.rewrites.len(), 1);
        assert_eq!(config.rewrites[0].prefix, "input/posts");
    }

    #[test]
    fn test_document_order_is_preserved() {
        let config = ValetConfig::from_toml_str(sample_toml()).unwrap();
        let ids: Vec<&str> = config
            .providers
            .iter()
            .flat_map(|p| p.accounts.iter().map(|a| a.id.as_str()))
            .collect();
        assert_eq!(ids, vec!["coolgeek", "worklogin", "esther"]);
    }

    #[test]
    fn test_accounts_are_stamped_with_provider() {
        let config = ValetConfig::from_toml_str(sample_toml()).unwrap();
        assert_eq!(config.providers[0].accounts[0].provider, "github");
        assert_eq!(config.providers[1].accounts[0].provider, "gitlab");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = ValetConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.application.default_account, "coolgeek");
    }

    #[test]
    fn test_file_not_found() {
        let result = ValetConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_ok() {
        let config = ValetConfig::from_toml_str(sample_toml()).unwrap();
        config.validate().expect("sample config should validate");
    }

    #[test]
    fn test_validate_rejects_unresolvable_default() {
        let mut config = ValetConfig::from_toml_str(sample_toml()).unwrap();
        config.application.default_account = "nobody".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::DefaultAccountMissing { ref account, .. }) if account == "nobody"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_identity() {
        let mut config = ValetConfig::from_toml_str(sample_toml()).unwrap();
        config.providers[0].accounts[0].full_name = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_default_account_lookup() {
        let config = ValetConfig::from_toml_str(sample_toml()).unwrap();
        let account = config.default_account().expect("default should resolve");
        assert_eq!(account.id, "coolgeek");
        assert_eq!(account.provider, "github");
    }

    #[test]
    fn test_watched_dirs_default_to_empty() {
        let minimal = r#"
[application]
default_provider = "github"
default_account = "a"

[[provider]]
name = "github"

[[provider.account]]
id = "a"
full_name = "A"
email = "a@example.com"
token = "t"
commit_log_path = "/tmp/log.txt"
"#;
        let config = ValetConfig::from_toml_str(minimal).unwrap();
        assert!(config.providers[0].accounts[0].watched_dirs.is_empty());
        assert!(config.rewrites.is_empty());
    }
}
