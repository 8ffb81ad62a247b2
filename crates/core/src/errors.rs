//! Error types for the GitValet core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and the
//! session-level [`SessionError`] unifies them for callers that drive a whole
//! action through the [`Session`](crate::session::Session) façade.
//!
//! The split mirrors §7 of the design: configuration and identity problems
//! are fatal and abort before any repository mutation, while remote
//! conditions (diverged branch, missing remote, bad credentials) are turned
//! into outcome values by the remote synchronizer and never surface here.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// The `[application]` default pointer names an account that does not
    /// exist in any provider table.
    #[error("default account '{provider}/{account}' is not defined in the configuration")]
    DefaultAccountMissing {
        provider: String,
        account: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The named branch is checked out and cannot be deleted.
    #[error("branch '{0}' is currently checked out and cannot be deleted")]
    BranchCheckedOut(String),

    /// A history rewrite was requested on a dirty working tree.
    #[error("working tree at '{0}' has uncommitted changes; commit or discard them first")]
    WorkTreeDirty(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Errors raised by the repository session façade.
///
/// Everything here is fatal for the requested action: the session aborts
/// before staging, committing, or touching the network.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested repository directory does not exist.
    #[error("repository directory does not exist: {0}")]
    InvalidRepoPath(String),

    /// The resolved account's identity disagrees with the repository's
    /// locally configured `user.name` / `user.email`. Committing would
    /// record history under the wrong author, so the session refuses.
    #[error(
        "account identity '{account_name} <{account_email}>' does not match \
         repository identity '{repo_name} <{repo_email}>'"
    )]
    IdentityMismatch {
        account_name: String,
        account_email: String,
        repo_name: String,
        repo_email: String,
    },

    /// The repository has no local `user.name` / `user.email` configured.
    #[error("local git identity is not set ('{0}'); configure user.name and user.email")]
    IdentityUnset(String),

    /// The resolved account's commit-log file does not exist.
    #[error("commit log file not found: {0}")]
    CommitLogMissing(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Git(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Convenience conversions
// ---------------------------------------------------------------------------

// Lets session-level code use `?` directly on git2 calls without spelling
// out the intermediate GitError.
impl From<git2::Error> for SessionError {
    fn from(err: git2::Error) -> Self {
        SessionError::Git(GitError::Git2Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::FileNotFound("/tmp/config.toml".into());
        assert_eq!(
            err.to_string(),
            "configuration file not found: /tmp/config.toml"
        );

        let err = ConfigError::DefaultAccountMissing {
            provider: "github".into(),
            account: "jdoe".into(),
        };
        assert!(err.to_string().contains("github/jdoe"));

        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = SessionError::CommitLogMissing("/tmp/commit_log.txt".into());
        assert!(err.to_string().contains("commit_log.txt"));
    }

    #[test]
    fn test_identity_mismatch_names_both_identities() {
        let err = SessionError::IdentityMismatch {
            account_name: "Esther Arkin".into(),
            account_email: "esther@example.com".into(),
            repo_name: "Someone Else".into(),
            repo_email: "other@example.com".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Esther Arkin"));
        assert!(msg.contains("other@example.com"));
    }

    #[test]
    fn test_session_error_from_subsystem() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let session_err: SessionError = config_err.into();
        assert!(matches!(session_err, SessionError::Config(_)));

        let git_err = GitError::RefNotFound("refs/heads/dev".into());
        let session_err: SessionError = git_err.into();
        assert!(matches!(session_err, SessionError::Git(_)));
    }
}
