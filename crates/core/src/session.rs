//! Repository session façade.
//!
//! One session drives one requested action through the pipeline
//! `Opened → Staging → Committing → Syncing → Closed`, owning the
//! `git2::Repository` handle. Account resolution and the identity check
//! happen at open time, so a misconfigured identity can never reach a
//! staging, commit, or push call.

use std::path::{Path, PathBuf};

use git2::{BranchType, Repository, Status};
use tracing::{debug, info};

use crate::accounts::{resolve_account, verify_identity};
use crate::commit::{head_commit, maybe_commit, CommitMessage, CommitOutcome};
use crate::config::{Account, RewriteRule, ValetConfig};
use crate::errors::{GitError, SessionError};
use crate::remote::{self, PullOutcome, PushOutcome, RemoteTip};
use crate::rewrite;
use crate::stage::{stage, status_options, StageRequest};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Where the session is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    Staging,
    Committing,
    Syncing,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Staging => write!(f, "staging"),
            Self::Committing => write!(f, "committing"),
            Self::Syncing => write!(f, "syncing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Immutable snapshot of the repository taken at session start.
#[derive(Debug, Clone)]
pub struct RepoContext {
    /// Repository path exactly as requested (used for `watched_dirs`
    /// matching, which is a string comparison).
    pub path: PathBuf,
    pub current_branch: String,
    pub local_user_name: String,
    pub local_user_email: String,
}

/// Identity and tip report for `info`.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub repo_path: String,
    pub branch: String,
    pub short_sha: Option<String>,
    pub tip_summary: Option<String>,
    pub tip_time: Option<i64>,
    pub user_name: String,
    pub user_email: String,
    pub provider: String,
    pub account_id: String,
}

/// One working-tree status entry.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: String,
    pub state: String,
    pub staged: bool,
}

/// Everything `status` shows.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub info: RepoInfo,
    pub entries: Vec<StatusEntry>,
    /// First line of the pending commit message, when the commit-log file
    /// exists.
    pub message_preview: Option<String>,
}

/// What a push action did at each step.
#[derive(Debug, Clone)]
pub struct PushReport {
    pub staged: bool,
    pub commit: CommitOutcome,
    /// `None` when the push was short-circuited because the remote already
    /// has the local tip.
    pub push: Option<PushOutcome>,
    /// Remote branch tips, listed when an unpushed earlier commit was
    /// detected.
    pub remote_tips: Vec<RemoteTip>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single-action session over one repository.
pub struct Session {
    repo: Repository,
    account: Account,
    context: RepoContext,
    rewrites: Vec<RewriteRule>,
    state: SessionState,
}

impl Session {
    /// Open the repository, resolve the responsible account, and verify
    /// its identity against the repository's local configuration.
    pub fn open(repo_dir: &Path, config: &ValetConfig) -> Result<Self, SessionError> {
        if !repo_dir.exists() {
            return Err(SessionError::InvalidRepoPath(
                repo_dir.display().to_string(),
            ));
        }
        let repo = Repository::open(repo_dir)
            .map_err(|_| GitError::RepositoryNotFound(repo_dir.display().to_string()))?;
        let context = read_context(&repo, repo_dir)?;
        let account = resolve_account(config, &context.path.display().to_string())?.clone();
        verify_identity(&account, &context.local_user_name, &context.local_user_email)?;
        info!(
            repo = %context.path.display(),
            branch = %context.current_branch,
            provider = %account.provider,
            account = %account.id,
            "session opened"
        );
        Ok(Self {
            repo,
            account,
            context,
            rewrites: config.rewrites.clone(),
            state: SessionState::Opened,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn context(&self) -> &RepoContext {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read-only identity/branch/tip report.
    pub fn info(&self) -> Result<RepoInfo, SessionError> {
        let tip = head_commit(&self.repo)?;
        Ok(RepoInfo {
            repo_path: self.context.path.display().to_string(),
            branch: self.context.current_branch.clone(),
            short_sha: tip.as_ref().map(|c| c.id().to_string()[..9].to_string()),
            tip_summary: tip.as_ref().and_then(|c| c.summary().map(|s| s.to_string())),
            tip_time: tip.as_ref().map(|c| c.time().seconds()),
            user_name: self.context.local_user_name.clone(),
            user_email: self.context.local_user_email.clone(),
            provider: self.account.provider.clone(),
            account_id: self.account.id.clone(),
        })
    }

    /// Working-tree status plus the pending commit-message preview.
    pub fn status(&self) -> Result<StatusReport, SessionError> {
        let info = self.info()?;
        let statuses = self.repo.statuses(Some(&mut status_options()))?;
        let mut entries = Vec::new();
        for entry in statuses.iter() {
            let path = match entry.path() {
                Some(p) => p.to_string(),
                None => continue,
            };
            entries.push(StatusEntry {
                path,
                state: state_label(entry.status()),
                staged: entry.status().intersects(
                    Status::INDEX_NEW
                        | Status::INDEX_MODIFIED
                        | Status::INDEX_DELETED
                        | Status::INDEX_RENAMED
                        | Status::INDEX_TYPECHANGE,
                ),
            });
        }
        let message_preview = CommitMessage::load(&self.account.commit_log_path)
            .ok()
            .map(|m| m.summary().to_string());
        Ok(StatusReport {
            info,
            entries,
            message_preview,
        })
    }

    /// Stage → maybe commit → push.
    pub fn push(&mut self, request: &StageRequest, amend: bool) -> Result<PushReport, SessionError> {
        self.set_state(SessionState::Staging);
        let staged = stage(&self.repo, request, &self.rewrites)?;

        self.set_state(SessionState::Committing);
        let commit = maybe_commit(&self.repo, &self.account, staged, amend)?;

        let mut remote_tips = Vec::new();
        if let CommitOutcome::EmptyCommitAvoided { remote_in_sync } = commit {
            if remote_in_sync {
                info!("local tip already on remote; skipping push");
                self.set_state(SessionState::Closed);
                return Ok(PushReport {
                    staged,
                    commit,
                    push: None,
                    remote_tips,
                });
            }
            // An earlier commit was never pushed; show where the remotes
            // stand before pushing it now.
            remote_tips = remote::remote_branch_tips(&self.repo)?;
        }

        self.set_state(SessionState::Syncing);
        // An amended tip always diverges from the remote, so amend implies
        // a forced push.
        let outcome = remote::push(&self.repo, &self.account, amend)?;
        self.set_state(SessionState::Closed);
        Ok(PushReport {
            staged,
            commit,
            push: Some(outcome),
            remote_tips,
        })
    }

    /// Fetch and merge from `origin`, or from `upstream` in the fork
    /// workflow.
    pub fn pull(&mut self, use_upstream: bool) -> Result<PullOutcome, SessionError> {
        self.set_state(SessionState::Syncing);
        let outcome = remote::pull(&self.repo, &self.account, use_upstream)?;
        self.set_state(SessionState::Closed);
        Ok(outcome)
    }

    /// Set or create the `origin` (or `upstream`) remote URL. Idempotent.
    pub fn set_remote_url(&mut self, url: &str, upstream: bool) -> Result<(), SessionError> {
        let name = if upstream {
            remote::UPSTREAM_REMOTE
        } else {
            remote::ORIGIN_REMOTE
        };
        match self.repo.find_remote(name) {
            Ok(_) => {
                self.repo.remote_set_url(name, url)?;
                info!(remote = name, url, "updated remote url");
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                self.repo.remote(name, url)?;
                info!(remote = name, url, "created remote");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Delete a local branch and its counterpart on `origin`.
    pub fn delete_branch(&mut self, name: &str) -> Result<PushOutcome, SessionError> {
        if name == self.context.current_branch {
            return Err(GitError::BranchCheckedOut(name.to_string()).into());
        }
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| GitError::RefNotFound(format!("refs/heads/{}", name)))?;
        branch.delete()?;
        drop(branch);
        info!(name, "deleted local branch");

        self.set_state(SessionState::Syncing);
        let outcome = remote::push_delete(&self.repo, &self.account, name)?;
        self.set_state(SessionState::Closed);
        Ok(outcome)
    }

    /// Rename the current branch locally, retire the old name on `origin`,
    /// and publish the new one.
    pub fn rename_branch(&mut self, new_name: &str) -> Result<PushOutcome, SessionError> {
        let old_name = self.context.current_branch.clone();
        let mut branch = self
            .repo
            .find_branch(&old_name, BranchType::Local)
            .map_err(|_| GitError::RefNotFound(format!("refs/heads/{}", old_name)))?;
        branch.rename(new_name, false)?;
        drop(branch);
        self.repo.set_head(&format!("refs/heads/{}", new_name))?;
        self.context.current_branch = new_name.to_string();
        info!(from = %old_name, to = new_name, "renamed local branch");

        self.set_state(SessionState::Syncing);
        let delete_outcome = remote::push_delete(&self.repo, &self.account, &old_name)?;
        if !matches!(
            delete_outcome,
            PushOutcome::Pushed | PushOutcome::RemoteMissing
        ) {
            debug!(?delete_outcome, "old remote branch not removed");
        }
        let outcome = remote::push(&self.repo, &self.account, false)?;
        self.set_state(SessionState::Closed);
        Ok(outcome)
    }

    /// Re-author history recorded under a different identity.
    pub fn rewrite_author(&mut self, name: &str, email: &str) -> Result<usize, SessionError> {
        Ok(rewrite::rewrite_author(&self.repo, name, email)?)
    }

    fn set_state(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

/// Create a new non-bare repository at `path`.
///
/// Used by the CLI when the user confirms initializing a directory that is
/// not yet a repository.
pub fn init_repository(path: &Path) -> Result<(), GitError> {
    Repository::init(path)?;
    info!(path = %path.display(), "initialized new repository");
    Ok(())
}

fn read_context(repo: &Repository, repo_dir: &Path) -> Result<RepoContext, SessionError> {
    let config = repo.config().map_err(GitError::Git2Error)?;
    let local_user_name = config
        .get_string("user.name")
        .map_err(|_| SessionError::IdentityUnset("user.name".into()))?;
    let local_user_email = config
        .get_string("user.email")
        .map_err(|_| SessionError::IdentityUnset("user.email".into()))?;
    let current_branch = remote::current_branch(repo)?;
    Ok(RepoContext {
        path: repo_dir.to_path_buf(),
        current_branch,
        local_user_name,
        local_user_email,
    })
}

/// Human-readable label for a status entry.
fn state_label(status: Status) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
        parts.push("new");
    }
    if status.intersects(Status::WT_MODIFIED | Status::INDEX_MODIFIED) {
        parts.push("modified");
    }
    if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
        parts.push("deleted");
    }
    if status.intersects(Status::WT_RENAMED | Status::INDEX_RENAMED) {
        parts.push("renamed");
    }
    if status.intersects(Status::WT_TYPECHANGE | Status::INDEX_TYPECHANGE) {
        parts.push("typechange");
    }
    if parts.is_empty() {
        "unchanged".to_string()
    } else {
        parts.join("+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};

    fn init_repo(dir: &Path, name: &str, email: &str) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", name).unwrap();
            config.set_str("user.email", email).unwrap();
        }
        repo
    }

    fn commit_everything(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        let sig = Signature::now("Esther Arkin", "esther@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    fn make_config(repo_path: &str, log_path: &Path) -> ValetConfig {
        ValetConfig::from_toml_str(&format!(
            r#"
[application]
default_provider = "github"
default_account = "primary"

[[provider]]
name = "github"

[[provider.account]]
id = "primary"
full_name = "Esther Arkin"
email = "esther@example.com"
token = "ghp_test"
commit_log_path = "{}"
watched_dirs = ["{}"]
"#,
            log_path.display(),
            repo_path
        ))
        .unwrap()
    }

    #[test]
    fn test_open_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config("/nonexistent/repo", &log);

        let result = Session::open(Path::new("/nonexistent/repo"), &config);
        assert!(matches!(result, Err(SessionError::InvalidRepoPath(_))));
    }

    #[test]
    fn test_open_rejects_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config(&dir.path().display().to_string(), &log);

        let result = Session::open(dir.path(), &config);
        assert!(matches!(
            result,
            Err(SessionError::Git(GitError::RepositoryNotFound(_)))
        ));
    }

    #[test]
    fn test_open_rejects_identity_mismatch_before_any_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir(&repo_dir).unwrap();
        init_repo(&repo_dir, "Somebody Else", "other@example.com");
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config(&repo_dir.display().to_string(), &log);

        let result = Session::open(&repo_dir, &config);
        assert!(matches!(result, Err(SessionError::IdentityMismatch { .. })));
    }

    #[test]
    fn test_open_resolves_watching_account() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir(&repo_dir).unwrap();
        init_repo(&repo_dir, "Esther Arkin", "esther@example.com");
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config(&repo_dir.display().to_string(), &log);

        let session = Session::open(&repo_dir, &config).unwrap();
        assert_eq!(session.account().id, "primary");
        assert_eq!(session.state(), SessionState::Opened);
    }

    #[test]
    fn test_info_reports_short_sha_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir(&repo_dir).unwrap();
        let repo = init_repo(&repo_dir, "Esther Arkin", "esther@example.com");
        std::fs::write(repo_dir.join("a.txt"), "a").unwrap();
        commit_everything(&repo, "first commit");
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config(&repo_dir.display().to_string(), &log);

        let session = Session::open(&repo_dir, &config).unwrap();
        let info = session.info().unwrap();
        assert_eq!(info.user_name, "Esther Arkin");
        assert_eq!(info.short_sha.as_ref().unwrap().len(), 9);
        assert_eq!(info.tip_summary.as_deref(), Some("first commit"));
    }

    #[test]
    fn test_status_preview_shows_first_line_only() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir(&repo_dir).unwrap();
        let repo = init_repo(&repo_dir, "Esther Arkin", "esther@example.com");
        std::fs::write(repo_dir.join("a.txt"), "a").unwrap();
        commit_everything(&repo, "init");
        std::fs::write(repo_dir.join("a.txt"), "changed").unwrap();

        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "Fix bug\n\ndetails").unwrap();
        let config = make_config(&repo_dir.display().to_string(), &log);

        let session = Session::open(&repo_dir, &config).unwrap();
        let report = session.status().unwrap();
        assert_eq!(report.message_preview.as_deref(), Some("Fix bug"));
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].path, "a.txt");
        assert_eq!(report.entries[0].state, "modified");
        assert!(!report.entries[0].staged);
    }

    #[test]
    fn test_set_remote_url_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir(&repo_dir).unwrap();
        init_repo(&repo_dir, "Esther Arkin", "esther@example.com");
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config(&repo_dir.display().to_string(), &log);

        let mut session = Session::open(&repo_dir, &config).unwrap();
        session
            .set_remote_url("https://example.com/a.git", false)
            .unwrap();
        session
            .set_remote_url("https://example.com/b.git", false)
            .unwrap();

        let repo = Repository::open(&repo_dir).unwrap();
        let remote = repo.find_remote("origin").unwrap();
        assert_eq!(remote.url(), Some("https://example.com/b.git"));
    }

    #[test]
    fn test_delete_branch_refuses_current_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir(&repo_dir).unwrap();
        let repo = init_repo(&repo_dir, "Esther Arkin", "esther@example.com");
        std::fs::write(repo_dir.join("a.txt"), "a").unwrap();
        commit_everything(&repo, "init");
        let log = dir.path().join("commit_log.txt");
        std::fs::write(&log, "msg").unwrap();
        let config = make_config(&repo_dir.display().to_string(), &log);

        let mut session = Session::open(&repo_dir, &config).unwrap();
        let current = session.context().current_branch.clone();
        let result = session.delete_branch(&current);
        assert!(matches!(
            result,
            Err(SessionError::Git(GitError::BranchCheckedOut(_)))
        ));
    }
}
