//! Commit orchestration: message resolution, amend semantics, and
//! empty-commit avoidance.

use std::path::Path;

use git2::{Oid, Repository, Signature};
use tracing::{debug, info};

use crate::config::Account;
use crate::errors::{GitError, SessionError};
use crate::remote;

/// What the commit step decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit (or amend) was created.
    Committed(Oid),

    /// Nothing was staged and no amend message change was requested; no
    /// commit was attempted.
    Skipped,

    /// A commit was attempted but would have introduced no tree changes.
    /// `remote_in_sync` reports whether the local tip already equals the
    /// remote-tracking tip, so the caller can skip the push entirely.
    EmptyCommitAvoided { remote_in_sync: bool },
}

/// The commit message read from an account's commit-log file.
///
/// The full file content is the commit body; only the first line is shown
/// in previews.
#[derive(Debug, Clone)]
pub struct CommitMessage {
    body: String,
}

impl CommitMessage {
    /// Read the message from `path`. A missing file is fatal for the
    /// requested commit; committing with an empty message is never done.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::CommitLogMissing(path.display().to_string()));
        }
        let body = std::fs::read_to_string(path).map_err(GitError::IoError)?;
        debug!(path = %path.display(), bytes = body.len(), "loaded commit message");
        Ok(Self { body })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// First line, for status previews.
    pub fn summary(&self) -> &str {
        self.body.lines().next().unwrap_or("").trim_end()
    }
}

/// Commit staged changes if warranted.
///
/// A commit is attempted when something was staged, or when `amend` is
/// requested and the commit-log content differs from the tip's recorded
/// message (an amend that only rewords). An attempt that would change
/// nothing in the tree reports [`CommitOutcome::EmptyCommitAvoided`]
/// instead of failing.
pub fn maybe_commit(
    repo: &Repository,
    account: &Account,
    did_stage: bool,
    amend: bool,
) -> Result<CommitOutcome, SessionError> {
    let message = CommitMessage::load(&account.commit_log_path)?;
    let tip = head_commit(repo)?;

    if !did_stage {
        let message_changed = amend
            && tip
                .as_ref()
                .map(|c| c.message().unwrap_or("").trim() != message.body().trim())
                .unwrap_or(false);
        if !message_changed {
            debug!("nothing staged and no amend message change; skipping commit");
            return Ok(CommitOutcome::Skipped);
        }
    }

    let sig = Signature::now(&account.full_name, &account.email)?;
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    if amend {
        if let Some(ref tip) = tip {
            let oid = tip.amend(
                Some("HEAD"),
                Some(&sig),
                Some(&sig),
                None,
                Some(message.body()),
                Some(&tree),
            )?;
            info!(sha = %oid, summary = message.summary(), "amended tip commit");
            return Ok(CommitOutcome::Committed(oid));
        }
        // No tip to amend yet; fall through to a plain first commit.
    }

    if let Some(ref parent) = tip {
        if parent.tree_id() == tree_oid {
            let remote_in_sync = remote::tracking_tip(repo)
                .map(|t| t == parent.id())
                .unwrap_or(false);
            info!(remote_in_sync, "no tree changes; not creating a commit");
            return Ok(CommitOutcome::EmptyCommitAvoided { remote_in_sync });
        }
    }

    let parents: Vec<&git2::Commit> = tip.iter().collect();
    let oid = repo.commit(Some("HEAD"), &sig, &sig, message.body(), &tree, &parents)?;
    info!(sha = %oid, summary = message.summary(), "created commit");
    Ok(CommitOutcome::Committed(oid))
}

/// Tip commit of HEAD, or `None` on an unborn branch.
pub(crate) fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>, GitError> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(e) => Err(e.into()),
    }
}
