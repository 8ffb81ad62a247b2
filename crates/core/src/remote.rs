//! Push and pull orchestration against the configured remotes.
//!
//! Remote conditions that a user can recover from (diverged branch, missing
//! remote, bad credentials, merge conflict) are classified into
//! [`PushOutcome`] / [`PullOutcome`] values here instead of propagating as
//! errors, so one invocation never crashes on a recoverable condition.

use std::sync::{Arc, Mutex};

use git2::{
    BranchType, Cred, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository, Signature,
};
use tracing::{debug, info, warn};

use crate::config::Account;
use crate::errors::GitError;

/// The remote every push targets.
pub const ORIGIN_REMOTE: &str = "origin";

/// The secondary remote used by the fork/upstream pull workflow.
pub const UPSTREAM_REMOTE: &str = "upstream";

/// Branch fetched from `upstream` by convention.
const UPSTREAM_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote accepted the push.
    Pushed,
    /// The remote already has the local tip.
    NothingToPush,
    /// No `origin` remote is configured.
    RemoteMissing,
    /// The remote branch has diverged and the push was not forced.
    NonFastForward,
    /// The remote rejected the credentials.
    AuthFailed { url: String },
    /// Any other backend failure, already logged.
    Unknown,
}

/// Result of a pull attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The local branch pointer advanced without a merge commit.
    FastForwarded,
    /// Diverged histories merged cleanly into a merge commit.
    Merged,
    /// Nothing to do.
    UpToDate,
    /// The merge hit conflicts; they are left in the working tree for the
    /// user to resolve.
    Conflict,
    /// The remote, or the branch on it, does not exist.
    RemoteRefMissing,
    /// Any other backend failure, already logged.
    Unknown,
}

/// How a push will address the remote. Derived per invocation, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPlan {
    pub target_branch: String,
    pub refspec: String,
    pub forced: bool,
}

/// Name and abbreviated tip of one remote-tracking branch.
#[derive(Debug, Clone)]
pub struct RemoteTip {
    pub name: String,
    pub short_sha: String,
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// Build the refspec for pushing the current branch.
///
/// The force form is used when the caller asks for it, or when no
/// remote-tracking branch exists yet (first push of a new branch).
pub fn plan_push(repo: &Repository, forced: bool) -> Result<PushPlan, GitError> {
    let branch = current_branch(repo)?;
    let has_tracking = repo
        .find_branch(&format!("{}/{}", ORIGIN_REMOTE, branch), BranchType::Remote)
        .is_ok();
    let force = forced || !has_tracking;
    let refspec = if force {
        format!("+refs/heads/{}:refs/heads/{}", branch, branch)
    } else {
        format!("refs/heads/{}:refs/heads/{}", branch, branch)
    };
    debug!(branch = %branch, forced = force, has_tracking, "constructed push plan");
    Ok(PushPlan {
        target_branch: branch,
        refspec,
        forced: force,
    })
}

/// Push the current branch to `origin` with the account's credentials.
pub fn push(repo: &Repository, account: &Account, forced: bool) -> Result<PushOutcome, GitError> {
    let mut remote = match repo.find_remote(ORIGIN_REMOTE) {
        Ok(r) => r,
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            warn!("no '{}' remote is configured", ORIGIN_REMOTE);
            return Ok(PushOutcome::RemoteMissing);
        }
        Err(e) => return Err(e.into()),
    };
    let plan = plan_push(repo, forced)?;

    if !plan.forced {
        if let Some(local_tip) = head_target(repo) {
            if tracking_tip(repo) == Some(local_tip) {
                info!(branch = %plan.target_branch, "remote already has this tip; nothing to push");
                return Ok(PushOutcome::NothingToPush);
            }
        }
    }

    let remote_url = remote.url().unwrap_or("").to_string();
    info!(branch = %plan.target_branch, forced = plan.forced, "pushing to remote");

    let mut callbacks = auth_callbacks(account);
    let rejection = Arc::new(Mutex::new(None::<String>));
    let rejection_clone = rejection.clone();
    callbacks.push_update_reference(move |refname, status| {
        if let Some(msg) = status {
            warn!(refname, msg, "push rejected");
            *rejection_clone.lock().unwrap() = Some(msg.to_string());
        }
        Ok(())
    });

    let mut push_opts = PushOptions::new();
    push_opts.remote_callbacks(callbacks);

    if let Err(e) = remote.push(&[plan.refspec.as_str()], Some(&mut push_opts)) {
        return Ok(classify_push_error(&e, &remote_url));
    }
    if let Some(msg) = rejection.lock().unwrap().take() {
        if msg.contains("fast-forward") || msg.contains("fetch first") {
            warn!(
                branch = %plan.target_branch,
                "remote has diverged; a forced or amend push is required"
            );
            return Ok(PushOutcome::NonFastForward);
        }
        warn!(msg = %msg, "push reference update rejected");
        return Ok(PushOutcome::Unknown);
    }
    info!(branch = %plan.target_branch, "push completed");
    Ok(PushOutcome::Pushed)
}

/// Delete `branch` on `origin` by pushing an empty source refspec.
pub fn push_delete(
    repo: &Repository,
    account: &Account,
    branch: &str,
) -> Result<PushOutcome, GitError> {
    let mut remote = match repo.find_remote(ORIGIN_REMOTE) {
        Ok(r) => r,
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            warn!("no '{}' remote is configured", ORIGIN_REMOTE);
            return Ok(PushOutcome::RemoteMissing);
        }
        Err(e) => return Err(e.into()),
    };
    let remote_url = remote.url().unwrap_or("").to_string();
    let refspec = format!(":refs/heads/{}", branch);
    info!(branch, "deleting remote branch");

    let mut push_opts = PushOptions::new();
    push_opts.remote_callbacks(auth_callbacks(account));
    match remote.push(&[refspec.as_str()], Some(&mut push_opts)) {
        Ok(()) => Ok(PushOutcome::Pushed),
        Err(e) => Ok(classify_push_error(&e, &remote_url)),
    }
}

fn classify_push_error(err: &git2::Error, remote_url: &str) -> PushOutcome {
    let message = err.message().to_string();
    if err.code() == git2::ErrorCode::NotFastForward
        || message.contains("fast-forward")
        || message.contains("fastforwardable")
    {
        warn!("remote has diverged; a forced or amend push is required");
        return PushOutcome::NonFastForward;
    }
    if err.code() == git2::ErrorCode::Auth || err.class() == git2::ErrorClass::Http {
        warn!(url = remote_url, error = %err, "authentication failed");
        return PushOutcome::AuthFailed {
            url: remote_url.to_string(),
        };
    }
    warn!(error = %err, "push failed");
    PushOutcome::Unknown
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

/// Fetch and merge with a fast-forward-preferred strategy.
///
/// The default pulls the current branch's counterpart from `origin`. With
/// `use_upstream`, the `main` branch is fetched explicitly from the
/// `upstream` remote instead, supporting a fork workflow.
pub fn pull(
    repo: &Repository,
    account: &Account,
    use_upstream: bool,
) -> Result<PullOutcome, GitError> {
    let remote_name = if use_upstream {
        UPSTREAM_REMOTE
    } else {
        ORIGIN_REMOTE
    };
    let mut remote = match repo.find_remote(remote_name) {
        Ok(r) => r,
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            warn!(remote = remote_name, "remote is not configured");
            return Ok(PullOutcome::RemoteRefMissing);
        }
        Err(e) => return Err(e.into()),
    };

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(auth_callbacks(account));

    info!(remote = remote_name, "fetching");
    let fetch_result = if use_upstream {
        let refspec = format!(
            "+refs/heads/{}:refs/remotes/{}/{}",
            UPSTREAM_BRANCH, UPSTREAM_REMOTE, UPSTREAM_BRANCH
        );
        remote.fetch(&[refspec.as_str()], Some(&mut fetch_opts), None)
    } else {
        remote.fetch(&[] as &[&str], Some(&mut fetch_opts), None)
    };
    if let Err(e) = fetch_result {
        return Ok(classify_pull_error(&e));
    }

    let branch = current_branch(repo)?;
    let target_branch = if use_upstream {
        UPSTREAM_BRANCH
    } else {
        branch.as_str()
    };
    let tracking_ref = format!("refs/remotes/{}/{}", remote_name, target_branch);
    let reference = match repo.find_reference(&tracking_ref) {
        Ok(r) => r,
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            warn!(refname = %tracking_ref, "remote ref not found");
            return Ok(PullOutcome::RemoteRefMissing);
        }
        Err(e) => return Err(e.into()),
    };
    let fetched = repo.reference_to_annotated_commit(&reference)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched])?;

    if analysis.is_up_to_date() {
        info!("already up to date");
        return Ok(PullOutcome::UpToDate);
    }

    if analysis.is_fast_forward() {
        let head = repo.head()?;
        let refname = head.name().unwrap_or("HEAD").to_string();
        let mut head_ref = repo.find_reference(&refname)?;
        head_ref.set_target(fetched.id(), "gitvalet: fast-forward pull")?;
        repo.set_head(&refname)?;
        if let Err(e) = repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force())) {
            return Ok(classify_pull_error(&e));
        }
        info!(sha = %fetched.id(), "fast-forwarded");
        return Ok(PullOutcome::FastForwarded);
    }

    if analysis.is_normal() {
        if let Err(e) = repo.merge(&[&fetched], None, None) {
            return Ok(classify_pull_error(&e));
        }
        let mut index = repo.index()?;
        if index.has_conflicts() {
            warn!("merge produced conflicts; resolve them and commit manually");
            return Ok(PullOutcome::Conflict);
        }
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let sig = Signature::now(&account.full_name, &account.email)?;
        let head_commit = repo.head()?.peel_to_commit()?;
        let fetched_commit = repo.find_commit(fetched.id())?;
        let message = format!("Merge {}/{} into {}", remote_name, target_branch, branch);
        let oid = repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &message,
            &tree,
            &[&head_commit, &fetched_commit],
        )?;
        repo.cleanup_state()?;
        info!(sha = %oid, "merged remote changes");
        return Ok(PullOutcome::Merged);
    }

    warn!("merge analysis produced no usable strategy");
    Ok(PullOutcome::Unknown)
}

fn classify_pull_error(err: &git2::Error) -> PullOutcome {
    if err.code() == git2::ErrorCode::Conflict || err.class() == git2::ErrorClass::Checkout {
        warn!("checkout conflict; resolve local changes and retry");
        return PullOutcome::Conflict;
    }
    if err.code() == git2::ErrorCode::NotFound {
        return PullOutcome::RemoteRefMissing;
    }
    warn!(error = %err, "pull failed");
    PullOutcome::Unknown
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn auth_callbacks(account: &Account) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    let username = account.id.clone();
    let token = account.token.clone();
    callbacks.credentials(move |_url, _username, _allowed| {
        Cred::userpass_plaintext(&username, &token)
    });
    callbacks
}

/// Canonical name of the branch HEAD points at, including an unborn HEAD
/// right after `git init`.
pub(crate) fn current_branch(repo: &Repository) -> Result<String, GitError> {
    match repo.head() {
        Ok(head) => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
            let head_ref = repo.find_reference("HEAD")?;
            let name = head_ref
                .symbolic_target()
                .and_then(|t| t.strip_prefix("refs/heads/"))
                .unwrap_or("main");
            Ok(name.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn head_target(repo: &Repository) -> Option<Oid> {
    repo.head().ok().and_then(|h| h.target())
}

/// Tip of `origin/<current branch>`, if the remote-tracking branch exists.
pub(crate) fn tracking_tip(repo: &Repository) -> Option<Oid> {
    let branch = current_branch(repo).ok()?;
    repo.find_branch(&format!("{}/{}", ORIGIN_REMOTE, branch), BranchType::Remote)
        .ok()
        .and_then(|b| b.get().target())
}

/// Names and abbreviated tips of every remote-tracking branch.
pub fn remote_branch_tips(repo: &Repository) -> Result<Vec<RemoteTip>, GitError> {
    let mut tips = Vec::new();
    for branch_result in repo.branches(Some(BranchType::Remote))? {
        let (branch, _) = branch_result?;
        let name = match branch.name()? {
            Some(n) => n.to_string(),
            None => continue,
        };
        let short_sha = branch
            .get()
            .target()
            .map(|oid| oid.to_string()[..9].to_string())
            .unwrap_or_default();
        tips.push(RemoteTip { name, short_sha });
    }
    Ok(tips)
}
