//! Working-tree staging decisions.
//!
//! The stager decides which paths go into the next commit. It never raises
//! an error for a path that simply is not there, since callers may pass a stale
//! path on purpose, and "nothing staged" is a normal outcome.

use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Repository, Status, StatusOptions};
use tracing::{debug, info, warn};

use crate::config::RewriteRule;
use crate::errors::GitError;

/// What to stage for the next commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    /// One caller-supplied path, possibly rewritten by a configured rule.
    Single(PathBuf),

    /// Every file modified in the working tree. Untracked files are left
    /// alone; that is the difference from [`StageRequest::All`].
    Update,

    /// Every status entry that still exists on disk, modified or new.
    All,
}

/// Stage paths according to `request`. Returns `true` iff at least one
/// path was added to the index.
pub fn stage(
    repo: &Repository,
    request: &StageRequest,
    rules: &[RewriteRule],
) -> Result<bool, GitError> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| GitError::Git2Error(git2::Error::from_str("bare repository has no working tree")))?;

    match request {
        StageRequest::Single(path) => stage_single(repo, workdir, path, rules),
        StageRequest::Update => stage_update(repo, workdir),
        StageRequest::All => stage_all(repo, workdir),
    }
}

/// Status enumeration shared by the stager and the session's status report.
pub(crate) fn status_options() -> StatusOptions {
    let mut opts = StatusOptions::new();
    opts.include_ignored(false)
        .include_untracked(true)
        .recurse_untracked_dirs(true);
    opts
}

fn stage_single(
    repo: &Repository,
    workdir: &Path,
    path: &Path,
    rules: &[RewriteRule],
) -> Result<bool, GitError> {
    let rel = normalize_single(workdir, path, rules);
    let target = workdir.join(&rel);

    if !target.exists() {
        warn!(path = %rel.display(), "path does not exist on disk; nothing staged");
        return Ok(false);
    }

    let mut index = repo.index()?;
    if target.is_dir() {
        index.add_all([rel.as_path()].iter(), IndexAddOption::DEFAULT, None)?;
    } else {
        index.add_path(&rel)?;
    }
    index.write()?;
    info!(path = %rel.display(), "staged");
    Ok(true)
}

fn stage_update(repo: &Repository, workdir: &Path) -> Result<bool, GitError> {
    let statuses = repo.statuses(Some(&mut status_options()))?;
    let mut index = repo.index()?;
    let mut staged = false;

    for entry in statuses.iter() {
        // Exactly "modified in working tree": entries that are also staged,
        // untracked, or deleted do not qualify.
        if entry.status() != Status::WT_MODIFIED {
            continue;
        }
        let path = match entry.path() {
            Some(p) => p,
            None => continue,
        };
        if !workdir.join(path).exists() {
            continue;
        }
        debug!(path, "staging modified file");
        index.add_path(Path::new(path))?;
        staged = true;
    }

    if staged {
        index.write()?;
    } else {
        debug!("no modified files to stage");
    }
    Ok(staged)
}

fn stage_all(repo: &Repository, workdir: &Path) -> Result<bool, GitError> {
    let statuses = repo.statuses(Some(&mut status_options()))?;
    let mut index = repo.index()?;
    let mut staged = false;

    for entry in statuses.iter() {
        let path = match entry.path() {
            Some(p) => p,
            None => continue,
        };
        // Entries for deletions no longer on disk are skipped; staging a
        // deletion is the backend's own concern.
        if !workdir.join(path).exists() {
            debug!(path, "skipping status entry missing on disk");
            continue;
        }
        debug!(path, "staging");
        index.add_path(Path::new(path))?;
        staged = true;
    }

    if staged {
        index.write()?;
    }
    Ok(staged)
}

/// Make a caller-supplied path repo-relative and apply the first matching
/// configured rewrite rule.
fn normalize_single(workdir: &Path, path: &Path, rules: &[RewriteRule]) -> PathBuf {
    let mut rel = if path.is_absolute() {
        match path.strip_prefix(workdir) {
            Ok(stripped) => stripped.to_path_buf(),
            Err(_) => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    };

    for rule in rules {
        if !workdir.ends_with(Path::new(&rule.repo_suffix)) {
            continue;
        }
        let extension_matches = rel
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == rule.extension)
            .unwrap_or(false);
        if !extension_matches {
            continue;
        }
        let prefix = Path::new(&rule.prefix);
        if rel.starts_with(prefix) {
            break;
        }
        let rewritten = prefix.join(&rel);
        if workdir.join(prefix).is_dir() && workdir.join(&rewritten).exists() {
            debug!(
                from = %rel.display(),
                to = %rewritten.display(),
                "applying configured path rewrite"
            );
            rel = rewritten;
        }
        break;
    }

    rel
}
