//! History rewriting: re-author commits recorded under the wrong identity.
//!
//! Walks every commit reachable from HEAD and re-creates the chain with the
//! given author/committer wherever the recorded identity differs, keeping
//! original timestamps, trees, and messages. Commits whose message mentions
//! "Initial commit" are left untouched.

use std::collections::HashMap;

use git2::{Oid, Repository, Signature, Sort};
use tracing::{debug, info, warn};

use crate::errors::GitError;
use crate::stage::status_options;

/// Rewrite author and committer on mismatched commits reachable from HEAD.
///
/// Returns the number of commits whose identity was replaced. The current
/// branch ref is moved to the rewritten tip; the working tree is unchanged
/// because every rewritten commit keeps its original tree.
///
/// Refuses to run on a dirty working tree: a rewrite moves the branch ref,
/// and uncommitted changes make that hard to reason about.
pub fn rewrite_author(repo: &Repository, name: &str, email: &str) -> Result<usize, GitError> {
    let statuses = repo.statuses(Some(&mut status_options()))?;
    if !statuses.is_empty() {
        let path = repo
            .workdir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        return Err(GitError::WorkTreeDirty(path));
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;
    // Parent-first so every rewritten parent exists before its children.
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

    let mut remapped: HashMap<Oid, Oid> = HashMap::new();
    let mut rewritten = 0usize;

    for oid_result in revwalk {
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;
        let message = commit.message().unwrap_or("");

        let identity_matches = commit.author().name() == Some(name)
            && commit.author().email() == Some(email)
            && commit.committer().name() == Some(name)
            && commit.committer().email() == Some(email);
        let protected = message.contains("Initial commit");
        let needs_identity = !identity_matches && !protected;

        let parent_ids: Vec<Oid> = commit
            .parent_ids()
            .map(|p| remapped.get(&p).copied().unwrap_or(p))
            .collect();
        let parents_changed = parent_ids
            .iter()
            .zip(commit.parent_ids())
            .any(|(new, old)| *new != old);

        if !needs_identity && !parents_changed {
            continue;
        }

        let (author, committer) = if needs_identity {
            debug!(
                sha = %oid,
                old_author = commit.author().name().unwrap_or(""),
                "rewriting commit identity"
            );
            (
                Signature::new(name, email, &commit.author().when())?,
                Signature::new(name, email, &commit.committer().when())?,
            )
        } else {
            let author = commit.author();
            let committer = commit.committer();
            (
                Signature::new(
                    author.name().unwrap_or(""),
                    author.email().unwrap_or(""),
                    &author.when(),
                )?,
                Signature::new(
                    committer.name().unwrap_or(""),
                    committer.email().unwrap_or(""),
                    &committer.when(),
                )?,
            )
        };

        let tree = commit.tree()?;
        let parent_commits: Vec<git2::Commit> = parent_ids
            .iter()
            .map(|p| repo.find_commit(*p))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();

        let new_oid = repo.commit(None, &author, &committer, message, &tree, &parent_refs)?;
        remapped.insert(oid, new_oid);
        if needs_identity {
            rewritten += 1;
        }
    }

    if remapped.is_empty() {
        info!("no commits needed rewriting");
        return Ok(0);
    }

    let head = repo.head()?;
    let refname = head.name().unwrap_or("HEAD").to_string();
    let old_tip = head.target().ok_or_else(|| GitError::RefNotFound(refname.clone()))?;
    match remapped.get(&old_tip) {
        Some(new_tip) => {
            let mut head_ref = repo.find_reference(&refname)?;
            head_ref.set_target(*new_tip, "gitvalet: rewrite author")?;
            info!(count = rewritten, tip = %new_tip, "history rewritten");
        }
        None => {
            // Rewrites happened somewhere off the first-parent chain only.
            warn!("rewritten commits are not ancestors of the branch tip; ref not moved");
        }
    }

    Ok(rewritten)
}
