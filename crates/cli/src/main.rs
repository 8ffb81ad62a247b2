//! GitValet command-line tool.
//!
//! Stages, commits, and pushes/pulls a local repository using the identity,
//! token, and commit message resolved from a per-directory multi-account
//! configuration file. All decision logic lives in `gitvalet-core`; this
//! binary parses arguments, renders outcomes, and maps fatal errors to a
//! nonzero exit code.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use tracing_subscriber::EnvFilter;

use gitvalet_core::commit::CommitOutcome;
use gitvalet_core::errors::{GitError, SessionError};
use gitvalet_core::remote::{PullOutcome, PushOutcome};
use gitvalet_core::session::{self, RepoInfo, Session};
use gitvalet_core::stage::StageRequest;
use gitvalet_core::ValetConfig;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// GitValet command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "gitvalet",
    version,
    about = "Stage, commit, and push with per-directory account selection"
)]
struct Cli {
    /// Path to the repository directory (defaults to the current directory).
    #[arg(long, global = true)]
    repodir: Option<PathBuf>,

    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    configfilepath: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show repository identity, branch, and tip.
    Info,

    /// Show working-tree status and the pending commit message.
    Status,

    /// Fetch and merge from the remote.
    Pull {
        /// Pull `main` from the `upstream` remote instead of origin.
        #[arg(long)]
        upstream: bool,
    },

    /// Stage changes, commit, and push to origin.
    Push {
        /// Amend the tip commit instead of creating a new one (implies a
        /// forced push).
        #[arg(long)]
        amend: bool,

        /// Stage every change, including untracked files.
        #[arg(long, conflicts_with = "singlefile")]
        all: bool,

        /// Stage one file or directory.
        #[arg(long)]
        singlefile: Option<PathBuf>,
    },

    /// Set or update a remote URL.
    SetUrl {
        /// The remote URL.
        url: String,

        /// Target the `upstream` remote instead of origin.
        #[arg(long)]
        upstream: bool,
    },

    /// Delete or rename branches locally and on origin.
    Branch {
        /// Delete the named branch.
        #[arg(long, conflicts_with = "rename")]
        delete: Option<String>,

        /// Rename the current branch.
        #[arg(long)]
        rename: Option<String>,
    },

    /// Write a commented sample configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./gitvalet.toml")]
        output: PathBuf,
    },

    /// Rewrite history so author and committer match the given identity.
    RewriteAuthor {
        /// Author/committer name to record.
        name: String,

        /// Author/committer email to record.
        email: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Minimal logging by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { ref output } = cli.command {
        return cmd_init(output);
    }

    let config_path = match cli.configfilepath.clone() {
        Some(p) => p,
        None => default_config_path()?,
    };
    let config = ValetConfig::load_and_validate(&config_path).with_context(|| {
        format!(
            "failed to load configuration from {}",
            config_path.display()
        )
    })?;

    let repo_dir = match cli.repodir.clone() {
        Some(p) => p,
        None => std::env::current_dir().context("failed to determine current directory")?,
    };

    let mut session = open_session(&repo_dir, &config)?;

    match cli.command {
        Commands::Info => cmd_info(&session),
        Commands::Status => cmd_status(&session),
        Commands::Pull { upstream } => cmd_pull(&mut session, upstream),
        Commands::Push {
            amend,
            all,
            singlefile,
        } => cmd_push(&mut session, amend, all, singlefile),
        Commands::SetUrl { url, upstream } => cmd_set_url(&mut session, &url, upstream),
        Commands::Branch { delete, rename } => cmd_branch(&mut session, delete, rename),
        Commands::RewriteAuthor { name, email } => {
            cmd_rewrite_author(&mut session, &name, &email)
        }
        Commands::Init { .. } => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("could not determine the user configuration directory")?;
    Ok(dir.join("gitvalet").join("config.toml"))
}

/// Open the session, offering to initialize a fresh repository when the
/// directory exists but is not one yet (interactive runs only).
fn open_session(repo_dir: &Path, config: &ValetConfig) -> Result<Session> {
    match Session::open(repo_dir, config) {
        Ok(session) => Ok(session),
        Err(SessionError::Git(GitError::RepositoryNotFound(_))) if console::user_attended() => {
            println!(
                "{}",
                style::warn(&format!("{} is not a git repository.", repo_dir.display()))
            );
            let initialize = Confirm::new()
                .with_prompt(format!(
                    "Initialize a repository in {}?",
                    repo_dir.display()
                ))
                .default(false)
                .interact()
                .context("failed to read confirmation")?;
            if !initialize {
                anyhow::bail!("no repository at {}", repo_dir.display());
            }
            session::init_repository(repo_dir)?;
            println!("{}", style::success("Repository initialized."));
            Ok(Session::open(repo_dir, config)?)
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_info(session: &Session) -> Result<()> {
    let info = session.info()?;
    print_info(&info);
    Ok(())
}

fn print_info(info: &RepoInfo) {
    println!("{}", style::header("Repository"));
    println!("  Path    : {}", info.repo_path);
    println!("  Branch  : {}", info.branch);
    match (&info.short_sha, &info.tip_summary) {
        (Some(sha), Some(summary)) => {
            println!("  Tip     : {} {}", sha, summary);
            if let Some(secs) = info.tip_time {
                if let Some(time) = chrono::DateTime::from_timestamp(secs, 0) {
                    println!("  Tip date: {}", time.format("%Y-%m-%d %H:%M:%S UTC"));
                }
            }
        }
        _ => println!("  Tip     : {}", style::dim("no commits yet")),
    }
    println!("  Author  : {} <{}>", info.user_name, info.user_email);
    println!("  Account : {}/{}", info.provider, info.account_id);
}

fn cmd_status(session: &Session) -> Result<()> {
    let report = session.status()?;
    print_info(&report.info);
    println!();

    if report.entries.is_empty() {
        println!("{}", style::success("Working tree clean."));
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["File", "State", "Staged"]);

        for entry in &report.entries {
            let state_cell = match entry.state.as_str() {
                "new" => Cell::new("new").fg(comfy_table::Color::Green),
                "modified" => Cell::new("modified").fg(comfy_table::Color::Yellow),
                "deleted" => Cell::new("deleted").fg(comfy_table::Color::Red),
                other => Cell::new(other),
            };
            table.add_row(vec![
                Cell::new(&entry.path),
                state_cell,
                Cell::new(if entry.staged { "yes" } else { "" }),
            ]);
        }
        println!("{}", table);
    }

    println!();
    match report.message_preview {
        Some(preview) => println!("Pending commit message: {}", preview),
        None => println!(
            "{}",
            style::warn("Commit log file not found; no pending message.")
        ),
    }
    Ok(())
}

fn cmd_pull(session: &mut Session, upstream: bool) -> Result<()> {
    let outcome = session.pull(upstream)?;
    match outcome {
        PullOutcome::FastForwarded => {
            println!("{}", style::success("Fast-forwarded to the remote tip."))
        }
        PullOutcome::Merged => println!("{}", style::success("Merged remote changes.")),
        PullOutcome::UpToDate => println!("{}", style::dim("Already up to date.")),
        PullOutcome::Conflict => println!(
            "{}",
            style::warn("Merge conflicts; resolve them and commit manually.")
        ),
        PullOutcome::RemoteRefMissing => println!(
            "{}",
            style::warn("The remote, or the branch on it, does not exist.")
        ),
        PullOutcome::Unknown => {
            println!("{}", style::error("Pull failed; see the log for details."))
        }
    }
    Ok(())
}

fn cmd_push(
    session: &mut Session,
    amend: bool,
    all: bool,
    singlefile: Option<PathBuf>,
) -> Result<()> {
    let request = match singlefile {
        Some(path) => StageRequest::Single(path),
        None if all => StageRequest::All,
        None => StageRequest::Update,
    };

    let report = session.push(&request, amend)?;

    match report.commit {
        CommitOutcome::Committed(oid) => println!(
            "{}",
            style::success(&format!("Committed {}", &oid.to_string()[..9]))
        ),
        CommitOutcome::Skipped => println!("{}", style::dim("Nothing new to commit.")),
        CommitOutcome::EmptyCommitAvoided { .. } => {
            println!("{}", style::dim("No changes; not creating a commit."))
        }
    }

    if !report.remote_tips.is_empty() {
        println!("Remote branches:");
        for tip in &report.remote_tips {
            println!("  {}: {}", tip.name, tip.short_sha);
        }
    }

    match report.push {
        None => println!(
            "{}",
            style::success("Remote already has this tip; nothing to push.")
        ),
        Some(PushOutcome::Pushed) => println!("{}", style::success("Pushed to origin.")),
        Some(PushOutcome::NothingToPush) => println!("{}", style::dim("Nothing to push.")),
        Some(PushOutcome::RemoteMissing) => println!(
            "{}",
            style::warn("No 'origin' remote is configured; set one with `gitvalet set-url <url>`.")
        ),
        Some(PushOutcome::NonFastForward) => println!(
            "{}",
            style::error("The remote has diverged; pull first, or push with --amend to force.")
        ),
        Some(PushOutcome::AuthFailed { url }) => println!(
            "{}",
            style::error(&format!("Authentication failed for {}", url))
        ),
        Some(PushOutcome::Unknown) => {
            println!("{}", style::error("Push failed; see the log for details."))
        }
    }
    Ok(())
}

fn cmd_set_url(session: &mut Session, url: &str, upstream: bool) -> Result<()> {
    session.set_remote_url(url, upstream)?;
    let name = if upstream { "upstream" } else { "origin" };
    println!(
        "{}",
        style::success(&format!("Remote '{}' now points at {}", name, url))
    );
    Ok(())
}

fn cmd_branch(
    session: &mut Session,
    delete: Option<String>,
    rename: Option<String>,
) -> Result<()> {
    match (delete, rename) {
        (Some(name), None) => {
            let outcome = session.delete_branch(&name)?;
            report_branch_outcome(&format!("Deleted branch '{}'", name), outcome);
        }
        (None, Some(name)) => {
            let outcome = session.rename_branch(&name)?;
            report_branch_outcome(&format!("Renamed current branch to '{}'", name), outcome);
        }
        _ => anyhow::bail!("specify exactly one of --delete <name> or --rename <name>"),
    }
    Ok(())
}

fn report_branch_outcome(action: &str, outcome: PushOutcome) {
    match outcome {
        PushOutcome::Pushed => println!(
            "{}",
            style::success(&format!("{} locally and on origin.", action))
        ),
        PushOutcome::RemoteMissing => println!(
            "{}",
            style::warn(&format!("{} locally; no origin remote to update.", action))
        ),
        other => println!(
            "{}",
            style::warn(&format!(
                "{} locally; the remote update reported {:?}.",
                action, other
            ))
        ),
    }
}

fn cmd_rewrite_author(session: &mut Session, name: &str, email: &str) -> Result<()> {
    let count = session.rewrite_author(name, email)?;
    if count == 0 {
        println!("{}", style::dim("All commits already carry this identity."));
    } else {
        println!(
            "{}",
            style::success(&format!("Rewrote {} commit(s).", count))
        );
        println!(
            "{}",
            style::warn("The branch now points at new history; publishing it requires a forced push.")
        );
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let sample = r#"# GitValet Configuration
# Accounts are matched against the repository directory: the first account
# whose watched_dirs contains the exact path wins; otherwise the default
# account named below is used.

[application]
default_provider = "github"
default_account = "coolgeek"

[[provider]]
name = "github"

# The everyday account.
[[provider.account]]
id = "coolgeek"
full_name = "Esther Arkin"
email = "esther@example.com"
token = "ghp_xxxxxxxxxxxxxxxx"
commit_log_path = "/home/esther/git_ws/commit_log.txt"
watched_dirs = []

# A second account claimed by specific checkouts.
[[provider.account]]
id = "worklogin"
full_name = "Esther Arkin"
email = "esther.arkin@corp.example.com"
token = "ghp_yyyyyyyyyyyyyyyy"
commit_log_path = "/home/esther/git_ws/work_commit_log.txt"
watched_dirs = ["/home/esther/src/widget"]

# Optional staging path rewrite: a markdown file staged by name in a
# repository whose path ends with repo_suffix is looked up under prefix.
# [[rewrite]]
# repo_suffix = "statiq/note"
# extension = "md"
# prefix = "input/posts"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, sample).context("failed to write config file")?;

    println!("Sample configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the accounts, tokens, and watched directories");
    println!("  2. Point each commit_log_path at a real file");
    println!(
        "  3. Move the file to your config directory, or pass --configfilepath {}",
        output.display()
    );
    Ok(())
}
