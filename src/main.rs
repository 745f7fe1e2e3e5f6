//! minivcs - a minimal content-addressed version-control tool
//!
//! This is the main entry point for the minivcs command-line interface.
//! Every command is a thin wrapper over `minivcs::storage::Repository`.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error};

use minivcs::config::LoggingConfig;
use minivcs::logging::init_logging;
use minivcs::storage::{
    format_timestamp, BlobId, Change, ChangeKind, Commit, CommitId, ErrorKind, ObjectId, Repository,
    StagedEntry, StorageError, StorageResult, TreeId,
};

/// minivcs - content-addressed objects, commits and branches
#[derive(Parser)]
#[command(name = "minivcs", version)]
#[command(about = "Minimal version control: object store, commit graph and branches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory (repository root, or any directory below it)
    #[arg(short = 'C', long, default_value = ".", global = true)]
    repo: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository with an unborn `main` branch
    Init,
    /// Store a file's content and print its hash
    HashObject {
        file: PathBuf,
    },
    /// Print the raw bytes of a stored object
    CatObject {
        id: String,
    },
    /// Build a tree from `path=blob-hash` pairs and print its hash
    WriteTree {
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Commit a tree on the current branch
    Commit {
        /// Tree hash
        tree: String,
        /// Commit message
        #[arg(short, long)]
        message: String,
        /// Author as `Name <email>`
        #[arg(short, long)]
        author: String,
        /// Parent commit (defaults to the branch tip)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Show history of the current branch, newest first
    Log {
        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Compare the trees of two commits
    Diff {
        old: String,
        new: String,
        /// Descend into sub-trees and report file paths
        #[arg(short, long)]
        recursive: bool,
    },
    /// Branch management
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// List branches
    List,
    /// Create a branch at the current tip
    Create { name: String },
    /// Delete a branch
    Delete { name: String },
    /// Make another branch current
    Switch { name: String },
    /// Print the current branch
    Current,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&LoggingConfig::for_verbosity(cli.verbose)) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = %e.kind(), "command failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::from(exit_code(e.kind()))
        }
    }
}

/// Distinct exit status per error category.
fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Storage => 1,
        ErrorKind::Validation => 2,
        ErrorKind::InvalidName => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::AlreadyExists => 5,
        ErrorKind::InvalidState => 6,
        ErrorKind::Conflict => 7,
    }
}

fn run(cli: &Cli) -> StorageResult<()> {
    if let Commands::Init = cli.command {
        let repo = Repository::init(&cli.repo)?;
        println!(
            "Initialized empty repository in {}",
            repo.meta_dir().display()
        );
        return Ok(());
    }

    let repo = Repository::discover(&cli.repo)?;
    debug!(root = %repo.root().display(), "using repository");

    match &cli.command {
        Commands::Init => Ok(()),
        Commands::HashObject { file } => {
            let bytes = fs::read(file)?;
            let id = repo.put_object(&bytes)?;
            println!("{}", id);
            Ok(())
        }
        Commands::CatObject { id } => {
            let id = ObjectId::from_hex(id)?;
            let bytes = repo.get_object(&id)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        }
        Commands::WriteTree { entries } => {
            let staged = entries
                .iter()
                .map(|arg| parse_staged(arg))
                .collect::<StorageResult<Vec<_>>>()?;
            let id = repo.create_tree_from_staged(&staged)?;
            println!("{}", id);
            Ok(())
        }
        Commands::Commit {
            tree,
            message,
            author,
            parent,
        } => {
            let tree = TreeId::from_hex(tree)?;
            let parent = parent.as_deref().map(CommitId::from_hex).transpose()?;
            let commit = repo.create_commit(tree, parent, author, message)?;
            if cli.json {
                print_json(&commit)
            } else {
                println!("{}", commit.id);
                Ok(())
            }
        }
        Commands::Log { limit } => {
            let commits = match limit {
                Some(n) => repo.log(*n)?,
                None => repo.log_default()?,
            };
            if cli.json {
                return print_json(&commits);
            }
            for commit in &commits {
                print_commit(commit);
            }
            Ok(())
        }
        Commands::Diff {
            old,
            new,
            recursive,
        } => {
            let old = repo.resolve_commit(old)?.id;
            let new = repo.resolve_commit(new)?.id;
            let changes = if *recursive {
                repo.diff_commits_recursive(old, new)?
            } else {
                repo.diff_commits(old, new)?
            };
            if cli.json {
                return print_json(&changes);
            }
            print_changes(&changes);
            Ok(())
        }
        Commands::Branch { command } => run_branch(&repo, command, cli.json),
    }
}

fn run_branch(repo: &Repository, command: &BranchCommands, json: bool) -> StorageResult<()> {
    match command {
        BranchCommands::List => {
            let branches = repo.list_branches()?;
            if json {
                return print_json(&branches);
            }
            for branch in &branches {
                let marker = if branch.is_current { '*' } else { ' ' };
                match branch.tip {
                    Some(tip) => println!("{} {} {}", marker, branch.name, tip.short()),
                    None => println!("{} {} (unborn)", marker, branch.name),
                }
            }
        }
        BranchCommands::Create { name } => {
            let branch = repo.create_branch(name)?;
            println!("Created branch {}", branch);
        }
        BranchCommands::Delete { name } => {
            repo.delete_branch(name)?;
            println!("Deleted branch {}", name);
        }
        BranchCommands::Switch { name } => {
            repo.switch_branch(name)?;
            println!("Switched to branch {}", name);
        }
        BranchCommands::Current => {
            println!("{}", repo.current_branch()?);
        }
    }
    Ok(())
}

/// `path=hash` as given to `write-tree`.
fn parse_staged(arg: &str) -> StorageResult<StagedEntry> {
    let (path, hash) = arg.rsplit_once('=').ok_or_else(|| {
        StorageError::validation("entries", format!("expected 'path=hash', got '{}'", arg))
    })?;
    Ok(StagedEntry::new(path, BlobId::from_hex(hash)?))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> StorageResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    println!("{}", text);
    Ok(())
}

fn print_commit(commit: &Commit) {
    println!("commit {}", commit.id);
    if let Some(parent) = commit.parent {
        println!("Parent: {}", parent);
    }
    println!("Author: {}", commit.author);
    println!("Date:   {}", format_timestamp(&commit.timestamp));
    println!();
    for line in commit.message.lines() {
        println!("    {}", line);
    }
    println!();
}

fn print_changes(changes: &[Change]) {
    for change in changes {
        let status = match change.kind {
            ChangeKind::Added => 'A',
            ChangeKind::Removed => 'D',
            ChangeKind::Changed => 'M',
        };
        println!("{}\t{}", status, change.name);
    }
}
