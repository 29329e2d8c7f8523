//! Salvor - crash recovery for delegated agent tasks.
//!
//! Command-line shell over the recovery engine: task record management,
//! crash-state reports, and validated recovery actions.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use salvor::error::{Result, SalvorError};
use salvor::git::GitInspector;
use salvor::notes::{NoteStatus, NoteStore};
use salvor::recover::RecoveryExecutor;
use salvor::report::{Reporter, SessionPointer};
use salvor::review::{GhReviewHost, ReviewHost};
use salvor::store::TaskStore;

#[derive(Parser)]
#[command(name = "salvor")]
#[command(version = "0.1.0")]
#[command(about = "Crash recovery for delegated agent tasks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage task records
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Generate the crash-state report for the active (or a given) task
    Report {
        /// Task id (defaults to the session pointer's current task)
        #[arg(long)]
        task: Option<String>,

        /// Reference branch for divergence counts
        #[arg(long, default_value = salvor::DEFAULT_REFERENCE_BRANCH)]
        reference: String,
    },

    /// Run a recovery action for a task
    Recover {
        #[command(subcommand)]
        command: RecoverCommands,
    },

    /// Interact with the remote review request for a task
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Manage cross-session notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a new task record
    Create {
        /// Task id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Executor model tag
        #[arg(long)]
        model: String,

        /// Task prompt text (mutually exclusive with --prompt-file)
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the prompt from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Nesting depth (0 = top-level)
        #[arg(long, default_value = "0")]
        depth: u32,

        /// Parent task id (required when depth > 0)
        #[arg(long)]
        parent: Option<String>,

        /// Branch allocated for the task's work
        #[arg(long)]
        branch: Option<String>,

        /// Point the session at this task
        #[arg(long)]
        set_current: bool,
    },

    /// List task record summaries
    List,

    /// Show one record in full
    Show { id: String },

    /// Check a record's integrity
    Validate { id: String },

    /// Append a note to a record
    Note { id: String, text: String },

    /// Read a single field
    GetField { id: String, field: String },

    /// Write a single field
    SetField {
        id: String,
        field: String,
        value: String,
    },

    /// Delete a record (idempotent)
    Delete { id: String },
}

#[derive(Subcommand)]
enum RecoverCommands {
    /// delete branch, mark discarded, keep the record for audit
    Cleanup {
        #[arg(long)]
        task: String,
    },

    /// stash, rebase onto the reference branch, reapply the stash
    PostWork {
        #[arg(long)]
        task: String,

        /// Reference branch to rebase onto
        #[arg(long, default_value = salvor::DEFAULT_REFERENCE_BRANCH)]
        reference: String,
    },

    /// Hard-reset to a commit (destructive, not reversible)
    Reset {
        #[arg(long)]
        task: String,

        /// Target commit (defaults to the task's last good commit)
        #[arg(long)]
        commit: Option<String>,

        /// Required acknowledgement that history will move
        #[arg(long)]
        force: bool,
    },

    /// Delete the task's branch (idempotent)
    DeleteBranch {
        #[arg(long)]
        task: String,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Open a review request for the task's branch
    Create {
        #[arg(long)]
        task: String,
    },

    /// Query the review request's remote state
    Status {
        #[arg(long)]
        task: String,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Append a note entry
    Add {
        /// Who is writing the note
        #[arg(long, default_value = "cli")]
        source: String,

        /// One-line summary
        #[arg(long)]
        hint: String,

        /// Full note text
        content: String,
    },

    /// Mark an entry done
    Done { id: u64 },

    /// Dismiss an entry
    Discard { id: u64 },

    /// List all entries
    List,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "salvor=debug,info"
    } else {
        "salvor=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let workspace = cli.workspace.canonicalize().unwrap_or(cli.workspace.clone());
    if !workspace.exists() {
        eprintln!(
            "{} Workspace directory does not exist: {}",
            "Error:".red().bold(),
            workspace.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(&workspace, cli.command) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn run(workspace: &Path, command: Commands) -> Result<()> {
    match command {
        Commands::Task { command } => run_task(workspace, command),
        Commands::Report { task, reference } => run_report(workspace, task, reference),
        Commands::Recover { command } => run_recover(workspace, command),
        Commands::Review { command } => run_review(workspace, command),
        Commands::Note { command } => run_note(workspace, command),
    }
}

fn open_store(workspace: &Path) -> Result<TaskStore> {
    TaskStore::ensure_state_dir(workspace)?;
    TaskStore::open(TaskStore::default_dir(workspace))
}

fn run_task(workspace: &Path, command: TaskCommands) -> Result<()> {
    let store = open_store(workspace)?;

    match command {
        TaskCommands::Create {
            id,
            model,
            prompt,
            prompt_file,
            depth,
            parent,
            branch,
            set_current,
        } => {
            let prompt = match (prompt, prompt_file) {
                (Some(p), _) => p,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (None, None) => {
                    return Err(SalvorError::invalid_argument(
                        "prompt",
                        "provide --prompt or --prompt-file",
                    ));
                }
            };

            let id = id.unwrap_or_else(|| {
                format!("t-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
            });

            let record = store.create(&id, &prompt, &model, depth, parent)?;

            // Anchor the rollback point at spawn time when inside a repo.
            if let Ok(inspector) = GitInspector::open(workspace) {
                let head = inspector.head_commit()?;
                store.write_field(&id, "last_good_commit", &head)?;
            }
            if let Some(branch) = branch {
                store.write_field(&id, "branch_name", &branch)?;
            }
            if set_current {
                let path = SessionPointer::default_path(workspace);
                let mut pointer = SessionPointer::load(&path)?;
                pointer.set(SessionPointer::CURRENT_TASK, &record.id);
                pointer.save(&path)?;
            }

            println!("{} task {} created", "Created:".green().bold(), record.id);
        }

        TaskCommands::List => {
            for summary in store.list()? {
                println!(
                    "{}  {:<10}  {:<12}  {}",
                    summary.id,
                    summary.status.to_string(),
                    summary.model,
                    summary.created_at.to_rfc3339()
                );
            }
        }

        TaskCommands::Show { id } => {
            let record = store.read(&id)?;
            println!("{}", "Task record".bold());
            println!("  id:               {}", record.id);
            println!("  status:           {}", record.status);
            println!("  model:            {}", record.model);
            println!("  depth:            {}", record.depth);
            if let Some(parent) = &record.parent_id {
                println!("  parent_id:        {}", parent);
            }
            if let Some(branch) = &record.branch_name {
                println!("  branch_name:      {}", branch);
            }
            if let Some(review) = &record.review_ref {
                println!("  review_ref:       {}", review);
            }
            if let Some(commit) = &record.last_good_commit {
                println!("  last_good_commit: {}", commit);
            }
            println!("  created_at:       {}", record.created_at.to_rfc3339());
            println!("  updated_at:       {}", record.updated_at.to_rfc3339());
            println!("\n{}\n{}", "Prompt".bold(), record.prompt);
            if !record.notes.is_empty() {
                println!("{}", "Notes".bold());
                for note in &record.notes {
                    println!("  [{}] {}", note.timestamp.to_rfc3339(), note.text);
                }
            }
        }

        TaskCommands::Validate { id } => {
            if store.validate(&id) {
                println!("{} record {} is intact", "OK:".green().bold(), id);
            } else {
                return Err(SalvorError::validation(id, "integrity check failed"));
            }
        }

        TaskCommands::Note { id, text } => {
            store.append_note(&id, &text)?;
            println!("{} note appended to {}", "OK:".green().bold(), id);
        }

        TaskCommands::GetField { id, field } => {
            println!("{}", store.read_field(&id, &field)?);
        }

        TaskCommands::SetField { id, field, value } => {
            store.write_field(&id, &field, &value)?;
            println!("{} {}.{} updated", "OK:".green().bold(), id, field);
        }

        TaskCommands::Delete { id } => {
            store.delete(&id)?;
            println!("{} task {} deleted", "OK:".green().bold(), id);
        }
    }
    Ok(())
}

fn run_report(workspace: &Path, task: Option<String>, reference: String) -> Result<()> {
    let store = open_store(workspace)?;
    let inspector = GitInspector::open(workspace)?;

    // gh may be absent; the reporter only needs the host for tasks that
    // carry a review_ref, so keep its absence non-fatal here.
    let gh = GhReviewHost::new(workspace).ok();
    let mut reporter = Reporter::new(&store, &inspector).with_reference_branch(reference);
    if let Some(gh) = gh.as_ref() {
        reporter = reporter.with_review_host(gh as &dyn ReviewHost);
    }

    let report = match task {
        Some(id) => reporter.generate_for(&id)?,
        None => {
            let pointer = SessionPointer::load(&SessionPointer::default_path(workspace))?;
            reporter.generate(&pointer)?
        }
    };

    println!("{}", report.to_json()?);
    Ok(())
}

fn run_recover(workspace: &Path, command: RecoverCommands) -> Result<()> {
    let store = open_store(workspace)?;
    let inspector = GitInspector::open(workspace)?;
    let notes = NoteStore::open(NoteStore::default_path(workspace))?;

    match command {
        RecoverCommands::Cleanup { task } => {
            let record = store.read(&task)?;
            let executor =
                RecoveryExecutor::new(&store, &inspector).with_note_store(&notes);
            let outcome = executor.cleanup_orphaned_task(&record)?;
            println!("{} {}", "Recovered:".green().bold(), outcome.summary());
        }

        RecoverCommands::PostWork { task, reference } => {
            let record = store.read(&task)?;
            let executor = RecoveryExecutor::new(&store, &inspector)
                .with_reference_branch(reference)
                .with_note_store(&notes);
            let outcome = executor.post_work_recovery(&record)?;
            println!("{} {}", "Recovered:".green().bold(), outcome.summary());
        }

        RecoverCommands::Reset {
            task,
            commit,
            force,
        } => {
            if !force {
                return Err(SalvorError::invalid_argument(
                    "force",
                    "reset moves history; pass --force to confirm",
                ));
            }
            let record = store.read(&task)?;
            let commit = match commit.or_else(|| record.last_good_commit.clone()) {
                Some(c) => c,
                None => {
                    return Err(SalvorError::invalid_argument(
                        "commit",
                        "task has no last good commit; pass --commit",
                    ));
                }
            };
            let executor =
                RecoveryExecutor::new(&store, &inspector).with_note_store(&notes);
            executor.reset_to_commit(&record, &commit)?;
            store.append_note(&task, &format!("reset to {}", commit))?;
            println!("{} reset to {}", "Recovered:".green().bold(), commit);
        }

        RecoverCommands::DeleteBranch { task } => {
            let record = store.read(&task)?;
            let executor =
                RecoveryExecutor::new(&store, &inspector).with_note_store(&notes);
            executor.delete_branch(&record)?;
            println!("{} branch removed (or already absent)", "OK:".green().bold());
        }
    }
    Ok(())
}

fn run_review(workspace: &Path, command: ReviewCommands) -> Result<()> {
    let store = open_store(workspace)?;
    let inspector = GitInspector::open(workspace)?;
    let gh = GhReviewHost::new(workspace)?;

    match command {
        ReviewCommands::Create { task } => {
            let record = store.read(&task)?;
            let executor = RecoveryExecutor::new(&store, &inspector).with_review_host(&gh);
            let review_ref = executor.create_review_request(&record)?;
            println!(
                "{} review request {} created",
                "OK:".green().bold(),
                review_ref
            );
        }

        ReviewCommands::Status { task } => {
            let record = store.read(&task)?;
            let executor = RecoveryExecutor::new(&store, &inspector).with_review_host(&gh);
            let status = executor.check_review_status(&record)?;
            println!("{}", status);
        }
    }
    Ok(())
}

fn run_note(workspace: &Path, command: NoteCommands) -> Result<()> {
    let notes = NoteStore::open(NoteStore::default_path(workspace))?;

    match command {
        NoteCommands::Add {
            source,
            hint,
            content,
        } => {
            let entry = notes.append(source, hint, content)?;
            println!("{} note {} added", "OK:".green().bold(), entry.id);
        }

        NoteCommands::Done { id } => {
            notes.set_status(id, NoteStatus::Done)?;
            println!("{} note {} done", "OK:".green().bold(), id);
        }

        NoteCommands::Discard { id } => {
            notes.set_status(id, NoteStatus::Discard)?;
            println!("{} note {} discarded", "OK:".green().bold(), id);
        }

        NoteCommands::List => {
            for entry in notes.entries()? {
                println!(
                    "{:>4}  {:<8}  {:<20}  {}",
                    entry.id,
                    entry.status.to_string(),
                    entry.source,
                    entry.short_hint
                );
            }
        }
    }
    Ok(())
}
