pub mod commands;
pub mod output;

use crate::errors::Result;
use crate::stack::RestackScope;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bst")]
#[command(about = "Stacked branches on top of git")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the repository
    Init {
        /// Trunk branch (defaults to main, master, or the current branch)
        #[arg(long)]
        trunk: Option<String>,

        /// Re-initialize even if already initialized
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Create a branch on top of the current one
    Create {
        name: String,

        /// Commit staged changes onto the new branch with this message
        #[arg(long, short)]
        message: Option<String>,

        /// Stage every change first, untracked files included
        #[arg(long, short)]
        all: bool,
    },

    /// Commit on the current branch and restack the branches above it
    Commit {
        #[command(subcommand)]
        action: CommitAction,
    },

    /// Record the parent of an existing branch
    Track {
        /// Branch to track (defaults to the current branch)
        branch: Option<String>,

        /// Parent branch
        #[arg(long, short)]
        parent: String,
    },

    /// Rename a branch, keeping its place in the stack
    Rename {
        new_name: String,

        /// Branch to rename (defaults to the current branch)
        #[arg(long, short)]
        branch: Option<String>,
    },

    /// Delete branches, moving their children onto the nearest surviving ancestor
    Delete {
        #[arg(required = true)]
        branches: Vec<String>,

        /// Delete even if not merged into trunk
        #[arg(long, short)]
        force: bool,

        /// Leave children where they are; the graph re-parents them lazily
        #[arg(long)]
        no_restack: bool,
    },

    /// Check out the child of the current branch
    Up,

    /// Check out the parent of the current branch
    Down,

    /// Move a branch and everything above it onto another branch
    Onto {
        onto: String,

        /// Branch to move (defaults to the current branch)
        #[arg(long, short)]
        branch: Option<String>,
    },

    /// Rebase branches onto their parents' current tips
    Restack {
        /// Branch to start from (defaults to the current branch)
        #[arg(long, short)]
        branch: Option<String>,

        #[arg(long, value_enum, default_value_t = ScopeArg::Stack)]
        scope: ScopeArg,
    },

    /// Pull trunk, clean up merged branches, and restack every stack
    Sync {
        /// Fast-forward trunk from the remote first
        #[arg(long)]
        pull: bool,

        /// Delete branches whose pull request is merged or closed
        #[arg(long)]
        delete: bool,
    },

    /// Rewrite branch commits from todo files, then restack above them
    Edit {
        /// Branches to edit, lowest first
        #[arg(required = true)]
        branches: Vec<String>,

        /// Todo file for each branch, in the same order
        #[arg(long = "todo", required = true)]
        todos: Vec<PathBuf>,
    },

    /// Resume the operation stopped on a conflict
    Continue {
        /// Stage all changes before continuing
        #[arg(long, short)]
        all: bool,
    },

    /// Abandon the operation stopped on a conflict
    Abort,

    /// Show the state of a stopped operation
    Status,

    /// Show the branch tree
    Log {
        /// Use commit ancestry instead of recorded parents
        #[arg(long)]
        ancestry: bool,

        /// Include every branch regardless of the recency limits
        #[arg(long)]
        all: bool,
    },

    /// Cached pull-request information
    Pr {
        #[command(subcommand)]
        action: PrAction,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScopeArg {
    Branch,
    Upstack,
    Stack,
}

impl From<ScopeArg> for RestackScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Branch => RestackScope::Branch,
            ScopeArg::Upstack => RestackScope::Upstack,
            ScopeArg::Stack => RestackScope::Stack,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set { key: String, value: String },

    /// Get a configuration value
    Get { key: String },

    /// List all configuration values
    List,

    /// Hide branches matching a regular expression
    Ignore { pattern: String },

    /// Remove an ignore pattern
    Unignore { pattern: String },
}

#[derive(Subcommand)]
pub enum CommitAction {
    /// Add a new commit
    Create {
        #[arg(long, short)]
        message: String,

        /// Stage every change first, untracked files included
        #[arg(long, short)]
        all: bool,
    },

    /// Amend the branch's last commit, keeping its message unless one is given
    Amend {
        #[arg(long, short)]
        message: Option<String>,

        /// Stage every change first, untracked files included
        #[arg(long, short)]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum PrAction {
    /// Record the pull request of a branch
    Set {
        branch: String,
        #[arg(long)]
        number: u64,
        /// OPEN, MERGED, or CLOSED
        #[arg(long, default_value = "OPEN")]
        state: String,
        /// Base branch the pull request targets
        #[arg(long)]
        base: Option<String>,
    },

    /// Forget the pull request of a branch
    Clear { branch: String },

    /// List branches in a stack whose pull request is merged or closed
    Blockers {
        #[arg(long, short)]
        branch: Option<String>,
    },
}

impl Cli {
    /// Returns the process exit code; non-zero when an operation stopped on a conflict
    pub fn run(self) -> Result<i32> {
        self.setup_logging();

        if self.no_color {
            console::set_colors_enabled(false);
        }

        match self.command {
            Commands::Init { trunk, force } => commands::init::run(trunk, force).map(|_| 0),
            Commands::Config { action } => commands::config::run(action).map(|_| 0),
            Commands::Create { name, message, all } => {
                commands::branch::create(&name, message, all).map(|_| 0)
            }
            Commands::Commit { action } => commands::commit::run(action),
            Commands::Track { branch, parent } => {
                commands::branch::track(branch, &parent).map(|_| 0)
            }
            Commands::Rename { new_name, branch } => {
                commands::branch::rename(branch, &new_name).map(|_| 0)
            }
            Commands::Delete {
                branches,
                force,
                no_restack,
            } => commands::branch::delete(branches, force, no_restack),
            Commands::Up => commands::branch::up().map(|_| 0),
            Commands::Down => commands::branch::down().map(|_| 0),
            Commands::Onto { onto, branch } => commands::restack::onto(branch, &onto),
            Commands::Restack { branch, scope } => commands::restack::restack(branch, scope.into()),
            Commands::Sync { pull, delete } => commands::restack::sync(pull, delete),
            Commands::Edit { branches, todos } => commands::restack::edit(branches, todos),
            Commands::Continue { all } => commands::resume::continue_operation(all),
            Commands::Abort => commands::resume::abort().map(|_| 0),
            Commands::Status => commands::resume::status().map(|_| 0),
            Commands::Log { ancestry, all } => commands::log::run(ancestry, all).map(|_| 0),
            Commands::Pr { action } => commands::pr::run(action).map(|_| 0),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr);

        if self.no_color {
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
