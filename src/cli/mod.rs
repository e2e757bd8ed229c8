pub mod commands;
pub mod output;

use crate::errors::Result;
use crate::stack::RunOptions;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "restack")]
#[command(about = "Keep a stack of feature branches rebased on a moving upstream")]
#[command(version)]
pub struct Cli {
    /// Stack configuration file
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Flags shared by sync and the mutating commands
#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Generate backup branches before rewriting
    #[arg(long, short)]
    pub backup: bool,

    /// Keep the working folder after the run
    #[arg(long, short)]
    pub keep: bool,

    /// Don't push anything, keep everything local
    #[arg(long, short)]
    pub local: bool,

    /// Working folder, otherwise a new temporary folder is used
    #[arg(long, short = 'd')]
    pub dir: Option<PathBuf>,
}

impl RunArgs {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            backup: self.backup,
            keep: self.keep,
            local: self.local,
            dir: self.dir.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay every feature branch onto the moving base
    Sync {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Validate declared statuses and branches against the remotes
    Check,

    /// Insert a new feature branch into the stack
    Add {
        /// Branch name of the new feature
        name: String,
        /// Declared remote the branch lives on
        remote: String,
        /// Feature to insert after (defaults to the end of the stack)
        #[arg(long)]
        after: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Drop a feature branch from the stack
    Remove {
        /// Feature to remove
        name: String,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Replace a feature branch's content from another branch
    Update {
        /// Feature to update
        name: String,
        /// remote/branch reference to take the new content from
        from: String,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Mark a merging feature as folded into the base and resync
    Integrate {
        /// Feature that has been merged upstream
        name: String,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Render a markdown summary of the stack
    Report,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Sync { run } => commands::sync::run(&self.config, &run),
            Commands::Check => commands::check::run(&self.config),
            Commands::Add {
                name,
                remote,
                after,
                run,
            } => commands::add::run(&self.config, &name, &remote, after.as_deref(), &run),
            Commands::Remove { name, run } => commands::remove::run(&self.config, &name, &run),
            Commands::Update { name, from, run } => {
                commands::update::run(&self.config, &name, &from, &run)
            }
            Commands::Integrate { name, run } => {
                commands::integrate::run(&self.config, &name, &run)
            }
            Commands::Report => commands::report::run(&self.config),
            Commands::Completions { shell } => commands::completions::run(shell),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time()
            .init();
    }
}
