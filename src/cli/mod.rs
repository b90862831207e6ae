//! CLI surface for persona-sync.
//!
//! Thin handlers over the library: each command builds what it needs from the
//! merged config, runs one operation and prints the result as text or JSON.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, builder::BoolishValueParser};
use serde::Serialize;

use crate::config::{self, Config};
use crate::{Error, Result};

mod commands;
mod render;

#[derive(Parser, Debug)]
#[command(
    name = "psync",
    version,
    about = "Safe persistence and sync for git-backed persona memory",
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(
        long,
        global = true,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub json: bool,

    /// Durable repository clone (default: discover from cwd).
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// User config file (default: <config dir>/persona-sync/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every configured actor until interrupted.
    Run,

    /// Run a single tick for one resource.
    Tick(TickArgs),

    /// Publish a file into the durable store.
    Publish(PublishArgs),

    /// Print the quality score of a candidate document.
    Score(ScoreArgs),

    /// Inspect or release resource locks.
    Lock {
        #[command(subcommand)]
        cmd: LockCmd,
    },

    /// Fetch and fast-forward the durable clone.
    Refresh,
}

#[derive(Args, Debug)]
pub struct TickArgs {
    /// Resource name from `[resources.<name>]`.
    pub resource: String,

    /// Run the reconcile actor instead of the persist actor.
    #[arg(long)]
    pub reconcile: bool,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Repository-relative destination path.
    pub path: String,

    /// Source file holding the new content.
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    /// Why this change is being made (commit subject).
    #[arg(long)]
    pub reason: String,

    /// Author recorded in the commit (default: identity name).
    #[arg(long)]
    pub author: Option<String>,

    /// Record the intent in the signal log instead of pushing.
    #[arg(long)]
    pub signal_only: bool,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    pub file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum LockCmd {
    /// Show who holds a resource lock and whether it is stale.
    Status { resource: String },

    /// Remove a resource lock regardless of its holder.
    Release {
        resource: String,
        #[arg(long)]
        force: bool,
    },
}

/// How a command finished; failures and conflicts exit non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Failed => 1,
        }
    }
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let raw: Vec<OsString> = args.into_iter().map(|t| t.into()).collect();
    Cli::parse_from(normalize_args(raw))
}

/// Merge config layers for this invocation. `--repo` wins over discovery
/// and over `repo.path` from any file.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let discovered = match &cli.repo {
        Some(repo) => Some(repo.clone()),
        None => config::discover_repo_root(),
    };
    let mut config = config::load_for_repo(cli.config.as_deref(), discovered.as_deref())?;
    if let Some(repo) = &cli.repo {
        config.repo.path = Some(repo.clone());
    }
    Ok(config)
}

pub fn run(cli: Cli, config: Config) -> Result<Status> {
    let ctx = Ctx {
        config,
        json: cli.json,
    };
    match cli.command {
        Commands::Run => commands::run::handle(&ctx),
        Commands::Tick(args) => commands::tick::handle(&ctx, args),
        Commands::Publish(args) => commands::publish::handle(&ctx, args),
        Commands::Score(args) => commands::score::handle(&ctx, args),
        Commands::Lock { cmd } => commands::lock::handle(&ctx, cmd),
        Commands::Refresh => commands::refresh::handle(&ctx),
    }
}

struct Ctx {
    config: Config,
    json: bool,
}

impl Ctx {
    fn print<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<()> {
        let s = if self.json {
            serde_json::to_string_pretty(value)?
        } else {
            human()
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{s}")
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(Error::Io)
}

// Accept `--signal_only` and `--Signal-Only` alongside the canonical spelling.
fn normalize_args(mut raw: Vec<OsString>) -> Vec<OsString> {
    if raw.is_empty() {
        return raw;
    }

    let mut out = Vec::with_capacity(raw.len());
    out.push(raw.remove(0));

    for arg in raw {
        let s = arg.to_string_lossy();
        if s.starts_with("--") {
            let mut pieces = s.splitn(2, '=');
            let flag = pieces.next().unwrap_or("");
            let val = pieces.next();
            let canon = canonical_flag(&flag.to_lowercase().replace('_', "-")).to_string();
            match val {
                Some(v) => out.push(OsString::from(format!("{canon}={v}"))),
                None => out.push(OsString::from(canon)),
            }
        } else {
            out.push(arg);
        }
    }
    out
}

fn canonical_flag(flag: &str) -> &str {
    match flag {
        "--dry-run" | "--signal" => "--signal-only",
        "--message" => "--reason",
        other => other,
    }
}
