mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use androsh_fs::HashAlgorithm;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "androsh",
    version,
    about = "Run commands and manage files through the Shizuku privileged shell"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (default: $ANDROSH_CONFIG, then ~/.config/androsh/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory checked first for the exported rish payload
    #[arg(long, global = true)]
    pub resources: Option<PathBuf>,

    /// Privileged-shell loader executable
    #[arg(long, global = true)]
    pub loader: Option<PathBuf>,

    /// Application id exported as RISH_APPLICATION_ID
    #[arg(long, global = true)]
    pub app_id: Option<String>,

    /// Export the application id even if the environment already sets one
    #[arg(long, global = true)]
    pub force_app_id: bool,

    /// Busybox binary on the device
    #[arg(long, global = true)]
    pub busybox: Option<String>,

    /// Per-command timeout in seconds (0 waits forever)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the privileged shell answers
    Check,

    /// Run one command and exit with its status
    Run {
        /// Command line, passed to the shell as one string
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Hand the terminal to the privileged shell
    Shell {
        /// Command to run instead of an interactive shell
        command: Option<String>,
    },

    /// File operations
    Fs {
        /// Backend to use; auto tries direct, busybox, then shell
        #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
        backend: BackendChoice,

        #[command(subcommand)]
        op: FsOp,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    Auto,
    Direct,
    Busybox,
    Shell,
}

#[derive(Subcommand, Debug)]
pub enum FsOp {
    /// Exit 0 if the path exists
    Exists { path: String },
    /// Exit 0 if the path is a regular file
    IsFile { path: String },
    /// Exit 0 if the path is a directory
    IsDir { path: String },
    /// Create a directory
    Mkdir {
        path: String,
        #[arg(short, long)]
        parents: bool,
    },
    /// Remove a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
        #[arg(short, long)]
        force: bool,
    },
    /// Empty a directory and keep it
    Clean { path: String },
    /// Copy a file or directory
    Cp {
        src: String,
        dst: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move a file or directory
    Mv { src: String, dst: String },
    /// Rename within the same directory
    Rename { path: String, new_name: String },
    /// Change permission bits (octal)
    Chmod {
        #[arg(value_parser = parse_mode)]
        mode: u32,
        path: String,
        #[arg(short = 'R', long)]
        recursive: bool,
    },
    /// Change ownership
    Chown {
        owner: String,
        path: String,
        #[arg(long)]
        group: Option<String>,
        #[arg(short = 'R', long)]
        recursive: bool,
    },
    /// Print a file
    Cat { path: String },
    /// Replace a file's content
    Write { path: String, content: String },
    /// Append to a file
    Append { path: String, content: String },
    /// List a directory
    Ls {
        path: String,
        /// Glob matched against entry names
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Print a file digest
    Checksum {
        path: String,
        #[arg(long, default_value = "sha256", value_parser = parse_algorithm)]
        algo: HashAlgorithm,
    },
    /// Exit 0 if the file matches the digest
    Verify {
        path: String,
        digest: String,
        #[arg(long, default_value = "sha256", value_parser = parse_algorithm)]
        algo: HashAlgorithm,
    },
    /// Show file metadata
    Info {
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Create a symbolic link
    Ln { target: String, link: String },
    /// Print a symbolic link's target
    Readlink { link: String },
    /// Extract a tar archive into a directory
    Untar { archive: String, target: String },
    /// Show usage of the filesystem holding a path
    Df { path: String },
}

fn parse_mode(raw: &str) -> Result<u32, String> {
    let digits = raw.trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| format!("invalid octal mode: {raw}"))
}

fn parse_algorithm(raw: &str) -> Result<HashAlgorithm, String> {
    raw.parse()
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let cfg = config::load_runtime_config(&cli.global)?;

    match cli.command {
        Commands::Check => commands::check(&cfg),
        Commands::Run { command } => commands::run(&cfg, &command.join(" ")),
        Commands::Shell { command } => commands::shell(&cfg, command.as_deref().unwrap_or("")),
        Commands::Fs { backend, op } => commands::fs(&cfg, backend, op),
    }
}
