use clap::{Parser, Subcommand, Args};

#[derive(Parser)]
#[command(name = "v2r", version, about = "Reproduce PoC exploits in disposable containers and score their reliability")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reproduce one PoC inside a disposable container
    Reproduce(ReproduceArgs),
    /// Reproduce and score a list of PoC jobs
    Batch(BatchArgs),
    /// Compute a reliability score
    Score(ScoreArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// Check that the container runtime is reachable
    Ping(PingArgs),
}

#[derive(Args, Clone)]
pub struct ReproduceArgs {
    /// PoC script body, or path to a local script file
    pub script: String,

    /// PoC category (rce, sql_injection, command_injection, xss, ...)
    #[arg(short = 't', long, default_value = "command_injection")]
    pub poc_type: String,

    /// Target host exposed to the script as TARGET_HOST
    #[arg(long)]
    pub target: Option<String>,

    /// Script timeout in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Run the container without network access
    #[arg(long)]
    pub no_network: bool,

    /// Collect syscall, network and filesystem evidence
    #[arg(long)]
    pub evidence: bool,

    /// Commit the container to an image before removal
    #[arg(long)]
    pub snapshot: bool,

    /// PoC source; when given, the outcome is also scored
    #[arg(long)]
    pub source: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Fail instead of degrading when the container runtime is unreachable
    #[arg(long)]
    pub strict: bool,

    /// Use the in-memory runtime instead of Docker
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON result to this file
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args, Clone)]
pub struct BatchArgs {
    /// JSON file holding an array of jobs
    #[arg(short, long)]
    pub jobs: String,

    /// Maximum reproductions in flight
    #[arg(long, default_value = "3")]
    pub concurrency: usize,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use the in-memory runtime instead of Docker
    #[arg(long)]
    pub dry_run: bool,

    /// Print the records as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON records to this file
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args, Clone)]
pub struct ScoreArgs {
    /// PoC source (exploit-db, github, security-advisory, ...)
    #[arg(long, default_value = "other")]
    pub source: String,

    /// Reproduction status: success, partial or failed
    #[arg(long)]
    pub status: String,

    /// Evidence file as kind=path (repeatable)
    #[arg(long = "evidence", value_name = "KIND=PATH")]
    pub evidence: Vec<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print the breakdown as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}

#[derive(Args, Clone)]
pub struct PingArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,
}
