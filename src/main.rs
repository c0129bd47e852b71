use clap::Parser;
use tracing_subscriber::EnvFilter;
use v2r::cli;
use v2r::config;
use v2r::errors::V2rError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 if cli.quiet => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // stdout carries results; logs go to stderr
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .with_writer(std::io::stderr)
            .init();
    }

    let quiet = cli.quiet;
    let result = match cli.command {
        cli::Commands::Reproduce(args) => cli::reproduce::handle_reproduce(args, quiet).await,
        cli::Commands::Batch(args) => cli::batch::handle_batch(args, quiet).await,
        cli::Commands::Score(args) => cli::score::handle_score(args).await,
        cli::Commands::Validate(args) => handle_validate(args).await,
        cli::Commands::Ping(args) => cli::ping::handle_ping(args).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            let exit_code = match &e {
                V2rError::Config(_) | V2rError::Yaml(_) => 2,
                V2rError::Container(_)
                | V2rError::ImageNotFound(_)
                | V2rError::RuntimeUnavailable(_)
                | V2rError::Docker(_) => 3,
                V2rError::InvalidRequest(_) => 5,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), V2rError> {
    let path = std::path::PathBuf::from(&args.config);
    let _config = config::parse_config(&path).await?;
    match option_env!("GIT_HASH") {
        Some(hash) => println!("Configuration is valid: {} (v2r {}+{})", args.config, env!("CARGO_PKG_VERSION"), hash),
        None => println!("Configuration is valid: {}", args.config),
    }
    Ok(())
}
