pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use claimly_core::config::{AppConfig, LogFormat, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "claimly",
    about = "Claimly expense approval CLI",
    long_about = "Inspect configuration, load demo data, list approval rules, and replay approval scenarios.",
    after_help = "Examples:\n  claimly config\n  claimly rules\n  claimly evaluate scenario.toml"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a claimly.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Load the demo dataset and evaluate every pending expense")]
    Seed,
    #[command(about = "List the approval rule catalog grouped by rule type")]
    Rules,
    #[command(about = "Replay a scenario file of approver actions and print the outcome")]
    Evaluate {
        #[arg(help = "TOML scenario with users, rules, one expense and its actions")]
        scenario: PathBuf,
    },
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Commands report config failures themselves.
    let options = LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() };
    if let Ok(config) = AppConfig::load(options) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Seed => commands::seed::run(config_path),
        Command::Rules => commands::rules::run(config_path),
        Command::Evaluate { scenario } => commands::evaluate::run(config_path, &scenario),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
