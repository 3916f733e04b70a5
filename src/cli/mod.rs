mod catalog;
mod output;
mod serve;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use frontdesk::AppConfig;
use frontdesk::config::DEFAULT_CONFIG_FILE;
use frontdesk::logging::{LogTap, init_logging};

pub(crate) use output::print_error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Serve,
    Recipes,
    Validate(PathBuf),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub config: PathBuf,
    pub command: Command,
}

fn print_help() {
    println!("{}", style("frontdesk").bold().green());
    println!("  Routes chat requests to recipes and runs them by priority.\n");
    println!("  {}  read JSON turns from stdin, print replies", style("serve   ").cyan());
    println!("  {}  list the loaded recipe catalog", style("recipes ").cyan());
    println!("  {}  check a YAML recipe file", style("validate FILE").cyan());
    println!(
        "\n {} frontdesk [--config PATH] <command>\n",
        style("Usage:").bold()
    );
}

pub(crate) fn parse_cli_args(args: &[String]) -> Result<CliArgs> {
    let mut config = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut positional: Vec<&str> = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let Some(path) = args.get(i + 1) else {
                    anyhow::bail!("--config needs a path");
                };
                config = PathBuf::from(path);
                i += 2;
            }
            "--help" | "-h" => {
                positional.push("help");
                i += 1;
            }
            other => {
                positional.push(other);
                i += 1;
            }
        }
    }

    let command = match positional.as_slice() {
        [] | ["serve"] => Command::Serve,
        ["recipes"] => Command::Recipes,
        ["validate", file] => Command::Validate(PathBuf::from(file)),
        ["validate"] => anyhow::bail!("validate needs a recipe file"),
        ["help", ..] => Command::Help,
        [other, ..] => anyhow::bail!("unknown command `{}`", other),
    };
    Ok(CliArgs { config, command })
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_cli_args(&args)?;
    if cli.command == Command::Help {
        print_help();
        return Ok(());
    }

    let config = AppConfig::load(&cli.config).await?;
    let tap = LogTap::new(500, false);
    init_logging(&config.logging.level, tap)?;

    match cli.command {
        Command::Serve => serve::run(&config).await,
        Command::Recipes => catalog::list_recipes(&config).await,
        Command::Validate(path) => catalog::validate_file(&path).await,
        Command::Help => Ok(()),
    }
}
