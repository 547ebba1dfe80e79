// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use bizdesk_api::Client;
use bizdesk_app::RowId;
use config::Config;
use runtime::Session;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

/// Log to stderr so command output on stdout stays pipeable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `bizdesk --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let client = Client::new(config.base_url(), config.timeout()?, config.token()).with_context(
        || {
            format!(
                "invalid [api] config in {}; fix base_url/timeout values",
                options.config_path.display()
            )
        },
    )?;
    if options.check_only {
        return Ok(());
    }

    let Some(command) = options.command else {
        bail!("no command given; run with --help to see supported commands");
    };
    tracing::debug!(command = command.name(), base_url = client.base_url(), "running");

    let session = Session::new(&client, &config);
    match command {
        Command::Schema { entity } => print!("{}", session.schema(&entity)?),
        Command::List { entity, search } => {
            print!("{}", session.list(&entity, search.as_deref())?);
        }
        Command::Copy { entity, id } => println!("{}", session.copy(&entity, &id)?),
        Command::Delete { entity, id } => println!("{}", session.delete(&entity, &id)?),
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Schema { entity: String },
    List { entity: String, search: Option<String> },
    Copy { entity: String, id: RowId },
    Delete { entity: String, id: RowId },
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema",
            Self::List { .. } => "list",
            Self::Copy { .. } => "copy",
            Self::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    command: Option<Command>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
        command: None,
    };

    let mut iter = args.into_iter().map(|arg| arg.as_ref().to_owned());
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value);
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            "schema" | "list" | "copy" | "delete" if options.command.is_none() => {
                options.command = Some(parse_command(&arg, &mut iter)?);
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    Ok(options)
}

fn parse_command(name: &str, args: &mut impl Iterator<Item = String>) -> Result<Command> {
    let entity = args
        .next()
        .filter(|entity| !entity.starts_with('-'))
        .ok_or_else(|| anyhow!("{name} requires an entity name, for example `{name} accounts`"))?;

    match name {
        "schema" => Ok(Command::Schema { entity }),
        "list" => {
            let mut search = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--search" => {
                        let text = args
                            .next()
                            .ok_or_else(|| anyhow!("--search requires a search term"))?;
                        search = Some(text);
                    }
                    unknown => {
                        bail!("unknown list argument {unknown:?}; only --search <text> is supported")
                    }
                }
            }
            Ok(Command::List { entity, search })
        }
        "copy" | "delete" => {
            let id = args
                .next()
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
                .ok_or_else(|| {
                    anyhow!("{name} requires a row id, for example `{name} {entity} 42`")
                })?;
            if let Some(extra) = args.next() {
                bail!("unexpected argument {extra:?} after {name} {entity} {id}");
            }
            let id = RowId::from(id.as_str());
            if name == "copy" {
                Ok(Command::Copy { entity, id })
            } else {
                Ok(Command::Delete { entity, id })
            }
        }
        other => bail!("unknown command {other:?}"),
    }
}

fn print_help() {
    println!("bizdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --check                  Validate config and client settings");
    println!("  --help                   Show this help");
    println!();
    println!("commands:");
    println!("  schema <entity>                  Print the entity's form fields");
    println!("  list <entity> [--search <text>]  Print rows as a tab-separated table");
    println!("  copy <entity> <id>               Create a copy of a row");
    println!("  delete <entity> <id>             Delete a row (needs enable_delete)");
}
