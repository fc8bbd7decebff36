//! `strata` command line

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use strata_engine::LocalEngine;
use strata_orchestrator::{init_tracing, Orchestrator, ProvisionError};
use strata_store::FileParameterStore;
use strata_units::{RunContext, StrataConfig, UnitKind};

const PARAMETERS_FILE: &str = "parameters.json";
const ENGINE_FILE: &str = "engine.json";

fn unit_arg() -> Arg {
    Arg::new("unit")
        .value_parser(|s: &str| s.parse::<UnitKind>())
        .help("network, access-roles, artifact-repository, cluster or service")
}

fn cli() -> Command {
    Command::new("strata")
        .version(strata_orchestrator::VERSION)
        .about("Apply staged provisioning units wired through a shared parameter store")
        .subcommand_required(true)
        .arg(
            Arg::new("stage")
                .long("stage")
                .env("STRATA_STAGE")
                .help("Stage to operate on (defaults to the configured baseline stage)"),
        )
        .arg(
            Arg::new("vpc-id")
                .long("vpc-id")
                .help("Use this network id instead of the published one"),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .default_value(".strata")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding parameter and engine state"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (defaults to strata.toml if present)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(Command::new("plan").about("Show apply waves and stack names"))
        .subcommand(
            Command::new("apply")
                .about("Apply one unit, or every unit in dependency order")
                .arg(unit_arg().required_unless_present("all"))
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("unit")
                        .help("Apply every unit"),
                ),
        )
        .subcommand(
            Command::new("destroy")
                .about("Tear down one unit and withdraw its keys")
                .arg(unit_arg().required(true))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Override termination protection"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show deployment and readiness of every unit")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(Command::new("keys").about("List keys published for the stage"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if err
                .downcast_ref::<ProvisionError>()
                .is_some_and(ProvisionError::is_retryable)
            {
                eprintln!("hint: re-running the same command may succeed");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config_path = matches.get_one::<PathBuf>("config");
    let config = StrataConfig::load(config_path.map(PathBuf::as_path))
        .context("loading configuration")?;
    let ctx = RunContext::resolve(
        &config,
        matches.get_one::<String>("stage").map(String::as_str),
        matches.get_one::<String>("vpc-id").cloned(),
    )?;

    let state_dir = matches
        .get_one::<PathBuf>("state-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(".strata"));
    tokio::fs::create_dir_all(&state_dir)
        .await
        .with_context(|| format!("creating {}", state_dir.display()))?;

    let store = Arc::new(FileParameterStore::new(state_dir.join(PARAMETERS_FILE)));
    let engine = Arc::new(LocalEngine::open(state_dir.join(ENGINE_FILE)).await?);
    let orchestrator = Orchestrator::new(&config, store, engine)?;

    match matches.subcommand() {
        Some(("plan", _)) => {
            println!("stage {}", ctx.stage());
            for (index, wave) in orchestrator.plan()?.into_iter().enumerate() {
                println!("wave {}:", index + 1);
                for unit in wave {
                    println!("  {:<20} {}", unit, orchestrator.stack_name(&ctx, unit)?);
                }
            }
        }
        Some(("apply", args)) => {
            if args.get_flag("all") {
                for report in orchestrator.apply_all(&ctx).await? {
                    print!("{report}");
                }
            } else if let Some(unit) = args.get_one::<UnitKind>("unit") {
                print!("{}", orchestrator.apply(&ctx, *unit).await?);
            }
        }
        Some(("destroy", args)) => {
            if let Some(unit) = args.get_one::<UnitKind>("unit") {
                let report = orchestrator
                    .teardown(&ctx, *unit, args.get_flag("force"))
                    .await?;
                if report.stack_removed {
                    println!("{} ({}) removed", report.unit, report.stack_name);
                } else {
                    println!("{} ({}) was not deployed", report.unit, report.stack_name);
                }
                for key in report.deleted_keys {
                    println!("  withdrew {key}");
                }
            }
        }
        Some(("status", args)) => {
            let statuses = orchestrator.status(&ctx).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                println!("stage {}", ctx.stage());
                for status in statuses {
                    println!("  {status}");
                }
            }
        }
        Some(("keys", _)) => {
            for record in orchestrator.published_keys(&ctx).await? {
                println!(
                    "{} = {} (v{}, written by {})",
                    record.key, record.value, record.version, record.written_by
                );
            }
        }
        Some((other, _)) => anyhow::bail!("unknown command {other}"),
        None => anyhow::bail!("a command is required"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn apply_parses_unit_names() {
        let matches = cli()
            .try_get_matches_from(["strata", "--stage", "prod", "apply", "cluster"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("stage").map(String::as_str),
            Some("prod")
        );
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "apply");
        assert_eq!(args.get_one::<UnitKind>("unit"), Some(&UnitKind::Cluster));
    }

    #[test]
    fn apply_requires_unit_or_all() {
        assert!(cli().try_get_matches_from(["strata", "apply"]).is_err());
        assert!(cli()
            .try_get_matches_from(["strata", "apply", "--all"])
            .is_ok());
        assert!(cli()
            .try_get_matches_from(["strata", "apply", "bogus"])
            .is_err());
    }

    #[test]
    fn destroy_accepts_force() {
        let matches = cli()
            .try_get_matches_from(["strata", "destroy", "service", "--force"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(args.get_flag("force"));
    }
}
