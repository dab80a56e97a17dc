use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use toolkit_engine::{ActionBackend, EngineConfig, StepOutcome, Wizard, WizardState, parse_tool_file};
use toolkit_types::validate_tool_definition;
use tracing::{Level, info};

/// Upper bound on advances in one headless run; guards cyclic tool graphs.
const MAX_ADVANCES: usize = 200;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("validate", sub)) => run_validate(sub),
        Some(("run", sub)) => run_tool(sub).await,
        _ => {
            println!("Available subcommands: validate, run");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    Command::new("toolkit")
        .about("Run and check declarative toolkit tools")
        .subcommand(
            Command::new("validate")
                .about("Check a tool definition file for structural problems")
                .arg(Arg::new("file").required(true).action(ArgAction::Set).help("Path to tool JSON/YAML")),
        )
        .subcommand(
            Command::new("run")
                .about("Run a tool headlessly, answering each step from a file")
                .arg(Arg::new("tool").required(true).action(ArgAction::Set).help("Tool identifier"))
                .arg(
                    Arg::new("definition")
                        .long("definition")
                        .short('d')
                        .action(ArgAction::Set)
                        .help("Use a local definition instead of fetching it"),
                )
                .arg(
                    Arg::new("answers")
                        .long("answers")
                        .short('a')
                        .action(ArgAction::Set)
                        .help("JSON file of answers keyed by step id, then field id"),
                )
                .arg(
                    Arg::new("base-url")
                        .long("base-url")
                        .action(ArgAction::Set)
                        .help("Backend base URL (overrides config and TOOLKIT_API_BASE)"),
                ),
        )
}

fn run_validate(matches: &ArgMatches) -> Result<()> {
    let file = matches.get_one::<String>("file").context("missing file argument")?;
    let tool = parse_tool_file(file)?;
    validate_tool_definition(&tool).with_context(|| format!("{} is not a valid tool", file))?;

    let actions: usize = tool.steps.iter().map(|step| step.on_submit.len()).sum();
    println!("{}: {} steps, {} actions; ok", tool.id, tool.steps.len(), actions);
    Ok(())
}

async fn run_tool(matches: &ArgMatches) -> Result<()> {
    let tool_id = matches.get_one::<String>("tool").context("missing tool argument")?;

    let mut config = EngineConfig::load();
    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config.api_base_url = base_url.clone();
    }
    let mut wizard = Wizard::from_config(config)?;

    match matches.get_one::<String>("definition") {
        Some(path) => {
            let mut tool = parse_tool_file(path)?;
            tool.id = tool_id.clone();
            wizard.load_definition(tool);
        }
        None => wizard.load_tool(tool_id).await,
    }

    let answers = match matches.get_one::<String>("answers") {
        Some(path) => load_answers(Path::new(path))?,
        None => IndexMap::new(),
    };

    drive(&mut wizard, &answers).await?;

    let session = wizard.session();
    let summary = json!({
        "state": wizard.state(),
        "history": session.history,
        "formData": session.form_data,
        "responseData": session.response_data,
        "message": session.message,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Feeds answers into each step and advances until the tool completes or fails.
async fn drive<B: ActionBackend>(wizard: &mut Wizard<B>, answers: &IndexMap<String, Map<String, Value>>) -> Result<()> {
    for _ in 0..MAX_ADVANCES {
        let step_id = match wizard.state() {
            WizardState::Ready { step_id } => step_id,
            WizardState::Completed => return Ok(()),
            WizardState::LoadFailed { message } => bail!(message),
            WizardState::Failed { step_id, message } => bail!("step '{}' failed: {}", step_id, message),
            other => bail!("unexpected wizard state: {:?}", other),
        };

        if let Some(step_answers) = answers.get(&step_id) {
            for (field_id, value) in step_answers {
                wizard.update_field(field_id, value.clone());
            }
        }

        info!(step_id = %step_id, "advancing");
        let mut outcome = wizard.advance_step(&step_id).await;
        if outcome == StepOutcome::AwaitingJob {
            outcome = wizard.await_job().await;
        }

        match outcome {
            StepOutcome::Invalid => {
                let problems: Vec<String> = wizard
                    .validation_errors()
                    .iter()
                    .map(|(field, message)| format!("{field}: {message}"))
                    .collect();
                bail!("step '{}' is incomplete: {}", step_id, problems.join("; "));
            }
            StepOutcome::Ignored => return Err(anyhow!("step '{}' refused to advance", step_id)),
            StepOutcome::Completed => return Ok(()),
            StepOutcome::Failed | StepOutcome::Navigated(_) | StepOutcome::AwaitingJob => {}
        }
    }
    bail!("gave up after {} advances; the tool graph may loop", MAX_ADVANCES)
}

fn load_answers(path: &Path) -> Result<IndexMap<String, Map<String, Value>>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read answers file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid answers JSON: {}", path.display()))
}
