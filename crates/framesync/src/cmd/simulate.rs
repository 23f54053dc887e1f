use framesync::agent::{AgentOptions, LayoutMetrics};
use framesync::schema::{RegistryConfig, SchemaRegistry};
use framesync::simulate::{Simulation, SimulationConfig, Step};
use serde_json::{Map, Value};

use crate::cmd::SimulateArgs;
use crate::exit::{agent_error, schema_error, CliError, CliResult, SUCCESS, USAGE};
use crate::logging::LogLevel;
use crate::output::{print_observed, OutputFormat};

pub fn run(args: SimulateArgs, format: OutputFormat, log_level: LogLevel) -> CliResult<i32> {
    let config = build_config(&args, log_level.agent_diagnostics())?;
    let steps = build_steps(&args)?;

    let simulation =
        Simulation::start(config).map_err(|err| agent_error("simulation failed to start", err))?;
    if let Some(dir) = &args.validate {
        let schema_config = if args.strict_schemas {
            RegistryConfig::strict()
        } else {
            RegistryConfig::default()
        };
        let registry = SchemaRegistry::from_directory_with_config(dir, schema_config)
            .map_err(|err| schema_error("failed loading schemas", err))?;
        simulation.use_schemas(registry);
    }
    for step in &steps {
        if let Step::Message { msg_type, .. } = step {
            simulation.watch(msg_type);
        }
    }
    for step in &steps {
        tracing::debug!(?step, "applying step");
        simulation.apply(step);
    }

    let observed = simulation.finish();
    print_observed(&observed, format);
    Ok(SUCCESS)
}

fn build_config(args: &SimulateArgs, log: bool) -> CliResult<SimulationConfig> {
    let initial_height = args.heights.first().copied().unwrap_or(0.0);
    let target_origin = args
        .target_origin
        .clone()
        .unwrap_or_else(|| args.parent_origin.clone());

    let mut child = AgentOptions::default()
        .with_target_origin(target_origin)
        .with_log(log);
    if let Some(raw) = &args.init_data {
        child = child.with_init_data(parse_object("--init-data", raw)?);
    }
    let parent = AgentOptions::default()
        .with_target_origin(args.child_origin.clone())
        .with_log(log);

    Ok(SimulationConfig {
        parent_origin: args.parent_origin.clone(),
        child_origin: args.child_origin.clone(),
        initial: LayoutMetrics::content(initial_height, args.width),
        child,
        parent,
    })
}

fn build_steps(args: &SimulateArgs) -> CliResult<Vec<Step>> {
    let mut steps: Vec<Step> = args.heights.iter().skip(1).copied().map(Step::Height).collect();

    for raw in &args.scrolls {
        let (left, top) = raw
            .split_once(':')
            .ok_or_else(|| CliError::new(USAGE, format!("--scrolls expects LEFT:TOP, got '{raw}'")))?;
        steps.push(Step::Scroll {
            left: parse_number("--scrolls", left)?,
            top: parse_number("--scrolls", top)?,
        });
    }

    for raw in &args.messages {
        let (msg_type, json) = raw
            .split_once('=')
            .ok_or_else(|| CliError::new(USAGE, format!("--message expects TYPE=JSON, got '{raw}'")))?;
        if msg_type.is_empty() {
            return Err(CliError::new(USAGE, "--message type must not be empty"));
        }
        steps.push(Step::Message {
            msg_type: msg_type.to_string(),
            data: Value::Object(parse_object("--message", json)?),
        });
    }

    Ok(steps)
}

fn parse_number(flag: &str, raw: &str) -> CliResult<f64> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("{flag}: invalid number '{raw}'")))
}

fn parse_object(flag: &str, raw: &str) -> CliResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(CliError::new(USAGE, format!("{flag}: JSON must be an object"))),
        Err(err) => Err(CliError::new(USAGE, format!("{flag} is not valid JSON: {err}"))),
    }
}
