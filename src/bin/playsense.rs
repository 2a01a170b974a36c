//! Playsense CLI - Command-line interface for the Playsense engine
//!
//! Commands:
//! - replay: Feed a recorded pointer-event log through a session
//! - validate-config: Check a TOML/JSON engine configuration
//! - defaults: Print the default engine configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use playsense::config::{EngineConfig, SensitivityProfile};
use playsense::session::{EventBuffer, PlaySession};
use playsense::telemetry::JsonLinesTelemetry;
use playsense::types::{EngineEvent, SessionInput};
use playsense::{EngineError, PLAYSENSE_VERSION, PRODUCER_NAME};

/// Playsense - interaction analysis and adaptive suggestions for play sessions
#[derive(Parser)]
#[command(name = "playsense")]
#[command(version = PLAYSENSE_VERSION)]
#[command(about = "Analyze touch interaction logs and emit adaptive suggestions", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an NDJSON log of session inputs and print the engine events
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Engine configuration file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the sensitivity profile (alta, media, baja)
        #[arg(long)]
        profile: Option<String>,

        /// Activity start (RFC 3339). Defaults to the first timestamped input.
        #[arg(long)]
        started_at: Option<DateTime<Utc>>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Also write telemetry events (NDJSON) to this file
        #[arg(long)]
        telemetry: Option<PathBuf>,

        /// Print a replay summary to stderr when done
        #[arg(long)]
        summary: bool,
    },

    /// Validate an engine configuration file
    ValidateConfig {
        /// Configuration file (.toml or .json)
        path: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default engine configuration
    Defaults {
        #[arg(long, default_value = "toml")]
        format: ConfigFormat,

        /// Sensitivity profile to embed
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), PlaysenseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            config,
            profile,
            started_at,
            output_format,
            telemetry,
            summary,
        } => cmd_replay(
            &input,
            config.as_deref(),
            profile.as_deref(),
            started_at,
            output_format,
            telemetry.as_deref(),
            summary,
        ),

        Commands::ValidateConfig { path, json } => cmd_validate_config(&path, json),

        Commands::Defaults { format, profile } => cmd_defaults(format, profile.as_deref()),
    }
}

fn load_config(path: Option<&Path>, profile: Option<&str>) -> Result<EngineConfig, PlaysenseCliError> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(profile) = profile {
        config.sensitivity = profile.parse::<SensitivityProfile>()?;
    }
    Ok(config)
}

fn parse_inputs(data: &str) -> Result<Vec<SessionInput>, PlaysenseCliError> {
    let mut inputs = Vec::new();
    for (index, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let input: SessionInput =
            serde_json::from_str(trimmed).map_err(|source| PlaysenseCliError::Parse {
                line: index + 1,
                source,
            })?;
        inputs.push(input);
    }
    Ok(inputs)
}

fn cmd_replay(
    input: &Path,
    config: Option<&Path>,
    profile: Option<&str>,
    started_at: Option<DateTime<Utc>>,
    output_format: OutputFormat,
    telemetry: Option<&Path>,
    summary: bool,
) -> Result<(), PlaysenseCliError> {
    let config = load_config(config, profile)?;

    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(PlaysenseCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let inputs = parse_inputs(&input_data)?;
    if inputs.is_empty() {
        return Err(PlaysenseCliError::NoInputs);
    }

    let started_at = started_at
        .or_else(|| inputs.iter().find_map(SessionInput::timestamp))
        .unwrap_or_else(Utc::now);

    let events = EventBuffer::new();
    let mut session = PlaySession::new(config, started_at)?.with_presentation(Box::new(events.clone()));
    if let Some(path) = telemetry {
        let file = fs::File::create(path)?;
        session = session.with_telemetry(Box::new(JsonLinesTelemetry::new(io::BufWriter::new(file))));
    }

    let total_inputs = inputs.len();
    let mut emitted: Vec<EngineEvent> = Vec::new();
    let mut stdout = io::stdout();

    for input in inputs {
        session.process(input);
        let batch = events.drain();
        if matches!(output_format, OutputFormat::Ndjson) {
            for event in &batch {
                writeln!(stdout, "{}", serde_json::to_string(event)?)?;
            }
        }
        emitted.extend(batch);
    }

    match output_format {
        OutputFormat::Ndjson => {}
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(&emitted)?)?,
        OutputFormat::JsonPretty => writeln!(stdout, "{}", serde_json::to_string_pretty(&emitted)?)?,
    }
    stdout.flush()?;

    if summary {
        let report = ReplaySummary {
            producer: PRODUCER_NAME.to_string(),
            version: PLAYSENSE_VERSION.to_string(),
            inputs: total_inputs,
            interactions: emitted
                .iter()
                .filter(|e| matches!(e, EngineEvent::Feedback { .. }))
                .count(),
            suggestions: emitted
                .iter()
                .filter_map(|e| match e {
                    EngineEvent::Suggestion { suggestion } => Some(suggestion.kind.as_str().to_string()),
                    _ => None,
                })
                .collect(),
            difficulty_level: format!("{:?}", session.level()).to_lowercase(),
        };
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn cmd_validate_config(path: &Path, json: bool) -> Result<(), PlaysenseCliError> {
    let result = EngineConfig::load(path);

    if json {
        let report = ConfigReport {
            path: path.display().to_string(),
            valid: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match result {
        Ok(config) => {
            if !json {
                println!("Configuration is valid ({} profile)", config.sensitivity);
            }
            Ok(())
        }
        Err(e) => Err(PlaysenseCliError::Engine(e)),
    }
}

fn cmd_defaults(format: ConfigFormat, profile: Option<&str>) -> Result<(), PlaysenseCliError> {
    let config = load_config(None, profile)?;
    match format {
        ConfigFormat::Toml => print!("{}", config.to_toml_string()?),
        ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum PlaysenseCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    NoInputs,
    InteractiveStdin,
}

impl From<io::Error> for PlaysenseCliError {
    fn from(e: io::Error) -> Self {
        PlaysenseCliError::Io(e)
    }
}

impl From<EngineError> for PlaysenseCliError {
    fn from(e: EngineError) -> Self {
        PlaysenseCliError::Engine(e)
    }
}

impl From<serde_json::Error> for PlaysenseCliError {
    fn from(e: serde_json::Error) -> Self {
        PlaysenseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PlaysenseCliError> for CliError {
    fn from(e: PlaysenseCliError) -> Self {
        match e {
            PlaysenseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PlaysenseCliError::Engine(e @ EngineError::Config(_))
            | PlaysenseCliError::Engine(e @ EngineError::UnknownProfile(_))
            | PlaysenseCliError::Engine(e @ EngineError::TomlError(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'playsense defaults' for a valid starting point".to_string()),
            },
            PlaysenseCliError::Parse { line, source } => CliError {
                code: "PARSE_ERROR".to_string(),
                message: format!("Failed to parse input on line {line}: {source}"),
                hint: Some("Each line must be one tagged input, e.g. {\"type\":\"tick\",\"at\":\"...\"}".to_string()),
            },
            PlaysenseCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PlaysenseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PlaysenseCliError::NoInputs => CliError {
                code: "NO_INPUTS".to_string(),
                message: "No inputs found in log".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PlaysenseCliError::InteractiveStdin => CliError {
                code: "NO_INPUTS".to_string(),
                message: "stdin is a TTY".to_string(),
                hint: Some("Pipe an NDJSON log into stdin or pass --input <file>".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ReplaySummary {
    producer: String,
    version: String,
    inputs: usize,
    interactions: usize,
    suggestions: Vec<String>,
    difficulty_level: String,
}

#[derive(serde::Serialize)]
struct ConfigReport {
    path: String,
    valid: bool,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs_skips_blank_and_comment_lines() {
        let log = "# recorded session\n\n{\"type\": \"tick\", \"at\": \"2024-01-15T14:00:00Z\"}\n";
        let inputs = parse_inputs(log).unwrap();
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn test_parse_error_reports_line_number() {
        let log = "{\"type\": \"tick\", \"at\": \"2024-01-15T14:00:00Z\"}\n{\"type\": \"wave\"}\n";
        let err = CliError::from(parse_inputs(log).unwrap_err());
        assert_eq!(err.code, "PARSE_ERROR");
        assert!(err.message.contains("line 2"));
    }
}
