//! Guard CLI - Command-line interface for Affect Guard
//!
//! Commands:
//! - enroll: Add keystroke enrollment samples for an identity
//! - authenticate: Decide one attempt from a JSON request
//! - alerts: List, acknowledge and resolve security alerts
//! - stats: Attempt statistics
//! - simulate: Fuse a synthetic scenario
//! - doctor: Diagnose configuration and state
//!
//! State (templates, credentials, alerts, attempts) is kept in the file
//! given by `--state` and rewritten after every mutating command.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use affect_guard::keystroke::KeystrokeSample;
use affect_guard::pipeline::{AuthRequest, Guardian, SimulationParams};
use affect_guard::types::{AlertLevel, Decision};
use affect_guard::{GuardConfig, GuardError, AFFECT_GUARD_VERSION, PRODUCER_NAME};

/// Guard - fail-closed decision fusion for emotion-aware MFA
#[derive(Parser)]
#[command(name = "guard")]
#[command(version = AFFECT_GUARD_VERSION)]
#[command(about = "Emotion-aware multi-factor authentication decisions", long_about = None)]
struct Cli {
    /// State file (created on first write)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add keystroke enrollment samples for an identity
    Enroll {
        /// Identity to enroll
        #[arg(short, long)]
        identity: String,

        /// JSON array of samples (use - for stdin)
        #[arg(short, long)]
        samples: PathBuf,

        /// Shared secret to register for the identity
        #[arg(long)]
        secret: Option<String>,
    },

    /// Decide one attempt. Exit status: 0 permit, 2 delay, 3 deny
    Authenticate {
        /// JSON request file (use - for stdin)
        #[arg(short, long)]
        request: PathBuf,

        /// Pretty-print the outcome
        #[arg(long)]
        pretty: bool,
    },

    /// Manage security alerts
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },

    /// Attempt statistics
    Stats,

    /// Fuse a synthetic scenario
    Simulate {
        #[arg(long, default_value = "0.5")]
        stress: f64,

        #[arg(long = "match", default_value = "0.5")]
        match_score: f64,

        #[arg(long, default_value = "0.5")]
        brightness: f64,

        #[arg(long, default_value = "0.3")]
        noise: f64,
    },

    /// Diagnose configuration and state
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AlertAction {
    /// List alerts, newest first
    List {
        /// Only this level (low, medium, high, critical)
        #[arg(long)]
        level: Option<String>,

        #[arg(long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Acknowledge an alert
    Ack { id: u64 },
    /// Resolve an alert
    Resolve {
        id: u64,

        #[arg(long)]
        note: Option<String>,
    },
    /// Alert counts
    Stats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, json: bool) {
    let level = level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<ExitCode, GuardCliError> {
    let state = cli.state.as_deref();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Enroll {
            identity,
            samples,
            secret,
        } => {
            let guardian = open_guardian(config, state)?;
            let samples: Vec<KeystrokeSample> = serde_json::from_str(&read_input(&samples)?)?;
            let outcome = guardian.enroll_with_secret(&identity, &samples, secret.as_deref())?;
            persist(&guardian, state)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Authenticate { request, pretty } => {
            let guardian = open_guardian(config, state)?;
            let request: AuthRequest = serde_json::from_str(&read_input(&request)?)?;
            let outcome = guardian.authenticate(&request);
            persist(&guardian, state)?;
            let json = if pretty {
                serde_json::to_string_pretty(&outcome)?
            } else {
                serde_json::to_string(&outcome)?
            };
            println!("{}", json);
            Ok(match outcome.result.decision {
                Decision::Permit => ExitCode::SUCCESS,
                Decision::Delay => ExitCode::from(2),
                Decision::Deny => ExitCode::from(3),
            })
        }
        Commands::Alerts { action } => {
            let guardian = open_guardian(config, state)?;
            cmd_alerts(&guardian, action, state)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats => {
            let guardian = open_guardian(config, state)?;
            println!("{}", serde_json::to_string_pretty(&guardian.auth_statistics())?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Simulate {
            stress,
            match_score,
            brightness,
            noise,
        } => {
            let guardian = Guardian::new(load_config(config)?)?;
            let result = guardian.simulate(&SimulationParams {
                stress_level: stress,
                match_score,
                brightness,
                noise,
            })?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Doctor { json } => {
            cmd_doctor(config, state, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_alerts(
    guardian: &Guardian,
    action: AlertAction,
    state: Option<&Path>,
) -> Result<(), GuardCliError> {
    match action {
        AlertAction::List {
            level,
            limit,
            offset,
        } => {
            let level = match level {
                Some(name) => Some(
                    AlertLevel::parse(&name).ok_or(GuardCliError::UnknownLevel(name))?,
                ),
                None => None,
            };
            let alerts = guardian.list_alerts(level, limit, offset);
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        }
        AlertAction::Ack { id } => {
            let alert = guardian.acknowledge_alert(id)?;
            persist(guardian, state)?;
            println!("{}", serde_json::to_string_pretty(&alert)?);
        }
        AlertAction::Resolve { id, note } => {
            let alert = guardian.resolve_alert(id, note)?;
            persist(guardian, state)?;
            println!("{}", serde_json::to_string_pretty(&alert)?);
        }
        AlertAction::Stats => {
            println!("{}", serde_json::to_string_pretty(&guardian.alert_statistics())?);
        }
    }
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, state: Option<&Path>, json: bool) -> Result<(), GuardCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Affect Guard version {}", AFFECT_GUARD_VERSION),
    });

    let loaded = load_config(config);
    checks.push(match (&loaded, config) {
        (Ok(_), Some(path)) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Configuration valid ({})", path.display()),
        },
        (Ok(_), None) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using default configuration".to_string(),
        },
        (Err(e), _) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    let guardian = Guardian::new(loaded.unwrap_or_default())?;

    if let Some(path) = state {
        let check = if !path.exists() {
            DoctorCheck {
                name: "state".to_string(),
                status: CheckStatus::Warning,
                message: "State file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(path)
                .map_err(GuardCliError::from)
                .and_then(|json| Ok(guardian.load_state(&json)?))
            {
                Ok(()) => {
                    let stats = guardian.auth_statistics();
                    let alerts = guardian.alert_statistics();
                    DoctorCheck {
                        name: "state".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "State file valid ({} attempts, {} alerts, {} critical unacknowledged)",
                            stats.total, alerts.total, alerts.critical_unacknowledged
                        ),
                    }
                }
                Err(e) => DoctorCheck {
                    name: "state".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load state file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    // Fail-closed self test: a calm scenario permits, a distressed one does not
    let calm = guardian.simulate(&SimulationParams {
        stress_level: 0.1,
        match_score: 0.9,
        brightness: 0.5,
        noise: 0.2,
    });
    let distressed = guardian.simulate(&SimulationParams {
        stress_level: 0.9,
        ..Default::default()
    });
    checks.push(match (calm, distressed) {
        (Ok(c), Ok(d)) if d.decision != Decision::Permit => DoctorCheck {
            name: "self_test".to_string(),
            status: if c.decision == Decision::Permit {
                CheckStatus::Ok
            } else {
                CheckStatus::Warning
            },
            message: format!(
                "calm scenario: {}, distressed scenario: {}",
                c.decision.as_str(),
                d.decision.as_str()
            ),
        },
        (Ok(_), Ok(_)) => DoctorCheck {
            name: "self_test".to_string(),
            status: CheckStatus::Error,
            message: "distressed scenario was permitted".to_string(),
        },
        (Err(e), _) | (_, Err(e)) => DoctorCheck {
            name: "self_test".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: AFFECT_GUARD_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Guard Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GuardCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<GuardConfig, GuardCliError> {
    match path {
        Some(path) => Ok(GuardConfig::from_file(path)?),
        None => Ok(GuardConfig::default()),
    }
}

fn open_guardian(config: Option<&Path>, state: Option<&Path>) -> Result<Guardian, GuardCliError> {
    let guardian = Guardian::new(load_config(config)?)?;
    if let Some(path) = state {
        if path.exists() {
            guardian.load_state(&fs::read_to_string(path)?)?;
        }
    }
    Ok(guardian)
}

fn persist(guardian: &Guardian, state: Option<&Path>) -> Result<(), GuardCliError> {
    if let Some(path) = state {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, guardian.save_state()?)?;
        fs::rename(&tmp, path)?;
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String, GuardCliError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

// Error types

#[derive(Debug)]
enum GuardCliError {
    Io(io::Error),
    Guard(GuardError),
    Json(serde_json::Error),
    UnknownLevel(String),
    DoctorFailed,
}

impl std::fmt::Display for GuardCliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardCliError::Io(e) => write!(f, "{}", e),
            GuardCliError::Guard(e) => write!(f, "{}", e),
            GuardCliError::Json(e) => write!(f, "{}", e),
            GuardCliError::UnknownLevel(level) => write!(f, "unknown alert level '{}'", level),
            GuardCliError::DoctorFailed => write!(f, "one or more health checks failed"),
        }
    }
}

impl From<io::Error> for GuardCliError {
    fn from(e: io::Error) -> Self {
        GuardCliError::Io(e)
    }
}

impl From<GuardError> for GuardCliError {
    fn from(e: GuardError) -> Self {
        GuardCliError::Guard(e)
    }
}

impl From<serde_json::Error> for GuardCliError {
    fn from(e: serde_json::Error) -> Self {
        GuardCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GuardCliError> for CliError {
    fn from(e: GuardCliError) -> Self {
        let message = e.to_string();
        match e {
            GuardCliError::Io(_) => CliError {
                code: "IO_ERROR".to_string(),
                message,
                hint: Some("Check file paths and permissions".to_string()),
            },
            GuardCliError::Guard(GuardError::NotFound(_)) => CliError {
                code: "NOT_FOUND".to_string(),
                message,
                hint: Some("Run 'guard alerts list' to see alert ids".to_string()),
            },
            GuardCliError::Guard(GuardError::InvalidConfig(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message,
                hint: Some("Run 'guard doctor' to check the configuration".to_string()),
            },
            GuardCliError::Guard(GuardError::Persistence(_)) => CliError {
                code: "STATE_ERROR".to_string(),
                message,
                hint: Some("The state file was written by an incompatible version".to_string()),
            },
            GuardCliError::Guard(_) => CliError {
                code: "INPUT_ERROR".to_string(),
                message,
                hint: Some("Check identity and sample data".to_string()),
            },
            GuardCliError::Json(_) => CliError {
                code: "JSON_ERROR".to_string(),
                message,
                hint: Some("Check JSON syntax".to_string()),
            },
            GuardCliError::UnknownLevel(_) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message,
                hint: Some("Use one of: low, medium, high, critical".to_string()),
            },
            GuardCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message,
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
