use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use clinic_client::app::App;
use clinic_client::bindings::{CancelInput, UpdateInput};
use clinic_client::config::Config;
use clinic_client::navigation::LoginHint;
use clinic_client::params::QueryParams;

#[derive(Parser, Debug)]
#[command(name = "clinic")]
#[command(about = "Command-line client for the clinic records API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/clinic/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Store a session token
  Login {
    #[arg(long)]
    token: String,
  },
  /// Forget the session token
  Logout,
  /// Patient records
  #[command(subcommand)]
  Patients(PatientCommand),
  /// Appointments
  #[command(subcommand)]
  Appointments(AppointmentCommand),
}

#[derive(ClapArgs, Debug)]
struct ParamArgs {
  /// Query parameter as key=value (repeatable)
  #[arg(short, long = "param", value_parser = parse_param)]
  params: Vec<(String, String)>,
}

impl ParamArgs {
  fn to_params(&self) -> QueryParams {
    self
      .params
      .iter()
      .map(|(k, v)| (k.clone(), param_value(v)))
      .collect()
  }
}

#[derive(Subcommand, Debug)]
enum PatientCommand {
  List(ParamArgs),
  Get { id: String },
  /// Create from a JSON document
  Create { data: String },
  /// Update with a partial JSON document
  Update { id: String, data: String },
  Delete { id: String },
  Search(ParamArgs),
}

#[derive(Subcommand, Debug)]
enum AppointmentCommand {
  List(ParamArgs),
  Get { id: String },
  /// Create from a JSON document
  Create { data: String },
  /// Update with a partial JSON document
  Update { id: String, data: String },
  Cancel {
    id: String,
    #[arg(long)]
    reason: String,
  },
  /// All appointments of one patient
  ByPatient { patient_id: String },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Numbers and booleans keep their JSON type; everything else is a string.
fn param_value(raw: &str) -> Value {
  match serde_json::from_str::<Value>(raw) {
    Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
    _ => Value::String(raw.to_string()),
  }
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON payload: {}", e))
}

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
  let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
  let filter = EnvFilter::try_from_env("CLINIC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .init();
  guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing();

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let app = App::new(&config, Some(Arc::new(LoginHint)))?;

  let output = match args.command {
    Command::Login { token } => {
      app.login(&token)?;
      eprintln!("Logged in.");
      return Ok(());
    }
    Command::Logout => {
      app.logout()?;
      eprintln!("Logged out.");
      return Ok(());
    }
    Command::Patients(cmd) => run_patients(&app, cmd).await?,
    Command::Appointments(cmd) => run_appointments(&app, cmd).await?,
  };

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn run_patients(app: &App, cmd: PatientCommand) -> Result<Value> {
  let b = app.bindings();
  match cmd {
    PatientCommand::List(p) => app.read(&b.patients(p.to_params())).await,
    PatientCommand::Get { id } => app.read(&b.patient(&id)).await,
    PatientCommand::Create { data } => app.write(&b.create_patient(), parse_json(&data)?).await,
    PatientCommand::Update { id, data } => {
      let data = parse_json(&data)?;
      app.write(&b.update_patient(), UpdateInput { id, data }).await
    }
    PatientCommand::Delete { id } => app.write(&b.delete_patient(), id).await,
    PatientCommand::Search(p) => app.read(&b.patient_search(p.to_params())).await,
  }
}

async fn run_appointments(app: &App, cmd: AppointmentCommand) -> Result<Value> {
  let b = app.bindings();
  match cmd {
    AppointmentCommand::List(p) => app.read(&b.appointments(p.to_params())).await,
    AppointmentCommand::Get { id } => app.read(&b.appointment(&id)).await,
    AppointmentCommand::Create { data } => {
      app.write(&b.create_appointment(), parse_json(&data)?).await
    }
    AppointmentCommand::Update { id, data } => {
      let data = parse_json(&data)?;
      app.write(&b.update_appointment(), UpdateInput { id, data }).await
    }
    AppointmentCommand::Cancel { id, reason } => {
      app
        .write(&b.cancel_appointment(), CancelInput { id, reason })
        .await
    }
    AppointmentCommand::ByPatient { patient_id } => {
      app.read(&b.patient_appointments(&patient_id)).await
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_param() {
    assert_eq!(
      parse_param("date=2026-02-11").unwrap(),
      ("date".to_string(), "2026-02-11".to_string())
    );
    assert_eq!(
      parse_param("q=a=b").unwrap(),
      ("q".to_string(), "a=b".to_string())
    );
    assert!(parse_param("novalue").is_err());
    assert!(parse_param("=x").is_err());
  }

  #[test]
  fn test_param_value_types() {
    assert_eq!(param_value("1"), json!(1));
    assert_eq!(param_value("true"), json!(true));
    assert_eq!(param_value("alice"), json!("alice"));
    assert_eq!(param_value("2026-02-11"), json!("2026-02-11"));
  }

  #[test]
  fn test_cli_parses() {
    let args = Args::try_parse_from([
      "clinic",
      "appointments",
      "cancel",
      "a-1",
      "--reason",
      "rescheduled",
    ])
    .unwrap();
    assert!(matches!(
      args.command,
      Command::Appointments(AppointmentCommand::Cancel { .. })
    ));

    let args = Args::try_parse_from(["clinic", "patients", "list", "-p", "page=1"]).unwrap();
    match args.command {
      Command::Patients(PatientCommand::List(p)) => {
        assert_eq!(p.to_params(), QueryParams::new().with("page", 1));
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }
}
