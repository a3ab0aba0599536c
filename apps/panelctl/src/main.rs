use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use panel_core::{
    load_settings, load_settings_from, AutoConfirm, ConfirmationGate, ControlPanel, ControlPath,
    ControlsDocument, FeedbackRegistry, HttpTransport, JogController, RenderDriver, Settings,
};
use serde_json::Value;
use shared::domain::Axis;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive a printer's custom control panel from the terminal")]
struct Cli {
    /// Settings file; defaults to ./panel.toml when present.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a local controls document and print the rendered tree.
    Show {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(flatten)]
    Printer(PrinterCommand),
}

/// Subcommands that talk to the printer server.
#[derive(Subcommand, Debug)]
enum PrinterCommand {
    /// Fetch and print the server's custom controls.
    Controls,
    /// Click the control at a dotted path such as `1.0`.
    Click {
        #[arg(long)]
        path: ControlPath,
        /// Input value as `parameter=value`; values are parsed as JSON, falling back to text.
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(String, Value)>,
        /// Answer every confirmation prompt with yes.
        #[arg(long)]
        yes: bool,
    },
    Jog {
        #[arg(long, value_parser = parse_axis)]
        axis: Axis,
        #[arg(long, allow_negative_numbers = true)]
        distance: f64,
    },
    Home {
        #[arg(
            long,
            value_parser = parse_axis,
            value_delimiter = ',',
            default_values = ["x", "y", "z"]
        )]
        axes: Vec<Axis>,
    },
    /// Without `--amount` the configured default extrusion length is used.
    Extrude {
        #[arg(long)]
        amount: Option<f64>,
    },
    Retract {
        #[arg(long)]
        amount: Option<f64>,
    },
}

fn parse_axis(raw: &str) -> Result<Axis, String> {
    Axis::parse(raw).ok_or_else(|| format!("unknown axis '{raw}', expected x, y or z"))
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (parameter, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected parameter=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((parameter.trim().to_string(), value))
}

/// Prompts on the terminal and waits for `y`/`yes`.
struct TerminalGate;

#[async_trait]
impl ConfirmationGate for TerminalGate {
    async fn confirm(&self, message: &str) -> bool {
        let mut stdout = tokio::io::stdout();
        let prompt = format!("{message} [y/N] ");
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }
        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

fn resolve_settings(
    settings_file: Option<&Path>,
    server_url: Option<String>,
    api_key: Option<String>,
) -> Result<Settings> {
    let mut settings = match settings_file {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    if let Some(url) = server_url {
        settings.server_url = url;
    }
    if let Some(key) = api_key {
        settings.api_key = Some(key);
    }
    settings.validate()?;
    Ok(settings)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Offline: normalizes a document without contacting a server.
fn show_document(file: &Path) -> Result<()> {
    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let document: ControlsDocument = serde_json::from_str(&raw)
        .with_context(|| format!("invalid controls document {}", file.display()))?;
    let mut driver = RenderDriver::new();
    let mut registry = FeedbackRegistry::new();
    driver.set_server_controls(document.controls);
    let views: Vec<_> = driver
        .render(&mut registry)
        .iter()
        .map(|control| control.view())
        .collect();
    info!(feedback_outputs = registry.len(), "document normalized");
    print_json(&views)
}

async fn run(command: PrinterCommand, settings: Settings) -> Result<()> {
    let transport = Arc::new(HttpTransport::from_settings(&settings)?);
    info!(server = %transport.base_url(), "using printer server");

    match command {
        PrinterCommand::Controls => {
            let panel = ControlPanel::with_event_buffer(
                transport,
                Arc::new(AutoConfirm),
                settings.event_buffer,
            );
            panel.request_controls().await?;
            let views: Vec<_> = panel
                .controls()
                .await
                .iter()
                .map(|control| control.view())
                .collect();
            print_json(&views)?;
        }
        PrinterCommand::Click {
            path,
            assignments,
            yes,
        } => {
            let gate: Arc<dyn ConfirmationGate> = if yes {
                Arc::new(AutoConfirm)
            } else {
                Arc::new(TerminalGate)
            };
            let panel = ControlPanel::with_event_buffer(transport, gate, settings.event_buffer);
            panel.request_controls().await?;
            for (parameter, value) in assignments {
                panel.set_input(&path, &parameter, value).await?;
            }
            let outcome = panel.click(&path).await?;
            println!("{path}: {outcome:?}");
        }
        PrinterCommand::Jog { axis, distance } => {
            JogController::new(transport, &settings)
                .jog(axis, 1.0, distance)
                .await?;
        }
        PrinterCommand::Home { axes } => {
            JogController::new(transport, &settings).home(&axes).await?;
        }
        PrinterCommand::Extrude { amount } => {
            JogController::new(transport, &settings).extrude(amount).await?;
        }
        PrinterCommand::Retract { amount } => {
            JogController::new(transport, &settings).retract(amount).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Show { file } => show_document(&file),
        Command::Printer(command) => {
            let settings = resolve_settings(cli.settings.as_deref(), cli.server_url, cli.api_key)?;
            run(command, settings).await
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
