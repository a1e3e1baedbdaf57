//! Autopilot - clinic command bar
//!
//! CLI entry point: interactive REPL, one-shot dispatch and config dump.

use std::fs;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use autopilot::app::{Autopilot, default_session_id, log_dir};
use autopilot::cli::{Cli, Command, OutputFormat};
use autopilot::config::Config;
use autopilot::dispatch::DispatchOutcome;
use autopilot::domain::UserRole;
use autopilot::repl::{ReplSession, render};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialised yet, so nothing here can log
    let log_dir = log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("autopilot.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(backend = ?config.dispatch.backend, "Autopilot loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Config) => cmd_config(&config),
        Some(Command::Dispatch {
            text,
            session,
            run,
            format,
        }) => {
            debug!(%text, ?session, run, ?format, "main: matched Dispatch command");
            cmd_dispatch(config, &text, session, run, format).await
        }
        Some(Command::Repl { session }) => cmd_repl(config, session).await,
        None => {
            debug!("main: no command specified, launching REPL");
            cmd_repl(config, None).await
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

async fn cmd_repl(config: Config, session: Option<String>) -> Result<()> {
    let app = Autopilot::from_config(config)?;
    let mut repl = ReplSession::new(app, session.unwrap_or_else(default_session_id));
    repl.run().await
}

async fn cmd_dispatch(
    config: Config,
    text: &str,
    session: Option<String>,
    run: bool,
    format: OutputFormat,
) -> Result<()> {
    let app = Autopilot::from_config(config)?;
    let session_id = session.unwrap_or_else(default_session_id);
    app.dispatcher.open_session(&session_id, UserRole::FrontDesk, None).await?;

    let outcome = app.dispatcher.dispatch(&session_id, text).await?;

    let outcome = match outcome {
        DispatchOutcome::Plan(mut plan) if run => {
            let report = app.runner.run(&mut plan).await?;
            match format {
                OutputFormat::Text => render::print_run_report(&plan, &report),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&render::run_report_json(&plan, &report))?)
                }
            }
            return Ok(());
        }
        other => other,
    };

    match format {
        OutputFormat::Text => render::print_outcome(&outcome),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&render::outcome_json(&outcome))?),
    }
    Ok(())
}
