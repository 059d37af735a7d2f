mod cli;
mod error_fmt;
mod logging;
mod rig;
mod sim;
mod station;

use clap::Parser;
use refill_core::StationError;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn load_config(path: &std::path::Path) -> eyre::Result<refill_config::Config> {
    refill_config::load_path(path).map_err(|e| StationError::Config(format!("{e:#}")).into())
}

fn decode(hex: &str) -> eyre::Result<()> {
    let raw = refill_config::parse_hex(hex)?;
    let text = refill_core::codec::decode(&raw);
    if JSON_MODE.get().copied().unwrap_or(false) {
        println!(
            "{}",
            serde_json::json!({ "bytes": raw.len(), "text": text })
        );
    } else {
        println!("{text}");
    }
    Ok(())
}

fn self_check(cfg: &refill_config::Config) -> eyre::Result<()> {
    let report = station::self_check(cfg)?;
    if JSON_MODE.get().copied().unwrap_or(false) {
        println!(
            "{}",
            serde_json::json!({
                "status": "ok",
                "simulated": report.simulated,
                "outputs": report.outputs,
                "channels": report.channels,
                "telemetry": report.telemetry,
            })
        );
    } else {
        let mode = if report.simulated { "simulated" } else { "gpio" };
        println!(
            "OK: {} outputs off ({mode}), {} channels, telemetry {}",
            report.outputs.len(),
            report.channels,
            if report.telemetry { "on" } else { "off" }
        );
    }
    Ok(())
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = if cli.cmd.needs_config() {
        Some(load_config(&cli.config)?)
    } else {
        None
    };
    logging::init(
        cli.json,
        &cli.log_level,
        cfg.as_ref().map(|c| &c.logging),
    )?;

    match (cli.cmd, cfg) {
        (Commands::Decode { hex }, _) => decode(&hex),
        (Commands::SelfCheck, Some(cfg)) => self_check(&cfg),
        (
            Commands::Run {
                script,
                keep_running,
            },
            Some(cfg),
        ) => station::run(&cfg, script.as_deref(), keep_running),
        (_, None) => eyre::bail!("command requires a config"),
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "refill exited with error");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
