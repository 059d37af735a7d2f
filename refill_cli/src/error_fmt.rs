//! Human-readable error descriptions and structured JSON error formatting.

use refill_core::{BuildError, StationError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStatus => {
                "What happened: No status indicator was wired into the station.\nLikely causes: The output for indicators.status_pin failed to open.\nHow to fix: Check [indicators] status_pin and GPIO permissions.".to_string()
            }
            BuildError::MissingGateway => {
                "What happened: No backend gateway was provided to the station.\nLikely causes: The [backend] section could not be turned into an HTTP client.\nHow to fix: Check backend.base_url and backend.timeout_ms.".to_string()
            }
            BuildError::NoChannels => {
                "What happened: No dispense channels are configured.\nLikely causes: The config has no [[channel]] entries.\nHow to fix: Add at least one [[channel]] with pump and indicator pins.".to_string()
            }
            BuildError::DuplicateOutput(name) => format!(
                "What happened: Output {name:?} is defined twice.\nLikely causes: Two channels share a name.\nHow to fix: Give every [[channel]] a unique name."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/refill.toml for a sample."
            ),
            BuildError::Thread(msg) => format!(
                "What happened: A worker thread could not be started ({msg}).\nLikely causes: Process or memory limits.\nHow to fix: Check ulimits and free memory, then restart the service."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<StationError>() {
        return match se {
            StationError::PanicTriggered => {
                "What happened: The panic input was triggered and every output was switched off.\nLikely causes: Emergency button pressed or the panic line is floating.\nHow to fix: Release the panic button, check its wiring, then restart the station.".to_string()
            }
            StationError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing sections, bad values, or a pin assigned twice.\nHow to fix: Edit the config file, then rerun `refill self-check`."
            ),
            StationError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wrong pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the pins in the config; ensure the process may access /dev/gpiomem."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("gpio") || lower.contains("open output") {
        return "What happened: Failed to initialize GPIO lines.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the pin values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("script") {
        return format!(
            "What happened: The simulation script could not be used ({msg}).\nLikely causes: Missing file or an unknown command.\nHow to fix: Use tag/press/release/panic/wait lines; see `refill run --help`."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: panic stop 2, configuration 3, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<StationError>() {
        return match se {
            StationError::PanicTriggered => 2,
            StationError::Config(_) => 3,
            _ => 1,
        };
    }
    if let Some(BuildError::InvalidConfig(_)) = err.downcast_ref::<BuildError>() {
        return 3;
    }
    1
}

fn reason(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<StationError>() {
        return match se {
            StationError::PanicTriggered => "PanicTriggered",
            StationError::Config(_) => "Config",
            StationError::Hardware(_) => "Hardware",
            _ => "Station",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(eyre::Report::new(StationError::PanicTriggered), 2)]
    #[case(eyre::Report::new(StationError::Config("bad".into())), 3)]
    #[case(eyre::Report::new(BuildError::InvalidConfig("flow".into())), 3)]
    #[case(eyre::Report::new(BuildError::NoChannels), 1)]
    #[case(eyre::Report::new(StationError::Hardware("pin".into())), 1)]
    #[case(eyre::eyre!("boom"), 1)]
    fn exit_codes_are_stable(#[case] err: eyre::Report, #[case] code: i32) {
        assert_eq!(exit_code_for_error(&err), code);
    }

    #[test]
    fn wrapped_panic_keeps_its_exit_code() {
        let err = eyre::Report::new(StationError::PanicTriggered).wrap_err("station stopped");
        assert_eq!(exit_code_for_error(&err), 2);
    }

    #[test]
    fn json_carries_reason_and_message() {
        let err = eyre::Report::new(StationError::PanicTriggered);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "PanicTriggered");
        assert_eq!(v["exit_code"], 2);
        assert!(v["message"].as_str().unwrap().contains("panic input"));
    }
}
