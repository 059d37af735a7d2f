//! Collaborator wiring: config to outputs, network clients and the state
//! machine, plus the `self-check` routine.

use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as xch;
use refill_config::{Config, TelemetryCfg};
use refill_core::{
    BackendGateway, ChannelSpec, StationConfig, StationContext, StationError, StationStateMachine,
};
use refill_hardware::{Edge, LineTagReader};
use refill_net::{MqttPublisher, MqttSettings, ReqwestHttp};
use refill_traits::{DigitalOutput, Qos};

use crate::rig::Rig;
use crate::sim;

fn telemetry_settings(station_id: u32, t: &TelemetryCfg) -> MqttSettings {
    let mut s = MqttSettings::new(format!("refill-station-{station_id}"), &t.host, t.port);
    s.tls = t.tls;
    s.credentials = t.username.clone().zip(t.password.clone());
    s
}

fn qos(level: u8) -> Qos {
    if level == 0 {
        Qos::AtMostOnce
    } else {
        Qos::AtLeastOnce
    }
}

fn gateway(cfg: &Config) -> eyre::Result<BackendGateway> {
    let http = ReqwestHttp::new(Duration::from_millis(cfg.backend.timeout_ms))?;
    let gw = BackendGateway::new(&cfg.backend.base_url, cfg.station.id, Arc::new(http));
    let Some(t) = &cfg.telemetry else {
        tracing::info!("no [telemetry] section; dispense telemetry disabled");
        return Ok(gw);
    };
    let publisher = MqttPublisher::connect(&telemetry_settings(cfg.station.id, t))?;
    tracing::info!(host = %t.host, port = t.port, tls = t.tls, "telemetry broker configured");
    Ok(gw.with_telemetry(Arc::new(publisher), &t.base_topic, qos(t.qos)))
}

fn context(cfg: &Config, rig: &Rig) -> eyre::Result<StationContext> {
    let station = StationConfig::try_from(cfg)?;
    let mut builder = StationContext::builder(station).status(rig.output(
        refill_core::config::STATUS_OUTPUT,
        cfg.indicators.status_pin,
        cfg.indicators.status_active_low,
    )?);
    for ch in &cfg.channels {
        let spec = ChannelSpec::from(ch);
        let pump = rig.output(&spec.pump_output(), ch.pump_pin, ch.pump_active_low)?;
        let led = rig.output(&spec.indicator_output(), ch.indicator_pin, false)?;
        builder = builder.channel(spec, pump, led);
    }
    Ok(builder.gateway(gateway(cfg)?).build()?)
}

/// Run the station until shutdown, panic, or the end of tag input.
pub fn run(cfg: &Config, script: Option<&Path>, keep_running: bool) -> eyre::Result<()> {
    let steps = script.map(sim::load).transpose()?;
    let mut rig = Rig::open()?;
    let ctx = context(cfg, &rig)?;

    let (tag_tx, tag_rx) = xch::unbounded::<String>();
    let reader = if steps.is_some() {
        LineTagReader::spawn(sim::ChannelLines::new(tag_rx))
    } else {
        drop(tag_rx);
        LineTagReader::spawn(BufReader::new(io::stdin()))
    };

    let machine = StationStateMachine::new(ctx, reader).exit_on_reader_close(!keep_running);
    let events = machine.sender();
    let panic = machine.panic_monitor();

    let on_signal = events.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        on_signal.shutdown();
    })
    .map_err(|e| eyre::eyre!("install signal handler: {e}"))?;

    if let Some(p) = &cfg.panic {
        let monitor = panic.clone();
        rig.watch("panic", p.pin, p.active_low, Duration::ZERO, move |edge, _| {
            if edge == Edge::Pressed {
                monitor.trigger();
            }
        })?;
    }
    let debounce = Duration::from_millis(cfg.inputs.debounce_ms);
    for ch in &cfg.channels {
        let Some(pin) = ch.button_pin else { continue };
        let tx = events.clone();
        let name = ch.name.clone();
        rig.watch(&ch.name, pin, cfg.inputs.active_low, debounce, move |edge, _| {
            let _ = match edge {
                Edge::Pressed => tx.pressed(&name),
                Edge::Released => tx.released(&name),
            };
        })?;
    }

    let _script = match steps {
        Some(steps) => Some(sim::play(steps, tag_tx, events, panic)?),
        None => {
            drop(tag_tx);
            None
        }
    };

    let result = machine.run();
    drop(rig);
    match result {
        Ok(()) => {
            tracing::info!("station stopped");
            Ok(())
        }
        Err(e @ StationError::PanicTriggered) => Err(e.into()),
        Err(e) => Err(eyre::Report::from(e).wrap_err("station stopped on error")),
    }
}

/// Outputs that `self-check` verified.
#[derive(Debug)]
pub struct CheckReport {
    pub simulated: bool,
    pub outputs: Vec<String>,
    pub channels: usize,
    pub telemetry: bool,
}

/// Open every configured output, switch it off and confirm it reads OFF.
pub fn self_check(cfg: &Config) -> eyre::Result<CheckReport> {
    StationConfig::try_from(cfg)?;
    let rig = Rig::open()?;
    let mut lines = vec![(
        refill_core::config::STATUS_OUTPUT.to_string(),
        cfg.indicators.status_pin,
        cfg.indicators.status_active_low,
    )];
    for ch in &cfg.channels {
        let spec = ChannelSpec::from(ch);
        lines.push((spec.pump_output(), ch.pump_pin, ch.pump_active_low));
        lines.push((spec.indicator_output(), ch.indicator_pin, false));
    }
    let mut outputs = Vec::with_capacity(lines.len());
    for (name, pin, active_low) in lines {
        let mut line = rig.output(&name, pin, active_low)?;
        line.off()
            .map_err(|e| eyre::eyre!("switch off {name} (pin {pin}): {e}"))?;
        if line.is_on() {
            eyre::bail!("output {name} (pin {pin}) still reads ON after off()");
        }
        tracing::debug!(output = %name, pin, "off verified");
        outputs.push(name);
    }
    Ok(CheckReport {
        simulated: rig.simulated(),
        outputs,
        channels: cfg.channels.len(),
        telemetry: cfg.telemetry.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[station]
id = 3

[backend]
base_url = "http://127.0.0.1:9"

[telemetry]
host = "broker.local"
username = "station"
password = "secret"
base_topic = "stations/"
qos = 1

[indicators]
status_pin = 21

[[channel]]
name = "tap"
water_type = "tap"
pump_pin = 17
indicator_pin = 22
flow_ml_per_s = 38.0

[[channel]]
name = "mineral"
water_type = "mineral"
pump_pin = 27
indicator_pin = 23
flow_ml_per_s = 200.0
"#;

    #[test]
    fn telemetry_settings_follow_config() {
        let cfg = refill_config::load_toml(TOML).unwrap();
        let t = cfg.telemetry.as_ref().unwrap();
        let s = telemetry_settings(cfg.station.id, t);
        assert_eq!(s.client_id, "refill-station-3");
        assert_eq!(s.port, 8883);
        assert!(s.tls);
        assert_eq!(s.credentials, Some(("station".into(), "secret".into())));
        assert_eq!(qos(t.qos), Qos::AtLeastOnce);
        assert_eq!(qos(0), Qos::AtMostOnce);
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn self_check_opens_every_output() {
        let cfg = refill_config::load_toml(TOML).unwrap();
        let report = self_check(&cfg).unwrap();
        assert!(report.simulated);
        assert_eq!(
            report.outputs,
            vec!["status", "tap.pump", "tap.led", "mineral.pump", "mineral.led"]
        );
        assert_eq!(report.channels, 2);
        assert!(report.telemetry);
    }
}
