//! End-to-end station scenarios against in-memory collaborators.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use refill_core::mocks::{MemoryOutput, MockHttp, MockPublisher, ScriptedTagReader};
use refill_core::{
    AckStyle, BackendGateway, ChannelSpec, EventSender, PanicMonitor, StateProbe, StationConfig,
    StationContext, StationError, StationEvent, StationState, StationStateMachine, WaterType,
};
use refill_traits::{BoxError, KeyType, Qos, RawTag, TagReader};
use serde_json::json;

const UID: [u8; 4] = [0x04, 0xA2, 0x3B, 0x1C];
const PREFS_URL: &str = "http://backend/bottles/preferences/04:A2:3B:1C";

struct Lines {
    status: MemoryOutput,
    tap_pump: MemoryOutput,
    tap_led: MemoryOutput,
    min_pump: MemoryOutput,
    min_led: MemoryOutput,
}

impl Lines {
    fn all(&self) -> [&MemoryOutput; 5] {
        [&self.status, &self.tap_pump, &self.tap_led, &self.min_pump, &self.min_led]
    }
}

struct Rig {
    http: MockHttp,
    broker: MockPublisher,
    lines: Lines,
    events: EventSender,
    probe: StateProbe,
    monitor: PanicMonitor,
    handle: JoinHandle<refill_core::Result<()>>,
}

fn config() -> StationConfig {
    StationConfig {
        station_id: 3,
        settle: Duration::from_millis(50),
        poll_interval: Duration::from_millis(20),
        ack: AckStyle::Blink,
        blink_half_period: Duration::from_millis(20),
        ..StationConfig::default()
    }
}

fn start_with<R: TagReader + Send + 'static>(reader: R, http: MockHttp, exit_on_close: bool) -> Rig {
    start_configured(config(), reader, http, exit_on_close)
}

fn start_configured<R: TagReader + Send + 'static>(
    cfg: StationConfig,
    reader: R,
    http: MockHttp,
    exit_on_close: bool,
) -> Rig {
    let broker = MockPublisher::new();
    let lines = Lines {
        status: MemoryOutput::new(),
        tap_pump: MemoryOutput::new(),
        tap_led: MemoryOutput::new(),
        min_pump: MemoryOutput::new(),
        min_led: MemoryOutput::new(),
    };
    let gateway = BackendGateway::new("http://backend", 3, Arc::new(http.clone())).with_telemetry(
        Arc::new(broker.clone()),
        "stations/",
        Qos::AtMostOnce,
    );
    let ctx = StationContext::builder(cfg)
        .status(lines.status.clone())
        .gateway(gateway)
        .channel(
            ChannelSpec {
                name: "tap".into(),
                water_type: WaterType::Tap,
                flow_ml_per_s: 38.0,
            },
            lines.tap_pump.clone(),
            lines.tap_led.clone(),
        )
        .channel(
            ChannelSpec {
                name: "mineral".into(),
                water_type: WaterType::Mineral,
                flow_ml_per_s: 200.0,
            },
            lines.min_pump.clone(),
            lines.min_led.clone(),
        )
        .build()
        .expect("station context");
    let sm = StationStateMachine::new(ctx, reader).exit_on_reader_close(exit_on_close);
    let events = sm.sender();
    let probe = sm.probe();
    let monitor = sm.panic_monitor();
    let handle = std::thread::spawn(move || sm.run());
    Rig {
        http,
        broker,
        lines,
        events,
        probe,
        monitor,
        handle,
    }
}

fn start(reader: ScriptedTagReader, http: MockHttp) -> Rig {
    start_with(reader, http, false)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn prefs(fill_volume: u32, water_type: &str) -> String {
    json!({"id": 7, "user_id": 42, "fill_volume": fill_volume, "water_type": water_type}).to_string()
}

fn gets(http: &MockHttp) -> usize {
    http.requests().iter().filter(|r| r.method == "GET").count()
}

fn shutdown(rig: Rig) -> (Lines, MockHttp) {
    rig.events.shutdown();
    let res = rig.handle.join().expect("station thread");
    assert_eq!(res, Ok(()));
    (rig.lines, rig.http)
}

#[test]
fn tag_cycle_dispenses_planned_duration_and_reports_floor_volume() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(300, "tap"));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);

    assert!(wait_until(Duration::from_secs(3), || rig.probe.get() == StationState::Dispensing));
    let t0 = Instant::now();
    assert!(rig.lines.tap_pump.is_on());
    assert!(rig.lines.tap_led.is_on());
    assert!(wait_until(Duration::from_secs(12), || !rig.lines.tap_pump.is_on()));
    let ran = t0.elapsed();
    assert!(ran >= Duration::from_millis(7_700), "pump ran {ran:?}");

    assert!(wait_until(Duration::from_secs(2), || !rig.http.posted_json().is_empty()));
    assert_eq!(
        rig.http.posted_json(),
        vec![json!({"station_id": 3, "bottle_id": 7, "user_id": 42, "volume": 299, "water_type": "tap"})]
    );

    let published = rig.broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "stations/User-42");
    let payload: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(payload, json!({"duration": 7.89}));

    assert!(wait_until(Duration::from_secs(1), || rig.probe.get() == StationState::Idle));
    assert_eq!(rig.lines.tap_pump.history(), vec![false, true, false]);
    assert!(!rig.lines.tap_led.is_on());
    assert!(rig.lines.status.is_on());
    assert_eq!(rig.lines.min_pump.history(), vec![false]);

    let (lines, _) = shutdown(rig);
    assert!(lines.all().iter().all(|l| !l.is_on()));
}

#[test]
fn lookup_without_fill_volume_returns_to_idle_untouched() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, r#"{"id": 7, "user_id": 42, "water_type": "tap"}"#);
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);

    assert!(wait_until(Duration::from_secs(2), || gets(&rig.http) == 1));
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(rig.probe.get(), StationState::Idle);
    for line in [&rig.lines.tap_pump, &rig.lines.tap_led, &rig.lines.min_pump, &rig.lines.min_led] {
        assert_eq!(line.history(), vec![false]);
    }
    assert!(rig.lines.status.is_on());
    assert!(rig.broker.published().is_empty());

    let (_, http) = shutdown(rig);
    assert!(http.posted_json().is_empty());
}

#[test]
fn unknown_water_type_aborts_cycle() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(300, "sparkling"));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);

    assert!(wait_until(Duration::from_secs(2), || gets(&rig.http) == 1));
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(rig.probe.get(), StationState::Idle);
    assert_eq!(rig.lines.tap_pump.history(), vec![false]);
    assert_eq!(rig.lines.min_pump.history(), vec![false]);
    let (_, http) = shutdown(rig);
    assert!(http.posted_json().is_empty());
}

#[test]
fn button_hold_reports_guest_volume_from_hold_time() {
    let rig = start(ScriptedTagReader::new(), MockHttp::new());
    let t0 = Instant::now();
    rig.events.send(StationEvent::ButtonPressed {
        channel: "mineral".into(),
        at: t0,
    });
    assert!(wait_until(Duration::from_secs(1), || rig.lines.min_pump.is_on()));
    assert!(rig.lines.min_led.is_on());
    rig.events.send(StationEvent::ButtonReleased {
        channel: "mineral".into(),
        at: t0 + Duration::from_millis(1500),
    });

    assert!(wait_until(Duration::from_secs(2), || !rig.http.posted_json().is_empty()));
    assert_eq!(
        rig.http.posted_json(),
        vec![json!({"station_id": 3, "volume": 300, "water_type": "mineral", "guest": true})]
    );
    assert_eq!(rig.lines.min_pump.history(), vec![false, true, false]);
    assert!(!rig.lines.min_led.is_on());
    assert_eq!(rig.probe.get(), StationState::Idle);
    shutdown(rig);
}

#[test]
fn zero_length_press_is_still_reported() {
    let rig = start(ScriptedTagReader::new(), MockHttp::new());
    let t0 = Instant::now();
    for event in [
        StationEvent::ButtonPressed {
            channel: "tap".into(),
            at: t0,
        },
        StationEvent::ButtonReleased {
            channel: "tap".into(),
            at: t0,
        },
    ] {
        rig.events.send(event);
    }
    assert!(wait_until(Duration::from_secs(2), || !rig.http.posted_json().is_empty()));
    assert_eq!(rig.http.posted_json()[0]["volume"], json!(0));
    assert_eq!(rig.http.posted_json()[0]["guest"], json!(true));
    shutdown(rig);
}

#[test]
fn panic_mid_dispense_forces_everything_off() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(3800, "tap"));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);
    assert!(wait_until(Duration::from_secs(3), || rig.probe.get() == StationState::Dispensing));
    rig.events.pressed("mineral");
    assert!(wait_until(Duration::from_secs(1), || rig.lines.min_pump.is_on()));

    let t0 = Instant::now();
    rig.monitor.trigger();
    assert!(wait_until(Duration::from_millis(200), || rig
        .lines
        .all()
        .iter()
        .all(|l| !l.is_on())));
    assert!(t0.elapsed() <= Duration::from_millis(200));

    let res = rig.handle.join().expect("station thread");
    assert_eq!(res, Err(StationError::PanicTriggered));
    assert!(rig.lines.all().iter().all(|l| !l.is_on()));
    std::thread::sleep(Duration::from_millis(50));
    assert!(rig.http.posted_json().is_empty());
}

#[test]
fn tag_for_busy_channel_is_rejected_without_touching_it() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(38, "tap"));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    rig.events.pressed("tap");
    assert!(wait_until(Duration::from_secs(1), || rig.lines.tap_pump.is_on()));

    reader.present(&UID);
    assert!(wait_until(Duration::from_secs(2), || gets(&rig.http) == 1));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(rig.probe.get(), StationState::Idle);
    assert_eq!(rig.lines.tap_pump.history(), vec![false, true]);
    assert!(rig.lines.tap_led.is_on());

    rig.events.released("tap");
    assert!(wait_until(Duration::from_secs(2), || !rig.http.posted_json().is_empty()));
    let posted = rig.http.posted_json();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["guest"], json!(true));
    shutdown(rig);
}

#[test]
fn second_tag_during_cycle_is_ignored() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(19, "tap"));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);
    assert!(wait_until(Duration::from_secs(2), || rig.probe.get() != StationState::Idle));
    reader.present(&[0xAA, 0xBB]);
    assert!(wait_until(Duration::from_secs(3), || !rig.http.posted_json().is_empty()));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(gets(&rig.http), 1);
    assert_eq!(rig.lines.tap_pump.rising_edges(), 1);
    shutdown(rig);
}

#[test]
fn shutdown_mid_dispense_reports_elapsed_time() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(3800, "tap"));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);
    assert!(wait_until(Duration::from_secs(3), || rig.probe.get() == StationState::Dispensing));
    std::thread::sleep(Duration::from_millis(300));

    let (lines, http) = shutdown(rig);
    assert!(lines.all().iter().all(|l| !l.is_on()));
    let posted = http.posted_json();
    assert_eq!(posted.len(), 1);
    let volume = posted[0]["volume"].as_u64().unwrap();
    assert!((10..100).contains(&volume), "volume {volume}");
    assert_eq!(posted[0]["user_id"], json!(42));
}

/// Yields one tag, then reports the source closed.
struct OneShotReader {
    tag: Option<RawTag>,
}

impl TagReader for OneShotReader {
    fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<RawTag>, BoxError> {
        match self.tag.take() {
            Some(tag) => Ok(Some(tag)),
            None => {
                std::thread::sleep(timeout);
                Err("tag source closed".into())
            }
        }
    }

    fn authenticate_and_read_block(
        &mut self,
        _: &[u8],
        _: u8,
        _: KeyType,
        _: &[u8; 6],
    ) -> Result<Vec<u8>, BoxError> {
        Err("read failed".into())
    }
}

#[test]
fn closed_reader_finishes_cycle_then_exits() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(19, "tap"));
    let reader = OneShotReader {
        tag: Some(RawTag { uid: UID.to_vec() }),
    };
    let rig = start_with(reader, http, true);
    let res = rig.handle.join().expect("station thread");
    assert_eq!(res, Ok(()));
    let posted = rig.http.posted_json();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["volume"], json!(19));
    assert!(rig.lines.all().iter().all(|l| !l.is_on()));
}

#[test]
fn placement_blinks_channel_indicator_until_pump_starts() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(38, "tap"));
    let reader = ScriptedTagReader::new();
    let cfg = StationConfig {
        settle: Duration::from_millis(400),
        ..config()
    };
    let rig = start_configured(cfg, reader.clone(), http, false);
    reader.present(&UID);

    assert!(wait_until(Duration::from_secs(2), || rig.probe.get()
        == StationState::AwaitingBottlePlacement));
    std::thread::sleep(Duration::from_millis(200));
    assert!(rig.lines.tap_led.rising_edges() > 1, "led {:?}", rig.lines.tap_led.history());
    assert_eq!(rig.lines.tap_pump.history(), vec![false]);

    assert!(wait_until(Duration::from_secs(2), || rig.lines.tap_pump.is_on()));
    assert!(rig.lines.tap_led.is_on());
    let settled = rig.lines.tap_led.history().len();
    std::thread::sleep(Duration::from_millis(150));
    assert!(rig.lines.tap_pump.is_on());
    assert_eq!(rig.lines.tap_led.history().len(), settled, "led toggled while pumping");

    assert!(wait_until(Duration::from_secs(3), || !rig.http.posted_json().is_empty()));
    assert!(!rig.lines.tap_led.is_on());
    assert_eq!(rig.lines.tap_pump.rising_edges(), 1);
    assert_eq!(rig.lines.min_led.history(), vec![false]);
    shutdown(rig);
}

#[test]
fn pulse_acknowledgement_pulses_status_then_restores_it() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(19, "tap"));
    let reader = ScriptedTagReader::new();
    let cfg = StationConfig {
        ack: AckStyle::Pulse(3),
        ..config()
    };
    let rig = start_configured(cfg, reader.clone(), http, false);
    reader.present(&UID);

    assert!(wait_until(Duration::from_secs(3), || !rig.http.posted_json().is_empty()));
    assert!(wait_until(Duration::from_secs(1), || rig.probe.get() == StationState::Idle));
    assert_eq!(
        rig.lines.status.history(),
        vec![false, true, false, true, false, true, false, true, false, true]
    );
    assert!(rig.lines.status.is_on());
    shutdown(rig);
}

#[test]
fn status_blinks_while_lookup_is_pending() {
    let http = MockHttp::new();
    http.route_get(PREFS_URL, 200, &prefs(19, "tap"));
    http.delay_gets(Duration::from_millis(300));
    let reader = ScriptedTagReader::new();
    let rig = start(reader.clone(), http);
    reader.present(&UID);

    assert!(wait_until(Duration::from_secs(1), || rig.probe.get()
        == StationState::AwaitingPreferences));
    assert!(wait_until(Duration::from_secs(2), || rig.probe.get()
        == StationState::AwaitingBottlePlacement));
    assert!(
        rig.lines.status.rising_edges() >= 3,
        "status {:?}",
        rig.lines.status.history()
    );
    assert!(rig.lines.status.is_on());
    shutdown(rig);
}
