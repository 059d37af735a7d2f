use refill_config::{AckMode, KeyTypeCfg, TagKeySource, load_path, load_toml};
use rstest::rstest;

const BASE: &str = r#"
[station]
id = 1

[backend]
base_url = "https://backend.example/api"

[indicators]
status_pin = 21

[[channel]]
name = "tap"
water_type = "Tap"
pump_pin = 17
indicator_pin = 22
flow_ml_per_s = 38.0
button_pin = 5

[[channel]]
name = "mineral"
water_type = "Mineral"
pump_pin = 27
indicator_pin = 23
flow_ml_per_s = 200.0
"#;

#[test]
fn defaults_fill_optional_sections() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.station.settle_ms, 3000);
    assert_eq!(cfg.station.poll_ms, 500);
    assert_eq!(cfg.station.tag_key, TagKeySource::Uid);
    assert_eq!((cfg.tag.start_block, cfg.tag.end_block), (4, 6));
    assert_eq!(cfg.tag.key_type, KeyTypeCfg::B);
    assert_eq!(cfg.tag.key_bytes().unwrap(), [0xFF; 6]);
    assert_eq!(cfg.backend.timeout_ms, 5000);
    assert!(cfg.telemetry.is_none());
    assert!(cfg.panic.is_none());
    assert_eq!(cfg.indicators.half_period_ms, 200);
    assert_eq!(cfg.indicators.ack_blinks, 3);
    assert_eq!(cfg.indicators.ack_mode, AckMode::Blink);
    assert_eq!(cfg.inputs.debounce_ms, 200);
    assert!(cfg.inputs.active_low);
}

#[test]
fn telemetry_defaults_to_tls_on_8883() {
    let toml = format!(
        "{BASE}\n[telemetry]\nhost = \"broker.local\"\nbase_topic = \"stations/\"\n"
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid");
    let t = cfg.telemetry.unwrap();
    assert_eq!(t.port, 8883);
    assert!(t.tls);
    assert_eq!(t.qos, 0);
}

#[rstest]
#[case("flow_ml_per_s = 200.0", "flow_ml_per_s = 0.0", "flow_ml_per_s must be > 0")]
#[case("flow_ml_per_s = 200.0", "flow_ml_per_s = -4.0", "flow_ml_per_s must be > 0")]
#[case("name = \"mineral\"", "name = \"tap\"", "duplicate channel name")]
#[case("water_type = \"Mineral\"", "water_type = \"TAP\"", "duplicate channel water_type")]
#[case("pump_pin = 27", "pump_pin = 21", "pin 21 is assigned twice")]
#[case("button_pin = 5", "button_pin = 22", "pin 22 is assigned twice")]
#[case("base_url = \"https://backend.example/api\"", "base_url = \"  \"", "base_url must not be empty")]
#[case("id = 1", "id = 1\npoll_ms = 0", "poll_ms must be >= 1")]
#[case("status_pin = 21", "status_pin = 21\nhalf_period_ms = 0", "half_period_ms must be >= 1")]
fn rejects_invalid_values(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let toml = BASE.replacen(from, to, 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected {needle:?} in {err}"
    );
}

#[rstest]
#[case("[tag]\nstart_block = 6\nend_block = 6\n", "end_block must be greater")]
#[case("[tag]\nkey = \"FFFF\"\n", "must be 6 bytes")]
#[case("[tag]\nkey = \"GGGGGGGGGGGG\"\n", "invalid hex digit")]
#[case("[telemetry]\nhost = \"b\"\nbase_topic = \"t/\"\nqos = 2\n", "qos must be 0 or 1")]
#[case("[telemetry]\nhost = \"b\"\nbase_topic = \"t/\"\nusername = \"u\"\n", "set together")]
#[case("[panic]\npin = 17\n", "pin 17 is assigned twice")]
fn rejects_invalid_sections(#[case] extra: &str, #[case] needle: &str) {
    let toml = format!("{BASE}\n{extra}");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected {needle:?} in {err}"
    );
}

#[test]
fn empty_channel_list_is_rejected() {
    let toml = BASE.split("[[channel]]").next().unwrap();
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains("at least one [[channel]]"));
}

#[test]
fn unknown_enum_values_fail_to_parse() {
    let toml = BASE.replacen("id = 1", "id = 1\ntag_key = \"barcode\"", 1);
    assert!(load_toml(&toml).is_err());
}

#[test]
fn load_path_reads_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.toml");
    std::fs::write(&good, BASE).unwrap();
    assert_eq!(load_path(&good).unwrap().channels.len(), 2);

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, BASE.replacen("flow_ml_per_s = 38.0", "flow_ml_per_s = 0.0", 1)).unwrap();
    assert!(load_path(&bad).is_err());
    assert!(load_path(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/refill.toml");
    let cfg = load_path(&path).expect("etc/refill.toml validates");
    assert_eq!(cfg.channels.len(), 2);
    assert!(cfg.telemetry.is_some());
}
