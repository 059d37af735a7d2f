#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate must reject bad input with an error, never a panic.
    let Ok(cfg) = refill_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // Validated configs must convert to the core's station config.
        let _ = refill_core::StationConfig::try_from(&cfg)
            .expect("validated config converts");
        for ch in &cfg.channels {
            let spec = refill_core::ChannelSpec::from(ch);
            assert!(spec.flow_ml_per_s > 0.0);
        }
    }
});
