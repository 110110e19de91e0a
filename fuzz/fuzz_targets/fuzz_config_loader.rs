#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = aid_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // A validated config must always convert into core settings.
    let cycle = aid_core::CycleCfg::from(&cfg);
    let _ = cycle.insulin.curve(cycle.pump.dia_h);
    let _ = aid_core::Schedules::try_from((&cfg.schedules, cycle.bg.unit));
});
