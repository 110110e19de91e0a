#![no_main]
use aid_core::{BgUnit, CycleCfg, CycleInput, DailySchedule, Schedules, TargetRange, Unit};
use libfuzzer_sys::fuzz_target;

fn schedules() -> Option<Schedules> {
    let midnight = chrono::NaiveTime::from_hms_opt(0, 0, 0)?;
    Some(Schedules {
        basal: DailySchedule::new(vec![(midnight, 1.0)], Unit::UnitsPerHour).ok()?,
        isf: DailySchedule::new(vec![(midnight, 2.0)], Unit::GlucosePerUnit(BgUnit::MmolL)).ok()?,
        csf: DailySchedule::new(vec![(midnight, 10.0)], Unit::GramsPerUnit).ok()?,
        targets: DailySchedule::new(
            vec![(midnight, TargetRange::new(5.0, 6.0).ok()?)],
            Unit::Glucose(BgUnit::MmolL),
        )
        .ok()?,
    })
}

fuzz_target!(|data: &str| {
    // Arbitrary treatment histories must fail with an error, never a panic.
    let Ok(input) = serde_json::from_str::<CycleInput>(data) else {
        return;
    };
    let (Some(now), Some(s)) = (input.now, schedules()) else {
        return;
    };
    let _ = aid_core::run_cycle(
        &input,
        now,
        &s,
        &CycleCfg::default(),
        &mut aid_traits::NullReporter,
    );
});
