//! Command bodies: config and schedule loading, cycle execution, output.

use crate::cli::{CliCycle, LAST_CYCLE};
use crate::report::{JsonlIobSink, read_snapshots};
use aid_core::dosing::{NoActionReason, PumpAction, Recommendation};
use aid_core::iob::IobPrediction;
use aid_core::net::NetInsulin;
use aid_core::records::DecodeCtx;
use aid_core::{AidError, CycleCfg, CycleInput, CycleOutcome, Schedules};
use aid_traits::{Clock, CycleReporter, NullReporter};
use chrono::NaiveDateTime;
use eyre::WrapErr;
use std::path::Path;

/// Everything read from disk before a cycle runs.
pub struct Loaded {
    pub config: aid_config::Config,
    pub cycle: CycleCfg,
    pub schedules: Schedules,
}

pub const SCHEDULE_FILES: [&str; 4] = ["basal.csv", "isf.csv", "csf.csv", "targets.csv"];

/// Load and validate the TOML config, then build the schedules either from
/// its inline tables or from the CSV files in `schedule_dir`.
pub fn load(config: &Path, schedule_dir: Option<&Path>) -> eyre::Result<Loaded> {
    let text = std::fs::read_to_string(config)
        .wrap_err_with(|| format!("read config {}", config.display()))?;
    let cfg = aid_config::load_toml(&text)
        .map_err(|e| AidError::Config(format!("parse {}: {e}", config.display())))?;
    cfg.validate()
        .map_err(|e| AidError::Config(e.to_string()))?;
    let cycle = CycleCfg::from(&cfg);

    let schedules = if let Some(dir) = schedule_dir {
        let [basal, isf, csf, targets] = SCHEDULE_FILES.map(|f| dir.join(f));
        let targets_rows = aid_config::load_schedule_csv(&targets)?;
        aid_config::validate_schedule("targets", &targets_rows, true)
            .map_err(|e| AidError::Config(e.to_string()))?;
        tracing::info!(dir = %dir.display(), "loaded schedules from CSV");
        Schedules::from_rows(
            &aid_config::load_schedule_csv(&basal)?,
            &aid_config::load_schedule_csv(&isf)?,
            &aid_config::load_schedule_csv(&csf)?,
            &targets_rows,
            cycle.bg.unit,
        )?
    } else {
        Schedules::try_from((&cfg.schedules, cycle.bg.unit))?
    };
    schedules.check_units(&cycle.bg)?;
    Ok(Loaded {
        config: cfg,
        cycle,
        schedules,
    })
}

pub fn read_input(path: &Path) -> eyre::Result<CycleInput> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read input {}", path.display()))?;
    serde_json::from_str(&text).wrap_err_with(|| format!("decode cycle input {}", path.display()))
}

/// Cycle time: the command-line flag, else the input file, else the clock.
pub fn resolve_now(
    flag: Option<NaiveDateTime>,
    input: &CycleInput,
    clock: &dyn Clock,
) -> NaiveDateTime {
    flag.or(input.now).unwrap_or_else(|| clock.now())
}

fn remember(now: NaiveDateTime, cycle: &CycleCfg) {
    let _ = LAST_CYCLE.set(CliCycle {
        now,
        dia_h: cycle.pump.dia_h,
        step_min: cycle.iob.step_min,
        trend_window_min: cycle.bg.trend_window_min,
    });
}

pub fn run_recommend(
    loaded: &Loaded,
    input: &CycleInput,
    now: NaiveDateTime,
    iob_log: Option<&Path>,
) -> eyre::Result<CycleOutcome> {
    remember(now, &loaded.cycle);
    let mut sink = iob_log.map(JsonlIobSink::new);
    let mut null = NullReporter;
    let reporter: &mut dyn CycleReporter = match sink.as_mut() {
        Some(s) => s,
        None => &mut null,
    };
    aid_core::run_cycle(input, now, &loaded.schedules, &loaded.cycle, reporter)
}

pub fn print_outcome(out: &CycleOutcome, unit: &str, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string(out)?);
        return Ok(());
    }
    let d = &out.diagnostics;
    println!("Cycle: {}", out.now);
    println!("IOB: {:.2} U", out.iob_now);
    println!(
        "BG: {:.1} {unit} (eventual {:.1}, target {:.1})",
        d.bg, d.eventual_bg, d.target_bg
    );
    println!("Dose: {:.2} U", d.dose);
    match out.recommendation {
        Recommendation::Tbr(t) => println!(
            "Recommendation: TBR {:.2} {} for {} min",
            t.rate,
            t.units.as_str(),
            t.duration_min
        ),
        Recommendation::NoAction(NoActionReason::MatchesBasal) => {
            println!("Recommendation: no action (matches basal)");
        }
        Recommendation::NoAction(NoActionReason::Snoozed { remaining_min }) => {
            println!("Recommendation: no action (snoozed, {remaining_min} min left)");
        }
    }
    match out.action {
        PumpAction::Set(t) => println!("Pump: set TBR {:.2} {}", t.rate, t.units.as_str()),
        PumpAction::Cancel => println!("Pump: cancel running TBR"),
        PumpAction::Nothing => println!("Pump: nothing to do"),
    }
    for w in &out.warnings {
        println!("warning: {w}");
    }
    Ok(())
}

/// Current IOB and its decay over the next DIA.
pub fn run_iob(
    loaded: &Loaded,
    input: &CycleInput,
    now: NaiveDateTime,
    json: bool,
) -> eyre::Result<()> {
    remember(now, &loaded.cycle);
    let cfg = &loaded.cycle;
    let dia = cfg.pump.dia_h;
    let curve = cfg.insulin.curve(dia)?;
    let past = aid_core::util::checked_add_hours(now, -dia)
        .ok_or_else(|| AidError::Config(format!("cycle time {now} out of range")))?;
    let basal = loaded.schedules.basal.profile(past, now)?;
    let ctx = DecodeCtx {
        bolus_rate_u_per_h: cfg.iob.bolus_rate_u_per_h,
    };
    let net = NetInsulin::build(&input.records, &basal, &ctx)?;
    let iob = IobPrediction::predict(&net.net, &curve, cfg.iob.step_min)?;

    if json {
        let points: Vec<_> = iob
            .profile()
            .times()
            .iter()
            .zip(iob.profile().values())
            .map(|(t, v)| serde_json::json!({ "time": t, "iob_u": v }))
            .collect();
        let obj = serde_json::json!({
            "now": now,
            "curve": curve.name(),
            "dia_h": dia,
            "iob_u": iob.now(),
            "prediction": points,
        });
        println!("{obj}");
    } else {
        println!("IOB at {now}: {:.2} U ({} curve, DIA {dia} h)", iob.now(), curve.name());
        for (t, v) in iob.profile().times().iter().zip(iob.profile().values()) {
            println!("{t}  {v:.3}");
        }
    }
    Ok(())
}

pub fn run_snapshots(file: &Path, json: bool) -> eyre::Result<()> {
    let snaps = read_snapshots(file)?;
    if json {
        println!("{}", serde_json::to_string(&snaps)?);
    } else if snaps.is_empty() {
        println!("No IOB snapshots in {}", file.display());
    } else {
        for s in &snaps {
            println!("{}  {:.2} U", s.time, s.iob_u);
        }
    }
    Ok(())
}

/// Summary printed by `check-config`.
pub fn print_config_summary(loaded: &Loaded, json: bool) {
    let c = &loaded.cycle;
    let curve = c
        .insulin
        .curve(c.pump.dia_h)
        .map_or("invalid", |k| k.name());
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "dia_h": c.pump.dia_h,
                "curve": curve,
                "unit": c.bg.unit.as_str(),
                "step_min": c.iob.step_min,
                "basal_entries": loaded.schedules.basal.entries().len(),
                "logging": loaded.config.logging.file,
            })
        );
    } else {
        println!(
            "Config OK: DIA {} h, {curve} curve, BG in {}, {} basal entries",
            c.pump.dia_h,
            c.bg.unit,
            loaded.schedules.basal.entries().len()
        );
    }
}
