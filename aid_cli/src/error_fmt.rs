//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_CYCLE;
use aid_core::AidError;

/// Stable machine name of a typed core error.
pub const fn reason_name(e: &AidError) -> &'static str {
    match e {
        AidError::InsufficientData { .. } => "InsufficientData",
        AidError::UnitMismatch { .. } => "UnitMismatch",
        AidError::BadPredictionTime(_) => "BadPredictionTime",
        AidError::EmptyProfile { .. } => "EmptyProfile",
        AidError::UnsupportedDia(_) => "UnsupportedDia",
        AidError::MixedRecords { .. } => "MixedRecords",
        AidError::Config(_) => "Config",
        AidError::InvalidProfile(_) => "InvalidProfile",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(e) = err.downcast_ref::<AidError>() {
        return match e {
            AidError::InsufficientData { needed, found } => format!(
                "What happened: Not enough recent BG readings ({found} found, {needed} needed).\nLikely causes: CGM gap, sensor warm-up, or readings older than the trend window.\nHow to fix: Wait for fresh readings; the next cycle will retry. Widen bg.trend_window_min if readings are sparse."
            ),
            AidError::UnitMismatch { expected, found } => format!(
                "What happened: Unit mismatch (expected {expected}, found {found}).\nLikely causes: Readings or schedules in mg/dL while bg.unit is mmol/L (or the reverse), or a percent TBR.\nHow to fix: Make bg.unit, the ISF/target schedules and the readings agree."
            ),
            AidError::EmptyProfile { unit } => format!(
                "What happened: A {unit} profile has gaps nothing could fill.\nLikely causes: No records in the window and no schedule covering it.\nHow to fix: Check the basal schedule and the treatment history."
            ),
            AidError::BadPredictionTime(h) => format!(
                "What happened: {h} h is not on the IOB prediction grid.\nLikely causes: bg.analysis_horizon_h or pump.dia_h not a multiple of iob.step_min.\nHow to fix: Align both with iob.step_min in the config."
            ),
            AidError::UnsupportedDia(d) => format!(
                "What happened: The Walsh curve has no reference data for a DIA of {d} h.\nLikely causes: pump.dia_h outside 3, 4, 5 or 6.\nHow to fix: Use one of those values or switch insulin.curve to \"exponential\"."
            ),
            AidError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or schedule CSVs.\nHow to fix: Edit the config, then rerun `aid check-config`."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config and CSV loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("schedule csv must have headers") {
        return "Invalid headers in schedule CSV. Expected 'time,value' or 'time,value,high'."
            .to_string();
    }

    if lower.contains("read config") || lower.contains("read input") {
        let cause = err.root_cause();
        return format!(
            "What happened: {msg}.\nLikely causes: Wrong path or missing permissions ({cause}).\nHow to fix: Pass --config / --input with a readable file."
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

/// Map typed core errors to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<AidError>() {
        Some(AidError::InsufficientData { .. }) => 3,
        Some(AidError::UnitMismatch { .. }) => 4,
        Some(AidError::EmptyProfile { .. }) => 5,
        Some(AidError::BadPredictionTime(_)) => 6,
        Some(AidError::UnsupportedDia(_)) => 7,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(e) = err.downcast_ref::<AidError>() {
        let msg = humanize(err);
        let cycle = LAST_CYCLE.get();
        let details = match e {
            AidError::InsufficientData { needed, found } => Some(json!({
                "needed": needed,
                "found": found,
                "trend_window_min": cycle.map(|c| c.trend_window_min),
                "now": cycle.map(|c| c.now.to_string()),
            })),
            AidError::BadPredictionTime(h) => Some(json!({
                "dt_h": h,
                "step_min": cycle.map(|c| c.step_min),
                "dia_h": cycle.map(|c| c.dia_h),
            })),
            AidError::UnsupportedDia(d) => Some(json!({ "dia_h": d })),
            _ => None,
        };
        let obj = if let Some(d) = details {
            json!({ "reason": reason_name(e), "retryable": e.is_retryable(), "details": d, "message": msg })
        } else {
            json!({ "reason": reason_name(e), "retryable": e.is_retryable(), "message": msg })
        };
        return obj.to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
