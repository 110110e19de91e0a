use aid_config::load_schedule_csv;
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("schedule.csv");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn loads_basal_schedule() {
    let (_dir, path) = write_csv("time,value\n00:00,0.8\n06:30,1.1\n22:00,0.9\n");
    let rows = load_schedule_csv(&path).expect("valid csv");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].time, "06:30");
    assert!((rows[1].value - 1.1).abs() < 1e-12);
    assert!(rows[1].high.is_none());
}

#[test]
fn loads_target_ranges() {
    let (_dir, path) = write_csv("time,value,high\n00:00,5.0,6.5\n07:00,4.5,6.0\n");
    let rows = load_schedule_csv(&path).expect("valid csv");
    assert_eq!(rows[0].high, Some(6.5));
}

#[rstest]
#[case("t,v\n00:00,1.0\n", "must have headers")]
#[case("time,value\n00:00,abc\n", "invalid CSV row 2")]
#[case("time,value\n06:00,1.0\n05:00,1.0\n", "strictly increasing")]
#[case("time,value\n25:00,1.0\n", "invalid time of day")]
#[case("time,value\n", "at least one entry")]
fn rejects_bad_csv(#[case] contents: &str, #[case] needle: &str) {
    let (_dir, path) = write_csv(contents);
    let err = load_schedule_csv(&path).expect_err("should fail");
    assert!(
        format!("{err}").contains(needle),
        "error {err} does not mention {needle}"
    );
}

#[test]
fn missing_file_reports_path() {
    let err = load_schedule_csv(std::path::Path::new("/nonexistent/basal.csv"))
        .expect_err("missing file");
    assert!(format!("{err}").contains("open schedule CSV"));
}
