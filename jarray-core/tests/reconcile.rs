//! End-to-end reconciliation: job file → array spec → accounting →
//! filtered job file, with no scheduler involved.

use std::io::Cursor;

use jarray_core::{
    StateBuckets, collapse, filter_tasks, parse_accounting_line, resolve_state_filters,
    scan_tasks,
};
use rstest::rstest;

const JOBS: &str = "\
./sim --seed 0
./sim --seed 1
./sim --seed 2
# seeds 3 and 4 were retired
./sim --seed 5
./sim --seed 6
./sim --seed 7
";

#[test]
fn scanned_indices_collapse_into_the_submitted_array_spec() {
    let scanned = scan_tasks(Cursor::new(JOBS)).expect("scan must succeed");
    assert_eq!(scanned.indices, vec![0, 1, 2, 4, 5, 6]);
    assert_eq!(collapse(&scanned.indices), "0-2,4-6");
}

#[rstest]
#[case::failed_only("FAILED", &["./sim --seed 2", "./sim --seed 7"])]
#[case::failed_and_cancelled("f,ca", &["./sim --seed 0", "./sim --seed 2", "./sim --seed 7"])]
fn accounting_buckets_drive_the_job_file_filter(
    #[case] filter: &str,
    #[case] expected: &[&str],
) {
    let rows: Vec<_> = [
        "sweep|8800_0|CANCELLED by 501",
        "sweep|8800_[1,4]|COMPLETED",
        "sweep|8800_[2,5-6]|FAILED",
        // Task 5 was requeued and finished cleanly; last state wins.
        "sweep|8800_5|COMPLETED",
    ]
    .iter()
    .filter_map(|line| parse_accounting_line(line))
    .collect();
    let buckets = StateBuckets::from_rows(&rows);

    let selected = resolve_state_filters(filter).expect("filter must resolve");
    let retain = buckets.indices_for(&selected);

    let mut out = Vec::new();
    let written =
        filter_tasks(Cursor::new(JOBS), &retain, &mut out).expect("filter must succeed");
    let text = String::from_utf8(out).expect("output must be UTF-8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, expected);
    assert_eq!(written, expected.len());
}

#[test]
fn round_trip_of_reported_ranges_matches_submitted_indices() {
    let scanned = scan_tasks(Cursor::new(JOBS)).expect("scan must succeed");
    let spec = format!("[{}]", collapse(&scanned.indices));
    let expanded = jarray_core::expand(&spec).expect("spec must expand");
    assert_eq!(expanded, scanned.indices);
}
