// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn table_pads_columns() {
    let rows = vec![
        vec!["wf-1".to_string(), "greet".to_string()],
        vec!["wf-123456".to_string(), "etl".to_string()],
    ];
    let text = table(&["ID", "TYPE"], &rows);
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID"));
    // TYPE column starts at the same offset on every line.
    let offset = lines[0].find("TYPE").unwrap();
    assert_eq!(&lines[1][offset..offset + 5], "greet");
    assert_eq!(&lines[2][offset..offset + 3], "etl");
}

#[test]
fn table_with_no_rows_is_just_the_header() {
    let text = table(&["A", "B"], &[]);
    assert_eq!(text, "A  B\n");
}

#[parameterized(
    epoch = { 0, "1970-01-01 00:00:00" },
    y2k = { 946_684_800_000, "2000-01-01 00:00:00" },
    with_time = { 946_684_800_000 + 3_723_000, "2000-01-01 01:02:03" },
    leap_day = { 1_709_164_800_000, "2024-02-29 00:00:00" },
)]
fn formats_epoch_ms(ms: u64, expected: &str) {
    assert_eq!(format_epoch_ms(ms), expected);
}
