use std::fs;

use chrono::Datelike;
use smartcities_core::calendar::{build_month_grid, cell_state, marked_dates_from_reports};
use smartcities_core::datastore::ReportSource;
use smartcities_core::filter::{FilterConfig, active_filter_count, apply_filters};
use tempfile::tempdir;

const REPORTS: &str = r#"[
  {"id": 1, "type": "danger", "city": "11 rue X, 59320 Haubourdin, France", "distance": 300, "createdAt": "2024-01-01T09:00:00Z", "title": "Trou"},
  {"id": 2, "type": "Danger", "city": "4 avenue Y, 59000 Lille, France", "createdAt": "2024-06-01T09:00:00Z"},
  {"id": 3, "type": "travaux", "city": "Haubourdin", "distance": 10, "createdAt": "2024-02-14"},
  {"id": "abc", "type": "danger", "city": "rue Z, Haubourdin, France", "distance": 10, "createdAt": "bientôt"}
]"#;

#[test]
fn report_file_to_filtered_view_and_calendar() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("reports.json");
    fs::write(&path, REPORTS).expect("write reports");

    let reports = ReportSource::open(&path)
        .expect("open report source")
        .load()
        .expect("load reports");
    assert_eq!(reports.len(), 4);

    let filter = FilterConfig::from_raw("danger", Some("haubourdin"), "distance").expect("filter");
    assert_eq!(active_filter_count(&filter), 2);

    let shown = apply_filters(&reports, &filter);
    let ids: Vec<String> = shown.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["abc", "1"]);
    assert_eq!(reports[0].id.to_string(), "1");

    let by_date = apply_filters(
        &reports,
        &FilterConfig::from_raw("Tous", None, "date").expect("filter"),
    );
    let ids: Vec<String> = by_date.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["2", "3", "1", "abc"]);

    let marked = marked_dates_from_reports(&reports);
    let grid = build_month_grid(2024, 1).expect("february grid");
    let marked_days: Vec<u32> = grid
        .iter()
        .filter(|day| day.is_current_month)
        .filter(|day| cell_state(day, &marked, None, None).marked)
        .filter_map(|day| day.date.map(|d| d.day()))
        .collect();
    assert_eq!(marked_days, vec![14]);
}
