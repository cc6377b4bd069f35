use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarDay, GRID_COLUMNS, MarkedDates, cell_state};
use crate::config::Config;
use crate::filter::extract_city_name;
use crate::report::Report;

const WEEKDAY_LABELS: [&str; GRID_COLUMNS] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

/// What the calendar printer highlights besides the grid itself.
#[derive(Debug, Clone, Default)]
pub struct CalendarMarks {
    pub marked: MarkedDates,
    pub selected: Option<NaiveDate>,
    pub today: Option<NaiveDate>,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, reports))]
    pub fn print_report_table(&mut self, reports: &[Report], active_filters: usize) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_report_table(out, reports, active_filters)
    }

    pub fn write_report_table<W: Write>(
        &self,
        mut out: W,
        reports: &[Report],
        active_filters: usize,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Type".to_string(),
            "City".to_string(),
            "Distance".to_string(),
            "Created".to_string(),
        ];

        let rows = reports
            .iter()
            .map(|report| {
                let distance = report
                    .distance
                    .map(|d| format!("{d:.0} m"))
                    .unwrap_or_else(|| "-".to_string());
                vec![
                    self.paint(&report.id.to_string(), "33"),
                    report.kind.clone(),
                    extract_city_name(&report.city),
                    distance,
                    report.created_at.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(
            out,
            "{} report(s), {} active filter(s)",
            reports.len(),
            active_filters
        )?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_city_summary(
        &mut self,
        cities: &[String],
        categories: &BTreeMap<String, usize>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_city_summary(out, cities, categories)
    }

    pub fn write_city_summary<W: Write>(
        &self,
        mut out: W,
        cities: &[String],
        categories: &BTreeMap<String, usize>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint("Cities", "1"))?;
        for city in cities {
            writeln!(out, "  {city}")?;
        }

        writeln!(out, "{}", self.paint("Categories", "1"))?;
        let rows = categories
            .iter()
            .map(|(kind, count)| vec![kind.clone(), count.to_string()])
            .collect();
        write_table(&mut out, vec!["Type".to_string(), "Count".to_string()], rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, grid, marks))]
    pub fn print_calendar(
        &mut self,
        year: i32,
        month: u32,
        grid: &[CalendarDay],
        marks: &CalendarMarks,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_calendar(out, year, month, grid, marks)
    }

    /// Month is 0-indexed, matching [`crate::calendar::build_month_grid`].
    pub fn write_calendar<W: Write>(
        &self,
        mut out: W,
        year: i32,
        month: u32,
        grid: &[CalendarDay],
        marks: &CalendarMarks,
    ) -> anyhow::Result<()> {
        writeln!(out, "{year}-{:02}", month + 1)?;
        let header = WEEKDAY_LABELS
            .iter()
            .map(|label| format!(" {label}  "))
            .collect::<String>();
        writeln!(out, "{}", header.trim_end())?;

        for week in grid.chunks(GRID_COLUMNS) {
            let mut line = String::new();
            for day in week {
                line.push_str(&self.format_cell(day, marks));
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        Ok(())
    }

    fn format_cell(&self, day: &CalendarDay, marks: &CalendarMarks) -> String {
        let Some(date) = day.date else {
            return " ".repeat(5);
        };
        let state = cell_state(day, &marks.marked, marks.selected, marks.today);

        let (open, close) = if state.selected {
            ('[', ']')
        } else if state.today {
            ('<', '>')
        } else {
            (' ', ' ')
        };
        let label = format!("{:>2}", date.day());
        let label = if !day.is_current_month {
            self.paint(&label, "2")
        } else if state.marked {
            self.paint(&label, "31")
        } else {
            label
        };
        let marker = if state.marked { '*' } else { ' ' };

        format!("{open}{label}{close}{marker}")
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| pad(header, *width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible_width)))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{CalendarMarks, Renderer};
    use crate::calendar::build_month_grid;
    use crate::report::Report;

    #[test]
    fn report_table_aligns_accented_city_names() {
        let reports = vec![
            Report::new(1, "danger", "1 rue A, 59000 Lille, France").with_distance(12.4),
            Report::new(2, "travaux", "2 rue B, 62110 Hénin-Beaumont, France"),
        ];
        let mut buf = Vec::new();
        Renderer::plain()
            .write_report_table(&mut buf, &reports, 2)
            .expect("render table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("ID Type"));
        assert!(lines[2].contains("Lille"));
        assert!(lines[2].contains("12 m"));
        assert!(lines[3].contains("Hénin-Beaumont"));
        assert!(lines[3].ends_with(" -"));
        assert!(text.ends_with("2 report(s), 2 active filter(s)\n"));
    }

    #[test]
    fn calendar_prints_six_weeks_with_markers() {
        let grid = build_month_grid(2024, 1).expect("grid");
        let mut marks = CalendarMarks {
            selected: NaiveDate::from_ymd_opt(2024, 2, 14),
            ..CalendarMarks::default()
        };
        marks.marked.insert("2024-02-03".to_string(), true);

        let mut buf = Vec::new();
        Renderer::plain()
            .write_calendar(&mut buf, 2024, 1, &grid, &marks)
            .expect("render calendar");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "2024-02");
        assert!(lines[1].starts_with(" Mo "));
        assert!(text.contains(" 3 *"));
        assert!(text.contains("[14]"));
        assert!(lines[2].starts_with(" 29 "));
    }
}
