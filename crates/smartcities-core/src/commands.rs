use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::calendar::{build_month_grid, marked_dates_from_reports, normalize_date};
use crate::cli::{CalendarArgs, Command, ReportsArgs, SourceArgs};
use crate::config::{Config, resolve_reports_path};
use crate::datastore::ReportSource;
use crate::datetime::today;
use crate::filter::{
    ALL_CATEGORIES, FilterConfig, active_filter_count, apply_filters, available_cities,
    category_counts,
};
use crate::render::{CalendarMarks, Renderer};
use crate::report::Report;

#[instrument(skip(cfg, renderer, command))]
pub fn dispatch(
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match command {
        Command::Reports(args) => cmd_reports(cfg, renderer, args),
        Command::Cities(args) => cmd_cities(cfg, renderer, args),
        Command::Calendar(args) => cmd_calendar(renderer, args, now),
    }
}

/// Flags win over `filter.*` config keys, which win over the built-in defaults.
pub fn resolve_filter_config(cfg: &Config, args: &ReportsArgs) -> anyhow::Result<FilterConfig> {
    let category = args
        .category
        .clone()
        .or_else(|| cfg.get("filter.category"))
        .unwrap_or_else(|| ALL_CATEGORIES.to_string());
    let city = args.city.clone().or_else(|| cfg.get("filter.city"));
    let sort = args
        .sort
        .clone()
        .or_else(|| cfg.get("filter.sort"))
        .unwrap_or_else(|| "distance".to_string());

    FilterConfig::from_raw(&category, city.as_deref(), &sort).context("invalid filter settings")
}

fn load_reports(cfg: &Config, source: &SourceArgs) -> anyhow::Result<Vec<Report>> {
    let path = resolve_reports_path(cfg, source.file.as_deref());
    load_reports_from(&path)
}

fn load_reports_from(path: &Path) -> anyhow::Result<Vec<Report>> {
    ReportSource::open(path)
        .and_then(|source| source.load())
        .with_context(|| format!("failed to load reports from {}", path.display()))
}

#[instrument(skip_all)]
fn cmd_reports(cfg: &Config, renderer: &mut Renderer, args: ReportsArgs) -> anyhow::Result<()> {
    let filter = resolve_filter_config(cfg, &args)?;
    let reports = load_reports(cfg, &args.source)?;
    let shown = apply_filters(&reports, &filter);

    info!(
        total = reports.len(),
        shown = shown.len(),
        sort = filter.sort_order.as_key(),
        "listing reports"
    );
    renderer.print_report_table(&shown, active_filter_count(&filter))
}

#[instrument(skip_all)]
fn cmd_cities(cfg: &Config, renderer: &mut Renderer, args: SourceArgs) -> anyhow::Result<()> {
    let reports = load_reports(cfg, &args)?;
    let cities = available_cities(&reports);
    let categories = category_counts(&reports);

    debug!(cities = cities.len(), categories = categories.len(), "summarized reports");
    renderer.print_city_summary(&cities, &categories)
}

#[instrument(skip_all)]
fn cmd_calendar(
    renderer: &mut Renderer,
    args: CalendarArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let today = today(now);
    let year = args.year.unwrap_or_else(|| today.year());
    let month = args.month.map(|m| m - 1).unwrap_or_else(|| today.month0());

    let grid = build_month_grid(year, month)?;

    let mut marks = CalendarMarks {
        today: Some(today),
        ..CalendarMarks::default()
    };
    if let Some(path) = args.reports.as_deref() {
        let reports = load_reports_from(path)?;
        marks.marked = marked_dates_from_reports(&reports);
    }
    for raw in &args.marked {
        let date = parse_day(raw).context("invalid --marked value")?;
        marks.marked.insert(normalize_date(date), true);
    }
    if let Some(raw) = args.selected.as_deref() {
        marks.selected = Some(parse_day(raw).context("invalid --selected value")?);
    }

    debug!(year, month, marked = marks.marked.len(), "rendering calendar");
    renderer.print_calendar(year, month, &grid, &marks)
}

fn parse_day(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow!("expected YYYY-MM-DD, got {raw}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::resolve_filter_config;
    use crate::cli::{ReportsArgs, SourceArgs};
    use crate::config::Config;
    use crate::filter::{CategoryFilter, CityFilter, SortOrder};

    fn args() -> ReportsArgs {
        ReportsArgs {
            source: SourceArgs { file: None },
            category: None,
            city: None,
            sort: None,
        }
    }

    #[test]
    fn defaults_produce_inactive_filter() {
        let cfg = Config::default();
        let filter = resolve_filter_config(&cfg, &args()).expect("filter");
        assert_eq!(filter.category, CategoryFilter::All);
        assert_eq!(filter.city, CityFilter::Any);
        assert_eq!(filter.sort_order, SortOrder::Distance);
    }

    #[test]
    fn flags_override_config_keys() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![
            ("filter.category".to_string(), "travaux".to_string()),
            ("filter.city".to_string(), "Roubaix".to_string()),
            ("filter.sort".to_string(), "date".to_string()),
        ]);

        let mut flags = args();
        flags.city = Some("utilisateur".to_string());
        let filter = resolve_filter_config(&cfg, &flags).expect("filter");

        assert_eq!(filter.category, CategoryFilter::Named("travaux".to_string()));
        assert_eq!(filter.city, CityFilter::CurrentUser);
        assert_eq!(filter.sort_order, SortOrder::Date);
    }

    #[test]
    fn bad_sort_setting_is_an_error() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("rc.filter.sort".to_string(), "votes".to_string())]);
        assert!(resolve_filter_config(&cfg, &args()).is_err());
    }
}
