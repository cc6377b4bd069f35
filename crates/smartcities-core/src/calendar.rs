use std::collections::HashMap;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate
};
use tracing::debug;

use crate::datetime::{
  parse_created_at,
  to_project_date
};
use crate::report::Report;

pub const GRID_COLUMNS: usize = 7;
pub const GRID_ROWS: usize = 6;
pub const GRID_CELLS: usize =
  GRID_COLUMNS * GRID_ROWS;

/// Dates with events, keyed by [`normalize_date`].
pub type MarkedDates =
  HashMap<String, bool>;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct CalendarDay {
  pub date:             Option<NaiveDate>,
  pub is_current_month: bool
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub struct CellState {
  pub marked:   bool,
  pub selected: bool,
  pub today:    bool
}

#[must_use]
pub fn is_leap_year(year: i32) -> bool {
  year % 4 == 0
    && (year % 100 != 0
      || year % 400 == 0)
}

/// Day count of a 0-indexed month. Callers pass `month` in `0..=11`.
#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  match month {
    | 1 => {
      if is_leap_year(year) {
        29
      } else {
        28
      }
    }
    | 3 | 5 | 8 | 10 => 30,
    | _ => 31
  }
}

#[must_use]
pub fn previous_month(
  year: i32,
  month: u32
) -> (i32, u32) {
  if month == 0 {
    (year - 1, 11)
  } else {
    (year, month - 1)
  }
}

#[must_use]
pub fn next_month(
  year: i32,
  month: u32
) -> (i32, u32) {
  if month >= 11 {
    (year + 1, 0)
  } else {
    (year, month + 1)
  }
}

/// `YYYY-MM-DD` key used for marked/selected lookups.
#[must_use]
pub fn normalize_date(
  date: NaiveDate
) -> String {
  format!(
    "{:04}-{:02}-{:02}",
    date.year(),
    date.month(),
    date.day()
  )
}

fn ymd(
  year: i32,
  month: u32,
  day: u32
) -> anyhow::Result<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year,
    month + 1,
    day
  )
  .ok_or_else(|| {
    anyhow!(
      "date out of range: \
       {year}-{:02}-{day:02}",
      month + 1
    )
  })
}

/// Builds the Monday-first 6x7 grid for a 0-indexed `month`.
///
/// The result always holds [`GRID_CELLS`] cells: the tail of the previous
/// month, the whole target month, then the head of the next month. A
/// `month` outside `0..=11` is rejected rather than clamped.
#[tracing::instrument]
pub fn build_month_grid(
  year: i32,
  month: u32
) -> anyhow::Result<Vec<CalendarDay>> {
  if month > 11 {
    return Err(anyhow!(
      "invalid month {month}: \
       expected 0 (January) through \
       11 (December)"
    ));
  }

  let first = ymd(year, month, 1)?;
  let day_count =
    days_in_month(year, month);

  let weekday = first
    .weekday()
    .num_days_from_sunday();
  let day_offset = if weekday == 0 {
    6
  } else {
    weekday - 1
  };

  let mut cells =
    Vec::with_capacity(GRID_CELLS);

  let (prev_year, prev_month) =
    previous_month(year, month);
  let prev_count =
    days_in_month(prev_year, prev_month);
  for day in (prev_count - day_offset
    + 1)
    ..=prev_count
  {
    cells.push(CalendarDay {
      date:             Some(ymd(
        prev_year, prev_month, day
      )?),
      is_current_month: false
    });
  }

  for day in 1..=day_count {
    cells.push(CalendarDay {
      date:             Some(ymd(
        year, month, day
      )?),
      is_current_month: true
    });
  }

  let (next_year, next_month) =
    next_month(year, month);
  let trailing =
    GRID_CELLS - cells.len();
  for day in 1..=trailing as u32 {
    cells.push(CalendarDay {
      date:             Some(ymd(
        next_year, next_month, day
      )?),
      is_current_month: false
    });
  }

  debug!(
    leading = day_offset,
    days = day_count,
    trailing,
    "built month grid"
  );
  Ok(cells)
}

/// Highlight state of one cell. Placeholder cells are never highlighted.
#[must_use]
pub fn cell_state(
  day: &CalendarDay,
  marked: &MarkedDates,
  selected: Option<NaiveDate>,
  today: Option<NaiveDate>
) -> CellState {
  let Some(date) = day.date else {
    return CellState::default();
  };
  let key = normalize_date(date);

  CellState {
    marked:   marked
      .get(&key)
      .copied()
      .unwrap_or(false),
    selected: selected
      .map(normalize_date)
      .is_some_and(|sel| sel == key),
    today:    today == Some(date)
  }
}

/// Marks the project-local creation day of every report with a valid `createdAt`.
pub fn marked_dates_from_reports(
  reports: &[Report]
) -> MarkedDates {
  reports
    .iter()
    .filter_map(|report| {
      parse_created_at(
        &report.created_at
      )
    })
    .map(|dt| {
      (
        normalize_date(
          to_project_date(dt)
        ),
        true
      )
    })
    .collect()
}
