use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "smartcities-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "SMARTCITIES_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "SMARTCITIES_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Europe/Paris";

const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%dT%H:%M"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn today(
  now: DateTime<Utc>
) -> NaiveDate {
  to_project_date(now)
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn local_to_utc(
  local_naive: NaiveDateTime
) -> Option<DateTime<Utc>> {
  match project_timezone()
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Some(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      // Spring-forward gap: move past it the way wall clocks do.
      let shifted = local_naive
        .checked_add_signed(
          Duration::hours(1)
        )?;
      tracing::trace!(
        local = %local_naive,
        shifted = %shifted,
        "local time in dst gap; shifting forward"
      );
      project_timezone()
        .from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
    }
  }
}

/// Parses a report `createdAt` value.
///
/// Offset-less timestamps are read in the project timezone; a bare
/// `YYYY-MM-DD` is UTC midnight. Returns `None` for anything unrecognized;
/// callers decide how invalid instants order.
pub fn parse_created_at(
  raw: &str
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in NAIVE_TIMESTAMP_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return local_to_utc(ndt);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return date
      .and_hms_opt(0, 0, 0)
      .map(|midnight| midnight.and_utc());
  }

  tracing::trace!(
    input = token,
    "unparseable createdAt"
  );
  None
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    parse_created_at,
    to_project_date
  };

  #[test]
  fn parses_rfc3339_with_offset() {
    let parsed = parse_created_at(
      "2024-06-01T08:30:00+02:00"
    )
    .expect("rfc3339");
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2024, 6, 1, 6, 30, 0
        )
        .single()
        .expect("valid instant")
    );
  }

  #[test]
  fn parses_bare_dates_and_naive_timestamps()
   {
    let day = parse_created_at(
      "2024-01-01"
    )
    .expect("bare date");
    assert_eq!(
      to_project_date(day),
      NaiveDate::from_ymd_opt(
        2024, 1, 1
      )
      .expect("valid date")
    );

    let naive = parse_created_at(
      "2024-01-01T12:00:00.250"
    )
    .expect("naive timestamp");
    assert!(naive > day);
  }

  #[test]
  fn dst_gap_time_shifts_forward() {
    let before = parse_created_at(
      "2024-03-31T01:30:00"
    )
    .expect("before the gap");
    let in_gap = parse_created_at(
      "2024-03-31T02:30:00"
    )
    .expect("inside the gap");
    let after = parse_created_at(
      "2024-03-31T04:00:00"
    )
    .expect("after the gap");

    assert!(before < in_gap);
    assert!(in_gap < after);
  }

  #[test]
  fn bare_date_is_utc_midnight() {
    let day = parse_created_at(
      "2024-06-01"
    )
    .expect("bare date");
    assert_eq!(
      day,
      Utc
        .with_ymd_and_hms(
          2024, 6, 1, 0, 0, 0
        )
        .single()
        .expect("valid instant")
    );

    let late_evening = parse_created_at(
      "2024-05-31T23:00:00Z"
    )
    .expect("utc timestamp");
    assert!(day > late_evening);
  }

  #[test]
  fn rejects_garbage_without_panicking()
  {
    assert!(
      parse_created_at("").is_none()
    );
    assert!(
      parse_created_at("hier soir")
        .is_none()
    );
    assert!(
      parse_created_at("2024-13-45")
        .is_none()
    );
  }
}
