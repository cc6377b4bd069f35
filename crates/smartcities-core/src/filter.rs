use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::anyhow;
use regex::Regex;
use tracing::{
  debug,
  trace
};

use crate::datetime::parse_created_at;
use crate::report::Report;

pub const ALL_CATEGORIES: &str = "Tous";
pub const CURRENT_USER_CITY: &str =
  "utilisateur";

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub enum CategoryFilter {
  #[default]
  All,
  Named(String)
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub enum CityFilter {
  #[default]
  Any,
  CurrentUser,
  Named(String)
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum SortOrder {
  Date,
  #[default]
  Distance
}

impl SortOrder {
  pub fn as_key(
    &self
  ) -> &'static str {
    match self {
      | Self::Date => "date",
      | Self::Distance => "distance"
    }
  }
}

impl std::str::FromStr for SortOrder {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "date" => Ok(Self::Date),
      | "distance" => {
        Ok(Self::Distance)
      }
      | other => {
        Err(anyhow!(
          "unknown sort order: \
           {other} (expected date or \
           distance)"
        ))
      }
    }
  }
}

impl CategoryFilter {
  pub fn from_raw(raw: &str) -> Self {
    if raw == ALL_CATEGORIES {
      Self::All
    } else {
      Self::Named(raw.to_string())
    }
  }
}

impl CityFilter {
  pub fn from_raw(
    raw: Option<&str>
  ) -> Self {
    match raw {
      | None => Self::Any,
      | Some(CURRENT_USER_CITY) => {
        Self::CurrentUser
      }
      | Some(name) => {
        Self::Named(name.to_string())
      }
    }
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FilterConfig {
  pub category:   CategoryFilter,
  pub city:       CityFilter,
  pub sort_order: SortOrder
}

impl FilterConfig {
  pub fn from_raw(
    category: &str,
    city: Option<&str>,
    sort: &str
  ) -> anyhow::Result<Self> {
    Ok(Self {
      category:   CategoryFilter::from_raw(
        category
      ),
      city:       CityFilter::from_raw(
        city
      ),
      sort_order: sort.parse()?
    })
  }
}

/// Filters and orders `reports` without touching the input.
///
/// Category, then city, then a stable sort; ties keep their input order.
#[tracing::instrument(skip(reports), fields(total = reports.len()))]
pub fn apply_filters(
  reports: &[Report],
  config: &FilterConfig
) -> Vec<Report> {
  let mut out: Vec<Report> = reports
    .iter()
    .filter(|report| {
      matches_category(
        report,
        &config.category
      )
    })
    .filter(|report| {
      matches_city(report, &config.city)
    })
    .cloned()
    .collect();

  match config.sort_order {
    | SortOrder::Distance => {
      out.sort_by(compare_by_distance)
    }
    | SortOrder::Date => {
      sort_by_date_desc(&mut out)
    }
  }

  debug!(
    kept = out.len(),
    dropped = reports.len() - out.len(),
    sort = config.sort_order.as_key(),
    "applied report filters"
  );
  out
}

/// Count of settings that differ from the defaults, for the filter badge.
pub fn active_filter_count(
  config: &FilterConfig
) -> usize {
  [
    config.category
      != CategoryFilter::All,
    config.city != CityFilter::Any,
    config.sort_order
      != SortOrder::Distance
  ]
  .into_iter()
  .filter(|active| *active)
  .count()
}

fn matches_category(
  report: &Report,
  category: &CategoryFilter
) -> bool {
  let ok = match category {
    | CategoryFilter::All => true,
    | CategoryFilter::Named(name) => {
      report.kind.to_lowercase()
        == name.to_lowercase()
    }
  };
  trace!(id = %report.id, kind = %report.kind, ok, "category predicate");
  ok
}

fn matches_city(
  report: &Report,
  city: &CityFilter
) -> bool {
  match city {
    | CityFilter::Any
    | CityFilter::CurrentUser => true,
    | CityFilter::Named(name) => {
      let extracted =
        extract_city_name(&report.city);
      let ok = extracted.to_lowercase()
        == name.to_lowercase();
      trace!(id = %report.id, city = %extracted, ok, "city predicate");
      ok
    }
  }
}

fn compare_by_distance(
  a: &Report,
  b: &Report
) -> Ordering {
  a.distance
    .unwrap_or(f64::MAX)
    .total_cmp(
      &b.distance.unwrap_or(f64::MAX)
    )
}

fn sort_by_date_desc(
  reports: &mut Vec<Report>
) {
  let mut keyed: Vec<_> =
    std::mem::take(reports)
      .into_iter()
      .map(|report| {
        (
          parse_created_at(
            &report.created_at
          ),
          report
        )
      })
      .collect();

  // Newest first; `None` compares below every instant so invalid dates land last.
  keyed.sort_by(|(a, _), (b, _)| {
    b.cmp(a)
  });

  reports.extend(
    keyed
      .into_iter()
      .map(|(_, report)| report)
  );
}

fn postal_code_re()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"[0-9]{5}\s+([^,]+)").ok()
  })
  .as_ref()
}

fn anchored_postal_code_re()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^[0-9]{5}\s+(.+)$").ok()
  })
  .as_ref()
}

/// Best-effort city name from a free-text French address.
///
/// Tiers, in order: `<5 ASCII digits> <name>` anywhere; the segment before the
/// last `France` segment; the raw address.
pub fn extract_city_name(
  address: &str
) -> String {
  if let Some(name) =
    city_after_postal_code(address)
  {
    return name;
  }

  if let Some(name) =
    city_before_country(address)
  {
    trace!(address, city = %name, "city from country segment");
    return name;
  }

  trace!(
    address,
    "no city pattern; using raw address"
  );
  address.to_string()
}

fn city_after_postal_code(
  address: &str
) -> Option<String> {
  let caps = postal_code_re()?
    .captures(address)?;
  let name = caps.get(1)?.as_str().trim();
  (!name.is_empty())
    .then(|| name.to_string())
}

fn city_before_country(
  address: &str
) -> Option<String> {
  let parts: Vec<&str> =
    address.split(',').collect();
  let country_idx = parts
    .iter()
    .rposition(|part| {
      part.contains("France")
    })
    .filter(|idx| *idx > 0)?;

  let candidate =
    parts[country_idx - 1].trim();
  if let Some(caps) =
    anchored_postal_code_re()
      .and_then(|re| {
        re.captures(candidate)
      })
    && let Some(name) = caps.get(1)
  {
    let name = name.as_str().trim();
    if !name.is_empty() {
      return Some(name.to_string());
    }
  }

  (!candidate.is_empty())
    .then(|| candidate.to_string())
}

/// Distinct canonical city names, first spelling wins.
pub fn available_cities(
  reports: &[Report]
) -> Vec<String> {
  let mut by_key: BTreeMap<
    String,
    String
  > = BTreeMap::new();
  for report in reports {
    let name =
      extract_city_name(&report.city);
    if name.trim().is_empty() {
      continue;
    }
    by_key
      .entry(name.to_lowercase())
      .or_insert(name);
  }
  by_key.into_values().collect()
}

pub fn category_counts(
  reports: &[Report]
) -> BTreeMap<String, usize> {
  let mut counts = BTreeMap::new();
  for report in reports {
    *counts
      .entry(report.kind.to_lowercase())
      .or_insert(0) += 1;
  }
  counts
}
