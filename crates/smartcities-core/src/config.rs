use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "SMARTCITIESRC";
const RC_FILE_NAME: &str =
  ".smartcitiesrc";

/// Keys the commands read; anything else is kept but warned about.
const KNOWN_KEYS: [&str; 5] = [
  "reports.file",
  "filter.category",
  "filter.city",
  "filter.sort",
  "color"
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Entry(&'a str, &'a str)
}

/// One rc line with its `#` comment dropped. `None` means malformed.
fn parse_rc_line(
  raw: &str
) -> Option<RcLine<'_>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Some(RcLine::Blank);
  }
  if let Some(rest) =
    line.strip_prefix("include ")
  {
    return Some(RcLine::Include(
      rest.trim()
    ));
  }
  let (key, value) =
    line.split_once('=')?;
  let key = key.trim();
  (!key.is_empty()).then(|| {
    RcLine::Entry(key, value.trim())
  })
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "reports.file".to_string(),
      "reports.json".to_string()
    );
    map.insert(
      "filter.category".to_string(),
      crate::filter::ALL_CATEGORIES
        .to_string()
    );
    map.insert(
      "filter.sort".to_string(),
      "distance".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line_num = idx + 1;
      match parse_rc_line(raw_line) {
        | Some(RcLine::Blank) => {}
        | Some(RcLine::Include(rest)) => {
          let include_path =
            resolve_include_path(
              &base_dir, rest
            )?;
          debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num,
            "processing include"
          );
          if self
            .loaded_files
            .contains(&include_path)
          {
            warn!(include = %include_path.display(), "include cycle; skipping");
          } else if include_path.exists() {
            self
              .load_file(&include_path)?;
          } else {
            warn!(include = %include_path.display(), "include file does not exist; skipping");
          }
        }
        | Some(RcLine::Entry(key, value)) => {
          if !KNOWN_KEYS.contains(&key) {
            warn!(
              file = %path.display(),
              line = line_num,
              key,
              "unknown config key"
            );
          }
          trace!(key, value, "loaded config key");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | None => {
          return Err(anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num,
            raw_line
          ));
        }
      }
    }

    Ok(())
  }
}

/// Report file from an explicit flag, else `reports.file`, relative paths
/// resolved against the current directory.
pub fn resolve_reports_path(
  cfg: &Config,
  override_path: Option<&Path>
) -> PathBuf {
  match override_path {
    | Some(path) => expand_tilde(path),
    | None => {
      let raw = cfg
        .get("reports.file")
        .unwrap_or_else(|| {
          "reports.json".to_string()
        });
      expand_tilde(Path::new(&raw))
    }
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    parse_rc_line
  };

  #[test]
  fn rc_lines_classify() {
    assert_eq!(
      parse_rc_line("   # only a comment"),
      Some(RcLine::Blank)
    );
    assert_eq!(
      parse_rc_line("include  extra.rc "),
      Some(RcLine::Include("extra.rc"))
    );
    assert_eq!(
      parse_rc_line(
        " filter.sort = date # newest"
      ),
      Some(RcLine::Entry(
        "filter.sort",
        "date"
      ))
    );
    assert_eq!(
      parse_rc_line("filter.city ="),
      Some(RcLine::Entry(
        "filter.city",
        ""
      ))
    );
    assert_eq!(
      parse_rc_line("= orphan"),
      None
    );
    assert_eq!(
      parse_rc_line("just words"),
      None
    );
  }

  #[test]
  fn rc_file_includes_and_overrides() {
    let temp =
      tempdir().expect("tempdir");
    let main = temp.path().join("rc");
    let extra =
      temp.path().join("filters.rc");

    fs::write(
      &main,
      "# smartcities\nreports.file = \
       /tmp/reports.json\ninclude \
       filters.rc\ncolor = off # \
       plain\n"
    )
    .expect("write rc");
    fs::write(
      &extra,
      "filter.category = danger\n"
    )
    .expect("write include");

    let mut cfg = Config::load(Some(
      main.as_path()
    ))
    .expect("load rc");
    assert_eq!(
      cfg.get("reports.file").as_deref(),
      Some("/tmp/reports.json")
    );
    assert_eq!(
      cfg
        .get("filter.category")
        .as_deref(),
      Some("danger")
    );
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
    assert_eq!(cfg.loaded_files.len(), 2);

    cfg.apply_overrides(vec![(
      "rc.filter.sort".to_string(),
      "date".to_string()
    )]);
    assert_eq!(
      cfg.get("filter.sort").as_deref(),
      Some("date")
    );
    assert!(cfg.get("filter.city").is_none());
  }

  #[test]
  fn malformed_line_is_reported() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("rc");
    fs::write(&rc, "just words\n")
      .expect("write rc");

    let err = Config::load(Some(rc.as_path()))
      .expect_err("must fail");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }
}
