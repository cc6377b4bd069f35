use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use crate::report::Report;

/// Read-only report file exported from the backend.
///
/// Accepts either a JSON array or JSON Lines, one report per line.
#[derive(Debug)]
pub struct ReportSource {
    pub path: PathBuf,
}

impl ReportSource {
    #[tracing::instrument(skip(path))]
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("report file not found: {}", path.display()));
        }

        info!(path = %path.display(), "opened report source");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> anyhow::Result<Vec<Report>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let reports = if text.trim_start().starts_with('[') {
            serde_json::from_str::<Vec<Report>>(&text)
                .with_context(|| format!("invalid report array in {}", self.path.display()))?
        } else {
            parse_jsonl(&text)
                .with_context(|| format!("invalid report lines in {}", self.path.display()))?
        };

        debug!(count = reports.len(), "loaded reports");
        Ok(reports)
    }
}

fn parse_jsonl(text: &str) -> anyhow::Result<Vec<Report>> {
    let mut out = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let report: Report = serde_json::from_str(trimmed)
            .with_context(|| format!("failed to parse report on line {}", idx + 1))?;
        out.push(report);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::ReportSource;

    #[test]
    fn loads_json_lines_and_reports_line_numbers() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("reports.jsonl");
        fs::write(
            &path,
            "{\"id\":1,\"type\":\"danger\",\"city\":\"Lille\",\"createdAt\":\"2024-01-01\"}\n\n\
             {\"id\":2,\"type\":\"travaux\",\"city\":\"Lille\",\"createdAt\":\"2024-01-02\"}\n",
        )
        .expect("write reports");

        let source = ReportSource::open(&path).expect("open source");
        assert_eq!(source.load().expect("load").len(), 2);

        fs::write(&path, "{\"id\":1,\"type\":\"danger\"}\nnot json\n").expect("rewrite");
        let err = source.load().expect_err("bad line must fail");
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempdir().expect("tempdir");
        assert!(ReportSource::open(&temp.path().join("absent.json")).is_err());
    }
}
