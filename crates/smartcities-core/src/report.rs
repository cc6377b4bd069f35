use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ReportId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportId::Number(n) => write!(f, "{n}"),
            ReportId::Text(s) => f.write_str(s),
        }
    }
}

/// A civic incident report as delivered by the backend.
///
/// Only `type`, `city`, `distance` and `createdAt` are interpreted; every
/// other field is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub city: String,

    #[serde(default)]
    pub distance: Option<f64>,

    #[serde(rename = "createdAt", default)]
    pub created_at: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Report {
    pub fn new(id: u64, kind: &str, city: &str) -> Self {
        Self {
            id: ReportId::Number(id),
            kind: kind.to_string(),
            city: city.to_string(),
            distance: None,
            created_at: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_created_at(mut self, created_at: &str) -> Self {
        self.created_at = created_at.to_string();
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").and_then(|v| v.as_str())
    }
}
