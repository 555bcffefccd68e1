use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Coarse academic level. Stored as lowercase text in Postgres and CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegreeType {
    Undergraduate,
    Graduate,
}

impl DegreeType {
    pub fn as_str(self) -> &'static str {
        match self {
            DegreeType::Undergraduate => "undergraduate",
            DegreeType::Graduate => "graduate",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "undergraduate" => Ok(DegreeType::Undergraduate),
            "graduate" => Ok(DegreeType::Graduate),
            other => bail!("unknown degree type '{other}'"),
        }
    }
}

/// A user profile; serves both as the viewer and as a feed candidate.
///
/// Tags and preferences keep their stored order and any duplicates; the
/// scorer iterates the viewer's lists as-is.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub degree_type: DegreeType,
    pub semester: Option<i32>,
    pub tags: Vec<String>,
    pub preferences: Vec<String>,
}

/// Most recent time a viewer saw a candidate profile. One row per
/// (viewer, profile) pair; the store upserts on that key.
#[derive(Debug, Clone)]
pub struct ViewRecord {
    pub viewer_id: Uuid,
    pub profile_id: Uuid,
    pub profile_name: String,
    pub viewed_at: DateTime<Utc>,
}

/// Ranking output for one candidate. Recomputed on every pass, never stored.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub profile: Profile,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct PreferenceSummary {
    pub preference: String,
    pub count: usize,
}
