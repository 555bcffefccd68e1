use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{DegreeType, Profile, ViewRecord};
use crate::ranking::ViewHistory;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn profile_from_row(row: &PgRow) -> anyhow::Result<Profile> {
    let degree_type: String = row.get("degree_type");
    Ok(Profile {
        id: row.get("id"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        degree_type: DegreeType::parse(&degree_type)?,
        semester: row.get("semester"),
        tags: row.get("tags"),
        preferences: row.get("preferences"),
    })
}

pub async fn fetch_profile_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Profile> {
    let row = sqlx::query(
        "SELECT id, display_name, email, degree_type, semester, tags, preferences \
         FROM campus_feed.profiles WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no profile registered for {email}"))?;

    profile_from_row(&row)
}

/// Everyone except the viewer and anyone already connected to the viewer,
/// in either direction. Ordered by name so repeated passes see the same
/// fetch order.
pub async fn fetch_candidates(pool: &PgPool, viewer_id: Uuid) -> anyhow::Result<Vec<Profile>> {
    let rows = sqlx::query(
        "SELECT p.id, p.display_name, p.email, p.degree_type, p.semester, p.tags, p.preferences \
         FROM campus_feed.profiles p \
         WHERE p.id <> $1 \
           AND NOT EXISTS ( \
             SELECT 1 FROM campus_feed.connections c \
             WHERE (c.profile_id = $1 AND c.friend_id = p.id) \
                OR (c.friend_id = $1 AND c.profile_id = p.id)) \
         ORDER BY p.display_name, p.email",
    )
    .bind(viewer_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch feed candidates")?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in &rows {
        candidates.push(profile_from_row(row)?);
    }
    Ok(candidates)
}

/// Upsert on (viewer, profile): a repeat view only refreshes the timestamp,
/// so one row per pair ever exists.
pub async fn record_view(pool: &PgPool, view: &ViewRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO campus_feed.profile_views (viewer_id, profile_id, viewed_at) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (viewer_id, profile_id) DO UPDATE SET viewed_at = EXCLUDED.viewed_at",
    )
    .bind(view.viewer_id)
    .bind(view.profile_id)
    .bind(view.viewed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_recent_views(
    pool: &PgPool,
    viewer_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<ViewRecord>> {
    let rows = sqlx::query(
        "SELECT v.viewer_id, v.profile_id, p.display_name, v.viewed_at \
         FROM campus_feed.profile_views v \
         JOIN campus_feed.profiles p ON p.id = v.profile_id \
         WHERE v.viewer_id = $1 \
         ORDER BY v.viewed_at DESC \
         LIMIT $2",
    )
    .bind(viewer_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(|row| ViewRecord {
            viewer_id: row.get("viewer_id"),
            profile_id: row.get("profile_id"),
            profile_name: row.get("display_name"),
            viewed_at: row.get("viewed_at"),
        })
        .collect();
    Ok(records)
}

/// `ViewHistory` backed by the profile_views table.
pub struct PgViewHistory {
    pool: PgPool,
}

impl PgViewHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ViewHistory for PgViewHistory {
    async fn last_viewed(
        &self,
        viewer_id: Uuid,
        candidate_id: Uuid,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT viewed_at FROM campus_feed.profile_views \
             WHERE viewer_id = $1 AND profile_id = $2",
        )
        .bind(viewer_id)
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|record| record.get("viewed_at")))
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let profiles = vec![
        (
            Uuid::parse_str("7f3c2a9e-5b1d-4c6a-9e2f-8a4b6c1d3e5f")?,
            "Noa Fischer",
            "noa.fischer@campus.example",
            DegreeType::Undergraduate,
            Some(3),
            vec!["climbing", "jazz", "board-games"],
            vec!["study-groups", "friendship"],
        ),
        (
            Uuid::parse_str("2b8e4d1a-7c3f-4a5b-8d6e-1f9a2c4b6d8e")?,
            "Sam Okafor",
            "sam.okafor@campus.example",
            DegreeType::Undergraduate,
            Some(4),
            vec!["climbing", "photography"],
            vec!["study-groups", "dating"],
        ),
        (
            Uuid::parse_str("9a1c3e5b-2d4f-4b6a-8c0e-3f5a7b9d1c2e")?,
            "Kim Laurent",
            "kim.laurent@campus.example",
            DegreeType::Graduate,
            Some(2),
            vec!["jazz", "board-games", "cooking"],
            vec!["networking", "friendship"],
        ),
        (
            Uuid::parse_str("4d6f8a2c-9e1b-4d3a-b5c7-6e8f0a2b4c6d")?,
            "Ira Castellanos",
            "ira.castellanos@campus.example",
            DegreeType::Undergraduate,
            None,
            vec!["rowing", "photography"],
            vec!["dating", "events"],
        ),
    ];

    for (id, name, email, degree_type, semester, tags, preferences) in profiles {
        let tags: Vec<String> = tags.into_iter().map(String::from).collect();
        let preferences: Vec<String> = preferences.into_iter().map(String::from).collect();
        sqlx::query(
            "INSERT INTO campus_feed.profiles \
             (id, display_name, email, degree_type, semester, tags, preferences) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (email) DO UPDATE \
             SET display_name = EXCLUDED.display_name, \
                 degree_type = EXCLUDED.degree_type, \
                 semester = EXCLUDED.semester, \
                 tags = EXCLUDED.tags, \
                 preferences = EXCLUDED.preferences",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(degree_type.as_str())
        .bind(semester)
        .bind(tags)
        .bind(preferences)
        .execute(pool)
        .await?;
    }

    // Noa and Kim are already friends, so Kim stays out of Noa's feed.
    sqlx::query(
        "INSERT INTO campus_feed.connections (profile_id, friend_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(Uuid::parse_str("7f3c2a9e-5b1d-4c6a-9e2f-8a4b6c1d3e5f")?)
    .bind(Uuid::parse_str("9a1c3e5b-2d4f-4b6a-8c0e-3f5a7b9d1c2e")?)
    .execute(pool)
    .await?;

    let seed_view_time = Utc
        .with_ymd_and_hms(2026, 2, 2, 18, 30, 0)
        .single()
        .context("invalid seed timestamp")?;
    record_view(
        pool,
        &ViewRecord {
            viewer_id: Uuid::parse_str("7f3c2a9e-5b1d-4c6a-9e2f-8a4b6c1d3e5f")?,
            profile_id: Uuid::parse_str("4d6f8a2c-9e1b-4d3a-b5c7-6e8f0a2b4c6d")?,
            profile_name: "Ira Castellanos".to_string(),
            viewed_at: seed_view_time,
        },
    )
    .await?;

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        display_name: String,
        email: String,
        degree_type: DegreeType,
        semester: Option<i32>,
        tags: String,
        preferences: String,
    }

    fn split_list(raw: &str) -> Vec<String> {
        raw.split('|')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(String::from)
            .collect()
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut upserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        sqlx::query(
            "INSERT INTO campus_feed.profiles \
             (id, display_name, email, degree_type, semester, tags, preferences) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (email) DO UPDATE \
             SET display_name = EXCLUDED.display_name, \
                 degree_type = EXCLUDED.degree_type, \
                 semester = EXCLUDED.semester, \
                 tags = EXCLUDED.tags, \
                 preferences = EXCLUDED.preferences",
        )
        .bind(Uuid::new_v4())
        .bind(&row.display_name)
        .bind(&row.email)
        .bind(row.degree_type.as_str())
        .bind(row.semester)
        .bind(split_list(&row.tags))
        .bind(split_list(&row.preferences))
        .execute(pool)
        .await?;
        upserted += 1;
    }

    Ok(upserted)
}
