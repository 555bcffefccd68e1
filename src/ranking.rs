use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::models::{Profile, ScoredCandidate};

pub const PREFERENCE_WEIGHT: f64 = 3.0;
pub const TAG_WEIGHT: f64 = 1.0;
pub const DEGREE_WEIGHT: f64 = 0.5;
pub const SEMESTER_WEIGHT: f64 = 0.5;

/// Upper bound on a single view-history lookup; a stalled lookup scores the
/// candidate as never seen rather than stalling the whole pass.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Read side of the profile-view store: most recent time the viewer saw the
/// candidate, if ever.
#[allow(async_fn_in_trait)]
pub trait ViewHistory {
    async fn last_viewed(
        &self,
        viewer_id: Uuid,
        candidate_id: Uuid,
    ) -> anyhow::Result<Option<DateTime<Utc>>>;
}

/// Weighted similarity between a viewer and one candidate.
///
/// Preference and tag matching is asymmetric: only the viewer's lists are
/// walked, and they are walked as stored, so a duplicated entry counts twice.
/// The semester term is skipped entirely unless both sides have one, and it
/// turns negative once the gap exceeds 5 semesters.
pub fn similarity_score(viewer: &Profile, candidate: &Profile, penalty: f64) -> f64 {
    let mut score = -penalty;

    for preference in &viewer.preferences {
        if candidate.preferences.contains(preference) {
            score += PREFERENCE_WEIGHT;
        }
    }

    for tag in &viewer.tags {
        if candidate.tags.contains(tag) {
            score += TAG_WEIGHT;
        }
    }

    if viewer.degree_type == candidate.degree_type {
        score += DEGREE_WEIGHT;
    }

    if let (Some(own), Some(other)) = (viewer.semester, candidate.semester) {
        let diff = f64::from((own - other).abs());
        score += SEMESTER_WEIGHT - diff / 10.0;
    }

    score
}

/// Penalty for a profile the viewer already saw `hours_since_view` hours ago.
///
/// Starts at exactly 2.00 right after a view and decays toward zero without
/// ever reaching it. The inner ratio is rounded to two decimals before
/// doubling; that rounding is part of the observable value.
pub fn view_penalty(hours_since_view: f64) -> f64 {
    let hours = hours_since_view.max(0.0);
    2.0 * round2(1.0 / (1.0 + (1.0 + hours).log2()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn hours_since(viewed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - viewed_at).num_milliseconds() as f64 / 3_600_000.0
}

/// Score every candidate against the viewer and order the feed best-first.
///
/// Lookups run one candidate at a time in fetch order. A failed or timed-out
/// lookup downgrades to "never seen" (penalty 0) and the candidate stays in
/// the output; only the caller's candidate fetch is fatal to a pass. The sort
/// is stable, so equal scores keep fetch order.
pub async fn rank_candidates<H: ViewHistory>(
    viewer: &Profile,
    candidates: Vec<Profile>,
    history: &H,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let mut scored = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let penalty = lookup_penalty(viewer, &candidate, history, now).await;
        let score = similarity_score(viewer, &candidate, penalty);
        scored.push(ScoredCandidate {
            profile: candidate,
            score,
        });
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Ordered feed with scores stripped, for consumers that only paginate.
pub fn ranked_profiles(scored: Vec<ScoredCandidate>) -> Vec<Profile> {
    scored.into_iter().map(|entry| entry.profile).collect()
}

async fn lookup_penalty<H: ViewHistory>(
    viewer: &Profile,
    candidate: &Profile,
    history: &H,
    now: DateTime<Utc>,
) -> f64 {
    let lookup = history.last_viewed(viewer.id, candidate.id);
    match tokio::time::timeout(LOOKUP_TIMEOUT, lookup).await {
        Ok(Ok(Some(viewed_at))) => view_penalty(hours_since(viewed_at, now)),
        Ok(Ok(None)) => 0.0,
        Ok(Err(err)) => {
            warn!(
                candidate = %candidate.email,
                error = %err,
                "view history lookup failed; scoring without penalty"
            );
            0.0
        }
        Err(_) => {
            warn!(
                candidate = %candidate.email,
                "view history lookup timed out; scoring without penalty"
            );
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::bail;
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::models::DegreeType;

    fn profile(name: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            email: format!("{}@campus.example", name.to_lowercase()),
            degree_type: DegreeType::Undergraduate,
            semester: None,
            tags: Vec::new(),
            preferences: Vec::new(),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[derive(Default)]
    struct FakeHistory {
        views: HashMap<Uuid, DateTime<Utc>>,
        fail_for: Option<Uuid>,
    }

    impl ViewHistory for FakeHistory {
        async fn last_viewed(
            &self,
            _viewer_id: Uuid,
            candidate_id: Uuid,
        ) -> anyhow::Result<Option<DateTime<Utc>>> {
            if self.fail_for == Some(candidate_id) {
                bail!("view store unavailable");
            }
            Ok(self.views.get(&candidate_id).copied())
        }
    }

    struct StalledHistory;

    impl ViewHistory for StalledHistory {
        async fn last_viewed(
            &self,
            _viewer_id: Uuid,
            _candidate_id: Uuid,
        ) -> anyhow::Result<Option<DateTime<Utc>>> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut viewer = profile("Noa");
        viewer.preferences = vec!["study-groups".to_string()];
        viewer.tags = vec!["climbing".to_string()];
        let candidate = viewer.clone();

        let first = similarity_score(&viewer, &candidate, 0.25);
        let second = similarity_score(&viewer, &candidate, 0.25);
        assert_close(first, second);
    }

    #[test]
    fn shared_preference_adds_full_weight() {
        let mut viewer = profile("Noa");
        viewer.preferences = vec!["study-groups".to_string(), "networking".to_string()];

        let mut matching = profile("Sam");
        matching.preferences = vec!["study-groups".to_string(), "dating".to_string()];
        let mut disjoint = profile("Kim");
        disjoint.preferences = vec!["dating".to_string(), "events".to_string()];

        let gap = similarity_score(&viewer, &matching, 0.0)
            - similarity_score(&viewer, &disjoint, 0.0);
        assert_close(gap, PREFERENCE_WEIGHT);
    }

    #[test]
    fn candidate_only_entries_contribute_nothing() {
        let viewer = profile("Noa");
        let mut candidate = profile("Sam");
        candidate.preferences = vec!["dating".to_string()];
        candidate.tags = vec!["chess".to_string(), "rowing".to_string()];

        assert_close(similarity_score(&viewer, &candidate, 0.0), DEGREE_WEIGHT);
    }

    #[test]
    fn duplicate_viewer_tags_count_twice() {
        let mut viewer = profile("Noa");
        viewer.tags = vec!["climbing".to_string(), "climbing".to_string()];
        let mut candidate = profile("Sam");
        candidate.tags = vec!["climbing".to_string()];

        assert_close(
            similarity_score(&viewer, &candidate, 0.0),
            2.0 * TAG_WEIGHT + DEGREE_WEIGHT,
        );
    }

    #[test]
    fn degree_bonus_is_flat_and_never_negative() {
        let mut viewer = profile("Noa");
        viewer.degree_type = DegreeType::Graduate;
        let mut same = profile("Sam");
        same.degree_type = DegreeType::Graduate;
        let other = profile("Kim");

        assert_close(similarity_score(&viewer, &same, 0.0), DEGREE_WEIGHT);
        assert_close(similarity_score(&viewer, &other, 0.0), 0.0);
    }

    #[test]
    fn semester_term_crosses_zero_unclamped() {
        let mut viewer = profile("Noa");
        viewer.semester = Some(1);

        let mut candidate = profile("Sam");
        candidate.semester = Some(1);
        assert_close(similarity_score(&viewer, &candidate, 0.0), 0.5 + 0.5);

        candidate.semester = Some(6);
        assert_close(similarity_score(&viewer, &candidate, 0.0), 0.5);

        candidate.semester = Some(11);
        assert_close(similarity_score(&viewer, &candidate, 0.0), 0.5 - 0.5);
    }

    #[test]
    fn missing_semester_skips_the_term() {
        let mut viewer = profile("Noa");
        viewer.semester = Some(3);
        let candidate = profile("Sam");

        assert_close(similarity_score(&viewer, &candidate, 0.0), DEGREE_WEIGHT);
    }

    #[test]
    fn penalty_is_two_immediately_after_view() {
        assert_close(view_penalty(0.0), 2.0);
    }

    #[test]
    fn penalty_decays_but_stays_positive() {
        let checkpoints = [0.0, 1.0, 6.0, 24.0, 168.0, 8760.0];
        let mut previous = f64::INFINITY;
        for hours in checkpoints {
            let penalty = view_penalty(hours);
            assert!(penalty > 0.0, "penalty hit zero at {hours}h");
            assert!(penalty < previous, "penalty rose at {hours}h");
            previous = penalty;
        }
    }

    #[test]
    fn penalty_rounds_inner_ratio_to_two_decimals() {
        // One hour: 1 / (1 + log2(2)) = 0.5 exactly, doubled to 1.0.
        assert_close(view_penalty(1.0), 1.0);
        // Three hours: 1 / 3 rounds to 0.33 before doubling.
        assert_close(view_penalty(3.0), 0.66);
    }

    #[test]
    fn future_view_timestamp_behaves_like_just_viewed() {
        assert_close(view_penalty(-2.0), 2.0);
    }

    #[tokio::test]
    async fn ranks_example_feed_in_expected_order() {
        let now = Utc::now();
        let mut viewer = profile("Noa");
        viewer.preferences = vec!["study-groups".to_string()];
        viewer.tags = vec!["climbing".to_string(), "jazz".to_string()];
        viewer.semester = Some(3);

        let mut first = profile("Sam");
        first.preferences = vec!["study-groups".to_string()];
        first.tags = vec!["climbing".to_string()];
        first.semester = Some(3);

        let mut second = profile("Kim");
        second.degree_type = DegreeType::Graduate;
        second.tags = vec!["climbing".to_string(), "jazz".to_string()];
        second.semester = Some(3);

        let mut third = profile("Ira");
        third.preferences = vec!["study-groups".to_string()];
        third.degree_type = DegreeType::Graduate;
        third.semester = Some(9);

        // Seen one hour ago, which is exactly a 1.0 penalty.
        let mut history = FakeHistory::default();
        history
            .views
            .insert(third.id, now - ChronoDuration::hours(1));

        let ranked = rank_candidates(
            &viewer,
            vec![third.clone(), second.clone(), first.clone()],
            &history,
            now,
        )
        .await;

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].profile.id, first.id);
        assert_close(ranked[0].score, 5.0);
        assert_eq!(ranked[1].profile.id, second.id);
        assert_close(ranked[1].score, 2.5);
        assert_eq!(ranked[2].profile.id, third.id);
        assert_close(ranked[2].score, 1.9);
    }

    #[tokio::test]
    async fn unseen_candidates_carry_no_penalty() {
        let viewer = profile("Noa");
        let candidate = profile("Sam");
        let history = FakeHistory::default();

        let ranked = rank_candidates(&viewer, vec![candidate], &history, Utc::now()).await;
        assert_close(ranked[0].score, DEGREE_WEIGHT);
    }

    #[tokio::test]
    async fn failed_lookup_keeps_candidate_in_feed() {
        let now = Utc::now();
        let viewer = profile("Noa");
        let first = profile("Sam");
        let second = profile("Kim");
        let third = profile("Ira");

        let mut history = FakeHistory::default();
        history.fail_for = Some(second.id);
        history
            .views
            .insert(first.id, now - ChronoDuration::hours(1));

        let ranked = rank_candidates(
            &viewer,
            vec![first.clone(), second.clone(), third.clone()],
            &history,
            now,
        )
        .await;

        assert_eq!(ranked.len(), 3);
        let failing = ranked
            .iter()
            .find(|entry| entry.profile.id == second.id)
            .unwrap();
        assert_close(failing.score, DEGREE_WEIGHT);
        let penalized = ranked
            .iter()
            .find(|entry| entry.profile.id == first.id)
            .unwrap();
        assert_close(penalized.score, DEGREE_WEIGHT - 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_lookup_times_out_to_no_penalty() {
        let viewer = profile("Noa");
        let candidate = profile("Sam");

        let ranked = rank_candidates(&viewer, vec![candidate], &StalledHistory, Utc::now()).await;
        assert_eq!(ranked.len(), 1);
        assert_close(ranked[0].score, DEGREE_WEIGHT);
    }

    #[tokio::test]
    async fn equal_scores_keep_fetch_order() {
        let viewer = profile("Noa");
        let first = profile("Sam");
        let second = profile("Kim");
        let history = FakeHistory::default();

        let ranked = rank_candidates(
            &viewer,
            vec![first.clone(), second.clone()],
            &history,
            Utc::now(),
        )
        .await;

        assert_eq!(ranked[0].profile.id, first.id);
        assert_eq!(ranked[1].profile.id, second.id);
    }

    #[test]
    fn ranked_profiles_strips_scores_in_order() {
        let first = profile("Sam");
        let second = profile("Kim");
        let scored = vec![
            ScoredCandidate {
                profile: first.clone(),
                score: 2.0,
            },
            ScoredCandidate {
                profile: second.clone(),
                score: 1.0,
            },
        ];

        let feed = ranked_profiles(scored);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, first.id);
        assert_eq!(feed[1].id, second.id);
    }
}
