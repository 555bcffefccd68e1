use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{PreferenceSummary, Profile, ScoredCandidate, ViewRecord};

pub fn summarize_preferences(candidates: &[Profile]) -> Vec<PreferenceSummary> {
    let mut map: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for candidate in candidates {
        for preference in &candidate.preferences {
            *map.entry(preference.clone()).or_insert(0) += 1;
        }
    }

    let mut summaries: Vec<PreferenceSummary> = map
        .into_iter()
        .map(|(preference, count)| PreferenceSummary { preference, count })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.preference.cmp(&b.preference)));
    summaries
}

pub fn build_report(
    viewer: &Profile,
    ranked: &[ScoredCandidate],
    recent_views: &[ViewRecord],
    generated_at: DateTime<Utc>,
) -> String {
    let candidates = crate::ranking::ranked_profiles(ranked.to_vec());
    let summaries = summarize_preferences(&candidates);

    let mut output = String::new();

    let _ = writeln!(output, "# Campus Feed Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) on {}",
        viewer.display_name,
        viewer.email,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Matches");

    if ranked.is_empty() {
        let _ = writeln!(output, "No candidates available for this viewer.");
    } else {
        for entry in ranked.iter().take(10) {
            let semester = entry
                .profile
                .semester
                .map_or_else(|| "n/a".to_string(), |value| value.to_string());
            let _ = writeln!(
                output,
                "- {} ({}) score {:.2} | {} | semester {}",
                entry.profile.display_name,
                entry.profile.email,
                entry.score,
                entry.profile.degree_type.as_str(),
                semester
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Preference Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No preferences declared across candidates.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} candidates",
                summary.preference, summary.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recently Viewed");

    if recent_views.is_empty() {
        let _ = writeln!(output, "No profile views recorded yet.");
    } else {
        for view in recent_views.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} on {}",
                view.profile_name,
                view.viewed_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    output
}
