//! Mention autocomplete. Best-effort by design: candidates are limited to
//! users who already commented on the story, so the pool stays small no
//! matter how many accounts exist.

use crate::{Author, UserId};

/// How many distinct prior commenters are considered at most.
pub const CANDIDATE_POOL: i64 = 20;

/// How many suggestions a single query may return.
pub const MAX_SUGGESTIONS: usize = 10;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MentionSuggestion {
    pub user_id: UserId,
    pub username: String,
}

/// Case-insensitive substring match over the candidate pool. An empty (or
/// all-whitespace) query suggests nobody.
pub fn filter_suggestions(query: &str, candidates: Vec<Author>) -> Vec<MentionSuggestion> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    candidates
        .into_iter()
        .filter(|a| a.username.to_lowercase().contains(&needle))
        .map(|a| MentionSuggestion {
            user_id: a.id,
            username: a.username,
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn candidates(names: &[&str]) -> Vec<Author> {
        names
            .iter()
            .map(|n| Author {
                id: UserId(Uuid::new_v4()),
                username: n.to_string(),
                avatar_url: None,
            })
            .collect()
    }

    #[test]
    fn empty_query_suggests_nobody() {
        assert_eq!(filter_suggestions("", candidates(&["alice"])), Vec::new());
        assert_eq!(filter_suggestions("   ", candidates(&["alice"])), Vec::new());
    }

    #[test]
    fn no_candidates_means_no_suggestions() {
        assert_eq!(filter_suggestions("alice", Vec::new()), Vec::new());
    }

    #[test]
    fn match_is_case_insensitive_substring() {
        let found = filter_suggestions("LIC", candidates(&["Alice", "bob", "malice"]));
        let names: Vec<_> = found.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["Alice", "malice"]);
    }

    #[test]
    fn result_count_is_capped() {
        let names: Vec<String> = (0..30).map(|i| format!("reader{i}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let found = filter_suggestions("reader", candidates(&refs));
        assert_eq!(found.len(), MAX_SUGGESTIONS);
    }
}
