//! Keyword relevance ranking over subject and fact text.

use regex::Regex;
use std::sync::LazyLock;

use super::types::Memory;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("word regex is a valid static pattern"));

/// Words too common to signal relevance.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "with",
];

const SUBJECT_PHRASE: u32 = 10;
const FACT_PHRASE: u32 = 5;
const SUBJECT_KEYWORD: u32 = 3;
const FACT_KEYWORD: u32 = 1;

/// Lowercased, de-duplicated keywords of a query.
pub fn keywords(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in WORD.find_iter(query) {
        let word = m.as_str().to_lowercase();
        if word.len() < 2 || STOPWORDS.contains(&word.as_str()) || out.contains(&word) {
            continue;
        }
        out.push(word);
    }
    out
}

/// Relevance of a memory to a query. Zero means no match.
pub fn score(memory: &Memory, query: &str, keywords: &[String]) -> u32 {
    let subject = memory.subject.to_lowercase();
    let fact = memory.fact.to_lowercase();
    let phrase = query.trim().to_lowercase();

    let mut score = 0;
    if !phrase.is_empty() {
        if subject.contains(&phrase) {
            score += SUBJECT_PHRASE;
        }
        if fact.contains(&phrase) {
            score += FACT_PHRASE;
        }
    }

    let subject_words = word_set(&subject);
    let fact_words = word_set(&fact);
    for keyword in keywords {
        if subject_words.contains(keyword) {
            score += SUBJECT_KEYWORD;
        }
        if fact_words.contains(keyword) {
            score += FACT_KEYWORD;
        }
    }
    score
}

fn word_set(text: &str) -> Vec<String> {
    WORD.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Sort scored memories: score, then use count, then most recent first.
pub fn rank(mut scored: Vec<(u32, Memory)>) -> Vec<Memory> {
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| b.use_count.cmp(&a.use_count))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    scored.into_iter().map(|(_, m)| m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{CreatedBy, MemoryStatus};
    use chrono::Utc;
    use std::path::PathBuf;

    fn memory(subject: &str, fact: &str) -> Memory {
        Memory {
            id: subject.to_string(),
            owner: "o".into(),
            name: "n".into(),
            repository_path: PathBuf::from("/repo"),
            subject: subject.to_string(),
            fact: fact.to_string(),
            reason: String::new(),
            citations: vec![],
            status: MemoryStatus::Active,
            created_by: CreatedBy::User { name: "u".into() },
            created_at: Utc::now(),
            last_validated_at: None,
            last_used_at: None,
            use_count: 0,
            superseded_by: None,
        }
    }

    #[test]
    fn test_keywords_drop_stopwords_and_duplicates() {
        assert_eq!(
            keywords("Add the login endpoint to the login page"),
            vec!["add", "login", "endpoint", "page"]
        );
    }

    #[test]
    fn test_subject_match_outranks_fact_match() {
        let query = "database migrations";
        let kw = keywords(query);
        let subject_hit = memory("database migrations", "use sqlx");
        let fact_hit = memory("tooling", "database migrations live in db/");
        assert!(score(&subject_hit, query, &kw) > score(&fact_hit, query, &kw));
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let kw = keywords("render charts");
        assert_eq!(score(&memory("auth", "jwt tokens"), "render charts", &kw), 0);
    }

    #[test]
    fn test_keyword_requires_whole_word() {
        let kw = keywords("log");
        assert_eq!(score(&memory("login flow", "catalog"), "zzz", &kw), 0);
    }

    #[test]
    fn test_rank_breaks_ties_by_use_count() {
        let mut popular = memory("a", "x");
        popular.use_count = 5;
        let quiet = memory("b", "x");
        let ranked = rank(vec![(3, quiet), (3, popular)]);
        assert_eq!(ranked[0].id, "a");
    }
}
