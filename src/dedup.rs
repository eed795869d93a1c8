//! Candidate deduplication and quality scoring
//!
//! Pure logic: no I/O, no clocks. The caller passes the pending candidates,
//! the per-source trust weights, and an explicit `as_of` instant, and gets
//! back a deterministic ranking plus the supersede decisions. Running the
//! same input twice always yields the same output.

use std::collections::{HashMap, HashSet};

use crate::config::ScoringConfig;
use crate::db::Candidate;
use crate::types::CandidateId;

/// A candidate that survived deduplication, with its quality score
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// The surviving candidate
    pub candidate: Candidate,
    /// Quality score in [0.0, 1.0]
    pub score: f64,
}

/// Result of a deduplication pass
///
/// Every input candidate is accounted for exactly once: it appears in
/// `ranked`, is named as a loser in `superseded`, or is counted in
/// `malformed`.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Surviving candidates, best first
    pub ranked: Vec<ScoredCandidate>,
    /// (loser, winner) pairs for near-duplicate collisions
    pub superseded: Vec<(CandidateId, CandidateId)>,
    /// Candidates dropped for having no usable title or body
    pub malformed: usize,
}

/// Deduplicates and ranks pending candidates
pub struct Deduplicator {
    config: ScoringConfig,
}

impl Deduplicator {
    /// Create a deduplicator with the given scoring tunables
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Run a full pass over `candidates`
    ///
    /// `trust` maps source ids to trust weights; unknown sources score the
    /// neutral 0.5. `as_of` is the instant recency decay is computed against.
    pub fn process(
        &self,
        candidates: Vec<Candidate>,
        trust: &HashMap<String, f64>,
        as_of: i64,
    ) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();

        let mut scored: Vec<(Candidate, f64, HashSet<u64>, usize)> = Vec::new();
        for candidate in candidates {
            if candidate.title.trim().is_empty() || candidate.body.trim().is_empty() {
                outcome.malformed += 1;
                continue;
            }
            let trust_weight = trust.get(&candidate.source_id).copied().unwrap_or(0.5);
            let score = self.quality_score(&candidate, trust_weight, as_of);
            let normalized = normalize(&candidate.body);
            let norm_words = normalized.split(' ').filter(|w| !w.is_empty()).count();
            let shingle_set = shingles(&normalized);
            scored.push((candidate, score, shingle_set, norm_words));
        }

        // A collision keeps the more complete body: longest normalized text
        // wins, whatever the quality scores say. Sorting by completeness
        // first makes the clustering pass order-independent.
        scored.sort_by(|a, b| {
            b.3.cmp(&a.3)
                .then_with(|| a.0.published_at.cmp(&b.0.published_at))
                .then_with(|| a.0.natural_key.cmp(&b.0.natural_key))
        });

        let mut survivors: Vec<(Candidate, f64, HashSet<u64>)> = Vec::new();
        for (candidate, score, shingle_set, _) in scored {
            let winner = survivors.iter().find(|(_, _, existing)| {
                jaccard(existing, &shingle_set) >= self.config.similarity_threshold
            });

            match winner {
                Some((winning, _, _)) => {
                    outcome
                        .superseded
                        .push((CandidateId(candidate.id), CandidateId(winning.id)));
                }
                None => survivors.push((candidate, score, shingle_set)),
            }
        }

        // Rank orders the output only; it never decides collisions.
        survivors.sort_by(|a, b| rank_order(&a.0, a.1, &b.0, b.1));

        outcome.ranked = survivors
            .into_iter()
            .map(|(candidate, score, _)| ScoredCandidate { candidate, score })
            .collect();

        outcome
    }

    /// Deterministic quality score in [0.0, 1.0]
    ///
    /// Weighted blend of word-count fit, source trust, and recency decay.
    pub fn quality_score(&self, candidate: &Candidate, trust_weight: f64, as_of: i64) -> f64 {
        let word_count = candidate.body.split_whitespace().count();

        let length = if word_count >= self.config.min_words && word_count <= self.config.max_words
        {
            1.0
        } else if word_count < self.config.min_words {
            word_count as f64 / self.config.min_words.max(1) as f64
        } else {
            self.config.max_words as f64 / word_count as f64
        };

        let age_hours = ((as_of - candidate.published_at).max(0)) as f64 / 3600.0;
        let recency = 0.5_f64.powf(age_hours / self.config.half_life_hours);

        length * self.config.length_weight
            + trust_weight.clamp(0.0, 1.0) * self.config.trust_weight
            + recency * self.config.recency_weight
    }
}

/// Total ordering for the ranking: score desc, then published asc, then
/// natural key asc. Natural keys are unique, so ties cannot remain.
fn rank_order(a: &Candidate, a_score: f64, b: &Candidate, b_score: f64) -> std::cmp::Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.published_at.cmp(&b.published_at))
        .then_with(|| a.natural_key.cmp(&b.natural_key))
}

/// Lowercase, drop non-alphanumerics, collapse whitespace
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Word 3-gram shingle set, hashed for compact comparison
///
/// Texts shorter than three words shingle into their individual words so
/// near-identical snippets still collide.
fn shingles(normalized: &str) -> HashSet<u64> {
    use std::hash::{Hash, Hasher};

    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

    let hash_one = |parts: &[&str]| {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        parts.hash(&mut hasher);
        hasher.finish()
    };

    if words.len() < 3 {
        return words.iter().map(|w| hash_one(&[w])).collect();
    }

    words.windows(3).map(hash_one).collect()
}

fn jaccard(a: &HashSet<u64>, b: &HashSet<u64>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;

    fn candidate(id: i64, key: &str, source: &str, body: &str, published_at: i64) -> Candidate {
        Candidate {
            id,
            natural_key: key.to_string(),
            source_id: source.to_string(),
            title: format!("Title {key}"),
            body: body.to_string(),
            link: None,
            author: None,
            published_at,
            fetched_at: published_at,
            status: 0,
            superseded_by: None,
            quality_score: None,
        }
    }

    fn words(n: usize, seed: &str) -> String {
        (0..n)
            .map(|i| format!("{seed}{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(ScoringConfig::default())
    }

    #[test]
    fn test_no_silent_loss() {
        let input = vec![
            candidate(1, "k1", "a", &words(150, "w"), 1_700_000_000),
            candidate(2, "k2", "a", &words(150, "w"), 1_700_000_100),
            candidate(3, "k3", "a", &words(150, "x"), 1_700_000_200),
            candidate(4, "k4", "a", "", 1_700_000_300),
        ];
        let count = input.len();

        let outcome = dedup().process(input, &HashMap::new(), 1_700_003_600);
        assert_eq!(
            outcome.ranked.len() + outcome.superseded.len() + outcome.malformed,
            count
        );
        assert_eq!(outcome.malformed, 1);
    }

    #[test]
    fn test_near_duplicates_collide() {
        // Same 200 words, the second trails off differently for the last 20
        let shared = words(180, "w");
        let a_body = format!("{shared} {}", words(20, "a"));
        let b_body = format!("{shared} {}", words(20, "b"));

        let input = vec![
            candidate(1, "k1", "a", &a_body, 1_700_000_000),
            candidate(2, "k2", "a", &b_body, 1_700_000_000),
        ];

        let outcome = dedup().process(input, &HashMap::new(), 1_700_000_000);
        assert_eq!(outcome.ranked.len(), 1);
        assert_eq!(outcome.superseded.len(), 1);
    }

    #[test]
    fn test_distinct_items_both_survive() {
        let input = vec![
            candidate(1, "k1", "a", &words(150, "alpha"), 1_700_000_000),
            candidate(2, "k2", "a", &words(150, "omega"), 1_700_000_000),
        ];

        let outcome = dedup().process(input, &HashMap::new(), 1_700_000_000);
        assert_eq!(outcome.ranked.len(), 2);
        assert!(outcome.superseded.is_empty());
    }

    #[test]
    fn test_more_complete_copy_wins() {
        // Two copies of the same story; the one with the longer normalized
        // body survives the collision.
        let shared = words(90, "s");
        let short_body = shared.clone();
        let long_body = format!("{shared} {shared} {}", words(10, "extra"));

        let input = vec![
            candidate(1, "short", "a", &short_body, 1_700_000_000),
            candidate(2, "long", "a", &long_body, 1_700_000_000),
        ];

        let outcome = dedup().process(input, &HashMap::new(), 1_700_000_000);
        assert_eq!(outcome.ranked.len(), 1);
        assert_eq!(outcome.ranked[0].candidate.id, 2);
        assert_eq!(
            outcome.superseded,
            vec![(CandidateId(1), CandidateId(2))]
        );
    }

    #[test]
    fn test_longer_copy_survives_lower_score() {
        // The longer syndicated copy overshoots the ideal word band and
        // scores below the shorter in-band copy; completeness still decides
        // the collision, rank only orders the output.
        let shared = words(2000, "s");
        let long_body = format!("{shared} {}", words(600, "extra"));

        let input = vec![
            candidate(1, "short", "a", &shared, 1_700_000_000),
            candidate(2, "long", "a", &long_body, 1_700_000_000),
        ];

        let outcome = dedup().process(input, &HashMap::new(), 1_700_000_000);
        assert_eq!(outcome.ranked.len(), 1);
        assert_eq!(outcome.ranked[0].candidate.id, 2);
        assert_eq!(
            outcome.superseded,
            vec![(CandidateId(1), CandidateId(2))]
        );
    }

    #[test]
    fn test_idempotent_and_deterministic() {
        let make_input = || {
            vec![
                candidate(1, "k1", "a", &words(200, "p"), 1_700_000_000),
                candidate(2, "k2", "b", &words(300, "q"), 1_700_001_000),
                candidate(3, "k3", "a", &words(120, "r"), 1_700_002_000),
            ]
        };
        let trust: HashMap<String, f64> =
            [("a".to_string(), 0.9), ("b".to_string(), 0.2)].into();

        let first = dedup().process(make_input(), &trust, 1_700_010_000);
        let second = dedup().process(make_input(), &trust, 1_700_010_000);

        let ids = |o: &DedupOutcome| {
            o.ranked.iter().map(|s| s.candidate.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        for (a, b) in first.ranked.iter().zip(second.ranked.iter()) {
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn test_recency_decay_halves_per_half_life() {
        let d = dedup();
        let body = words(500, "w"); // in band, length component 1.0
        let fresh = candidate(1, "k1", "a", &body, 1_700_000_000);
        let stale = candidate(2, "k2", "a", &body, 1_700_000_000 - 24 * 3600);

        let as_of = 1_700_000_000;
        let fresh_score = d.quality_score(&fresh, 0.0, as_of);
        let stale_score = d.quality_score(&stale, 0.0, as_of);

        // length 0.4 + trust 0 + recency 0.3 vs recency 0.15
        assert!((fresh_score - 0.7).abs() < 1e-9);
        assert!((stale_score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_future_published_does_not_boost() {
        let d = dedup();
        let body = words(500, "w");
        let future = candidate(1, "k1", "a", &body, 1_700_010_000);
        let now = candidate(2, "k2", "a", &body, 1_700_000_000);

        let a = d.quality_score(&future, 0.5, 1_700_000_000);
        let b = d.quality_score(&now, 0.5, 1_700_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_trust_weight_orders_sources() {
        let input = vec![
            candidate(1, "k1", "low", &words(500, "alpha"), 1_700_000_000),
            candidate(2, "k2", "high", &words(500, "omega"), 1_700_000_000),
        ];
        let trust: HashMap<String, f64> =
            [("low".to_string(), 0.1), ("high".to_string(), 0.9)].into();

        let outcome = dedup().process(input, &trust, 1_700_000_000);
        assert_eq!(outcome.ranked[0].candidate.id, 2);
        assert_eq!(outcome.ranked[1].candidate.id, 1);
    }

    #[test]
    fn test_normalize_and_shingles() {
        assert_eq!(normalize("Hello, World!  42"), "hello world 42");
        assert_eq!(jaccard(&shingles("a b c d"), &shingles("a b c d")), 1.0);
        assert_eq!(
            jaccard(&shingles(&words(100, "x")), &shingles(&words(100, "y"))),
            0.0
        );
    }
}
