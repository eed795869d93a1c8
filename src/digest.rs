//! Digest assembly
//!
//! Packages a ranked list of candidates into a single deliverable document,
//! greedily filling up to the configured item and byte bounds. Assembly is
//! deterministic: the same ranked input and bounds always produce the same
//! document and the same content hash. The `Generated:` header line carries
//! the wall clock and is excluded from the hash.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::DigestConfig;
use crate::dedup::ScoredCandidate;
use crate::types::CandidateId;

/// An assembled digest document, ready for registration
#[derive(Debug, Clone)]
pub struct DigestDocument {
    /// Digest title (prefix + date)
    pub title: String,
    /// Full document text, including the `Generated:` line
    pub content: String,
    /// sha256 hex over the document minus the `Generated:` line
    pub content_hash: String,
    /// Candidates included, in section order
    pub items: Vec<CandidateId>,
}

impl DigestDocument {
    /// Whether the digest contains no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Assembles digest documents from ranked candidates
pub struct DigestAssembler {
    config: DigestConfig,
}

impl DigestAssembler {
    /// Create an assembler with the given bounds
    pub fn new(config: DigestConfig) -> Self {
        Self { config }
    }

    /// Assemble a digest from `ranked`, best candidates first
    ///
    /// Greedy: items are taken in rank order while they fit under both
    /// `max_items` and `max_bytes`. An item too large for the remaining byte
    /// budget is skipped whole, never truncated, and scanning continues with
    /// the next one. Empty input produces a well-formed empty digest, not an
    /// error.
    pub fn assemble(
        &self,
        ranked: &[ScoredCandidate],
        generated_at: DateTime<Utc>,
    ) -> DigestDocument {
        let title = format!(
            "{} {}",
            self.config.title_prefix,
            generated_at.format("%Y-%m-%d")
        );

        let mut sections = String::new();
        let mut items = Vec::new();
        let mut used_bytes = 0usize;

        for scored in ranked {
            if items.len() >= self.config.max_items {
                break;
            }

            let section = render_section(scored);
            if used_bytes + section.len() > self.config.max_bytes {
                tracing::debug!(
                    candidate_id = scored.candidate.id,
                    section_bytes = section.len(),
                    "Skipping item too large for remaining digest budget"
                );
                continue;
            }

            used_bytes += section.len();
            items.push(CandidateId(scored.candidate.id));
            sections.push_str(&section);
        }

        if items.is_empty() {
            sections.push_str("No items in this digest.\n");
        }

        // The hash covers title and sections only, so re-generating the same
        // selection at a different instant yields the same hash.
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\n");
        hasher.update(sections.as_bytes());
        let content_hash = format!("{:x}", hasher.finalize());

        let content = format!(
            "# {title}\n\nGenerated: {}\n\n{sections}",
            generated_at.to_rfc3339()
        );

        DigestDocument {
            title,
            content,
            content_hash,
            items,
        }
    }
}

fn render_section(scored: &ScoredCandidate) -> String {
    let c = &scored.candidate;

    let mut attribution = format!("*{}*", c.source_id);
    if let Some(author) = &c.author {
        attribution.push_str(&format!(" by {author}"));
    }
    if let Some(link) = &c.link {
        attribution.push_str(&format!(" — {link}"));
    }

    format!("## {}\n\n{attribution}\n\n{}\n\n", c.title, c.body)
}
