//! Background aggregation loop
//!
//! Polls the configured sources on their individual intervals, ingests new
//! candidates, deduplicates the pending pool, and registers a digest artifact
//! when any pending candidate survives. One sequential loop: a cycle that
//! runs long simply delays the next one, overlapping cycles cannot happen.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::catalog::ContentCatalog;
use crate::config::Config;
use crate::db::{Database, NewCandidate};
use crate::dedup::Deduplicator;
use crate::digest::DigestAssembler;
use crate::error::Result;
use crate::fetch::SourceAdapter;
use crate::types::{ArtifactId, Event};

/// Summary of one aggregation cycle
#[derive(Debug, Default, Clone)]
pub struct CycleSummary {
    /// Sources successfully fetched
    pub sources_fetched: usize,
    /// Sources that failed this cycle
    pub sources_failed: usize,
    /// New candidates ingested
    pub candidates_added: usize,
    /// Digest registered this cycle, if any
    pub digest_id: Option<ArtifactId>,
}

/// The aggregation background task
pub struct AggregationTask {
    config: Arc<Config>,
    db: Arc<Database>,
    catalog: ContentCatalog,
    adapter: Arc<dyn SourceAdapter>,
    deduplicator: Deduplicator,
    assembler: DigestAssembler,
    events: broadcast::Sender<Event>,
    accepting_new: Arc<AtomicBool>,
}

impl AggregationTask {
    /// Create the task
    pub fn new(
        config: Arc<Config>,
        db: Arc<Database>,
        catalog: ContentCatalog,
        adapter: Arc<dyn SourceAdapter>,
        events: broadcast::Sender<Event>,
        accepting_new: Arc<AtomicBool>,
    ) -> Self {
        let deduplicator = Deduplicator::new(config.scoring.clone());
        let assembler = DigestAssembler::new(config.digest.clone());
        Self {
            config,
            db,
            catalog,
            adapter,
            deduplicator,
            assembler,
            events,
            accepting_new,
        }
    }

    /// Run the aggregation loop until shutdown
    pub async fn run(self) {
        info!("Aggregation task started");

        loop {
            if !self.accepting_new.load(Ordering::SeqCst) {
                info!("Aggregation task shutting down");
                break;
            }

            match self.run_cycle().await {
                Ok(summary) => {
                    debug!(
                        sources_fetched = summary.sources_fetched,
                        sources_failed = summary.sources_failed,
                        candidates_added = summary.candidates_added,
                        "Aggregation cycle complete"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Aggregation cycle failed");
                }
            }

            sleep(self.config.aggregation.tick_interval).await;
        }

        info!("Aggregation task stopped");
    }

    /// Run a single aggregation cycle
    ///
    /// Also callable directly, for embedding and tests.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();
        let now = chrono::Utc::now().timestamp();

        for source in &self.config.sources {
            if !source.enabled {
                debug!(source_id = %source.id, "Source disabled, skipping");
                continue;
            }

            if !self.source_is_due(&source.id, source.poll_interval.as_secs() as i64, now).await? {
                continue;
            }

            // A failing source never takes the cycle down with it
            match self.adapter.fetch(source).await {
                Ok(items) => {
                    info!(
                        source_id = %source.id,
                        item_count = items.len(),
                        "Fetched source"
                    );

                    for item in items {
                        let inserted = self
                            .db
                            .insert_candidate_if_new(&NewCandidate {
                                natural_key: item.natural_key,
                                source_id: source.id.clone(),
                                title: item.title,
                                body: item.body,
                                link: item.link,
                                author: item.author,
                                published_at: item.published_at,
                            })
                            .await?;
                        if inserted.is_some() {
                            summary.candidates_added += 1;
                        }
                    }

                    self.db.record_source_success(&source.id, now).await?;
                    summary.sources_fetched += 1;
                }
                Err(e) => {
                    error!(source_id = %source.id, error = %e, "Failed to fetch source");
                    self.db.record_source_error(&source.id, &e.to_string()).await?;
                    summary.sources_failed += 1;
                }
            }
        }

        // Not gated on new arrivals: candidates left pending by an earlier
        // cycle (budget skips, a failed registration) get reconsidered here.
        summary.digest_id = self.build_digest().await?;

        let _ = self.events.send(Event::AggregationCycleComplete {
            sources_fetched: summary.sources_fetched,
            sources_failed: summary.sources_failed,
            candidates_added: summary.candidates_added,
            digest_id: summary.digest_id,
        });

        Ok(summary)
    }

    async fn source_is_due(&self, source_id: &str, poll_secs: i64, now: i64) -> Result<bool> {
        let state = self.db.get_source_state(source_id).await?;
        Ok(match state.and_then(|s| s.last_fetch_at) {
            Some(last) => now - last >= poll_secs,
            None => true,
        })
    }

    /// Deduplicate pending candidates and register a digest from the winners
    async fn build_digest(&self) -> Result<Option<ArtifactId>> {
        let pending = self.db.list_pending_candidates().await?;
        if pending.is_empty() {
            return Ok(None);
        }

        let trust: HashMap<String, f64> = self
            .config
            .sources
            .iter()
            .map(|s| (s.id.clone(), s.trust_weight))
            .collect();

        let as_of = chrono::Utc::now().timestamp();
        let outcome = self.deduplicator.process(pending, &trust, as_of);

        for (loser, winner) in &outcome.superseded {
            self.db.mark_candidate_superseded(*loser, *winner).await?;
        }
        if outcome.malformed > 0 {
            debug!(count = outcome.malformed, "Dropped malformed candidates");
        }

        let digest = self.assembler.assemble(&outcome.ranked, chrono::Utc::now());
        if digest.is_empty() {
            return Ok(None);
        }

        let artifact_id = self.catalog.register_digest(&digest).await?;

        // Only candidates that made it into the digest are consumed; the
        // rest stay pending for the next cycle.
        let scores: HashMap<i64, f64> = outcome
            .ranked
            .iter()
            .map(|s| (s.candidate.id, s.score))
            .collect();
        for candidate_id in &digest.items {
            let score = scores.get(&candidate_id.0).copied().unwrap_or(0.0);
            self.db.mark_candidate_selected(*candidate_id, score).await?;
        }

        let artifact = self.catalog.get(artifact_id).await?;
        let _ = self.events.send(Event::ArtifactRegistered {
            id: artifact_id,
            kind: crate::types::ArtifactKind::from_i32(artifact.kind),
            title: artifact.title,
            size_bytes: artifact.size_bytes as u64,
        });

        Ok(Some(artifact_id))
    }
}
