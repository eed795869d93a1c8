//! Top-level content server
//!
//! [`ContentServer`] owns the database, blob store, catalog, and delivery
//! coordinator, and spawns the background tasks. It is the embedding surface
//! for the library: create one, `start()` it, and use the methods (or the
//! REST API) to feed it books and devices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::info;

use crate::aggregator::{AggregationTask, CycleSummary};
use crate::blob::FsBlobStore;
use crate::catalog::ContentCatalog;
use crate::config::Config;
use crate::db::Database;
use crate::delivery::{DeliveryCoordinator, secret_hash_for_storage};
use crate::error::{Error, Result};
use crate::fetch::RssAdapter;
use crate::sweeper::RetrySweepTask;
use crate::types::{ArtifactId, ArtifactKind, Event};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The content aggregation and delivery server
pub struct ContentServer {
    /// Server configuration
    pub config: Arc<Config>,
    /// Database handle
    pub db: Arc<Database>,
    /// Artifact catalog
    pub catalog: ContentCatalog,
    /// Delivery coordinator
    pub coordinator: DeliveryCoordinator,
    /// Set to false when shutdown begins; background tasks poll this
    pub accepting_new: Arc<AtomicBool>,
    events: broadcast::Sender<Event>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ContentServer {
    /// Create a server from configuration
    ///
    /// Opens (and migrates) the database and blob store but starts no
    /// background work; call [`start`](Self::start) for that.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.storage.database_path).await?);
        let blobs = Arc::new(FsBlobStore::new(&config.storage.blob_dir).await?);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let catalog = ContentCatalog::new(db.clone(), blobs.clone());
        let coordinator = DeliveryCoordinator::new(
            db.clone(),
            blobs,
            config.delivery.clone(),
            events.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            catalog,
            coordinator,
            accepting_new: Arc::new(AtomicBool::new(true)),
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Spawn the aggregation loop, the retry sweep, and (when enabled) the
    /// REST API server
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut tasks = self.tasks.lock().await;

        let aggregation = self.aggregation_task();
        tasks.push(tokio::spawn(aggregation.run()));

        let sweep = RetrySweepTask::new(
            self.coordinator.clone(),
            self.config.delivery.clone(),
            self.accepting_new.clone(),
        );
        tasks.push(tokio::spawn(sweep.run()));

        if self.config.api.enabled {
            let server = self.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = crate::api::run_api_server(server).await {
                    tracing::error!(error = %e, "API server exited");
                }
            }));
        }

        info!("Content server started");
        Ok(())
    }

    /// Stop accepting new work and tear down the background tasks
    pub async fn shutdown(&self) {
        info!("Content server shutting down");
        self.accepting_new.store(false, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }

        self.db.close().await;
        info!("Content server stopped");
    }

    /// Register an uploaded book as a deliverable artifact
    pub async fn add_book(
        &self,
        title: &str,
        author: Option<&str>,
        bytes: &[u8],
    ) -> Result<ArtifactId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = self.catalog.register_book(title, author, bytes).await?;
        let _ = self.events.send(Event::ArtifactRegistered {
            id,
            kind: ArtifactKind::Book,
            title: title.to_string(),
            size_bytes: bytes.len() as u64,
        });
        Ok(id)
    }

    /// Register a device that may authenticate and receive deliveries
    pub async fn register_device(
        &self,
        device_id: &str,
        name: Option<&str>,
        secret: &str,
    ) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        self.db
            .insert_device(device_id, name, &secret_hash_for_storage(secret))
            .await?;
        info!(device_id, "Device registered");
        Ok(())
    }

    /// Run one aggregation cycle immediately
    ///
    /// Useful for CLI embedding and tests; the background loop is unaffected.
    pub async fn run_aggregation_once(&self) -> Result<CycleSummary> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.aggregation_task().run_cycle().await
    }

    fn aggregation_task(&self) -> AggregationTask {
        AggregationTask::new(
            self.config.clone(),
            self.db.clone(),
            self.catalog.clone(),
            Arc::new(RssAdapter::new()),
            self.events.clone(),
            self.accepting_new.clone(),
        )
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryOutcome;

    async fn server() -> (Arc<ContentServer>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_path = dir.path().join("test.db");
        config.storage.blob_dir = dir.path().join("blobs");
        config.api.enabled = false;

        let server = Arc::new(ContentServer::new(config).await.unwrap());
        (server, dir)
    }

    #[tokio::test]
    async fn test_book_flows_to_device() {
        let (server, _dir) = server().await;

        server.register_device("kindle-1", None, "secret").await.unwrap();
        let book_id = server
            .add_book("Dune", Some("Frank Herbert"), b"epub bytes")
            .await
            .unwrap();

        let token = server.coordinator.authenticate("kindle-1", "secret").await.unwrap();
        let device = server.coordinator.resolve_session(&token).await.unwrap();

        let available = server.coordinator.list_available(&device).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].artifact_id, book_id);

        server.coordinator.begin_delivery(&device, book_id).await.unwrap();
        server
            .coordinator
            .report_outcome(&device, book_id, DeliveryOutcome::Success)
            .await
            .unwrap();

        assert!(server.coordinator.list_available(&device).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_emitted_on_registration() {
        let (server, _dir) = server().await;
        let mut events = server.subscribe();

        server.add_book("Dune", None, b"bytes").await.unwrap();

        match events.recv().await.unwrap() {
            Event::ArtifactRegistered { title, kind, .. } => {
                assert_eq!(title, "Dune");
                assert_eq!(kind, ArtifactKind::Book);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let (server, _dir) = server().await;
        server.shutdown().await;

        assert!(matches!(
            server.add_book("x", None, b"y").await.unwrap_err(),
            Error::ShuttingDown
        ));
        assert!(matches!(
            server.register_device("d", None, "s").await.unwrap_err(),
            Error::ShuttingDown
        ));
        assert!(matches!(
            server.run_aggregation_once().await.unwrap_err(),
            Error::ShuttingDown
        ));
    }

    #[tokio::test]
    async fn test_run_aggregation_once_with_no_sources() {
        let (server, _dir) = server().await;
        let summary = server.run_aggregation_once().await.unwrap();
        assert_eq!(summary.sources_fetched, 0);
        assert!(summary.digest_id.is_none());
    }
}
