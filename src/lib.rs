//! # bookdrop
//!
//! Backend library for a personal content aggregation and e-reader delivery
//! server. Polls configured feeds, deduplicates and scores what they return,
//! bundles the best items into periodic digest documents, and tracks
//! exactly-once delivery of books and digests to registered devices.
//!
//! ## Design Philosophy
//!
//! bookdrop is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Crash-safe** - Delivery state lives in SQLite and survives restarts
//!
//! ## Quick Start
//!
//! ```no_run
//! use bookdrop::{Config, ContentServer, SourceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         sources: vec![SourceConfig {
//!             id: "hn-blogs".to_string(),
//!             name: "Curated blogs".to_string(),
//!             url: "https://example.com/feed.xml".to_string(),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     };
//!
//!     let server = Arc::new(ContentServer::new(config).await?);
//!
//!     // Subscribe to events
//!     let mut events = server.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Feed aggregation background task
pub mod aggregator;
/// REST API module
pub mod api;
/// Content-addressed blob storage
pub mod blob;
/// Artifact catalog over the database and blob store
pub mod catalog;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Candidate deduplication and scoring
pub mod dedup;
/// Delivery coordination and device sessions
pub mod delivery;
/// Digest document assembly
pub mod digest;
/// Error types
pub mod error;
/// Feed fetching and parsing
pub mod fetch;
/// Retry backoff computation
pub mod retry;
/// Core server implementation
pub mod server;
/// Stale delivery lease sweeper
pub mod sweeper;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use aggregator::CycleSummary;
pub use blob::{BlobStore, FsBlobStore};
pub use catalog::ContentCatalog;
pub use config::{
    ApiConfig, Config, DeliveryConfig, DigestConfig, ScoringConfig, SourceConfig, SourceKind,
    StorageConfig,
};
pub use db::Database;
pub use delivery::DeliveryCoordinator;
pub use error::{
    ApiError, DatabaseError, DeliveryError, Error, ErrorDetail, FetchError, Result, ToHttpStatus,
};
pub use server::ContentServer;
pub use types::{
    ArtifactId, ArtifactKind, AvailableArtifact, CandidateId, DeliveryOutcome, Event, SyncState,
};

use std::sync::Arc;

/// Helper function to run the server with graceful signal handling.
///
/// Waits for a termination signal and then calls the server's `shutdown()`
/// method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bookdrop::{Config, ContentServer, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Arc::new(ContentServer::new(Config::default()).await?);
///     server.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(server).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(server: Arc<ContentServer>) -> Result<()> {
    wait_for_signal().await;
    server.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
