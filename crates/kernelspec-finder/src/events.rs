//! Search lifecycle reporting.
//!
//! Provides [`SearchEvent`] covering a per-environment kernelspec scan
//! (start, candidate listing, each load, cancellation, completion) and a
//! [`SearchObserver`] trait that consumers implement to route events to
//! their UI layer.

use serde::{Deserialize, Serialize};

/// Lifecycle events of a per-environment kernelspec search.
///
/// Serializable for transport over IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    /// A fresh scan started for an environment.
    Started { env_id: String, search_path: String },
    /// A caller joined a scan that was already in flight.
    Coalesced { env_id: String, subscribers: usize },
    /// The locator returned its candidates.
    CandidatesFound { env_id: String, count: usize },
    /// A kernelspec was loaded and emitted.
    SpecLoaded { env_id: String, name: String },
    /// A candidate could not be loaded and was skipped.
    SpecSkipped {
        env_id: String,
        path: String,
        message: String,
    },
    /// A caller cancelled its subscription.
    Cancelled { env_id: String },
    /// Every subscriber left before the scan finished.
    Abandoned { env_id: String },
    /// The scan ran to completion.
    Completed {
        env_id: String,
        emitted: usize,
        elapsed_ms: u64,
    },
}

/// Trait for receiving search lifecycle events.
pub trait SearchObserver: Send + Sync {
    fn on_event(&self, event: SearchEvent);
}

/// Log-only observer.
///
/// Writes events to the `log` crate.
pub struct LogObserver;

impl SearchObserver for LogObserver {
    fn on_event(&self, event: SearchEvent) {
        match &event {
            SearchEvent::Started {
                env_id,
                search_path,
            } => {
                log::info!("[kernelspec] Searching {env_id} in {search_path}");
            }
            SearchEvent::Coalesced {
                env_id,
                subscribers,
            } => {
                log::debug!(
                    "[kernelspec] Joined in-flight search for {env_id} ({subscribers} subscribers)"
                );
            }
            SearchEvent::CandidatesFound { env_id, count } => {
                log::debug!("[kernelspec] {count} candidate kernelspecs in {env_id}");
            }
            SearchEvent::SpecLoaded { env_id, name } => {
                log::debug!("[kernelspec] Loaded {name} from {env_id}");
            }
            SearchEvent::SpecSkipped {
                env_id,
                path,
                message,
            } => {
                log::warn!("[kernelspec] Skipping {path} in {env_id}: {message}");
            }
            SearchEvent::Cancelled { env_id } => {
                log::debug!("[kernelspec] Search for {env_id} cancelled by caller");
            }
            SearchEvent::Abandoned { env_id } => {
                log::info!("[kernelspec] Search for {env_id} abandoned (no subscribers left)");
            }
            SearchEvent::Completed {
                env_id,
                emitted,
                elapsed_ms,
            } => {
                log::info!(
                    "[kernelspec] Found {emitted} kernelspecs in {env_id} in {elapsed_ms}ms"
                );
            }
        }
    }
}
