//! Per-environment kernelspec search and request coalescing.
//!
//! [`find_kernel_specs_in_environment`] is the raw scan: resolve the
//! environment's prefix, list candidates under `<prefix>/share/jupyter/kernels`,
//! load each one and hand it to the caller as soon as it is ready.
//!
//! [`SearchCoalescer`] shares one scan between every concurrent caller asking
//! about the same environment. The scan runs on its own task and owns a
//! cancellation token separate from any caller's:
//!
//! ```text
//! caller A ──┐                        ┌─> A's stream (stops when A cancels)
//! caller B ──┼─> in-flight[env.id] ───┼─> B's stream
//! caller C ──┘   (one locator call,   └─> C's stream
//!                 one load per file)
//! ```
//!
//! Documents produced so far are replayed to late joiners, so every live
//! subscriber sees the full result set for the environment. When the last
//! subscriber leaves, the scan is abandoned and its entry removed; the next
//! caller starts from scratch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Instant;

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::env::{Environment, PythonIntegration};
use crate::error::FinderError;
use crate::events::{SearchEvent, SearchObserver};
use crate::locator::{SpecLoader, SpecLocator};
use crate::paths::{kernel_search_path, paths_equal};
use crate::spec::KernelSpecDocument;

/// Collaborators needed to scan an environment.
#[derive(Clone)]
pub struct SearchContext {
    pub integration: PythonIntegration,
    pub locator: Arc<dyn SpecLocator>,
    pub loader: Arc<dyn SpecLoader>,
    pub observer: Arc<dyn SearchObserver>,
}

/// Prefer the prefix the integration reports now over the recorded one.
///
/// Environments get moved or upgraded in place while keeping their id.
async fn resolve_sys_prefix(env: &Environment, integration: &PythonIntegration) -> PathBuf {
    if let Some(provider) = integration.provider() {
        if let Some(details) = provider.resolve_environment(&env.id).await {
            if !details.sys_prefix.as_os_str().is_empty()
                && !paths_equal(&details.sys_prefix, &env.sys_prefix)
            {
                debug!(
                    "[kernelspec] {} moved from {:?} to {:?}",
                    env.id, env.sys_prefix, details.sys_prefix
                );
                return details.sys_prefix;
            }
        }
    }
    env.sys_prefix.clone()
}

/// Scan one environment for kernelspecs, without coalescing.
///
/// `emit` receives each document in locator order and returns `false` to stop
/// the scan. Load failures skip the file. Cancellation is checked before the
/// path is built, around the locator call and before every emission.
///
/// Returns the number of documents emitted.
pub async fn find_kernel_specs_in_environment<F>(
    env: &Environment,
    cancel: &CancellationToken,
    ctx: &SearchContext,
    mut emit: F,
) -> usize
where
    F: FnMut(KernelSpecDocument) -> bool,
{
    if cancel.is_cancelled() {
        return 0;
    }
    let sys_prefix = resolve_sys_prefix(env, &ctx.integration).await;
    if cancel.is_cancelled() {
        return 0;
    }

    let env = Environment {
        sys_prefix,
        ..env.clone()
    };
    let search_path = kernel_search_path(&env.sys_prefix);
    ctx.observer.on_event(SearchEvent::Started {
        env_id: env.id.clone(),
        search_path: search_path.to_string_lossy().to_string(),
    });

    let candidates = match ctx.locator.find_candidates(&search_path, cancel).await {
        Ok(candidates) => candidates,
        Err(FinderError::Cancelled) => return 0,
        Err(e) => {
            warn!("[kernelspec] Failed to list {:?}: {}", search_path, e);
            return 0;
        }
    };
    if cancel.is_cancelled() {
        return 0;
    }
    ctx.observer.on_event(SearchEvent::CandidatesFound {
        env_id: env.id.clone(),
        count: candidates.len(),
    });

    let mut emitted = 0;
    for candidate in &candidates {
        let mut doc = match ctx.loader.load(candidate, cancel, &env).await {
            Ok(doc) => doc,
            Err(FinderError::Cancelled) => break,
            Err(e) => {
                ctx.observer.on_event(SearchEvent::SpecSkipped {
                    env_id: env.id.clone(),
                    path: candidate.path.to_string_lossy().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        if cancel.is_cancelled() {
            break;
        }
        if doc.environment_id.is_none() {
            doc.environment_id = Some(env.id.clone());
        }
        let name = doc.name.clone();
        if !emit(doc) {
            break;
        }
        emitted += 1;
        ctx.observer.on_event(SearchEvent::SpecLoaded {
            env_id: env.id.clone(),
            name,
        });
    }
    emitted
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-flight searches keyed by environment id.
type InFlightRegistry = Arc<StdMutex<HashMap<String, Arc<InFlightSearch>>>>;

struct Subscriber {
    id: u64,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<KernelSpecDocument>,
}

impl Subscriber {
    fn is_interested(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

#[derive(Default)]
struct InFlightState {
    /// Everything produced so far, replayed to late subscribers.
    emitted: Vec<KernelSpecDocument>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    /// Completed or abandoned. No new subscribers are accepted.
    finished: bool,
}

/// One shared scan of one environment.
///
/// Lock order is always registry, then `state`.
struct InFlightSearch {
    env_id: String,
    /// Cancels the scan itself, not any caller.
    operation: CancellationToken,
    observer: Arc<dyn SearchObserver>,
    state: StdMutex<InFlightState>,
}

impl InFlightSearch {
    fn new(env_id: String, observer: Arc<dyn SearchObserver>) -> Self {
        Self {
            env_id,
            operation: CancellationToken::new(),
            observer,
            state: StdMutex::new(InFlightState::default()),
        }
    }

    /// Join a scan that is already running, replaying what it produced.
    ///
    /// Subscribers that cancelled are pruned first. Returns `None` once the
    /// scan has finished, or after abandoning it when nobody is left, so the
    /// caller starts a fresh scan instead. Caller holds the registry lock.
    fn try_join(
        self: &Arc<Self>,
        registry: &mut HashMap<String, Arc<InFlightSearch>>,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<KernelSpecDocument>,
    ) -> Option<(u64, usize)> {
        let mut state = lock(&self.state);
        if state.finished {
            return None;
        }
        state.subscribers.retain(Subscriber::is_interested);
        if state.subscribers.is_empty() {
            self.abandon(registry, &mut state);
            return None;
        }
        Some(Self::subscribe(&mut state, cancel, tx))
    }

    /// First subscriber of a scan that has not been registered yet.
    fn subscribe_first(
        &self,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<KernelSpecDocument>,
    ) -> u64 {
        let (id, _) = Self::subscribe(&mut lock(&self.state), cancel, tx);
        id
    }

    fn subscribe(
        state: &mut InFlightState,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<KernelSpecDocument>,
    ) -> (u64, usize) {
        for doc in &state.emitted {
            let _ = tx.send(doc.clone());
        }
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.push(Subscriber {
            id,
            cancel: cancel.clone(),
            tx: tx.clone(),
        });
        (id, state.subscribers.len())
    }

    /// Mark the scan abandoned. Caller holds both locks.
    fn abandon(
        self: &Arc<Self>,
        registry: &mut HashMap<String, Arc<InFlightSearch>>,
        state: &mut InFlightState,
    ) {
        state.finished = true;
        state.subscribers.clear();
        self.operation.cancel();
        remove_entry(registry, self);
        self.observer.on_event(SearchEvent::Abandoned {
            env_id: self.env_id.clone(),
        });
    }

    /// Fan a document out to every subscriber still interested.
    ///
    /// Returns `false` when nobody is left, after abandoning the scan.
    fn deliver(self: &Arc<Self>, doc: KernelSpecDocument, registry: &InFlightRegistry) -> bool {
        let mut registry = lock(registry);
        let mut state = lock(&self.state);
        if state.finished {
            return false;
        }
        state.subscribers.retain(Subscriber::is_interested);
        if state.subscribers.is_empty() {
            self.abandon(&mut registry, &mut state);
            return false;
        }
        for subscriber in &state.subscribers {
            let _ = subscriber.tx.send(doc.clone());
        }
        state.emitted.push(doc);
        true
    }

    /// Drop a subscriber; abandon the scan if it was the last one.
    fn detach(self: &Arc<Self>, subscriber_id: u64, registry: &InFlightRegistry) {
        let mut registry = lock(registry);
        let mut state = lock(&self.state);
        state.subscribers.retain(|s| s.id != subscriber_id);
        if !state.finished && state.subscribers.is_empty() {
            self.abandon(&mut registry, &mut state);
        }
    }

    /// Close out a scan that ran to completion.
    ///
    /// Dropping the senders ends every subscriber's stream after it drains.
    fn complete(self: &Arc<Self>, registry: &InFlightRegistry) -> bool {
        let mut registry = lock(registry);
        let mut state = lock(&self.state);
        if state.finished {
            return false;
        }
        state.finished = true;
        state.subscribers.clear();
        remove_entry(&mut registry, self);
        true
    }
}

/// Remove `flight` from the registry only if it is still the current entry.
fn remove_entry(registry: &mut HashMap<String, Arc<InFlightSearch>>, flight: &Arc<InFlightSearch>) {
    if registry
        .get(&flight.env_id)
        .is_some_and(|current| Arc::ptr_eq(current, flight))
    {
        registry.remove(&flight.env_id);
    }
}

/// Detaches its subscriber when the result stream ends or is dropped.
struct SubscriptionGuard {
    flight: Arc<InFlightSearch>,
    registry: InFlightRegistry,
    subscriber_id: u64,
    cancel: CancellationToken,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.cancel.is_cancelled() {
            self.flight.observer.on_event(SearchEvent::Cancelled {
                env_id: self.flight.env_id.clone(),
            });
        }
        self.flight.detach(self.subscriber_id, &self.registry);
    }
}

/// Coalesces concurrent searches of the same environment.
#[derive(Clone)]
pub struct SearchCoalescer {
    ctx: Arc<SearchContext>,
    in_flight: InFlightRegistry,
}

impl SearchCoalescer {
    pub fn new(ctx: SearchContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            in_flight: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    /// Number of environments with a scan currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Stream the kernelspecs of `env`.
    ///
    /// Joins the in-flight scan for `env.id` if there is one, otherwise
    /// spawns a new scan. Must be called within a tokio runtime. The stream
    /// ends when the scan completes or as soon as `cancel` fires; documents
    /// not yet delivered at that point are dropped for this caller only.
    pub fn search(
        &self,
        env: &Environment,
        cancel: CancellationToken,
    ) -> BoxStream<'static, KernelSpecDocument> {
        if cancel.is_cancelled() {
            return stream::empty().boxed();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (flight, subscriber_id) = {
            let mut registry = lock(&self.in_flight);
            let joined = registry.get(&env.id).cloned().and_then(|flight| {
                flight
                    .try_join(&mut registry, &cancel, &tx)
                    .map(|(id, subscribers)| (flight, id, subscribers))
            });

            match joined {
                Some((flight, id, subscribers)) => {
                    self.ctx.observer.on_event(SearchEvent::Coalesced {
                        env_id: env.id.clone(),
                        subscribers,
                    });
                    (flight, id)
                }
                None => {
                    let flight = Arc::new(InFlightSearch::new(
                        env.id.clone(),
                        self.ctx.observer.clone(),
                    ));
                    let id = flight.subscribe_first(&cancel, &tx);
                    registry.insert(env.id.clone(), flight.clone());
                    tokio::spawn(run_search(
                        self.ctx.clone(),
                        self.in_flight.clone(),
                        flight.clone(),
                        env.clone(),
                    ));
                    (flight, id)
                }
            }
        };
        drop(tx);

        let guard = SubscriptionGuard {
            flight,
            registry: self.in_flight.clone(),
            subscriber_id,
            cancel: cancel.clone(),
        };
        stream::unfold((rx, cancel, guard), |(mut rx, cancel, guard)| async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                doc = rx.recv() => doc.map(|doc| (doc, (rx, cancel, guard))),
            }
        })
        .boxed()
    }
}

/// Producer task for one in-flight scan.
async fn run_search(
    ctx: Arc<SearchContext>,
    registry: InFlightRegistry,
    flight: Arc<InFlightSearch>,
    env: Environment,
) {
    let started = Instant::now();
    let operation = flight.operation.clone();
    let emitted = find_kernel_specs_in_environment(&env, &operation, &ctx, |doc| {
        flight.deliver(doc, &registry)
    })
    .await;

    if flight.complete(&registry) {
        ctx.observer.on_event(SearchEvent::Completed {
            env_id: env.id.clone(),
            emitted,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }
}
