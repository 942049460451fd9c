//! Debounced edge refresh
//!
//! While a node is being dragged the host may report positions on every
//! frame. Rerouting edges that often is wasted work, so [`RefreshScheduler`]
//! coalesces bursts of triggers into a single recompute:
//!
//! - every [`trigger`](RefreshScheduler::trigger) cancels the pending timer and
//!   arms a new one `delay` later (trailing debounce, the last call wins)
//! - when the timer fires, edges are routed against the nodes passed to the
//!   trigger that armed it
//! - the result is published only if its fingerprint (rounded node positions
//!   plus edge connectivity) differs from the last published one
//!
//! Published edge sets arrive on the receiver returned by
//! [`RefreshScheduler::new`]. The scheduler owns its timer and fingerprint;
//! dropping or disposing it cancels the pending recompute.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! # async fn demo(nodes: Vec<schemaflow::core::LayoutNode>) {
//! use schemaflow::core::RefreshScheduler;
//! use std::time::Duration;
//!
//! let (mut scheduler, mut published) =
//!     RefreshScheduler::new(Duration::from_millis(120)).unwrap();
//!
//! scheduler.trigger(nodes).unwrap();
//! if let Some(batch) = published.recv().await {
//!     println!("{} edges", batch.edges.len());
//! }
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::core::auto_layout::LayoutNode;
use crate::core::config::{DEFAULT_REFRESH_DELAY_MS, VisualConfig};
use crate::core::edge_routing::{EdgeDescriptor, RoutingConfig, route_edges};
use crate::core::error::SchedulerError;
use crate::core::schema::Relationship;

/// Default quiescence delay (120ms)
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(DEFAULT_REFRESH_DELAY_MS);

/// Round like the canvas does: halves go up
fn round_coord(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Fingerprint of a routed diagram.
///
/// Covers node ids with rounded positions and, per edge, id, endpoints and
/// both handles. Labels and colors are not part of it.
pub fn fingerprint(nodes: &[LayoutNode], edges: &[EdgeDescriptor]) -> String {
    let nodes_key = nodes
        .iter()
        .map(|n| {
            format!(
                "{}@{},{}",
                n.id,
                round_coord(n.position.x),
                round_coord(n.position.y)
            )
        })
        .collect::<Vec<_>>()
        .join("|");

    let edges_key = edges
        .iter()
        .map(|e| {
            format!(
                "{}:{}->{}:{}:{}",
                e.id, e.source, e.target, e.source_handle, e.target_handle
            )
        })
        .collect::<Vec<_>>()
        .join("|");

    format!("{nodes_key}||{edges_key}")
}

/// Counters for observing the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Calls to `trigger`
    pub triggers: u64,
    /// Pending recomputes cancelled by a newer trigger or by disposal
    pub cancelled: u64,
    /// Recomputes that actually ran
    pub recomputes: u64,
    /// Recomputes whose result was published
    pub published: u64,
    /// Recomputes dropped because the fingerprint was unchanged
    pub suppressed: u64,
}

/// Edge set published after a recompute
#[derive(Debug, Clone)]
pub struct EdgeBatch {
    /// Trigger that produced this batch; increases monotonically
    pub generation: u64,
    pub edges: Vec<EdgeDescriptor>,
    pub fingerprint: String,
}

#[derive(Debug, Default)]
struct SchedulerState {
    generation: u64,
    last_fingerprint: Option<String>,
    stats: SchedulerStats,
}

/// Everything a recompute needs, captured when it is scheduled
struct RefreshJob {
    generation: u64,
    nodes: Vec<LayoutNode>,
    relationships: Arc<[Relationship]>,
    visual: Arc<VisualConfig>,
    routing: Arc<RoutingConfig>,
}

fn lock_state(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_job(
    job: RefreshJob,
    state: &Mutex<SchedulerState>,
    publisher: &mpsc::UnboundedSender<EdgeBatch>,
) {
    let mut state = lock_state(state);

    // A newer trigger landed after this timer woke up
    if state.generation != job.generation {
        tracing::trace!("Refresh {} superseded before running", job.generation);
        return;
    }

    let edges = route_edges(&job.relationships, &job.visual, &job.nodes, &job.routing);
    let fingerprint = fingerprint(&job.nodes, &edges);
    state.stats.recomputes += 1;

    if state.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
        state.stats.suppressed += 1;
        tracing::trace!("Refresh {} unchanged, not publishing", job.generation);
        return;
    }

    state.last_fingerprint = Some(fingerprint.clone());
    state.stats.published += 1;

    let batch = EdgeBatch {
        generation: job.generation,
        edges,
        fingerprint,
    };
    if publisher.send(batch).is_err() {
        tracing::debug!("Refresh {} dropped: receiver closed", job.generation);
    }
}

/// Trailing-debounce scheduler for edge recomputation
pub struct RefreshScheduler {
    runtime: Handle,
    delay: Duration,
    pending: Option<AbortHandle>,
    state: Arc<Mutex<SchedulerState>>,
    publisher: mpsc::UnboundedSender<EdgeBatch>,
    relationships: Arc<[Relationship]>,
    visual: Arc<VisualConfig>,
    routing: Arc<RoutingConfig>,
    disposed: bool,
}

impl RefreshScheduler {
    /// Create a scheduler bound to the current Tokio runtime
    pub fn new(
        delay: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EdgeBatch>), SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let (publisher, receiver) = mpsc::unbounded_channel();

        let scheduler = Self {
            runtime,
            delay,
            pending: None,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            publisher,
            relationships: Arc::from(Vec::new()),
            visual: Arc::new(VisualConfig::default()),
            routing: Arc::new(RoutingConfig::default()),
            disposed: false,
        };
        Ok((scheduler, receiver))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Relationships and styling used by recomputes scheduled from now on
    pub fn set_inputs(
        &mut self,
        relationships: &[Relationship],
        visual: &VisualConfig,
        routing: &RoutingConfig,
    ) {
        self.relationships = Arc::from(relationships);
        self.visual = Arc::new(visual.clone());
        self.routing = Arc::new(routing.clone());
    }

    pub fn set_visual_config(&mut self, visual: &VisualConfig) {
        self.visual = Arc::new(visual.clone());
    }

    /// Schedule a recompute against `nodes`, cancelling any pending one
    pub fn trigger(&mut self, nodes: Vec<LayoutNode>) -> Result<(), SchedulerError> {
        if self.disposed {
            return Err(SchedulerError::Disposed);
        }

        let cancelled = self.cancel_pending();
        let generation = {
            let mut state = lock_state(&self.state);
            state.stats.triggers += 1;
            if cancelled {
                state.stats.cancelled += 1;
            }
            state.generation += 1;
            state.generation
        };

        let job = RefreshJob {
            generation,
            nodes,
            relationships: Arc::clone(&self.relationships),
            visual: Arc::clone(&self.visual),
            routing: Arc::clone(&self.routing),
        };
        let state = Arc::clone(&self.state);
        let publisher = self.publisher.clone();
        let delay = self.delay;

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            run_job(job, &state, &publisher);
        });
        self.pending = Some(task.abort_handle());

        tracing::trace!("Refresh {} armed for {:?}", generation, delay);
        Ok(())
    }

    /// Forget pending work and take `nodes`/`edges` as the published state.
    ///
    /// Called when edges were rebuilt outside the scheduler. A recompute
    /// armed before this call never publishes, and a later one is only
    /// published if it differs from these edges.
    pub fn reset(&mut self, nodes: &[LayoutNode], edges: &[EdgeDescriptor]) {
        let cancelled = self.cancel_pending();
        let mut state = lock_state(&self.state);
        if cancelled {
            state.stats.cancelled += 1;
        }
        state.generation += 1;
        state.last_fingerprint = Some(fingerprint(nodes, edges));
        tracing::trace!("Refresh state reset at generation {}", state.generation);
    }

    /// Abort the pending timer; true if one was still waiting
    fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a recompute is armed and has not run yet
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel any pending recompute and refuse further triggers
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let cancelled = self.cancel_pending();
        let mut state = lock_state(&self.state);
        if cancelled {
            state.stats.cancelled += 1;
        }
        // Invalidate a timer that already woke but has not taken the lock yet
        state.generation += 1;
        tracing::debug!("Refresh scheduler disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn stats(&self) -> SchedulerStats {
        lock_state(&self.state).stats.clone()
    }

    pub fn last_fingerprint(&self) -> Option<String> {
        lock_state(&self.state).last_fingerprint.clone()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .field("disposed", &self.disposed)
            .finish()
    }
}
