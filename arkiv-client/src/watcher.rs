//! Lifecycle event watching with server-filter and log-scan strategies.
//!
//! A watcher first tries to install a server-side log filter. When the node
//! refuses (or later forgets the filter) it falls back to scanning block
//! ranges with `get_logs`. Either way events reach the handler in chain
//! order, each exactly once.
//!
//! Two execution modes are supported:
//! - manual: call [`EventWatcher::start`] and then [`EventWatcher::poll`]
//!   whenever convenient; nothing runs in the background;
//! - background: [`EventWatcher::run`] spawns one task that polls every
//!   `poll_interval_ms` until stopped.

use crate::config::WatcherConfig;
use crate::error::{ClientError, ClientResult};
use arkiv_rpc::{FilterId, LogFilter, LogRecord, NodeRpc, STORAGE_ADDRESS, decode_log};
use arkiv_types::{BlockNumber, BlockTag, EventKind, LifecycleEvent};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Unique identifier of a watcher within a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(Uuid);

impl WatcherId {
    /// Creates a new time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a watcher is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherStatus {
    Stopped,
    Starting,
    Filtering,
    Scanning,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Filtering => "filtering",
            Self::Scanning => "scanning",
        })
    }
}

/// How a started watcher obtains logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Polls a server-side filter.
    ServerFilter { filter_id: FilterId },
    /// Scans `(last_observed, head]` with `get_logs`. `None` means nothing
    /// has been scanned yet and the next scan starts at block 0.
    LogScan { last_observed: Option<BlockNumber> },
}

impl Strategy {
    const fn status(&self) -> WatcherStatus {
        match self {
            Self::ServerFilter { .. } => WatcherStatus::Filtering,
            Self::LogScan { .. } => WatcherStatus::Scanning,
        }
    }
}

/// Receives the events of a watcher.
///
/// Handlers run inside the watcher's poll step and must not call
/// [`EventWatcher::stop`] or [`EventWatcher::uninstall`] on the watcher that
/// is delivering to them.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called once per event, in chain order.
    async fn on_event(&self, event: LifecycleEvent);

    /// Called when a log cannot be decoded. The watcher keeps going.
    async fn on_error(&self, error: ClientError) {
        error!("Event handler error: {error}");
    }
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(LifecycleEvent) + Send + Sync,
{
    async fn on_event(&self, event: LifecycleEvent) {
        self(event);
    }
}

struct WatcherState {
    status: WatcherStatus,
    strategy: Option<Strategy>,
    /// Scan origin resolved at first start; used when a filter degrades
    /// before anything was delivered.
    origin: Option<BlockNumber>,
    last_delivered: Option<(BlockNumber, u64)>,
    uninstalled: bool,
}

struct Inner {
    id: WatcherId,
    node: Arc<dyn NodeRpc>,
    kinds: Vec<EventKind>,
    from: BlockTag,
    config: WatcherConfig,
    handler: Arc<dyn EventHandler>,
    state: Mutex<WatcherState>,
    running: AtomicBool,
    run_epoch: AtomicU64,
}

/// A lifecycle event subscription.
///
/// Cloning yields another handle to the same watcher.
#[derive(Clone)]
pub struct EventWatcher {
    inner: Arc<Inner>,
}

impl EventWatcher {
    /// Creates a stopped watcher for `kinds`, starting at `from`.
    ///
    /// An explicit start block is inclusive; [`BlockTag::Latest`] delivers
    /// only events in blocks after the head at start time.
    pub fn new(
        node: Arc<dyn NodeRpc>,
        kinds: Vec<EventKind>,
        from: BlockTag,
        handler: Arc<dyn EventHandler>,
        config: WatcherConfig,
    ) -> ClientResult<Self> {
        if kinds.is_empty() {
            return Err(ClientError::InvalidQuery(
                "watcher needs at least one event kind".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                id: WatcherId::new(),
                node,
                kinds,
                from,
                config,
                handler,
                state: Mutex::new(WatcherState {
                    status: WatcherStatus::Stopped,
                    strategy: None,
                    origin: None,
                    last_delivered: None,
                    uninstalled: false,
                }),
                running: AtomicBool::new(false),
                run_epoch: AtomicU64::new(0),
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    #[must_use]
    pub fn kinds(&self) -> &[EventKind] {
        &self.inner.kinds
    }

    pub async fn status(&self) -> WatcherStatus {
        self.inner.state.lock().await.status
    }

    /// Current strategy; `None` before the first start or after uninstall.
    pub async fn strategy(&self) -> Option<Strategy> {
        self.inner.state.lock().await.strategy.clone()
    }

    /// `(block, log_index)` of the last event handed to the handler.
    pub async fn last_delivered(&self) -> Option<(BlockNumber, u64)> {
        self.inner.state.lock().await.last_delivered
    }

    pub async fn is_uninstalled(&self) -> bool {
        self.inner.state.lock().await.uninstalled
    }

    /// Whether a background polling task is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Starts (or resumes) the watcher.
    ///
    /// On first start the start block is resolved and a server filter is
    /// requested; if the node refuses, the watcher falls back to scanning
    /// and the refusal is only logged. After [`stop`](Self::stop) the
    /// previous strategy is resumed as is.
    pub async fn start(&self) -> ClientResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        if state.uninstalled {
            return Err(ClientError::WatcherUninstalled);
        }
        if matches!(state.status, WatcherStatus::Filtering | WatcherStatus::Scanning) {
            return Ok(());
        }
        if let Some(strategy) = &state.strategy {
            state.status = strategy.status();
            info!("Watcher {} resumed ({})", inner.id, state.status);
            return Ok(());
        }

        state.status = WatcherStatus::Starting;
        let origin = match inner.from {
            BlockTag::Latest => match inner.head().await {
                Ok(head) => Some(head),
                Err(e) => {
                    state.status = WatcherStatus::Stopped;
                    return Err(e);
                }
            },
            BlockTag::Number(n) => n.checked_sub(1),
        };
        state.origin = origin;

        let filter = LogFilter::for_kinds(&inner.kinds, inner.from, BlockTag::Latest);
        let strategy = match inner.node.new_filter(&filter).await {
            Ok(filter_id) => {
                debug!("Watcher {} installed filter {filter_id}", inner.id);
                Strategy::ServerFilter { filter_id }
            }
            Err(e) => {
                warn!(
                    "Watcher {}: server filter unavailable, falling back to log scan: {e}",
                    inner.id
                );
                Strategy::LogScan {
                    last_observed: origin,
                }
            }
        };
        state.status = strategy.status();
        state.strategy = Some(strategy);
        info!(
            "Watcher {} started ({}) for {:?} from {}",
            inner.id, state.status, inner.kinds, inner.from
        );
        Ok(())
    }

    /// Runs one poll step and returns the number of events delivered.
    ///
    /// A stopped watcher does nothing. Transport failures are returned and
    /// leave the watcher's position unchanged.
    pub async fn poll(&self) -> ClientResult<usize> {
        self.inner.poll().await
    }

    /// Starts the watcher and spawns a task polling every
    /// `poll_interval_ms`. Calling it on a running watcher is a no-op.
    pub async fn run(&self) -> ClientResult<()> {
        self.start().await?;
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let epoch = self.inner.run_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let span = info_span!("watcher", id = %inner.id);

        tokio::spawn(
            async move {
                let interval = inner.config.poll_interval();
                info!("Background polling every {interval:?}");
                loop {
                    tokio::time::sleep(interval).await;
                    if !inner.running.load(Ordering::SeqCst)
                        || inner.run_epoch.load(Ordering::SeqCst) != epoch
                    {
                        break;
                    }
                    if let Err(e) = inner.poll().await {
                        warn!("Poll failed, retrying next tick: {e}");
                    }
                }
                debug!("Background polling ended");
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Halts polling. The server filter, if any, is kept so that
    /// [`start`](Self::start) can resume. Idempotent.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.run_epoch.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.state.lock().await;
        if state.status != WatcherStatus::Stopped {
            state.status = WatcherStatus::Stopped;
            info!("Watcher {} stopped", self.inner.id);
        }
    }

    /// Stops the watcher and releases its server filter. Idempotent; the
    /// watcher cannot be started again.
    ///
    /// If the node fails to release the filter the watcher keeps it and
    /// stays stopped, so a later call can try again.
    pub async fn uninstall(&self) -> ClientResult<()> {
        self.stop().await;
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        if state.uninstalled {
            return Ok(());
        }

        if let Some(Strategy::ServerFilter { filter_id }) = state.strategy.clone() {
            let node = inner.node.as_ref();
            let id = &filter_id;
            let released = inner
                .config
                .retry
                .run("uninstall filter", move || node.uninstall_filter(id))
                .await;
            match released {
                Ok(true) => debug!("Watcher {} released filter {filter_id}", inner.id),
                Ok(false) => debug!("Watcher {}: filter {filter_id} already gone", inner.id),
                Err(e) if e.is_capability() => {
                    debug!("Watcher {}: filter {filter_id} already gone: {e}", inner.id);
                }
                Err(e) => {
                    warn!("Watcher {} still holds filter {filter_id}: {e}", inner.id);
                    return Err(e.into());
                }
            }
        }
        state.strategy = None;
        state.uninstalled = true;
        info!("Watcher {} uninstalled", inner.id);
        Ok(())
    }
}

impl Inner {
    async fn head(&self) -> ClientResult<BlockNumber> {
        let node = self.node.as_ref();
        Ok(self
            .config
            .retry
            .run("block number", move || node.block_number())
            .await?)
    }

    async fn poll(&self) -> ClientResult<usize> {
        let mut state = self.state.lock().await;
        if state.uninstalled {
            return Err(ClientError::WatcherUninstalled);
        }
        if !matches!(state.status, WatcherStatus::Filtering | WatcherStatus::Scanning) {
            return Ok(0);
        }

        match state.strategy.clone() {
            Some(Strategy::ServerFilter { filter_id }) => {
                let node = self.node.as_ref();
                let id = &filter_id;
                let changes = self
                    .config
                    .retry
                    .run("filter changes", move || node.filter_changes(id))
                    .await;
                match changes {
                    Ok(logs) => Ok(self.dispatch(&mut state, logs).await),
                    Err(e) if e.is_capability() => {
                        let last_observed = state
                            .last_delivered
                            .map_or(state.origin, |(block, _)| block.checked_sub(1));
                        warn!(
                            "Watcher {}: filter {filter_id} lost ({e}), switching to log scan after block {last_observed:?}",
                            self.id
                        );
                        state.strategy = Some(Strategy::LogScan { last_observed });
                        state.status = WatcherStatus::Scanning;
                        self.scan(&mut state, last_observed).await
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Some(Strategy::LogScan { last_observed }) => self.scan(&mut state, last_observed).await,
            None => Ok(0),
        }
    }

    /// Scans `(last_observed, head]` in chunks of at most `max_block_range`
    /// blocks, committing progress after each chunk.
    async fn scan(
        &self,
        state: &mut WatcherState,
        last_observed: Option<BlockNumber>,
    ) -> ClientResult<usize> {
        let head = self.head().await?;
        let mut from = match last_observed {
            Some(block) if block >= head => return Ok(0),
            Some(block) => block + 1,
            None => 0,
        };

        let span = self.config.max_block_range.max(1);
        let filter = LogFilter::for_kinds(&self.kinds, BlockTag::Latest, BlockTag::Latest);
        let mut delivered = 0;
        loop {
            let to = head.min(from.saturating_add(span - 1));
            let range = filter.with_range(BlockTag::Number(from), BlockTag::Number(to));
            let node = self.node.as_ref();
            let range_ref = &range;
            let mut logs = self
                .config
                .retry
                .run("get logs", move || node.get_logs(range_ref))
                .await?;
            logs.sort_by_key(|log| (log.block_number, log.log_index));

            let n = self.dispatch(state, logs).await;
            delivered += n;
            state.strategy = Some(Strategy::LogScan {
                last_observed: Some(to),
            });
            debug!("Watcher {} scanned blocks {from}..={to}: {n} events", self.id);

            if to >= head {
                return Ok(delivered);
            }
            from = to + 1;
        }
    }

    /// Decodes and delivers logs in the given order, skipping reorged logs,
    /// foreign contracts and positions already delivered.
    async fn dispatch(&self, state: &mut WatcherState, logs: Vec<LogRecord>) -> usize {
        let mut delivered = 0;
        for log in logs {
            if log.removed {
                debug!("Watcher {} skipping removed log", self.id);
                continue;
            }
            if log.address != STORAGE_ADDRESS {
                debug!("Watcher {} skipping log from {}", self.id, log.address);
                continue;
            }
            let event = match decode_log(&log) {
                Ok(event) => event,
                Err(e) => {
                    self.handler.on_error(ClientError::Decode(e)).await;
                    continue;
                }
            };
            if !self.kinds.contains(&event.kind()) {
                continue;
            }
            let position = event.position();
            if state.last_delivered.is_some_and(|last| position <= last) {
                continue;
            }
            state.last_delivered = Some(position);
            self.handler.on_event(event).await;
            delivered += 1;
        }
        delivered
    }
}

impl fmt::Debug for EventWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWatcher")
            .field("id", &self.inner.id)
            .field("kinds", &self.inner.kinds)
            .field("from", &self.inner.from)
            .field("running", &self.is_running())
            .finish()
    }
}
