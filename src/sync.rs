//! The reconciliation engine: attach a mirror to an Event Source and keep
//! it consistent by folding the live event feed into the snapshot.
//!
//! [`attach_collection`] maintains an ordered list mirror;
//! [`attach_single`] maintains one optional record. Both return a
//! [`SyncHandle`] whose [`detach`](SyncHandle::detach) cancels the
//! subscription and guarantees no further mirror mutation.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};

use crate::error::SyncError;
use crate::record::{Record, RecordAction, RecordEvent};
use crate::source::RecordSource;

/// Handle controlling one running apply loop.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped and clones control the
/// same loop. Dropping every clone without calling
/// [`detach`](SyncHandle::detach) also ends the loop, but without waiting
/// for it -- call `detach` when you need the no-further-mutation guarantee.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    /// Sends `true` to signal the loop to stop.
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// The spawned apply loop. Wrapped in `Option` so it can be taken and
    /// awaited exactly once across all clones.
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl SyncHandle {
    /// Cancel the subscription and wait for the apply loop to exit.
    ///
    /// After this returns, the mirror behind this handle will not be
    /// mutated again. Calling `detach` more than once is safe --
    /// subsequent calls return immediately.
    pub async fn detach(&self) {
        // Ignore send errors: the loop may already have exited.
        let _ = self.shutdown_tx.send(true);

        // Take the task handle so we await it exactly once.
        let task = self.task.lock().await.take();
        if let Some(join_handle) = task {
            if let Err(e) = join_handle.await {
                tracing::warn!(error = %e, "apply loop task panicked");
            }
        }
    }
}

/// Combined teardown over several mirrors, returned by aggregate `load()`.
///
/// Detaching is idempotent, like the individual handles.
#[derive(Debug)]
pub struct Detacher {
    handles: Vec<SyncHandle>,
}

impl Detacher {
    pub(crate) fn new(handles: Vec<SyncHandle>) -> Self {
        Self { handles }
    }

    /// Detach every mirror this teardown covers.
    pub async fn detach_all(&self) {
        for handle in &self.handles {
            handle.detach().await;
        }
    }
}

/// Spawn the apply loop: drain `stream`, feeding each item to `apply`,
/// until the stream ends or shutdown is signalled.
///
/// Items are applied strictly in delivery order; the loop never reorders,
/// batches, or retries.
pub(crate) fn spawn_apply_loop<S, F>(mut stream: S, mut apply: F) -> SyncHandle
where
    S: Stream + Send + Unpin + 'static,
    F: FnMut(S::Item) + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                item = stream.next() => match item {
                    Some(item) => apply(item),
                    None => {
                        tracing::debug!("event stream ended");
                        break;
                    }
                },
            }
        }
    });
    SyncHandle {
        shutdown_tx: Arc::new(shutdown_tx),
        task: Arc::new(tokio::sync::Mutex::new(Some(task))),
    }
}

/// Fold one event into a list snapshot through the getter/setter pair.
///
/// The snapshot is re-read via `get` at event time, not captured at
/// subscribe time, so the fold never acts on a stale copy. A delete or
/// update whose id matches nothing is a silent no-op; the source's
/// contract is that it never emits two creates for the same id without an
/// intervening delete, and that contract is trusted, not enforced here.
fn apply_list_event<R, G, S>(get: &G, set: &S, event: RecordEvent<R>)
where
    R: Record,
    G: Fn() -> Vec<R>,
    S: Fn(Vec<R>),
{
    tracing::debug!(
        collection = R::COLLECTION,
        action = ?event.action,
        id = event.record.id(),
        "applying event"
    );
    match event.action {
        RecordAction::Create => {
            let mut records = get();
            records.push(event.record);
            set(records);
        }
        RecordAction::Update => {
            let records = get()
                .into_iter()
                .map(|existing| {
                    if existing.id() == event.record.id() {
                        event.record.clone()
                    } else {
                        existing
                    }
                })
                .collect();
            set(records);
        }
        RecordAction::Delete => {
            let records = get()
                .into_iter()
                .filter(|existing| existing.id() != event.record.id())
                .collect();
            set(records);
        }
    }
}

/// Attach a list mirror to one collection of an Event Source.
///
/// Installs the full `fetch_all` snapshot through `set`, then opens the
/// subscription and spawns the apply loop: creates append to the current
/// snapshot, updates replace the matching entry in place (preserving
/// position), deletes remove it. Events are applied in delivery order.
///
/// # Errors
///
/// [`SyncError::Fetch`] if the initial fetch fails -- no subscription is
/// opened, so a live feed never runs over an absent baseline.
/// [`SyncError::Subscribe`] if the feed cannot be opened.
pub async fn attach_collection<R, G, S>(
    source: &dyn RecordSource<R>,
    get: G,
    set: S,
    filter: &str,
) -> Result<SyncHandle, SyncError>
where
    R: Record,
    G: Fn() -> Vec<R> + Send + 'static,
    S: Fn(Vec<R>) + Send + 'static,
{
    let initial = source.fetch_all().await.map_err(SyncError::Fetch)?;
    tracing::info!(
        collection = R::COLLECTION,
        records = initial.len(),
        "installed initial snapshot"
    );
    set(initial);

    let stream = source.subscribe(filter).await.map_err(SyncError::Subscribe)?;
    Ok(spawn_apply_loop(stream, move |event| {
        apply_list_event(&get, &set, event);
    }))
}

/// Attach a single-record mirror to the record matching `query`.
///
/// Fetches exactly one record via the source's first-match lookup and
/// installs it through `set`; thereafter creates and updates install the
/// new value and deletes install `None`.
///
/// # Errors
///
/// [`SyncError::Fetch`] if the lookup fails -- including
/// [`SourceError::NotFound`](crate::SourceError::NotFound), which is
/// propagated rather than installed as `None` so callers can tell "no
/// such record" from "not yet loaded". [`SyncError::Subscribe`] if the
/// feed cannot be opened.
pub async fn attach_single<R, S>(
    source: &dyn RecordSource<R>,
    set: S,
    query: &str,
) -> Result<SyncHandle, SyncError>
where
    R: Record,
    S: Fn(Option<R>) + Send + 'static,
{
    let record = source.get_first(query).await.map_err(SyncError::Fetch)?;
    set(Some(record));

    let stream = source.subscribe(query).await.map_err(SyncError::Subscribe)?;
    Ok(spawn_apply_loop(stream, move |event: RecordEvent<R>| {
        tracing::debug!(
            collection = R::COLLECTION,
            action = ?event.action,
            id = event.record.id(),
            "applying event"
        );
        match event.action {
            RecordAction::Create | RecordAction::Update => set(Some(event.record)),
            RecordAction::Delete => set(None),
        }
    }))
}
