//! The Event Source seam: capabilities a backend must expose per
//! collection, plus the command surface and the session channel.
//!
//! The traits are object-safe (boxed futures, boxed streams) so aggregates
//! can hold heterogeneous sources behind `Arc<dyn ...>` and tests can
//! substitute doubles. The gRPC-backed implementations live in
//! [`client`](crate::client); the sync engine itself never sees a
//! transport type.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_stream::Stream;

use crate::domain::AuthSnapshot;
use crate::error::SourceError;
use crate::record::{Record, RecordEvent};

/// Boxed future alias used to keep the source traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The live feed of one collection: an unbounded stream of record events
/// in delivery order.
///
/// Delivery failures after a successful subscribe are the Event Source's
/// concern; an implementation that loses its channel simply ends the
/// stream. There is no reconnection inside the sync engine.
pub type EventStream<R> = Pin<Box<dyn Stream<Item = RecordEvent<R>> + Send>>;

/// The live feed of session state changes.
pub type AuthStream = Pin<Box<dyn Stream<Item = AuthSnapshot> + Send>>;

/// Subscribe filter matching every record of a collection.
pub const FILTER_ALL: &str = "*";

/// Upper bound on the number of records an implementation returns from
/// [`RecordSource::fetch_all`]. Collections in this domain stay far below
/// this; paging beyond it is deliberately not supported.
pub const MAX_INITIAL_FETCH: u32 = 1000;

/// Per-collection capabilities of an Event Source.
///
/// `fetch_all` + `subscribe` feed the mirrors; `get_first` feeds
/// single-record mirrors; `create`/`update` are the write path used by the
/// settings mutation. Implementations are expected to deliver events for
/// one collection serially and in order.
pub trait RecordSource<R: Record>: Send + Sync {
    /// Fetch the full current snapshot of the collection, capped at
    /// [`MAX_INITIAL_FETCH`] records.
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<R>, SourceError>>;

    /// Fetch the first record matching `filter`.
    ///
    /// Fails with [`SourceError::NotFound`] when nothing matches -- never
    /// an empty success, so "no such record" stays distinguishable from
    /// "not yet loaded".
    fn get_first<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<R, SourceError>>;

    /// Open the live feed of create/update/delete events matching `filter`.
    fn subscribe<'a>(
        &'a self,
        filter: &'a str,
    ) -> BoxFuture<'a, Result<EventStream<R>, SourceError>>;

    /// Create a record from a JSON field object, returning the stored
    /// record. The corresponding create event arrives independently
    /// through any open subscription.
    fn create(&self, fields: Value) -> BoxFuture<'_, Result<R, SourceError>>;

    /// Overwrite fields of the record with the given id.
    fn update<'a>(
        &'a self,
        id: &'a str,
        fields: Value,
    ) -> BoxFuture<'a, Result<R, SourceError>>;
}

/// HTTP-style method for a domain command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// Outcome of a domain command.
#[derive(Debug, Clone, Default)]
pub struct CommandResponse {
    /// Whether the backend accepted the command.
    pub ok: bool,
    /// HTTP-style status code.
    pub status: u16,
    /// Decoded response body, `Null` when empty.
    pub body: Value,
}

/// Generic command endpoint for domain operations that are not record
/// writes: starting/cancelling downloads and launching games.
pub trait CommandSurface: Send + Sync {
    /// Send a command addressed by path and method.
    ///
    /// A delivered-but-rejected command is an `Ok` response with
    /// `ok == false`; `Err` means the command never reached the backend.
    fn send<'a>(
        &'a self,
        path: &'a str,
        method: Method,
    ) -> BoxFuture<'a, Result<CommandResponse, SourceError>>;
}

/// The session state channel of the catalog server.
pub trait AuthSource: Send + Sync {
    /// The current session state.
    fn current(&self) -> BoxFuture<'_, Result<AuthSnapshot, SourceError>>;

    /// Open the feed of session state changes (login, logout, refresh).
    fn changes(&self) -> BoxFuture<'_, Result<AuthStream, SourceError>>;
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    //! Channel-driven Event Source doubles shared by the synchronizer and
    //! aggregate tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    /// A scripted collection: a fixed `fetch_all` result plus a test-held
    /// sender that feeds the subscription. Records every create/update the
    /// code under test issues.
    pub(crate) struct MockCollection<R: Record> {
        records: Mutex<Vec<R>>,
        events: Mutex<Option<mpsc::UnboundedReceiver<RecordEvent<R>>>>,
        fail_fetch: bool,
        fail_subscribe: bool,
        pub(crate) subscribe_count: AtomicUsize,
        pub(crate) created: Mutex<Vec<Value>>,
        pub(crate) updated: Mutex<Vec<(String, Value)>>,
    }

    impl<R: Record> MockCollection<R> {
        fn build(
            records: Vec<R>,
            fail_fetch: bool,
            fail_subscribe: bool,
        ) -> (Arc<Self>, mpsc::UnboundedSender<RecordEvent<R>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let mock = Arc::new(Self {
                records: Mutex::new(records),
                events: Mutex::new(Some(rx)),
                fail_fetch,
                fail_subscribe,
                subscribe_count: AtomicUsize::new(0),
                created: Mutex::new(Vec::new()),
                updated: Mutex::new(Vec::new()),
            });
            (mock, tx)
        }

        /// A healthy collection preloaded with `records`. The returned
        /// sender pushes events into any subsequently opened subscription.
        pub(crate) fn with_records(
            records: Vec<R>,
        ) -> (Arc<Self>, mpsc::UnboundedSender<RecordEvent<R>>) {
            Self::build(records, false, false)
        }

        /// A collection whose initial fetch always fails.
        pub(crate) fn failing_fetch() -> Arc<Self> {
            Self::build(Vec::new(), true, false).0
        }

        /// A collection whose subscribe call always fails.
        pub(crate) fn failing_subscribe() -> Arc<Self> {
            Self::build(Vec::new(), false, true).0
        }
    }

    impl<R: Record> RecordSource<R> for MockCollection<R> {
        fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<R>, SourceError>> {
            Box::pin(async move {
                if self.fail_fetch {
                    return Err(SourceError::Transport("fetch unavailable".to_string()));
                }
                Ok(self.records.lock().expect("records lock").clone())
            })
        }

        fn get_first<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<R, SourceError>> {
            // The mock treats the filter as a record id.
            Box::pin(async move {
                self.records
                    .lock()
                    .expect("records lock")
                    .iter()
                    .find(|r| r.id() == filter)
                    .cloned()
                    .ok_or(SourceError::NotFound)
            })
        }

        fn subscribe<'a>(
            &'a self,
            _filter: &'a str,
        ) -> BoxFuture<'a, Result<EventStream<R>, SourceError>> {
            Box::pin(async move {
                self.subscribe_count.fetch_add(1, Ordering::SeqCst);
                if self.fail_subscribe {
                    return Err(SourceError::Transport("subscribe refused".to_string()));
                }
                let rx = self
                    .events
                    .lock()
                    .expect("events lock")
                    .take()
                    .ok_or_else(|| SourceError::Transport("already subscribed".to_string()))?;
                Ok(Box::pin(UnboundedReceiverStream::new(rx)) as EventStream<R>)
            })
        }

        fn create(&self, fields: Value) -> BoxFuture<'_, Result<R, SourceError>> {
            Box::pin(async move {
                self.created.lock().expect("created lock").push(fields.clone());
                let mut object = fields;
                let map = object
                    .as_object_mut()
                    .ok_or_else(|| SourceError::InvalidPayload("fields must be an object".to_string()))?;
                map.insert("id".to_string(), Value::String("mock-created".to_string()));
                serde_json::from_value(object)
                    .map_err(|e| SourceError::InvalidPayload(e.to_string()))
            })
        }

        fn update<'a>(
            &'a self,
            id: &'a str,
            fields: Value,
        ) -> BoxFuture<'a, Result<R, SourceError>> {
            Box::pin(async move {
                self.updated
                    .lock()
                    .expect("updated lock")
                    .push((id.to_string(), fields));
                self.records
                    .lock()
                    .expect("records lock")
                    .iter()
                    .find(|r| r.id() == id)
                    .cloned()
                    .ok_or(SourceError::NotFound)
            })
        }
    }

    /// A command surface with a scripted verdict, recording every send.
    pub(crate) struct MockCommands {
        pub(crate) ok: bool,
        pub(crate) sent: Mutex<Vec<(String, Method)>>,
    }

    impl MockCommands {
        pub(crate) fn accepting() -> Arc<Self> {
            Arc::new(Self {
                ok: true,
                sent: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                ok: false,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl CommandSurface for MockCommands {
        fn send<'a>(
            &'a self,
            path: &'a str,
            method: Method,
        ) -> BoxFuture<'a, Result<CommandResponse, SourceError>> {
            Box::pin(async move {
                self.sent
                    .lock()
                    .expect("sent lock")
                    .push((path.to_string(), method));
                Ok(CommandResponse {
                    ok: self.ok,
                    status: if self.ok { 200 } else { 500 },
                    body: Value::Null,
                })
            })
        }
    }

    /// A session channel with a scripted current state and a test-held
    /// sender for pushing changes.
    pub(crate) struct MockAuth {
        pub(crate) snapshot: Mutex<AuthSnapshot>,
        changes: Mutex<Option<mpsc::UnboundedReceiver<AuthSnapshot>>>,
        fail_current: bool,
        fail_changes: bool,
    }

    impl MockAuth {
        fn build(
            snapshot: AuthSnapshot,
            fail_current: bool,
            fail_changes: bool,
        ) -> (Arc<Self>, mpsc::UnboundedSender<AuthSnapshot>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let mock = Arc::new(Self {
                snapshot: Mutex::new(snapshot),
                changes: Mutex::new(Some(rx)),
                fail_current,
                fail_changes,
            });
            (mock, tx)
        }

        pub(crate) fn with_state(
            snapshot: AuthSnapshot,
        ) -> (Arc<Self>, mpsc::UnboundedSender<AuthSnapshot>) {
            Self::build(snapshot, false, false)
        }

        pub(crate) fn failing_current() -> Arc<Self> {
            Self::build(AuthSnapshot::default(), true, false).0
        }

        pub(crate) fn failing_changes() -> Arc<Self> {
            Self::build(AuthSnapshot::default(), false, true).0
        }
    }

    impl AuthSource for MockAuth {
        fn current(&self) -> BoxFuture<'_, Result<AuthSnapshot, SourceError>> {
            Box::pin(async move {
                if self.fail_current {
                    return Err(SourceError::Transport("session unavailable".to_string()));
                }
                Ok(self.snapshot.lock().expect("snapshot lock").clone())
            })
        }

        fn changes(&self) -> BoxFuture<'_, Result<AuthStream, SourceError>> {
            Box::pin(async move {
                if self.fail_changes {
                    return Err(SourceError::Transport("watch refused".to_string()));
                }
                let rx = self
                    .changes
                    .lock()
                    .expect("changes lock")
                    .take()
                    .ok_or_else(|| SourceError::Transport("already watching".to_string()))?;
                Ok(Box::pin(UnboundedReceiverStream::new(rx)) as AuthStream)
            })
        }
    }
}
