//! gRPC-backed Event Source implementations over the tonic-generated
//! `CollectionServiceClient`.
//!
//! [`SyncClient`] wraps the transport; [`GrpcCollection`],
//! [`GrpcCommands`], and [`GrpcAuth`] adapt it to the seam traits so the
//! sync engine and the aggregates never import tonic types directly.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio_stream::StreamExt;

use crate::auth::BearerInterceptor;
use crate::domain::AuthSnapshot;
use crate::error::SourceError;
use crate::proto;
use crate::proto::collection_service_client::CollectionServiceClient;
use crate::record::{Record, RecordAction, RecordEvent};
use crate::source::{
    AuthSource, AuthStream, BoxFuture, CommandResponse, CommandSurface, EventStream, Method,
    RecordSource, MAX_INITIAL_FETCH,
};
use tonic::transport::Channel;

/// Plain (unauthenticated) gRPC client type alias.
type PlainClient = CollectionServiceClient<Channel>;

/// Authenticated gRPC client with Bearer token interceptor.
type AuthClient = CollectionServiceClient<
    tonic::service::interceptor::InterceptedService<Channel, BearerInterceptor>,
>;

/// Internal transport enum supporting both plain and authenticated channels.
enum ClientInner {
    /// Unauthenticated channel (the on-device service).
    Plain(PlainClient),
    /// Channel with a [`BearerInterceptor`] injecting an `authorization`
    /// header (the catalog server).
    Auth(AuthClient),
}

/// Typed gRPC client for a gameshelf backend.
///
/// Wraps the tonic-generated [`CollectionServiceClient`] behind methods
/// that accept and return Rust-native types. Clone is cheap because the
/// inner transport is wrapped in an [`Arc`].
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match *self.inner {
            ClientInner::Plain(_) => "Plain",
            ClientInner::Auth(_) => "Auth",
        };
        f.debug_struct("SyncClient")
            .field("transport", &variant)
            .finish()
    }
}

/// Map a tonic status onto the seam error.
fn status_to_source(status: tonic::Status) -> SourceError {
    match status.code() {
        tonic::Code::NotFound => SourceError::NotFound,
        _ => SourceError::Transport(status.to_string()),
    }
}

/// Decode one wire record into its typed form.
///
/// The collection-specific fields travel as a JSON object in
/// `record.fields`; the three base fields are merged into that object
/// before deserializing, so typed records keep their flat flattened shape.
fn decode_record<R: Record>(record: proto::Record) -> Result<R, SourceError> {
    let mut fields: Value = if record.fields.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_slice(&record.fields)
            .map_err(|e| SourceError::InvalidPayload(e.to_string()))?
    };
    let object = fields
        .as_object_mut()
        .ok_or_else(|| SourceError::InvalidPayload("record fields must be an object".to_string()))?;
    object.insert("id".to_string(), Value::String(record.id));
    object.insert("created".to_string(), Value::String(record.created));
    object.insert("updated".to_string(), Value::String(record.updated));
    serde_json::from_value(fields).map_err(|e| SourceError::InvalidPayload(e.to_string()))
}

/// Decode one subscription message, or `None` if it cannot be applied.
///
/// Undecodable messages are dropped with a warning rather than ending the
/// feed; one malformed record must not stall the whole mirror.
fn decode_event<R: Record>(response: proto::SubscribeResponse) -> Option<RecordEvent<R>> {
    let action = match proto::RecordAction::try_from(response.action) {
        Ok(proto::RecordAction::Create) => RecordAction::Create,
        Ok(proto::RecordAction::Update) => RecordAction::Update,
        Ok(proto::RecordAction::Delete) => RecordAction::Delete,
        Ok(proto::RecordAction::Unspecified) | Err(_) => {
            tracing::warn!(
                collection = R::COLLECTION,
                action = response.action,
                "dropping event with unknown action"
            );
            return None;
        }
    };
    let record = response.record.or_else(|| {
        tracing::warn!(collection = R::COLLECTION, "dropping event without a record");
        None
    })?;
    match decode_record::<R>(record) {
        Ok(record) => Some(RecordEvent { action, record }),
        Err(e) => {
            tracing::warn!(collection = R::COLLECTION, error = %e, "dropping undecodable event");
            None
        }
    }
}

/// Decode the wire session state.
fn decode_auth(message: proto::AuthSnapshotMessage) -> Result<AuthSnapshot, SourceError> {
    let record = message.record.map(decode_record).transpose()?;
    Ok(AuthSnapshot {
        token: message.token,
        record,
    })
}

impl SyncClient {
    /// Connect to a gameshelf backend at the given endpoint.
    ///
    /// Creates an unauthenticated (plain) connection, which is what the
    /// on-device service speaks. For the catalog server, use
    /// [`connect_with_token`](Self::connect_with_token).
    ///
    /// # Errors
    ///
    /// Returns [`tonic::transport::Error`] if the channel cannot be
    /// established.
    pub async fn connect(endpoint: &str) -> Result<Self, tonic::transport::Error> {
        let client = CollectionServiceClient::connect(endpoint.to_string()).await?;
        Ok(Self {
            inner: Arc::new(ClientInner::Plain(client)),
        })
    }

    /// Connect with Bearer token authentication.
    ///
    /// The token is read from the shared [`RwLock`] on every outgoing RPC;
    /// writing a new value into the lock (for instance when the session
    /// feed delivers a refresh) takes effect on the next RPC without
    /// reconnecting. An empty token sends no `authorization` header.
    ///
    /// # Errors
    ///
    /// Returns [`tonic::transport::Error`] if the channel cannot be
    /// established.
    pub async fn connect_with_token(
        endpoint: &str,
        token: Arc<RwLock<String>>,
    ) -> Result<Self, tonic::transport::Error> {
        let channel = tonic::transport::Endpoint::from_shared(endpoint.to_string())?
            .connect()
            .await?;
        let interceptor = BearerInterceptor { token };
        let client = CollectionServiceClient::with_interceptor(channel, interceptor);
        Ok(Self {
            inner: Arc::new(ClientInner::Auth(client)),
        })
    }

    /// Construct a `SyncClient` from a pre-built client.
    ///
    /// Used in tests to create clients with lazy channels.
    #[cfg(test)]
    pub(crate) fn from_inner(inner: PlainClient) -> Self {
        Self {
            inner: Arc::new(ClientInner::Plain(inner)),
        }
    }

    /// Whether this client uses an authenticated (Bearer token) transport.
    #[cfg(test)]
    pub(crate) fn is_auth(&self) -> bool {
        matches!(*self.inner, ClientInner::Auth(_))
    }

    /// A [`RecordSource`] view over one collection of this backend.
    pub fn collection<R: Record>(&self) -> GrpcCollection<R> {
        GrpcCollection {
            client: self.clone(),
            _record: PhantomData,
        }
    }

    /// A [`CommandSurface`] view over this backend.
    pub fn commands(&self) -> GrpcCommands {
        GrpcCommands {
            client: self.clone(),
        }
    }

    /// An [`AuthSource`] view over this backend's session channel.
    pub fn auth(&self) -> GrpcAuth {
        GrpcAuth {
            client: self.clone(),
        }
    }

    // Each RPC clones the inner tonic client. This is cheap: the
    // generated client wraps the channel, an Arc'd hyper connection pool.

    async fn list(
        &self,
        request: proto::ListRequest,
    ) -> Result<proto::ListResponse, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().list(request).await?,
            ClientInner::Auth(c) => c.clone().list(request).await?,
        };
        Ok(response.into_inner())
    }

    async fn get_first(
        &self,
        request: proto::GetFirstRequest,
    ) -> Result<proto::Record, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().get_first(request).await?,
            ClientInner::Auth(c) => c.clone().get_first(request).await?,
        };
        Ok(response.into_inner())
    }

    async fn subscribe(
        &self,
        request: proto::SubscribeRequest,
    ) -> Result<tonic::Streaming<proto::SubscribeResponse>, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().subscribe(request).await?,
            ClientInner::Auth(c) => c.clone().subscribe(request).await?,
        };
        Ok(response.into_inner())
    }

    async fn create(
        &self,
        request: proto::CreateRequest,
    ) -> Result<proto::Record, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().create(request).await?,
            ClientInner::Auth(c) => c.clone().create(request).await?,
        };
        Ok(response.into_inner())
    }

    async fn update(
        &self,
        request: proto::UpdateRequest,
    ) -> Result<proto::Record, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().update(request).await?,
            ClientInner::Auth(c) => c.clone().update(request).await?,
        };
        Ok(response.into_inner())
    }

    async fn send(
        &self,
        request: proto::SendRequest,
    ) -> Result<proto::SendResponse, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().send(request).await?,
            ClientInner::Auth(c) => c.clone().send(request).await?,
        };
        Ok(response.into_inner())
    }

    async fn auth_state(&self) -> Result<proto::AuthSnapshotMessage, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().auth_state(proto::Empty {}).await?,
            ClientInner::Auth(c) => c.clone().auth_state(proto::Empty {}).await?,
        };
        Ok(response.into_inner())
    }

    async fn watch_auth(
        &self,
    ) -> Result<tonic::Streaming<proto::AuthSnapshotMessage>, tonic::Status> {
        let response = match self.inner.as_ref() {
            ClientInner::Plain(c) => c.clone().watch_auth(proto::Empty {}).await?,
            ClientInner::Auth(c) => c.clone().watch_auth(proto::Empty {}).await?,
        };
        Ok(response.into_inner())
    }
}

/// One collection of a gRPC backend, viewed through the seam trait.
pub struct GrpcCollection<R: Record> {
    client: SyncClient,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for GrpcCollection<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> RecordSource<R> for GrpcCollection<R> {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<R>, SourceError>> {
        Box::pin(async move {
            let response = self
                .client
                .list(proto::ListRequest {
                    collection: R::COLLECTION.to_string(),
                    page: 1,
                    per_page: MAX_INITIAL_FETCH,
                })
                .await
                .map_err(status_to_source)?;
            // Undecodable records are skipped with a warning so one bad
            // row does not block the whole snapshot.
            let records = response
                .records
                .into_iter()
                .filter_map(|record| match decode_record::<R>(record) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(
                            collection = R::COLLECTION,
                            error = %e,
                            "skipping undecodable record"
                        );
                        None
                    }
                })
                .collect();
            Ok(records)
        })
    }

    fn get_first<'a>(&'a self, filter: &'a str) -> BoxFuture<'a, Result<R, SourceError>> {
        Box::pin(async move {
            let record = self
                .client
                .get_first(proto::GetFirstRequest {
                    collection: R::COLLECTION.to_string(),
                    filter: filter.to_string(),
                })
                .await
                .map_err(status_to_source)?;
            decode_record(record)
        })
    }

    fn subscribe<'a>(
        &'a self,
        filter: &'a str,
    ) -> BoxFuture<'a, Result<EventStream<R>, SourceError>> {
        Box::pin(async move {
            let streaming = self
                .client
                .subscribe(proto::SubscribeRequest {
                    collection: R::COLLECTION.to_string(),
                    filter: filter.to_string(),
                })
                .await
                .map_err(status_to_source)?;
            // A delivery error ends the feed; the apply loop exits when
            // the stream does.
            let events = streaming
                .take_while(|item| {
                    if let Err(status) = item {
                        tracing::warn!(
                            collection = R::COLLECTION,
                            error = %status,
                            "event feed failed, ending stream"
                        );
                        return false;
                    }
                    true
                })
                .filter_map(|item| item.ok().and_then(decode_event::<R>));
            Ok(Box::pin(events) as EventStream<R>)
        })
    }

    fn create(&self, fields: Value) -> BoxFuture<'_, Result<R, SourceError>> {
        Box::pin(async move {
            let fields = serde_json::to_vec(&fields)
                .map_err(|e| SourceError::InvalidPayload(e.to_string()))?;
            let record = self
                .client
                .create(proto::CreateRequest {
                    collection: R::COLLECTION.to_string(),
                    fields,
                })
                .await
                .map_err(status_to_source)?;
            decode_record(record)
        })
    }

    fn update<'a>(&'a self, id: &'a str, fields: Value) -> BoxFuture<'a, Result<R, SourceError>> {
        Box::pin(async move {
            let fields = serde_json::to_vec(&fields)
                .map_err(|e| SourceError::InvalidPayload(e.to_string()))?;
            let record = self
                .client
                .update(proto::UpdateRequest {
                    collection: R::COLLECTION.to_string(),
                    id: id.to_string(),
                    fields,
                })
                .await
                .map_err(status_to_source)?;
            decode_record(record)
        })
    }
}

/// The command endpoint of a gRPC backend.
#[derive(Clone)]
pub struct GrpcCommands {
    client: SyncClient,
}

fn method_to_proto(method: Method) -> proto::HttpMethod {
    match method {
        Method::Get => proto::HttpMethod::Get,
        Method::Post => proto::HttpMethod::Post,
        Method::Delete => proto::HttpMethod::Delete,
    }
}

/// Narrow the wire status to the HTTP range; out-of-range values become 0
/// rather than wrapping into a plausible-looking code.
fn decode_status(status: u32) -> u16 {
    u16::try_from(status).unwrap_or(0)
}

impl CommandSurface for GrpcCommands {
    fn send<'a>(
        &'a self,
        path: &'a str,
        method: Method,
    ) -> BoxFuture<'a, Result<CommandResponse, SourceError>> {
        Box::pin(async move {
            let response = self
                .client
                .send(proto::SendRequest {
                    path: path.to_string(),
                    method: method_to_proto(method) as i32,
                    body: Vec::new(),
                })
                .await
                .map_err(status_to_source)?;
            let body = if response.body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&response.body).unwrap_or(Value::Null)
            };
            Ok(CommandResponse {
                ok: response.ok,
                status: decode_status(response.status),
                body,
            })
        })
    }
}

/// The session channel of a gRPC backend.
#[derive(Clone)]
pub struct GrpcAuth {
    client: SyncClient,
}

impl AuthSource for GrpcAuth {
    fn current(&self) -> BoxFuture<'_, Result<AuthSnapshot, SourceError>> {
        Box::pin(async move {
            let message = self.client.auth_state().await.map_err(status_to_source)?;
            decode_auth(message)
        })
    }

    fn changes(&self) -> BoxFuture<'_, Result<AuthStream, SourceError>> {
        Box::pin(async move {
            let streaming = self.client.watch_auth().await.map_err(status_to_source)?;
            let changes = streaming
                .take_while(|item| {
                    if let Err(status) = item {
                        tracing::warn!(error = %status, "session feed failed, ending stream");
                        return false;
                    }
                    true
                })
                .filter_map(|item| {
                    item.ok().and_then(|message| match decode_auth(message) {
                        Ok(snapshot) => Some(snapshot),
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping undecodable session change");
                            None
                        }
                    })
                });
            Ok(Box::pin(changes) as AuthStream)
        })
    }
}
