//! Event-maintained in-memory mirrors of game-library collections.
//!
//! A backend owns the truth; this crate keeps local copies of its
//! collections consistent by fetching a full snapshot once and folding
//! the live create/update/delete feed into it. On top of the generic
//! synchronizer sit the two aggregates an app holds: [`DeviceState`] for
//! the local device service and [`RemoteState`] for the catalog server.

mod auth;
mod client;
mod device;
mod domain;
mod error;
mod mirror;
mod record;
mod remote;
mod settings;
mod source;
mod sync;

/// Generated wire types for the collection service.
pub mod proto {
    tonic::include_proto!("gameshelf");
}

pub use client::{GrpcAuth, GrpcCollection, GrpcCommands, SyncClient};
pub use device::{DeviceBackend, DeviceState};
pub use domain::{
    AuthSnapshot, ClientGame, Download, DownloadStatus, Game, GameStatus, Setting, UserRecord,
};
pub use error::{CommandError, SourceError, SyncError};
pub use mirror::Mirror;
pub use record::{Base, Record, RecordAction, RecordEvent};
pub use remote::{RemoteBackend, RemoteState};
pub use settings::ClientSettings;
pub use source::{
    AuthSource, AuthStream, BoxFuture, CommandResponse, CommandSurface, EventStream, Method,
    RecordSource, FILTER_ALL, MAX_INITIAL_FETCH,
};
pub use sync::{attach_collection, attach_single, Detacher, SyncHandle};
