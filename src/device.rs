//! The device-side aggregate: mirrors of the collections the local device
//! service owns, plus the commands that mutate them.
//!
//! All mutation goes through the backend; the mirrors only ever change in
//! response to events arriving through the normal feeds. A successful
//! command therefore becomes visible asynchronously, when its event lands.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::{ClientGame, Download, Setting};
use crate::error::{CommandError, SourceError, SyncError};
use crate::mirror::Mirror;
use crate::record::Record;
use crate::settings::ClientSettings;
use crate::source::{CommandSurface, Method, RecordSource, FILTER_ALL};
use crate::sync::{attach_collection, Detacher};

/// The capabilities of the local device service, one handle per concern.
#[derive(Clone)]
pub struct DeviceBackend {
    pub settings: Arc<dyn RecordSource<Setting>>,
    pub downloads: Arc<dyn RecordSource<Download>>,
    pub installed: Arc<dyn RecordSource<ClientGame>>,
    pub commands: Arc<dyn CommandSurface>,
}

/// Event-maintained device state: settings, downloads, and installed games.
pub struct DeviceState {
    backend: DeviceBackend,
    settings: Mirror<Vec<Setting>>,
    downloads: Mirror<Vec<Download>>,
    installed: Mirror<Vec<ClientGame>>,
}

impl DeviceState {
    /// Create the aggregate with empty mirrors. Nothing is fetched until
    /// [`load`](Self::load).
    pub fn new(backend: DeviceBackend) -> Self {
        Self {
            backend,
            settings: Mirror::default(),
            downloads: Mirror::default(),
            installed: Mirror::default(),
        }
    }

    /// Attach all three mirrors to their collections.
    ///
    /// All-or-nothing, one collection at a time: a failed attach stops
    /// the sequence before later collections are fetched or subscribed,
    /// and detaches whatever already attached before the error is
    /// returned, so a partially live aggregate never escapes.
    ///
    /// # Errors
    ///
    /// The [`SyncError`] of the first attach that failed.
    pub async fn load(&self) -> Result<Detacher, SyncError> {
        let mut handles = Vec::with_capacity(3);

        let settings = attach_mirror(self.backend.settings.as_ref(), &self.settings).await;
        push_or_unwind(&mut handles, settings).await?;
        let downloads = attach_mirror(self.backend.downloads.as_ref(), &self.downloads).await;
        push_or_unwind(&mut handles, downloads).await?;
        let installed = attach_mirror(self.backend.installed.as_ref(), &self.installed).await;
        push_or_unwind(&mut handles, installed).await?;

        Ok(Detacher::new(handles))
    }

    /// The raw settings rows. Most consumers want the typed
    /// [`settings`](Self::settings) view instead.
    pub fn setting_records(&self) -> &Mirror<Vec<Setting>> {
        &self.settings
    }

    /// The download jobs mirror.
    pub fn downloads(&self) -> &Mirror<Vec<Download>> {
        &self.downloads
    }

    /// The installed-games mirror.
    pub fn installed(&self) -> &Mirror<Vec<ClientGame>> {
        &self.installed
    }

    /// The typed settings view, derived from the current mirror contents.
    pub fn settings(&self) -> ClientSettings {
        ClientSettings::from_records(&self.settings.current())
    }

    /// Write one setting: update the existing record for `key`, or create
    /// one if no record holds that key yet.
    ///
    /// The value is stored JSON-encoded. The mirror is not touched here;
    /// the new value becomes visible when the resulting event arrives.
    ///
    /// # Errors
    ///
    /// [`CommandError::SettingWrite`] when encoding or the record write
    /// fails.
    pub async fn set_setting(&self, key: &str, value: &Value) -> Result<(), CommandError> {
        let encoded = serde_json::to_string(value).map_err(|e| CommandError::SettingWrite {
            key: key.to_string(),
            source: SourceError::InvalidPayload(e.to_string()),
        })?;

        let existing = self
            .settings
            .current()
            .into_iter()
            .find(|record| record.key == key);

        let result = match existing {
            Some(record) => {
                self.backend
                    .settings
                    .update(record.id(), json!({ "value": encoded }))
                    .await
            }
            None => {
                self.backend
                    .settings
                    .create(json!({ "key": key, "value": encoded }))
                    .await
            }
        };
        result
            .map(|_| ())
            .map_err(|source| CommandError::SettingWrite {
                key: key.to_string(),
                source,
            })
    }

    /// Ask the device service to start downloading a catalog game.
    ///
    /// # Errors
    ///
    /// [`CommandError::Download`] when the backend rejects the request;
    /// a transparent [`SourceError`] when it cannot be reached.
    pub async fn add_download(&self, game_id: &str) -> Result<(), CommandError> {
        let response = self
            .backend
            .commands
            .send(&format!("/api/download?id={game_id}"), Method::Post)
            .await?;
        if !response.ok {
            tracing::warn!(game = game_id, status = response.status, "download rejected");
            return Err(CommandError::Download(game_id.to_string()));
        }
        Ok(())
    }

    /// Ask the device service to cancel the download for a catalog game.
    ///
    /// # Errors
    ///
    /// [`CommandError::Cancel`] when the backend rejects the request.
    pub async fn cancel_download(&self, game_id: &str) -> Result<(), CommandError> {
        let response = self
            .backend
            .commands
            .send(&format!("/api/download?id={game_id}"), Method::Delete)
            .await?;
        if !response.ok {
            tracing::warn!(game = game_id, status = response.status, "cancel rejected");
            return Err(CommandError::Cancel(game_id.to_string()));
        }
        Ok(())
    }

    /// Ask the device service to launch an installed game.
    ///
    /// # Errors
    ///
    /// [`CommandError::Launch`] when the backend rejects the request.
    pub async fn launch_game(&self, game_id: &str) -> Result<(), CommandError> {
        let response = self
            .backend
            .commands
            .send(&format!("/api/launch?id={game_id}"), Method::Post)
            .await?;
        if !response.ok {
            tracing::warn!(game = game_id, status = response.status, "launch rejected");
            return Err(CommandError::Launch(game_id.to_string()));
        }
        Ok(())
    }
}

/// Collect a successful attach, or detach everything collected so far.
async fn push_or_unwind(
    handles: &mut Vec<crate::sync::SyncHandle>,
    result: Result<crate::sync::SyncHandle, SyncError>,
) -> Result<(), SyncError> {
    match result {
        Ok(handle) => {
            handles.push(handle);
            Ok(())
        }
        Err(e) => {
            for handle in handles.iter() {
                handle.detach().await;
            }
            Err(e)
        }
    }
}

async fn attach_mirror<R: Record>(
    source: &dyn RecordSource<R>,
    mirror: &Mirror<Vec<R>>,
) -> Result<crate::sync::SyncHandle, SyncError> {
    let getter = mirror.clone();
    let setter = mirror.clone();
    attach_collection(
        source,
        move || getter.current(),
        move |records| setter.set(records),
        FILTER_ALL,
    )
    .await
}
