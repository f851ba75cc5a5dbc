//! The catalog-side aggregate: the games mirror and the session mirror.
//!
//! Unlike the device aggregate there is no command surface here; the
//! catalog is read-only from the client's perspective, and session
//! changes (login, logout, token refresh) arrive as a feed of their own.

use std::sync::Arc;

use crate::domain::{AuthSnapshot, Game};
use crate::error::SyncError;
use crate::mirror::Mirror;
use crate::source::{AuthSource, RecordSource, FILTER_ALL};
use crate::sync::{attach_collection, spawn_apply_loop, Detacher};

/// The capabilities of the catalog server.
#[derive(Clone)]
pub struct RemoteBackend {
    pub games: Arc<dyn RecordSource<Game>>,
    pub auth: Arc<dyn AuthSource>,
}

/// Event-maintained catalog state: the game list and the session.
pub struct RemoteState {
    backend: RemoteBackend,
    games: Mirror<Vec<Game>>,
    auth: Mirror<AuthSnapshot>,
}

impl RemoteState {
    /// Create the aggregate with an empty game list and an
    /// unauthenticated session. Nothing is fetched until
    /// [`load`](Self::load).
    pub fn new(backend: RemoteBackend) -> Self {
        Self {
            backend,
            games: Mirror::default(),
            auth: Mirror::default(),
        }
    }

    /// Attach the session and games mirrors.
    ///
    /// The session feed is opened before its snapshot is read, so a
    /// change racing the seed is never lost, only reapplied. As with the
    /// device aggregate, a partial failure detaches whatever already
    /// attached before the error is returned.
    ///
    /// # Errors
    ///
    /// [`SyncError::Subscribe`] if the session feed cannot be opened,
    /// [`SyncError::Fetch`] if the session snapshot cannot be read, or
    /// whatever the games attach produced.
    pub async fn load(&self) -> Result<Detacher, SyncError> {
        let changes = self
            .backend
            .auth
            .changes()
            .await
            .map_err(SyncError::Subscribe)?;
        let seed = self.backend.auth.current().await.map_err(SyncError::Fetch)?;
        tracing::info!(authenticated = seed.is_authenticated(), "seeded session state");
        self.auth.set(seed);

        let auth_mirror = self.auth.clone();
        let auth_handle = spawn_apply_loop(changes, move |snapshot: AuthSnapshot| {
            tracing::debug!(
                authenticated = snapshot.is_authenticated(),
                "applying session change"
            );
            auth_mirror.set(snapshot);
        });

        let getter = self.games.clone();
        let setter = self.games.clone();
        let games_handle = match attach_collection(
            self.backend.games.as_ref(),
            move || getter.current(),
            move |records| setter.set(records),
            FILTER_ALL,
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                auth_handle.detach().await;
                return Err(e);
            }
        };

        Ok(Detacher::new(vec![auth_handle, games_handle]))
    }

    /// The catalog games mirror.
    pub fn games(&self) -> &Mirror<Vec<Game>> {
        &self.games
    }

    /// The session mirror.
    pub fn auth(&self) -> &Mirror<AuthSnapshot> {
        &self.auth
    }
}
