//! Typed records for the synchronized collections.
//!
//! The device service owns `settings`, `downloads`, and `client_games`;
//! the catalog server owns `games` and the user records behind the
//! session. Field sets mirror what the backends actually store.

use serde::{Deserialize, Serialize};

use crate::record::{Base, Record};

/// One device setting. Absence of a key means its default applies; the
/// derived view in [`ClientSettings`](crate::ClientSettings) fills those in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(flatten)]
    pub base: Base,
    /// Setting key, e.g. `"os"` or `"gamesDirectory"`.
    pub key: String,
    /// JSON-serialized value. Stored verbatim; decoding happens in the
    /// derived view.
    #[serde(default)]
    pub value: String,
}

impl Record for Setting {
    const COLLECTION: &'static str = "settings";

    fn base(&self) -> &Base {
        &self.base
    }
}

/// Lifecycle phase of a download, driven entirely by the device backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    #[default]
    Starting,
    Downloading,
    Extracting,
    Completed,
    Failed,
}

/// One download job. The mirror is read-only; the only writes are the
/// start/cancel commands on the command surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Download {
    #[serde(flatten)]
    pub base: Base,
    /// Catalog game id this download is for.
    #[serde(default)]
    pub game: String,
    #[serde(default)]
    pub status: DownloadStatus,
    /// Whether the job is still making progress.
    #[serde(default)]
    pub active: bool,
    /// Human-readable progress line from the backend.
    #[serde(default)]
    pub text: String,
    /// Bytes per second.
    #[serde(default)]
    pub speed: f64,
    /// Bytes transferred so far.
    #[serde(default)]
    pub progress: f64,
    /// Total bytes expected.
    #[serde(default)]
    pub total: f64,
}

impl Record for Download {
    const COLLECTION: &'static str = "downloads";

    fn base(&self) -> &Base {
        &self.base
    }
}

/// A locally installed copy of a catalog game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientGame {
    #[serde(flatten)]
    pub base: Base,
    /// Catalog game id this installation belongs to.
    #[serde(default)]
    pub game: String,
    /// Installation directory.
    #[serde(default)]
    pub path: String,
    /// Executable to run, relative to `path`.
    #[serde(default)]
    pub executable: String,
}

impl Record for ClientGame {
    const COLLECTION: &'static str = "client_games";

    fn base(&self) -> &Base {
        &self.base
    }
}

/// Catalog-side availability of a game's files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Deleted,
    Invalid,
    #[default]
    Missing,
    Found,
}

/// One catalog game with its descriptive metadata. Remote-owned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Game {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub released: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub artworks: Vec<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
    /// Metadata provider this entry was scanned from.
    #[serde(default)]
    pub provider: String,
    #[serde(default, rename = "providerId")]
    pub provider_id: String,
}

impl Record for Game {
    const COLLECTION: &'static str = "games";

    fn base(&self) -> &Base {
        &self.base
    }
}

/// The authenticated user's record on the catalog server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub verified: bool,
}

impl Record for UserRecord {
    const COLLECTION: &'static str = "users";

    fn base(&self) -> &Base {
        &self.base
    }
}

/// Current session state on the catalog server.
///
/// Invariant: `record` is `Some` iff a session is authenticated, and
/// `token` is the empty string iff it is not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    /// Session token; empty when unauthenticated.
    pub token: String,
    /// The authenticated user, if any.
    pub record: Option<UserRecord>,
}

impl AuthSnapshot {
    /// Returns `true` when a session is currently authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.record.is_some()
    }
}
