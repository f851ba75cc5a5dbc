//! Crate-level error types for mirror attachment and mutation commands.

/// Error reported by an Event Source capability (fetch, lookup, subscribe,
/// create, update, or command send).
///
/// The sync engine never inspects transport details; implementations map
/// their native errors onto these variants at the seam.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A single-record lookup matched nothing.
    ///
    /// Distinct from "not yet loaded": the source definitively asserted
    /// that no such record exists.
    #[error("record not found")]
    NotFound,

    /// The underlying channel could not be established or the call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A payload could not be encoded for the wire, or a response record
    /// could not be decoded into its typed form.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Error returned when attaching a mirror fails.
///
/// Attachment is all-or-nothing: a fetch failure means no subscription was
/// opened, and a subscribe failure means the installed snapshot has no live
/// feed behind it, so the attach is abandoned either way.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The initial snapshot load failed. No partial mirror is installed
    /// and no subscription was opened.
    #[error("initial fetch failed: {0}")]
    Fetch(#[source] SourceError),

    /// The live event stream could not be opened.
    #[error("subscribe failed: {0}")]
    Subscribe(#[source] SourceError),
}

/// Error returned when a mutation command is rejected or cannot be sent.
///
/// Commands never touch mirrors; a failed command leaves every mirror
/// exactly as it was, and a successful one only changes a mirror once the
/// resulting event arrives through the normal feed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The download-start command for this game was not accepted.
    #[error("download request for game {0} failed")]
    Download(String),

    /// The download-cancel command for this game was not accepted.
    #[error("cancel request for game {0} failed")]
    Cancel(String),

    /// The launch command for this game was not accepted.
    #[error("launch request for game {0} failed")]
    Launch(String),

    /// Writing a setting record (create or update) failed.
    #[error("write for setting {key} failed")]
    SettingWrite {
        /// The setting key being written.
        key: String,
        /// The underlying source failure.
        #[source]
        source: SourceError,
    },

    /// The command could not reach the command surface at all.
    #[error(transparent)]
    Source(#[from] SourceError),
}
