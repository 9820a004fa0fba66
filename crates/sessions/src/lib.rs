//! Session state for CodeRelay.
//!
//! The session table is in-memory and owned by a single gateway process.
//! Conversation history lives in a [`TranscriptStore`], durable when backed
//! by SQLite and a no-op otherwise.

pub mod store;
pub mod transcript;

pub use store::{Lookup, SessionEntry, SessionState, SessionTable};
pub use transcript::{
    Message, NewMessage, NullTranscriptStore, Role, SqliteTranscriptStore, TranscriptStore,
};
