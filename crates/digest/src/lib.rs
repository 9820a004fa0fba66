//! Post-processing for raw agent output.
//!
//! Everything here is pure and synchronous: the gateway calls these on the
//! captured stdout of a run before it is stored or returned.

pub mod extract;
pub mod noise;
pub mod summary;

pub use extract::{count_tokens, extract_action_items};
pub use noise::{extract_key_information, is_content_line};
pub use summary::{digest, summarize, Digest, EMPTY_OUTPUT_SUMMARY, SUMMARY_MAX_LINES};
