//! # Stream Harness Core
//!
//! Pure logic shared by the stream-harness crate: stream and record data
//! models, prompt parameter descriptions, content sniffing, and slug
//! derivation.
//!
//! This crate performs no I/O and depends on no async runtime, so the
//! sniffer and slug rules can be reused anywhere bytes and names are at hand.

pub mod models;
pub mod prompt;
pub mod slug;
pub mod sniff;
