//! # Issue Mirror Core
//!
//! Shared, I/O-light logic for Issue Mirror: the issue index with its
//! label and type views, decoding of raw issue payloads, the recursive
//! text splitter, the embedder trait, and the in-memory embedding store.
//!
//! This crate contains no HTTP client and no CLI. The only file I/O is the
//! embedding store's own serialization and the [`persist::atomic_write`]
//! helper it shares with the app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingestor;
pub mod models;
pub mod persist;
pub mod store;

pub use error::{CoreError, Result};
