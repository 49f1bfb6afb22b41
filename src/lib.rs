//! # Issue Mirror
//!
//! Incrementally mirrors a GitHub repository's issues into a local index
//! and a semantic search store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │  GitHub   │──▶│ Orchestrator │──▶│  IngestionStep      │
//! │ REST API  │   │ pages+links  │   │ index + embeddings  │
//! └───────────┘   └──────┬───────┘   └─────────────────────┘
//!                        │
//!                        ▼
//!               {cache}/{owner}/{name}/repo.json
//!               {cache}/{owner}/{name}/embeddings.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Sync error taxonomy |
//! | [`models`] | Repository names |
//! | [`github`] | Issue page transport and discussions query |
//! | [`embedder`] | OpenAI / Ollama embedding providers |
//! | [`repository`] | Per-repository persisted state |
//! | [`registry`] | In-process state cache with per-repository locks |
//! | [`ingest`] | Per-page index and embedding updates |
//! | [`sync`] | The incremental sync loop |
//! | [`search`] | Semantic search over a synced repository |

pub mod config;
pub mod embedder;
pub mod error;
pub mod github;
pub mod ingest;
pub mod models;
pub mod registry;
pub mod repository;
pub mod search;
pub mod sync;

pub use error::{MirrorError, Result};
