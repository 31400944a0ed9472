//! Tunedex - audio analysis and library consistency engine
//!
//! Turns raw audio files into structured, trustworthy metadata and keeps a
//! large collection internally consistent as files are added, moved,
//! re-analyzed or deleted. Content identity is derived from decoded
//! samples, so a track keeps its record (analysis, tags, history) across
//! renames, moves and re-encodes.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod dupes;
pub mod error;
pub mod export;
pub mod model;
pub mod reconcile;
pub mod store;

pub use config::LibraryConfig;
pub use error::{LibraryError, Result};
pub use reconcile::{CancelToken, Reconciler, WalkSummary};
pub use store::MetadataStore;
