//! # Hoard Node
//!
//! Git Smart HTTP server over a key-value object store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      HTTP (axum)                         │
//! │  /{owner}/{repo}/info/refs | git-upload-pack |           │
//! │  git-receive-pack | /health                              │
//! ├──────────────────────────────────────────────────────────┤
//! │  hoard-auth: Basic credentials -> Identity               │
//! │  repos: owner/name -> RepositoryRecord                   │
//! ├──────────────────────────────────────────────────────────┤
//! │  hoard-git: advertisement, upload-pack, receive-pack,    │
//! │             FsObjectEngine                               │
//! ├──────────────────────────────────────────────────────────┤
//! │  hoard-storage: ObjectStoreFs (per request)              │
//! │                 -> ObjectStore (memory | local)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin hoard-node -- --config hoard.yaml
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Router, handlers and [`api::AppState`]
//! - [`config`] - File and environment configuration
//! - [`observability`] - Structured logging
//! - [`repos`] - Repository lookup

pub mod api;
pub mod config;
pub mod observability;
pub mod repos;
