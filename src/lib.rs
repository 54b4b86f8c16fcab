//! # Quarry
//!
//! A local-first directory indexer with fused full-text and lexical search.
//!
//! Quarry indexes a directory tree (or several mounted ones) into SQLite
//! with FTS5 full-text ranking, fuses those results with live ripgrep
//! matches, and layers section-aware context, TF-IDF similarity, duplicate
//! detection, and link validation on top.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Roots     │──▶│  Index pass  │──▶│  SQLite   │
//! │ dir + mounts│   │ scan+sections│   │ FTS5      │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!        │                                  │
//!        │          ┌───────────────────────┤
//!        ▼          ▼                       ▼
//!   ┌──────────┐  ┌──────────┐       ┌───────────┐
//!   │ ripgrep  │─▶│  fusion  │       │ similarity│
//!   │ (live)   │  │ (search) │       │ links refs│
//!   └──────────┘  └──────────┘       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qry init                      # create the store
//! qry index                     # index the configured root
//! qry search "deployment"       # fused full-text + lexical search
//! qry related notes/infra.md    # TF-IDF neighbors
//! qry links                     # validate internal links
//! qry stats                     # store overview
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scan`] | Filesystem walking, type detection, fingerprinting |
//! | [`sections`] | Structural section extraction with date detection |
//! | [`index`] | Atomic index passes |
//! | [`search`] | FTS5 + ripgrep fusion search |
//! | [`similarity`] | TF-IDF related files and duplicate detection |
//! | [`links`] | Link validation and backreference scanning |
//! | [`sources`] | Source mount registry |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod index;
pub mod links;
pub mod migrate;
pub mod models;
pub mod ripgrep;
pub mod scan;
pub mod search;
pub mod sections;
pub mod similarity;
pub mod sources;
pub mod stats;
pub mod stopwords;
