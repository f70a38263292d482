//! # Scoped RAG
//!
//! A department-scoped, retrieval-augmented chat assistant over a company
//! document library.
//!
//! A one-shot sync mirrors a Microsoft Graph document library to disk,
//! converts new or changed files into page-tagged text blocks, embeds them
//! and stores them in a SQLite vector index tagged with a category taken
//! from the file's folder. Questions are answered by retrieving only the
//! chunks the caller's department may see and asking a chat model to answer
//! from them, or to decline politely when nothing relevant was found.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Graph sync  │──▶│   Indexer    │──▶│ SQLite index │
//! │ (downloads/) │   │ extract+embed│   │  (chunks)    │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │ category filter
//!                    ┌──────────────┐   ┌──────▼───────┐
//!  bearer token ────▶│   Pipeline   │──▶│  Retriever   │
//!  (department)      │ retrieve→gen │   └──────────────┘
//!                    └──────┬───────┘
//!                           ▼
//!                      chat model
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! srag init
//! srag sync                              # download + index changes
//! srag ask "How many vacation days?" --department HR
//! srag serve                             # POST /chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`sync`] | Incremental library mirroring, state file, run lock |
//! | [`connector_graph`] | Microsoft Graph remote source |
//! | [`extract`] | Document conversion and category derivation |
//! | [`chunk`] | Paragraph and oversized-block splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index backends |
//! | [`indexer`] | Re-indexing files into the store |
//! | [`retrieve`] | Department-scoped retrieval |
//! | [`llm`] | Chat model backends |
//! | [`generate`] | Grounded answer generation |
//! | [`pipeline`] | Retrieve → generate orchestration |
//! | [`auth`] | Session tokens |
//! | [`server`] | HTTP chat server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod chunk;
pub mod config;
pub mod connector_graph;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod http;
pub mod indexer;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod sync;
