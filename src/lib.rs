//! # Product Chat
//!
//! Retrieval-grounded chat over several independent product knowledge bases.
//!
//! A question about a product is embedded, matched against that product's
//! pre-built vector index, and the nearest text fragments are sent with the
//! conversation to a remote language model. When nothing relevant is found
//! the organization's canned introduction is returned instead and no model
//! call is made.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ ChatOrchestrator │──▶│ RetrievalCatalog │──▶│  ProductIndex    │
//! │  reply(turns, p) │   │  route by key    │   │  flat k-NN + text│
//! └───────┬──────────┘   └────────┬─────────┘   └──────────────────┘
//!         │                       ▼
//!         │              ┌──────────────────┐
//!         │              │ EmbeddingEncoder │
//!         ▼              └──────────────────┘
//! ┌──────────────────┐   ┌──────────────────┐
//! │ ContextAssembler │──▶│ GenerationClient │──▶ chat/completions
//! └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Transcript, message, and fragment types |
//! | [`error`] | Typed pipeline errors |
//! | [`embedding`] | Sentence-embedding encoders |
//! | [`index`] | Per-product vector index and fragment store |
//! | [`catalog`] | Product discovery and query routing |
//! | [`assembler`] | Grounded prompt assembly |
//! | [`generation`] | Remote completion client |
//! | [`orchestrator`] | The `reply` entry point |
//! | [`server`] | HTTP chat server |
//! | [`chat`] | Terminal chat commands |

pub mod assembler;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod products;
pub mod search;
pub mod server;
