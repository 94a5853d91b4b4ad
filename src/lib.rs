//! policyqa - retrieval-augmented question answering over HR policy
//! documents.
//!
//! Policy files are chunked, embedded, and stored in a local
//! [redb](https://github.com/cberner/redb) index; questions are answered
//! by retrieving the nearest chunks and asking an OpenAI-compatible chat
//! model to compose a grounded answer with citations. A WhatsApp-style
//! webhook bridges the same pipeline to a messaging channel.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use policyqa::{
//!     ChunkStore, Pipeline, PipelineConfig, VectorIndex,
//!     embedding::HttpEmbedder,
//!     generate::ChatGenerator,
//!     schemas::AskRequest,
//! };
//!
//! # async fn run() -> policyqa::Result<()> {
//! let store = Arc::new(ChunkStore::open(std::path::Path::new(
//!     "company-policies.redb",
//! ))?);
//! let http = reqwest::Client::new();
//!
//! let pipeline = Pipeline::new(
//!     VectorIndex::new(store),
//!     HttpEmbedder::new(
//!         http.clone(),
//!         "https://api.openai.com/v1",
//!         "sk-...",
//!         "text-embedding-3-small",
//!     ),
//!     ChatGenerator::new(
//!         http,
//!         "https://api.groq.com/openai/v1",
//!         "gsk-...",
//!         "gpt-4o-mini",
//!     ),
//!     PipelineConfig::default(),
//! );
//!
//! let answer = pipeline
//!     .ask(&AskRequest {
//!         question: "How many casual leave days do I get?".to_string(),
//!         filters: None,
//!         top_k: None,
//!         follow_up_context: None,
//!     })
//!     .await?;
//! println!("{} ({} citations)", answer.answer, answer.citations.len());
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod doc_id;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod ingestion;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod schemas;
pub mod server;
pub mod store;
pub mod webhook;

pub use config::Settings;
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use error::{Error, Result};
pub use index::VectorIndex;
pub use pipeline::{Pipeline, PipelineConfig};
pub use store::ChunkStore;
