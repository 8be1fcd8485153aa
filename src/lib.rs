//! Dictionary resource and lookup engine
//!
//! Discovers installed dictionaries, parses MDict (`.mdx`/`.mdd`) containers
//! and wikit text sources into sorted headword indexes, and answers lookups
//! with sanitized, self-contained markup for the wikit shells.
//!
//! # Example
//! ```no_run
//! use wikit_engine::{EngineConfig, QueryService};
//!
//! let config = EngineConfig::load().unwrap();
//! let service = QueryService::new(&config).unwrap();
//! for dict in service.list_dictionaries() {
//!     println!("{}: {}", dict.id, dict.name);
//! }
//!
//! match service.lookup("basic-en", "hello") {
//!     Ok(definition) => println!("{}", definition.html),
//!     Err(e) => eprintln!("{:?}: {}", e.kind, e.message),
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
mod error;
pub mod format;
pub mod index;
pub mod normalize;
pub mod render;
pub mod resolver;
pub mod service;
mod types;
mod utils;

pub use cache::{LoadedDictionary, ResourceCache};
pub use catalog::Catalog;
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use format::{FormatAdapter, MediaPayload};
pub use index::Index;
pub use normalize::Normalizer;
pub use render::{render, render_entry, RenderContext, RenderedEntry};
pub use resolver::LookupResolver;
pub use service::{BoundaryError, DictInfo, ExportSummary, QueryService};
pub use types::*;
