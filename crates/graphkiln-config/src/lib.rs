//! # Graphkiln Configuration Library
//!
//! Type-safe configuration for the graph synchronization engine. Everything the
//! engine needs at startup lives in one [`GraphkilnConfig`]: the remote SPARQL
//! endpoint, the named graph, sync tuning, the metadata backend selection and
//! the vocabulary namespaces.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphkiln_config::GraphkilnConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GraphkilnConfig::load(None)?;
//!     println!("syncing into {}", config.graph.graph_uri);
//!     Ok(())
//! }
//! ```
//!
//! Loading always validates. A config that fails validation never reaches the
//! backend registry.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod components;
mod error;
mod loader;

pub use components::*;
pub use error::{ConfigError, ConfigResult};
pub use loader::*;
