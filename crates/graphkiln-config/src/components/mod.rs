//! Configuration sections
//!
//! One module per top-level TOML table.

pub mod backend;
pub mod endpoint;
pub mod graph;
pub mod sync;
pub mod vocabulary;

pub use backend::*;
pub use endpoint::*;
pub use graph::*;
pub use sync::*;
pub use vocabulary::*;
