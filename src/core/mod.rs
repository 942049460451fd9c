//! Core domain models and the schema-to-diagram pipeline

pub mod auto_layout;
pub mod config;
pub mod diagram;
pub mod edge_routing;
pub mod error;
pub mod history;
pub mod ids;
pub mod refresh;
pub mod relationships;
mod schema;

pub use auto_layout::*;
pub use config::*;
pub use diagram::*;
pub use edge_routing::*;
pub use error::*;
pub use history::*;
pub use ids::*;
pub use refresh::*;
pub use relationships::*;
pub use schema::*;
