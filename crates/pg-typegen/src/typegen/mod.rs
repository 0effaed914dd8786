//! The type-generation pipeline: scan TypeScript sources for tagged SQL
//! templates, describe each query against a live database, and rewrite the
//! sources with generated result types.

pub mod attribution;
pub mod catalog;
pub mod config;
pub mod declarations;
pub mod migrate;
pub mod model;
pub mod naming;
pub mod normalize;
pub mod oracle;
pub mod orchestrator;
pub mod patcher;
pub mod pgtypes;
pub mod report;
pub mod resolver;
pub mod scan;
pub mod vcs;
pub mod walk;

pub use config::{Config, WritePlacement};
pub use orchestrator::Orchestrator;
pub use report::RunStats;
