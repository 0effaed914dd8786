pub mod generate;
pub mod migrate;

pub use generate::{RunOptions, generate_types};
pub use migrate::migrate_project;
