//! pg-typegen scans TypeScript sources for tagged SQL template literals,
//! describes each query against a live PostgreSQL database, and rewrites the
//! sources in place with generated result types. It also carries a one-shot
//! migration away from the legacy `setupTypeGen` codegen layout.

pub mod typegen;
pub mod ui;
