#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod clauses;
pub mod config;
pub mod error;
pub mod fallback;
pub mod query_log;
pub mod store;
pub mod text;
pub mod traits;
pub mod types;
