//! Load-generation client for a geospatial point server.
//!
//! Two workloads against one server: a pipelined bulk load of point records
//! (`loader`) and a fixed count of randomized radius queries spread across a
//! pool of worker connections (`bench`). The `stats` module fetches server
//! memory statistics once both are done.

pub mod bench;
pub mod conn;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod report;
pub mod resp;
pub mod stats;

pub use conn::Connection;
pub use error::{ClientError, Result};
