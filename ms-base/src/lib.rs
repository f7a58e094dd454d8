mod error;

pub use error::{capacity, conflict, err, fatal, not_found, transport, validation, Error, Kind, Result};
