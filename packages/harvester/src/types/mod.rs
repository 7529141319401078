//! Data types for the harvester library.

pub mod geo;
pub mod incident;
pub mod limits;
pub mod page;
