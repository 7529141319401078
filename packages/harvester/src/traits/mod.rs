//! Core trait abstractions for the harvester library.
//!
//! These traits define the seams where applications plug in network
//! access and storage.

pub mod fetcher;
pub mod geocoder;
pub mod store;
