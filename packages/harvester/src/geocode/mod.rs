//! Geocoding: query normalization, the Nominatim provider and the
//! cache-first resolver.

pub mod nominatim;
pub mod query;
pub mod resolver;

pub use nominatim::NominatimProvider;
pub use query::{build_queries, canonical_country, query_key, sanitize_place};
pub use resolver::{GeocodeResolver, ResolverConfig};
