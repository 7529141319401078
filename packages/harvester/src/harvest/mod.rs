//! Harvest jobs: configuration layering, the site catalog, the relevance
//! filter, the orchestrator and cron scheduling.

pub mod config;
pub mod filter;
pub mod journal;
pub mod orchestrator;
pub mod schedule;
pub mod sources;

pub use config::{HarvestSettings, ItemCaps, LimitDefaults, LimitOverrides, ResolvedLimits};
pub use journal::JournalSink;
pub use orchestrator::{
    CountryReport, HarvestJob, HarvestReport, Harvester, SiteReport, SiteStatus,
};
pub use schedule::start_scheduler;
pub use sources::SourceCatalog;
