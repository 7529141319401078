//! Incident import and deferred geocoding.
//!
//! Batches never fail as a whole: every record gets an outcome, and
//! geocoding problems only leave the coordinate empty for a later
//! [`IncidentService::resolve_missing`] pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::StoreResult;
use crate::geocode::GeocodeResolver;
use crate::traits::{geocoder::GeocodeProvider, store::GeocodeCache, store::IncidentStore};
use crate::types::incident::{BatchSummary, IncidentRecord, ParsedRecord, RecordOutcome};

/// Options for one import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Hint for records that carry none of their own
    pub country_hint: Option<String>,

    /// Resolve places without coordinates during import
    pub geocode: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            country_hint: None,
            geocode: true,
        }
    }
}

impl ImportOptions {
    pub fn with_country_hint(mut self, hint: impl Into<String>) -> Self {
        self.country_hint = Some(hint.into());
        self
    }

    pub fn without_geocoding(mut self) -> Self {
        self.geocode = false;
        self
    }
}

/// Counts from a [`IncidentService::resolve_missing`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveSummary {
    pub pending: usize,
    pub resolved: usize,
    pub unresolved: usize,
    /// Resolved but the write-back failed
    pub failed: usize,
}

/// Imports incidents into an [`IncidentStore`], geocoding through a
/// [`GeocodeResolver`].
pub struct IncidentService<P, C, I> {
    resolver: GeocodeResolver<P, C>,
    store: I,
}

impl<P, C, I> IncidentService<P, C, I>
where
    P: GeocodeProvider,
    C: GeocodeCache,
    I: IncidentStore,
{
    pub fn new(resolver: GeocodeResolver<P, C>, store: I) -> Self {
        Self { resolver, store }
    }

    pub fn resolver(&self) -> &GeocodeResolver<P, C> {
        &self.resolver
    }

    pub fn store(&self) -> &I {
        &self.store
    }

    /// Import a batch of records.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn import_batch(
        &self,
        records: &[IncidentRecord],
        opts: &ImportOptions,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in records {
            summary.record(self.import_one(record, opts).await);
        }
        self.resolver.flush_cache().await;

        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Import batch finished"
        );
        summary
    }

    /// Import the output of [`parse_records`]. Items that could not be read
    /// are counted as failed; the rest import as with [`import_batch`](Self::import_batch).
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn import_parsed(&self, items: &[ParsedRecord], opts: &ImportOptions) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for item in items {
            let outcome = match item {
                Ok(record) => self.import_one(record, opts).await,
                Err(reason) => {
                    debug!(reason = %reason, "Unreadable record");
                    RecordOutcome::Failed {
                        reason: reason.clone(),
                    }
                }
            };
            summary.record(outcome);
        }
        self.resolver.flush_cache().await;

        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Import batch finished"
        );
        summary
    }

    async fn import_one(&self, record: &IncidentRecord, opts: &ImportOptions) -> RecordOutcome {
        if let Some(reason) = record.validation_error() {
            debug!(reason = %reason, "Rejected record");
            return RecordOutcome::Failed { reason };
        }

        match self.store.exists(record).await {
            Ok(true) => {
                return RecordOutcome::Skipped {
                    reason: "duplicate".to_string(),
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Duplicate check failed");
                return RecordOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        let coordinate = match record.place_name() {
            Some(place) if opts.geocode && !record.has_coordinate() => {
                let hint = record
                    .country_hint
                    .as_deref()
                    .filter(|h| !h.trim().is_empty())
                    .or(opts.country_hint.as_deref())
                    .unwrap_or(&record.country);
                self.resolver.resolve(place, Some(hint)).await.into_coordinate()
            }
            _ => None,
        };

        match self.store.insert(record, coordinate.as_ref()).await {
            Ok(id) => RecordOutcome::Imported {
                id,
                geocoded: coordinate.is_some(),
            },
            Err(e) => {
                warn!(error = %e, "Incident insert failed");
                RecordOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Geocode stored incidents that have a place but no coordinates.
    ///
    /// Each incident is resolved with `default_hint` when given, otherwise
    /// with its own country.
    #[instrument(skip(self))]
    pub async fn resolve_missing(&self, default_hint: Option<&str>) -> StoreResult<ResolveSummary> {
        let pending = self.store.pending_geocode().await?;
        let mut summary = ResolveSummary {
            pending: pending.len(),
            ..Default::default()
        };

        for incident in &pending {
            let Some(place) = incident.place.as_deref() else {
                continue;
            };
            let hint = default_hint
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(&incident.country);

            match self.resolver.resolve(place, Some(hint)).await.into_coordinate() {
                Some(coordinate) => match self.store.update_geocode(incident.id, &coordinate).await {
                    Ok(()) => summary.resolved += 1,
                    Err(e) => {
                        warn!(id = incident.id, error = %e, "Geocode write-back failed");
                        summary.failed += 1;
                    }
                },
                None => summary.unresolved += 1,
            }
        }
        self.resolver.flush_cache().await;

        info!(
            pending = summary.pending,
            resolved = summary.resolved,
            unresolved = summary.unresolved,
            failed = summary.failed,
            "Pending incidents processed"
        );
        Ok(summary)
    }
}

/// Parse incident records from a JSON array, a single JSON object, or
/// JSON Lines (blank lines ignored).
///
/// Returns one entry per item so a bad item never hides its neighbours.
/// Error strings carry the 1-based item (array) or line (JSONL) number.
pub fn parse_records(text: &str) -> Vec<ParsedRecord> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // A whole-document parse covers arrays and single (possibly multi-line) objects.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let items = match value {
            Value::Array(items) => items,
            single => vec![single],
        };
        return items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item).map_err(|e| format!("item {}: {}", i + 1, e))
            })
            .collect();
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line.trim()).map_err(|e| format!("line {}: {}", i + 1, e))
        })
        .collect()
}
