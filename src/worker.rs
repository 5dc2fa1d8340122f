//! Background indexing process
//!
//! A message-driven actor owning one [`TemporalIndex`] per reading type, so
//! building or refiltering indices over tens of thousands of points never
//! blocks interactive rendering. Requests are handled strictly in arrival
//! order on a single task; the indices are never shared by reference outside
//! the actor boundary.
//!
//! Callers needing ordering (e.g. ingest then filter) must await the first
//! reply before issuing the dependent request, and correlate replies on
//! `subject_id` to discard stale responses.

use std::collections::HashMap;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{GlucoTrendError, Result};
use crate::index::TemporalIndex;
use crate::models::{ActiveWeekdays, NormalizedRecord, RawReading, ReadingType};
use crate::normalize;

const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Reply to an ingest request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestComplete {
    pub subject_id: String,

    /// Records normalized and indexed
    pub indexed: usize,

    /// Records excluded (non-visualized types, unparseable timestamps)
    pub dropped: usize,
}

/// Reply to a filter request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterComplete {
    pub subject_id: String,

    pub results_by_type: HashMap<ReadingType, Vec<NormalizedRecord>>,
}

/// Wire shapes of the worker protocol
///
/// The tag is the message name; an unrecognized tag is a caller/handler
/// desynchronization and is fatal by design (see [`WireRequest::from_json`]).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireRequest {
    #[serde(rename_all = "camelCase")]
    IngestRequest {
        records: Vec<RawReading>,
        timezone: String,
        subject_id: String,
    },
    ClearAllRequest {},
    #[serde(rename_all = "camelCase")]
    FilterRequest {
        types: Vec<String>,
        date_range: [String; 2],
        active_weekdays: ActiveWeekdays,
        subject_id: String,
    },
}

impl WireRequest {
    /// Parse a protocol message.
    ///
    /// # Panics
    ///
    /// Panics on an unrecognized message shape. This is the one place the
    /// crate raises instead of degrading: a message the worker cannot
    /// recognize means the calling protocol is out of sync, a programming
    /// error rather than a recoverable runtime condition.
    pub fn from_json(value: Value) -> WireRequest {
        match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(err) => panic!(
                "unrecognized index worker request ({err}); calling protocol out of sync: {value}"
            ),
        }
    }
}

enum Command {
    Ingest {
        records: Vec<RawReading>,
        timezone: String,
        subject_id: String,
        reply: oneshot::Sender<IngestComplete>,
    },
    ClearAll {
        reply: oneshot::Sender<()>,
    },
    Filter {
        types: Vec<ReadingType>,
        date_range: [String; 2],
        active_weekdays: ActiveWeekdays,
        subject_id: String,
        reply: oneshot::Sender<FilterComplete>,
    },
}

/// The actor state: one index per visualized reading type, exclusively
/// owned and mutated inside the spawned task.
struct IndexWorker {
    indices: HashMap<ReadingType, TemporalIndex>,
}

impl IndexWorker {
    fn new() -> Self {
        let indices = ReadingType::ALL
            .iter()
            .map(|&reading_type| (reading_type, TemporalIndex::new()))
            .collect();
        Self { indices }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Ingest {
                    records,
                    timezone,
                    subject_id,
                    reply,
                } => {
                    let outcome = self.handle_ingest(records, &timezone, subject_id);
                    // A dropped receiver means the caller superseded this
                    // request; the index mutation already happened.
                    let _ = reply.send(outcome);
                }
                Command::ClearAll { reply } => {
                    self.handle_clear_all();
                    let _ = reply.send(());
                }
                Command::Filter {
                    types,
                    date_range,
                    active_weekdays,
                    subject_id,
                    reply,
                } => {
                    let outcome =
                        self.handle_filter(&types, &date_range, active_weekdays, subject_id);
                    let _ = reply.send(outcome);
                }
            }
        }
        debug!("index worker channel closed, stopping");
    }

    fn handle_ingest(
        &mut self,
        records: Vec<RawReading>,
        timezone: &str,
        subject_id: String,
    ) -> IngestComplete {
        let total = records.len();

        let tz: Tz = match timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                error!(timezone, %subject_id, "unknown timezone, dropping batch");
                return IngestComplete {
                    subject_id,
                    indexed: 0,
                    dropped: total,
                };
            }
        };

        let mut grouped: HashMap<ReadingType, Vec<NormalizedRecord>> = HashMap::new();
        let mut dropped = 0usize;
        for raw in &records {
            // Non-visualized types are simply not indexed.
            let Some(reading_type) = ReadingType::from_tag(&raw.reading_type) else {
                dropped += 1;
                continue;
            };
            match normalize::normalize(raw, tz) {
                Ok(record) => grouped.entry(reading_type).or_default().push(record),
                Err(err) => {
                    warn!(%err, %subject_id, "dropping unnormalizable record");
                    dropped += 1;
                }
            }
        }

        let mut indexed = 0usize;
        for (reading_type, batch) in grouped {
            indexed += batch.len();
            if let Some(index) = self.indices.get_mut(&reading_type) {
                index.ingest(batch);
            }
        }

        debug!(%subject_id, indexed, dropped, "ingest complete");
        IngestComplete {
            subject_id,
            indexed,
            dropped,
        }
    }

    fn handle_clear_all(&mut self) {
        for index in self.indices.values_mut() {
            index.reset();
        }
        debug!("cleared all indices");
    }

    fn handle_filter(
        &mut self,
        types: &[ReadingType],
        date_range: &[String; 2],
        active_weekdays: ActiveWeekdays,
        subject_id: String,
    ) -> FilterComplete {
        let mut results_by_type = HashMap::new();
        for &reading_type in types {
            if let Some(index) = self.indices.get_mut(&reading_type) {
                index.clear_filters();
                index.filter_by_date_range(&date_range[0], &date_range[1]);
                index.filter_by_weekdays(active_weekdays);
                results_by_type.insert(reading_type, index.current_view());
            }
        }

        debug!(%subject_id, types = types.len(), "filter complete");
        FilterComplete {
            subject_id,
            results_by_type,
        }
    }
}

/// Handle to a spawned background indexing worker
#[derive(Clone)]
pub struct IndexWorkerHandle {
    tx: mpsc::Sender<Command>,
}

impl IndexWorkerHandle {
    /// Spawn the worker onto the current tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(IndexWorker::new().run(rx));
        Self { tx }
    }

    /// Normalize and index a batch of raw readings.
    pub async fn ingest(
        &self,
        records: Vec<RawReading>,
        timezone: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Result<IngestComplete> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Ingest {
            records,
            timezone: timezone.into(),
            subject_id: subject_id.into(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| GlucoTrendError::Worker("index worker dropped reply".to_string()))
    }

    /// Reset every index (used when the active subject changes).
    pub async fn clear_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearAll { reply }).await?;
        rx.await
            .map_err(|_| GlucoTrendError::Worker("index worker dropped reply".to_string()))
    }

    /// Refilter the requested types and read back their visible views.
    pub async fn filter(
        &self,
        types: Vec<ReadingType>,
        date_range: [String; 2],
        active_weekdays: ActiveWeekdays,
        subject_id: impl Into<String>,
    ) -> Result<FilterComplete> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Filter {
            types,
            date_range,
            active_weekdays,
            subject_id: subject_id.into(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| GlucoTrendError::Worker("index worker dropped reply".to_string()))
    }

    /// Dispatch a wire-shape request, returning the serialized reply
    /// (`None` for the side-effect-only clear message).
    pub async fn dispatch(&self, request: WireRequest) -> Result<Option<Value>> {
        match request {
            WireRequest::IngestRequest {
                records,
                timezone,
                subject_id,
            } => {
                let reply = self.ingest(records, timezone, subject_id).await?;
                Ok(Some(serde_json::to_value(reply).map_err(|err| {
                    GlucoTrendError::Worker(err.to_string())
                })?))
            }
            WireRequest::ClearAllRequest {} => {
                self.clear_all().await?;
                Ok(None)
            }
            WireRequest::FilterRequest {
                types,
                date_range,
                active_weekdays,
                subject_id,
            } => {
                // Unknown type names in a filter request are not an error;
                // they are simply absent from the reply, like at ingest.
                let types: Vec<ReadingType> = types
                    .iter()
                    .filter_map(|tag| {
                        let parsed = ReadingType::from_tag(tag);
                        if parsed.is_none() {
                            warn!(tag, "ignoring non-visualized type in filter request");
                        }
                        parsed
                    })
                    .collect();
                let reply = self
                    .filter(types, date_range, active_weekdays, subject_id)
                    .await?;
                Ok(Some(serde_json::to_value(reply).map_err(|err| {
                    GlucoTrendError::Worker(err.to_string())
                })?))
            }
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| GlucoTrendError::Worker("index worker stopped".to_string()))
    }
}
