//! Test doubles shared by the resolver's unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use property_geo_database::memory::MemoryStore;
use property_geo_database_models::{GeocodableRecord, RecordKind};
use property_geo_geocoder::{GeocodeError, GeocodeProvider, GeocodedAddress};
use property_geo_geography_models::Coordinate;

use crate::Pipeline;
use crate::config::PipelineConfig;
use crate::pool::ProviderPool;
use crate::progress::RunProgress;
use crate::report::BatchTally;

#[derive(Debug, Clone, Copy)]
enum Answer {
    At(Coordinate),
    Fail,
    RateLimited,
}

/// A provider that answers exact query strings from a script and records
/// every query it receives. Unscripted queries are misses.
pub struct ScriptedProvider {
    id: String,
    answers: BTreeMap<String, Answer>,
    calls: Mutex<Vec<String>>,
    last_resort: bool,
}

impl ScriptedProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            answers: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
            last_resort: false,
        }
    }

    /// Holds the provider back for the last-resort rung.
    pub fn last_resort(mut self) -> Self {
        self.last_resort = true;
        self
    }

    pub fn with(mut self, query: &str, latitude: f64, longitude: f64) -> Self {
        self.answers.insert(
            query.to_string(),
            Answer::At(Coordinate::new(latitude, longitude)),
        );
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.answers.insert(query.to_string(), Answer::Fail);
        self
    }

    pub fn rate_limited(mut self, query: &str) -> Self {
        self.answers.insert(query.to_string(), Answer::RateLimited);
        self
    }
}

#[async_trait]
impl GeocodeProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn is_last_resort(&self) -> bool {
        self.last_resort
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        match self.answers.get(query) {
            Some(Answer::At(coordinate)) => Ok(Some(GeocodedAddress {
                coordinate: *coordinate,
                matched_address: None,
            })),
            Some(Answer::Fail) => Err(GeocodeError::Status { status: 503 }),
            Some(Answer::RateLimited) => Err(GeocodeError::RateLimited),
            None => Ok(None),
        }
    }
}

/// Read access to a [`ScriptedProvider`] after it has been moved into a
/// pool.
#[derive(Clone)]
pub struct CallLog(Arc<ScriptedProvider>);

impl CallLog {
    pub fn of(provider: &Arc<ScriptedProvider>) -> Self {
        Self(Arc::clone(provider))
    }

    pub fn calls(&self) -> Vec<String> {
        self.0
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, query: &str) -> usize {
        self.calls().iter().filter(|q| *q == query).count()
    }
}

/// A pipeline over a [`MemoryStore`] seeded with `records`, using the
/// embedded config with `provider` as its only provider.
pub fn pipeline(
    records: Vec<GeocodableRecord>,
    provider: ScriptedProvider,
) -> (Pipeline, Arc<MemoryStore>, CallLog) {
    pipeline_with(PipelineConfig::embedded(), records, provider)
}

pub fn pipeline_with(
    config: PipelineConfig,
    records: Vec<GeocodableRecord>,
    provider: ScriptedProvider,
) -> (Pipeline, Arc<MemoryStore>, CallLog) {
    let (pipeline, store, mut logs) = pipeline_over(config, records, vec![provider]);
    let log = logs.remove(0);
    (pipeline, store, log)
}

/// Like [`pipeline_with`] with several providers, tried in the given
/// order. Returns one [`CallLog`] per provider.
pub fn pipeline_over(
    config: PipelineConfig,
    records: Vec<GeocodableRecord>,
    providers: Vec<ScriptedProvider>,
) -> (Pipeline, Arc<MemoryStore>, Vec<CallLog>) {
    let store = Arc::new(MemoryStore::new(RecordKind::Listing, records));
    let providers: Vec<Arc<ScriptedProvider>> = providers.into_iter().map(Arc::new).collect();
    let logs = providers.iter().map(|p| CallLog(Arc::clone(p))).collect();
    let pool = ProviderPool::new(
        providers
            .into_iter()
            .map(|p| p as Arc<dyn GeocodeProvider>)
            .collect(),
        config.degenerate.clone(),
    );
    let pipeline = Pipeline::new(config, pool, Arc::clone(&store) as _).unwrap();
    (pipeline, store, logs)
}

/// Keeps everything a pass reports.
#[derive(Default)]
pub struct RecordingProgress {
    total: Mutex<Option<u64>>,
    advanced: Mutex<u64>,
    tallies: Mutex<Vec<BatchTally>>,
    finished: Mutex<Option<String>>,
}

impl RecordingProgress {
    pub fn total(&self) -> Option<u64> {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advanced(&self) -> u64 {
        *self.advanced.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tallies(&self) -> Vec<BatchTally> {
        self.tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn finished(&self) -> Option<String> {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RunProgress for RecordingProgress {
    fn start(&self, total: u64) {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner) = Some(total);
    }

    fn advance(&self, records: u64) {
        *self.advanced.lock().unwrap_or_else(PoisonError::into_inner) += records;
    }

    fn batch(&self, tally: &BatchTally) {
        self.tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*tally);
    }

    fn finish(&self, message: &str) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }
}
