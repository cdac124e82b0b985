//! Observation store: writes into rollover partitions, reads time ranges
//! back by walking partition boundaries.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use time::OffsetDateTime;

use crate::catalog::{require_triple, RegistrationCatalog};
use crate::codec::{
    JsonCodec, ObservationExtractor, PayloadCodec, SensorObservation, SsnExtractor, Statement,
};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::partition::{PartitionKeyResolver, PartitionSpan};
use crate::query::{ObservationQuery, ResultSet};
use crate::registration::Registration;
use crate::rollover::Rollover;
use crate::storage::{BackingStore, DirStore, MemoryStore};
use crate::time_key::TimeKey;

/// Partitioned observation store over a [`BackingStore`].
///
/// # Example
///
/// ```no_run
/// use observa::{ObservationStore, Rollover, StoreConfig};
/// use time::macros::datetime;
///
/// let store = ObservationStore::open_dir("./observations", StoreConfig::default())?;
/// store.register("s1", "temp", "room1", Rollover::Hour)?;
/// store.write("s1", "temp", "room1", datetime!(2020-01-01 10:15 UTC), b"21.5")?;
///
/// let payloads = store.query_range(
///     "s1",
///     "temp",
///     "room1",
///     datetime!(2020-01-01 10:00 UTC),
///     datetime!(2020-01-01 11:00 UTC),
/// )?;
/// assert_eq!(payloads.len(), 1);
/// store.close()?;
/// # Ok::<(), observa::Error>(())
/// ```
pub struct ObservationStore {
    backend: Arc<dyn BackingStore>,
    catalog: Arc<RegistrationCatalog>,
    resolver: PartitionKeyResolver,
    codec: Box<dyn PayloadCodec>,
    extractor: Box<dyn ObservationExtractor>,
    config: StoreConfig,
    owns_backend: bool,
    closed: AtomicBool,
}

impl ObservationStore {
    /// Provision the schema and load registrations.
    ///
    /// The backend stays owned by the caller: dropping the store leaves it
    /// open, only an explicit [`close`](Self::close) releases it.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidTimezone`: the configured timezone is not recognised
    /// - backing store errors from provisioning or loading registrations
    pub fn open(backend: Arc<dyn BackingStore>, config: StoreConfig) -> Result<Self> {
        Self::open_backend(backend, config, false)
    }

    /// Open a store persisted under a directory. The store owns its backend
    /// and releases it on drop.
    pub fn open_dir(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let backend = DirStore::open_with_config(path, &config)?;
        Self::open_backend(Arc::new(backend), config, true)
    }

    /// Open a store kept in memory.
    pub fn in_memory(config: StoreConfig) -> Result<Self> {
        Self::open_backend(Arc::new(MemoryStore::new()), config, true)
    }

    fn open_backend(
        backend: Arc<dyn BackingStore>,
        config: StoreConfig,
        owns_backend: bool,
    ) -> Result<Self> {
        let timezone = config.timezone()?;
        backend.ensure_schema()?;
        let catalog = Arc::new(RegistrationCatalog::open(Arc::clone(&backend))?);
        let resolver = PartitionKeyResolver::new(Arc::clone(&catalog), timezone);
        info!(
            "Observation store opened [registrations = {}; timezone = {timezone}]",
            catalog.len()
        );
        Ok(Self {
            backend,
            catalog,
            resolver,
            codec: Box::new(JsonCodec),
            extractor: Box::new(SsnExtractor),
            config,
            owns_backend,
            closed: AtomicBool::new(false),
        })
    }

    /// Replace the payload codec used by [`add`](Self::add) and
    /// [`evaluate`](Self::evaluate).
    pub fn with_codec(mut self, codec: impl PayloadCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replace the extractor used by [`add_statements`](Self::add_statements).
    pub fn with_extractor(mut self, extractor: impl ObservationExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn catalog(&self) -> &Arc<RegistrationCatalog> {
        &self.catalog
    }

    pub fn resolver(&self) -> &PartitionKeyResolver {
        &self.resolver
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn register(
        &self,
        sensor: &str,
        property: &str,
        feature: &str,
        rollover: Rollover,
    ) -> Result<Arc<Registration>> {
        self.check_open()?;
        self.catalog.register(sensor, property, feature, rollover)
    }

    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        self.catalog.registrations()
    }

    /// Store `payload` for a triple at time `t`.
    ///
    /// Returns the time key the record was written under.
    ///
    /// # Errors
    ///
    /// - `Error::EmptyPayload`: nothing to store
    /// - `Error::MissingArgument`: an identifier is empty
    /// - `Error::NotRegistered`: the triple has no registration
    pub fn write(
        &self,
        sensor: &str,
        property: &str,
        feature: &str,
        t: OffsetDateTime,
        payload: &[u8],
    ) -> Result<TimeKey> {
        self.check_open()?;
        if let Err(err) = require_triple(sensor, property, feature) {
            warn!(
                "At least one parameter is empty [sensor = {sensor}; property = {property}; feature = {feature}; time = {t}]"
            );
            return Err(err);
        }
        if payload.is_empty() {
            warn!(
                "Empty payload [sensor = {sensor}; property = {property}; feature = {feature}; time = {t}]"
            );
            return Err(Error::EmptyPayload);
        }

        let Some(partition) = self.resolver.partition_key_for(sensor, property, feature, t) else {
            error!(
                "Observation not written, triple not registered [sensor = {sensor}; property = {property}; feature = {feature}; time = {t}]"
            );
            return Err(Error::not_registered(sensor, property, feature));
        };

        let key = TimeKey::generate(t);
        self.backend.insert(&partition, key, payload)?;
        debug!("write [partition = {partition}; key = {key}]");
        Ok(key)
    }

    /// Encode and store an observation at its result time.
    ///
    /// # Errors
    ///
    /// - `Error::EmptyPayload`: the observation has no statements
    /// - `Error::NotAnInstant`: the result time is an interval
    /// - any error of [`write`](Self::write)
    pub fn add(&self, observation: &SensorObservation) -> Result<TimeKey> {
        if observation.statements.is_empty() {
            warn!(
                "Empty collection of statements [sensor = {}; property = {}; feature = {}]",
                observation.sensor, observation.property, observation.feature
            );
            return Err(Error::EmptyPayload);
        }
        let t = observation.result_time.as_instant()?;
        let payload = self.codec.encode(observation)?;
        self.write(
            &observation.sensor,
            &observation.property,
            &observation.feature,
            t,
            &payload,
        )
    }

    /// Store a raw statement graph. The triple and result time are read
    /// from the graph by the configured extractor.
    ///
    /// # Errors
    ///
    /// - `Error::EmptyPayload`: the graph is empty
    /// - `Error::IncompleteObservation`: the graph lacks the triple or time
    /// - any error of [`add`](Self::add)
    pub fn add_statements(&self, statements: &BTreeSet<Statement>) -> Result<TimeKey> {
        if statements.is_empty() {
            warn!("Empty collection of statements");
            return Err(Error::EmptyPayload);
        }
        let observation = match self.extractor.extract(statements) {
            Ok(observation) => observation,
            Err(err) => {
                error!(
                    "Failed to extract observation [statements = {}]: {err}",
                    statements.len()
                );
                return Err(err);
            }
        };
        self.add(&observation)
    }

    /// Payloads of a triple stamped in `[from, to)`.
    ///
    /// Every rollover partition overlapping the range is scanned and the
    /// results are merged into a set; there is no ordering across
    /// partitions.
    ///
    /// # Errors
    ///
    /// - `Error::MissingArgument`: an identifier is empty
    /// - `Error::NotRegistered`: the triple has no registration
    pub fn query_range(
        &self,
        sensor: &str,
        property: &str,
        feature: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<HashSet<Vec<u8>>> {
        self.check_open()?;
        if let Err(err) = require_triple(sensor, property, feature) {
            warn!(
                "At least one parameter is empty [sensor = {sensor}; property = {property}; feature = {feature}; from = {from}; to = {to}]"
            );
            return Err(err);
        }

        let Some(registration) = self.catalog.resolve(sensor, property, feature) else {
            error!(
                "Query not evaluated, triple not registered [sensor = {sensor}; property = {property}; feature = {feature}]"
            );
            return Err(Error::not_registered(sensor, property, feature));
        };

        let spans = self.resolver.spans(&registration, from, to);
        debug!(
            "query [registration = {}; partitions = {}; from = {from}; to = {to}]",
            registration.id(),
            spans.len()
        );

        if self.config.parallel_scans && spans.len() > 1 {
            self.scan_parallel(&spans)
        } else {
            let mut merged = HashSet::new();
            for span in &spans {
                merged.extend(self.scan_span(span)?);
            }
            Ok(merged)
        }
    }

    /// Run a query and merge the statements of every matching observation.
    pub fn evaluate(&self, query: &ObservationQuery) -> Result<ResultSet> {
        let payloads = self.query_range(
            &query.sensor,
            &query.property,
            &query.feature,
            query.time_from,
            query.time_to,
        )?;
        let mut result = ResultSet::new(query.clone());
        for payload in payloads {
            result.add(self.codec.decode(&payload)?);
        }
        Ok(result)
    }

    /// Release the backing store, whether or not this store owns it.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn scan_span(&self, span: &PartitionSpan) -> Result<Vec<Vec<u8>>> {
        self.backend.scan(
            &span.key,
            TimeKey::lower_bound(span.from),
            TimeKey::lower_bound(span.to),
        )
    }

    fn scan_parallel(&self, spans: &[PartitionSpan]) -> Result<HashSet<Vec<u8>>> {
        let threads = self.config.scan_threads().min(spans.len());
        let per_thread = spans.len().div_ceil(threads);

        std::thread::scope(|scope| {
            let handles: Vec<_> = spans
                .chunks(per_thread)
                .map(|group| {
                    scope.spawn(move || -> Result<Vec<Vec<u8>>> {
                        let mut payloads = Vec::new();
                        for span in group {
                            payloads.extend(self.scan_span(span)?);
                        }
                        Ok(payloads)
                    })
                })
                .collect();

            let mut merged = HashSet::new();
            for handle in handles {
                let payloads = handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
                merged.extend(payloads);
            }
            Ok(merged)
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Observation store closed");
        self.backend.close()
    }
}

impl Drop for ObservationStore {
    fn drop(&mut self) {
        if !self.owns_backend {
            return;
        }
        if let Err(err) = self.shutdown() {
            warn!("Failed to close backing store: {err}");
        }
    }
}
