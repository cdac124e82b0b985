//! Registration catalog.
//!
//! Registrations are persisted through the backing store and cached in an
//! immutable [`CatalogSnapshot`]. A refresh builds a complete new snapshot
//! and publishes it with a single pointer swap, so lookups see either the
//! old cache or the new one and never a half-built index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::registration::Registration;
use crate::rollover::Rollover;
use crate::storage::BackingStore;

/// Point-in-time view of all cached registrations.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    by_id: HashMap<String, Arc<Registration>>,
    // sensor -> property -> feature -> id
    ids: HashMap<String, HashMap<String, HashMap<String, String>>>,
}

impl CatalogSnapshot {
    fn insert(&mut self, registration: Registration) {
        let id = registration.id().to_string();
        self.ids
            .entry(registration.sensor().to_string())
            .or_default()
            .entry(registration.property().to_string())
            .or_default()
            .insert(registration.feature().to_string(), id.clone());
        self.by_id.insert(id, Arc::new(registration));
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Registration>> {
        self.by_id.get(id)
    }

    /// Walk sensor, then property, then feature.
    pub fn lookup_id(&self, sensor: &str, property: &str, feature: &str) -> Option<&str> {
        let Some(by_property) = self.ids.get(sensor) else {
            error!("Sensor not registered [sensor = {sensor}]");
            return None;
        };
        let Some(by_feature) = by_property.get(property) else {
            error!("Property not registered [sensor = {sensor}; property = {property}]");
            return None;
        };
        let Some(id) = by_feature.get(feature) else {
            error!(
                "Feature not registered [sensor = {sensor}; property = {property}; feature = {feature}]"
            );
            return None;
        };
        Some(id.as_str())
    }

    pub fn resolve(&self, sensor: &str, property: &str, feature: &str) -> Option<&Arc<Registration>> {
        let id = self.lookup_id(sensor, property, feature)?;
        let registration = self.by_id.get(id);
        if registration.is_none() {
            error!("Registration not found [id = {id}; sensor = {sensor}; property = {property}; feature = {feature}]");
        }
        registration
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

pub struct RegistrationCatalog {
    backend: Arc<dyn BackingStore>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    /// Serializes every read-build-swap of the cache, and `register` across
    /// its check, persist and reload.
    update_lock: Mutex<()>,
}

impl RegistrationCatalog {
    /// Create a catalog with an empty cache. Call [`refresh`](Self::refresh)
    /// to load persisted registrations.
    pub fn new(backend: Arc<dyn BackingStore>) -> Self {
        Self {
            backend,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            update_lock: Mutex::new(()),
        }
    }

    /// Create a catalog and load every persisted registration.
    pub fn open(backend: Arc<dyn BackingStore>) -> Result<Self> {
        let catalog = Self::new(backend);
        catalog.refresh()?;
        Ok(catalog)
    }

    /// Register a triple with a rollover.
    ///
    /// Registering an already known triple returns the existing registration
    /// untouched, whatever rollover is passed.
    ///
    /// # Errors
    ///
    /// - `Error::MissingArgument`: an identifier is empty
    /// - backing store errors from persisting or reloading
    pub fn register(
        &self,
        sensor: &str,
        property: &str,
        feature: &str,
        rollover: Rollover,
    ) -> Result<Arc<Registration>> {
        if let Err(err) = require_triple(sensor, property, feature) {
            warn!(
                "At least one parameter is empty [sensor = {sensor}; property = {property}; feature = {feature}; rollover = {rollover}]"
            );
            return Err(err);
        }

        let _guard = self
            .update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let registration = Registration::new(sensor, property, feature, rollover);
        if let Some(existing) = self.snapshot().get(registration.id()) {
            warn!("Registration exists [registration = {existing}]");
            return Ok(Arc::clone(existing));
        }

        self.backend.insert_registration(&registration.to_row())?;
        info!("Registered [registration = {registration}]");
        self.reload()?;

        Ok(self
            .get(registration.id())
            .unwrap_or_else(|| Arc::new(registration)))
    }

    /// Rebuild the cache from the persisted registration rows.
    ///
    /// Rows whose stored id does not match the id recomputed from their
    /// triple, or whose rollover cannot be parsed, are skipped. Returns the
    /// number of cached registrations.
    pub fn refresh(&self) -> Result<usize> {
        let _guard = self
            .update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.reload()
    }

    /// Caller holds `update_lock`, so no older row set can be published
    /// over a newer one.
    fn reload(&self) -> Result<usize> {
        let rows = self.backend.registration_rows()?;
        let mut snapshot = CatalogSnapshot::default();
        let mut skipped = 0usize;

        for row in &rows {
            match Registration::from_row(row) {
                Ok(registration) => snapshot.insert(registration),
                Err(err) => {
                    skipped += 1;
                    error!(
                        "Persisted registration is not cached [id = {}; sensor = {}; property = {}; feature = {}; rollover = {}]: {err}",
                        row.id, row.sensor, row.property, row.feature, row.rollover
                    );
                }
            }
        }

        let cached = snapshot.len();
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        info!("Registration cache refreshed [cached = {cached}; skipped = {skipped}]");
        Ok(cached)
    }

    /// Look up the registration for a triple.
    pub fn resolve(&self, sensor: &str, property: &str, feature: &str) -> Option<Arc<Registration>> {
        self.snapshot()
            .resolve(sensor, property, feature)
            .map(Arc::clone)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Registration>> {
        self.snapshot().get(id).map(Arc::clone)
    }

    /// All cached registrations, ordered by id.
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        let mut all: Vec<_> = self.snapshot().iter().map(Arc::clone).collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Current cache snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }
}

pub(crate) fn require_triple(sensor: &str, property: &str, feature: &str) -> Result<()> {
    if sensor.is_empty() {
        return Err(Error::MissingArgument("sensor"));
    }
    if property.is_empty() {
        return Err(Error::MissingArgument("property"));
    }
    if feature.is_empty() {
        return Err(Error::MissingArgument("feature"));
    }
    Ok(())
}
