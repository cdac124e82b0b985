//! Registrations bind a (sensor, property, feature) triple to a rollover.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rollover::Rollover;

const ID_HEX_LEN: usize = 32;

/// Deterministic registration id for a triple.
///
/// BLAKE3 over the length-prefixed components, truncated to 128 bits of hex.
/// Depends only on the triple, so it is stable across processes and
/// registration order.
pub fn registration_id(sensor: &str, property: &str, feature: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [sensor, property, feature] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..ID_HEX_LEN].to_string()
}

/// Immutable binding of a triple to its rollover and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration {
    id: String,
    sensor: String,
    property: String,
    feature: String,
    rollover: Rollover,
}

impl Registration {
    pub fn new(
        sensor: impl Into<String>,
        property: impl Into<String>,
        feature: impl Into<String>,
        rollover: Rollover,
    ) -> Self {
        let sensor = sensor.into();
        let property = property.into();
        let feature = feature.into();
        Self {
            id: registration_id(&sensor, &property, &feature),
            sensor,
            property,
            feature,
            rollover,
        }
    }

    /// Rebuild a registration from a persisted row.
    ///
    /// The id is recomputed from the stored triple; a row whose stored id
    /// disagrees is reported as corrupt.
    pub fn from_row(row: &RegistrationRow) -> Result<Self> {
        let rollover: Rollover = row.rollover.parse()?;
        let registration = Registration::new(&row.sensor, &row.property, &row.feature, rollover);
        if registration.id != row.id {
            return Err(Error::Corrupt(format!(
                "registration id mismatch: stored {} computed {}",
                row.id, registration.id
            )));
        }
        Ok(registration)
    }

    pub fn to_row(&self) -> RegistrationRow {
        RegistrationRow {
            id: self.id.clone(),
            sensor: self.sensor.clone(),
            property: self.property.clone(),
            feature: self.feature.clone(),
            rollover: self.rollover.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn rollover(&self) -> Rollover {
        self.rollover
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [sensor = {}; property = {}; feature = {}; rollover = {}]",
            self.id, self.sensor, self.property, self.feature, self.rollover
        )
    }
}

/// Row of the registrations table. Every column is text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRow {
    pub id: String,
    pub sensor: String,
    pub property: String,
    pub feature: String,
    pub rollover: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = registration_id("urn:s1", "urn:temp", "urn:room1");
        let b = registration_id("urn:s1", "urn:temp", "urn:room1");
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_HEX_LEN);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_id_distinguishes_components() {
        let base = registration_id("a", "b", "c");
        assert_ne!(base, registration_id("b", "a", "c"));
        assert_ne!(base, registration_id("a", "c", "b"));
        // Length prefixes keep shifted boundaries apart.
        assert_ne!(registration_id("ab", "c", "d"), registration_id("a", "bc", "d"));
    }

    #[test]
    fn test_id_ignores_rollover() {
        let hour = Registration::new("s", "p", "f", Rollover::Hour);
        let day = Registration::new("s", "p", "f", Rollover::Day);
        assert_eq!(hour.id(), day.id());
    }

    #[test]
    fn test_row_round_trip() {
        let registration = Registration::new("s1", "temp", "room1", Rollover::Minute);
        let row = registration.to_row();
        assert_eq!(row.rollover, "MINUTE");
        assert_eq!(Registration::from_row(&row).unwrap(), registration);
    }

    #[test]
    fn test_from_row_detects_id_mismatch() {
        let mut row = Registration::new("s1", "temp", "room1", Rollover::Day).to_row();
        row.feature = "room2".to_string();
        assert!(matches!(
            Registration::from_row(&row),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_from_row_rejects_unknown_rollover() {
        let mut row = Registration::new("s1", "temp", "room1", Rollover::Day).to_row();
        row.rollover = "FORTNIGHT".to_string();
        assert!(matches!(
            Registration::from_row(&row),
            Err(Error::UnsupportedRollover(_))
        ));
    }
}
