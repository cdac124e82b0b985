//! Triple + time-window queries.

use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::codec::{SensorObservation, Statement};

/// Observations of one triple with result time in `[time_from, time_to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationQuery {
    pub sensor: String,
    pub property: String,
    pub feature: String,
    pub time_from: OffsetDateTime,
    pub time_to: OffsetDateTime,
}

impl ObservationQuery {
    pub fn new(
        sensor: impl Into<String>,
        property: impl Into<String>,
        feature: impl Into<String>,
        time_from: OffsetDateTime,
        time_to: OffsetDateTime,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            property: property.into(),
            feature: feature.into(),
            time_from,
            time_to,
        }
    }
}

/// Union of the statements of every matching observation.
#[derive(Debug, Clone)]
pub struct ResultSet {
    query: ObservationQuery,
    observations: usize,
    statements: BTreeSet<Statement>,
}

impl ResultSet {
    pub(crate) fn new(query: ObservationQuery) -> Self {
        Self {
            query,
            observations: 0,
            statements: BTreeSet::new(),
        }
    }

    pub(crate) fn add(&mut self, observation: SensorObservation) {
        self.observations += 1;
        self.statements.extend(observation.statements);
    }

    pub fn query(&self) -> &ObservationQuery {
        &self.query
    }

    /// Number of observations merged into this result.
    pub fn observation_count(&self) -> usize {
        self.observations
    }

    pub fn statements(&self) -> &BTreeSet<Statement> {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn into_statements(self) -> BTreeSet<Statement> {
        self.statements
    }
}
