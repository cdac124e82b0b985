//! Observation model and payload codecs.
//!
//! The store treats payloads as opaque bytes. A [`PayloadCodec`] turns a
//! [`SensorObservation`] (its triple, result time and statement graph) into
//! those bytes and back.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// One subject-predicate-object statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Statement {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Time of an observation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalEntity {
    Instant {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    Interval {
        #[serde(with = "time::serde::rfc3339")]
        start: OffsetDateTime,
        #[serde(with = "time::serde::rfc3339")]
        end: OffsetDateTime,
    },
}

impl TemporalEntity {
    pub fn instant(at: OffsetDateTime) -> Self {
        TemporalEntity::Instant { at }
    }

    /// The point in time, if this entity is one.
    pub fn as_instant(&self) -> Result<OffsetDateTime> {
        match self {
            TemporalEntity::Instant { at } => Ok(*at),
            TemporalEntity::Interval { start, end } => {
                Err(Error::NotAnInstant(format!("interval {start} .. {end}")))
            }
        }
    }
}

/// A sensor observation: the triple it belongs to, when the result was
/// produced, and the statements describing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorObservation {
    pub sensor: String,
    pub property: String,
    pub feature: String,
    pub result_time: TemporalEntity,
    pub statements: BTreeSet<Statement>,
}

pub trait PayloadCodec: Send + Sync {
    fn encode(&self, observation: &SensorObservation) -> Result<Vec<u8>>;

    fn decode(&self, payload: &[u8]) -> Result<SensorObservation>;
}

/// Codec storing observations as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode(&self, observation: &SensorObservation) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(observation)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<SensorObservation> {
        Ok(serde_json::from_slice(payload)?)
    }
}

pub const SSN_OBSERVED_BY: &str = "http://purl.oclc.org/NET/ssnx/ssn#observedBy";
pub const SSN_OBSERVED_PROPERTY: &str = "http://purl.oclc.org/NET/ssnx/ssn#observedProperty";
pub const SSN_FEATURE_OF_INTEREST: &str = "http://purl.oclc.org/NET/ssnx/ssn#featureOfInterest";
pub const SSN_OBSERVATION_RESULT_TIME: &str =
    "http://purl.oclc.org/NET/ssnx/ssn#observationResultTime";
pub const TIME_IN_XSD_DATE_TIME: &str = "http://www.w3.org/2006/time#inXSDDateTime";

/// Recovers the triple and result time of an observation from its raw
/// statement graph.
pub trait ObservationExtractor: Send + Sync {
    fn extract(&self, statements: &BTreeSet<Statement>) -> Result<SensorObservation>;
}

/// Extractor for graphs using the SSN and OWL-Time vocabularies.
///
/// The sensor, property and feature are the objects of `ssn:observedBy`,
/// `ssn:observedProperty` and `ssn:featureOfInterest`. The result time node
/// (object of `ssn:observationResultTime`) carries an RFC 3339
/// `time:inXSDDateTime` literal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsnExtractor;

impl ObservationExtractor for SsnExtractor {
    fn extract(&self, statements: &BTreeSet<Statement>) -> Result<SensorObservation> {
        let object_of = |predicate: &str, missing: &'static str| {
            statements
                .iter()
                .find(|s| s.predicate == predicate)
                .map(|s| s.object.as_str())
                .ok_or(Error::IncompleteObservation(missing))
        };

        let sensor = object_of(SSN_OBSERVED_BY, "sensor")?;
        let property = object_of(SSN_OBSERVED_PROPERTY, "property")?;
        let feature = object_of(SSN_FEATURE_OF_INTEREST, "feature")?;
        let time_node = object_of(SSN_OBSERVATION_RESULT_TIME, "result time")?;
        let literal = statements
            .iter()
            .find(|s| s.subject == time_node && s.predicate == TIME_IN_XSD_DATE_TIME)
            .map(|s| s.object.as_str())
            .ok_or(Error::IncompleteObservation("result time"))?;
        let at = OffsetDateTime::parse(lexical_form(literal), &Rfc3339)
            .map_err(|_| Error::NotAnInstant(literal.to_string()))?;

        Ok(SensorObservation {
            sensor: sensor.to_string(),
            property: property.to_string(),
            feature: feature.to_string(),
            result_time: TemporalEntity::instant(at),
            statements: statements.clone(),
        })
    }
}

/// `"2020-01-01T00:00:00Z"^^xsd:dateTime` -> `2020-01-01T00:00:00Z`.
fn lexical_form(literal: &str) -> &str {
    match literal.strip_prefix('"') {
        Some(rest) => rest.split('"').next().unwrap_or(rest),
        None => literal,
    }
}
