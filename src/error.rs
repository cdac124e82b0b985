use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("not registered: sensor={sensor} property={property} feature={feature}")]
    NotRegistered {
        sensor: String,
        property: String,
        feature: String,
    },
    #[error("empty payload")]
    EmptyPayload,
    #[error("unsupported rollover: {0}")]
    UnsupportedRollover(String),
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),
    #[error("observation graph has no {0}")]
    IncompleteObservation(&'static str),
    #[error("temporal entity is not an instant: {0}")]
    NotAnInstant(String),
    #[error("duplicate time key {key} in partition {partition}")]
    DuplicateTimeKey { partition: String, key: String },
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("store closed")]
    Closed,
}

impl Error {
    /// True for the expected "triple not registered yet" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotRegistered { .. })
    }

    pub(crate) fn not_registered(sensor: &str, property: &str, feature: &str) -> Self {
        Error::NotRegistered {
            sensor: sensor.to_string(),
            property: property.to_string(),
            feature: feature.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
