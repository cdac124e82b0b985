//! Partition keys and rollover-aligned range spans.
//!
//! A partition key names the bucket holding one series' observations for
//! one rollover period: `<registration id>-<YYYYMMDDHHmm>`, where the time
//! part is the bucket start in the resolver's timezone.

use std::fmt;
use std::sync::Arc;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::catalog::RegistrationCatalog;
use crate::error::{Error, Result};
use crate::registration::Registration;
use crate::rollover::Timezone;

const BUCKET_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Build the key for a bucket start. `bucket` must already be floored.
    pub fn new(registration_id: &str, bucket: OffsetDateTime) -> Self {
        Self(format!(
            "{}-{:04}{:02}{:02}{:02}{:02}",
            registration_id,
            bucket.year(),
            bucket.month() as u8,
            bucket.day(),
            bucket.hour(),
            bucket.minute()
        ))
    }

    /// Split a key back into registration id and bucket start (no offset).
    pub fn parse(key: &str) -> Result<(String, PrimitiveDateTime)> {
        let invalid = || Error::InvalidPartitionKey(key.to_string());
        let (id, bucket) = key.rsplit_once('-').ok_or_else(invalid)?;
        if id.is_empty() || bucket.len() != BUCKET_LEN || !bucket.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let num = |range: std::ops::Range<usize>| bucket[range].parse::<u16>().map_err(|_| invalid());
        let year = i32::from(num(0..4)?);
        let month = Month::try_from(num(4..6)? as u8).map_err(|_| invalid())?;
        let day = num(6..8)? as u8;
        let hour = num(8..10)? as u8;
        let minute = num(10..12)? as u8;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
        let time = Time::from_hms(hour, minute, 0).map_err(|_| invalid())?;
        Ok((id.to_string(), PrimitiveDateTime::new(date, time)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One partition's share of a time range: `[from, to)` inside `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpan {
    pub key: PartitionKey,
    pub from: OffsetDateTime,
    pub to: OffsetDateTime,
}

/// Maps triples and timestamps to partition keys.
pub struct PartitionKeyResolver {
    catalog: Arc<RegistrationCatalog>,
    timezone: Timezone,
}

impl PartitionKeyResolver {
    pub fn new(catalog: Arc<RegistrationCatalog>, timezone: Timezone) -> Self {
        Self { catalog, timezone }
    }

    pub fn catalog(&self) -> &Arc<RegistrationCatalog> {
        &self.catalog
    }

    pub fn timezone(&self) -> Timezone {
        self.timezone
    }

    /// Partition key for a triple at `t`, or `None` if the triple is not
    /// registered.
    pub fn partition_key_for(
        &self,
        sensor: &str,
        property: &str,
        feature: &str,
        t: OffsetDateTime,
    ) -> Option<PartitionKey> {
        let registration = self.catalog.resolve(sensor, property, feature)?;
        Some(self.key(&registration, t))
    }

    pub fn key(&self, registration: &Registration, t: OffsetDateTime) -> PartitionKey {
        let bucket = registration.rollover().floor(self.timezone.localize(t));
        PartitionKey::new(registration.id(), bucket)
    }

    /// Rollover-aligned sub-ranges covering `[from, to)`.
    ///
    /// The first span starts at `from` itself; every following span starts
    /// on a bucket boundary. Empty when `from >= to`.
    pub fn spans(
        &self,
        registration: &Registration,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Vec<PartitionSpan> {
        let rollover = registration.rollover();
        let mut spans = Vec::new();
        let mut cursor = self.timezone.localize(from);
        while cursor < to {
            // The last bucket of the date range has no successor.
            let end = rollover.next(cursor).map_or(to, |next| next.min(to));
            spans.push(PartitionSpan {
                key: PartitionKey::new(registration.id(), rollover.floor(cursor)),
                from: cursor,
                to: end,
            });
            cursor = end;
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollover::Rollover;
    use crate::storage::MemoryStore;
    use time::macros::datetime;

    fn resolver(timezone: Timezone) -> PartitionKeyResolver {
        let catalog = RegistrationCatalog::open(Arc::new(MemoryStore::new())).unwrap();
        PartitionKeyResolver::new(Arc::new(catalog), timezone)
    }

    #[test]
    fn test_key_format() {
        let key = PartitionKey::new("abc", datetime!(2020-01-02 03:04 UTC));
        assert_eq!(key.as_str(), "abc-202001020304");
    }

    #[test]
    fn test_key_parse() {
        let (id, bucket) = PartitionKey::parse("abc-202001020304").unwrap();
        assert_eq!(id, "abc");
        assert_eq!(bucket, datetime!(2020-01-02 03:04));
        assert!(PartitionKey::parse("abc").is_err());
        assert!(PartitionKey::parse("abc-2020010203").is_err());
        assert!(PartitionKey::parse("abc-202013020304").is_err());
    }

    #[test]
    fn test_partition_key_for_unregistered() {
        let resolver = resolver(Timezone::UTC);
        assert!(resolver
            .partition_key_for("s1", "temp", "room1", datetime!(2020-01-01 10:15 UTC))
            .is_none());
    }

    #[test]
    fn test_partition_key_for_floors_by_rollover() {
        let resolver = resolver(Timezone::UTC);
        let registration = resolver
            .catalog()
            .register("s1", "temp", "room1", Rollover::Hour)
            .unwrap();

        let a = resolver
            .partition_key_for("s1", "temp", "room1", datetime!(2020-01-01 10:15 UTC))
            .unwrap();
        let b = resolver
            .partition_key_for("s1", "temp", "room1", datetime!(2020-01-01 10:50 UTC))
            .unwrap();
        let c = resolver
            .partition_key_for("s1", "temp", "room1", datetime!(2020-01-01 11:05 UTC))
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), format!("{}-202001011000", registration.id()));
    }

    #[test]
    fn test_same_instant_any_offset_same_key() {
        let resolver = resolver(Timezone::UTC);
        let registration = resolver
            .catalog()
            .register("s1", "temp", "room1", Rollover::Day)
            .unwrap();

        let utc = resolver.key(&registration, datetime!(2020-01-01 23:30 UTC));
        let shifted = resolver.key(&registration, datetime!(2020-01-02 07:30 +08:00));
        assert_eq!(utc, shifted);
    }

    #[test]
    fn test_timezone_moves_day_boundary() {
        let resolver = resolver(Timezone::AsiaShanghai);
        let registration = resolver
            .catalog()
            .register("s1", "temp", "room1", Rollover::Day)
            .unwrap();

        // 17:00 UTC is already the next day in Shanghai.
        let key = resolver.key(&registration, datetime!(2020-01-01 17:00 UTC));
        assert_eq!(key.as_str(), format!("{}-202001020000", registration.id()));
    }

    #[test]
    fn test_spans_cross_day_boundary() {
        let resolver = resolver(Timezone::UTC);
        let registration = Registration::new("s1", "temp", "room1", Rollover::Day);

        let spans = resolver.spans(
            &registration,
            datetime!(2020-01-01 12:00 UTC),
            datetime!(2020-01-03 06:00 UTC),
        );
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].from, datetime!(2020-01-01 12:00 UTC));
        assert_eq!(spans[0].to, datetime!(2020-01-02 00:00 UTC));
        assert_eq!(spans[1].from, datetime!(2020-01-02 00:00 UTC));
        assert_eq!(spans[2].to, datetime!(2020-01-03 06:00 UTC));
        assert_eq!(
            spans[2].key.as_str(),
            format!("{}-202001030000", registration.id())
        );
    }

    #[test]
    fn test_spans_empty_range() {
        let resolver = resolver(Timezone::UTC);
        let registration = Registration::new("s1", "temp", "room1", Rollover::Minute);
        let t = datetime!(2020-01-01 12:00 UTC);
        assert!(resolver.spans(&registration, t, t).is_empty());
        assert!(resolver
            .spans(&registration, t, datetime!(2020-01-01 11:00 UTC))
            .is_empty());
    }

    #[test]
    fn test_spans_month_rollover_count() {
        let resolver = resolver(Timezone::UTC);
        let registration = Registration::new("s1", "temp", "room1", Rollover::Month);
        let spans = resolver.spans(
            &registration,
            datetime!(2020-01-15 00:00 UTC),
            datetime!(2021-01-01 00:00 UTC),
        );
        assert_eq!(spans.len(), 12);
        assert!(spans.windows(2).all(|w| w[0].to == w[1].from));
    }

    #[test]
    fn test_spans_reach_max_date() {
        let resolver = resolver(Timezone::UTC);
        let registration = Registration::new("s1", "temp", "room1", Rollover::Year);
        let to = datetime!(9999-12-31 23:59 UTC);
        let spans = resolver.spans(&registration, datetime!(9999-06-01 00:00 UTC), to);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].to, to);
        assert_eq!(
            spans[0].key.as_str(),
            format!("{}-999901010000", registration.id())
        );
    }
}
