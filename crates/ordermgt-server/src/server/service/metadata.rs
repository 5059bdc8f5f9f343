//! Header and trailer metadata exchanged by the handlers.

use core::time::Duration;
use ordermgt_core::types::metadata::{LOCATION, TIMESTAMP, timestamp_now};
use tokio::time::Instant;
use tonic::metadata::{AsciiMetadataValue, KeyRef, MetadataMap};

const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Keys tonic and hyper put on every request. They never count as caller
/// metadata.
const TRANSPORT_KEYS: &[&str] = &[
    "content-type",
    "te",
    "user-agent",
    "host",
    "accept-encoding",
    "content-length",
];

/// Returns `true` if the caller attached at least one metadata entry of its
/// own.
pub fn has_caller_metadata(metadata: &MetadataMap) -> bool {
    metadata.keys().any(|key| {
        let name = match key {
            KeyRef::Ascii(key) => key.as_str(),
            KeyRef::Binary(key) => key.as_str(),
        };
        !name.starts_with("grpc-") && !TRANSPORT_KEYS.contains(&name)
    })
}

/// Every `timestamp` value the caller sent, in order.
pub fn caller_timestamps(metadata: &MetadataMap) -> Vec<String> {
    metadata
        .get_all(TIMESTAMP)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Absolute deadline derived from the caller's `grpc-timeout` header.
///
/// tonic enforces the timeout only until response headers go out, so
/// streaming bodies have to carry it themselves. Returns `None` when the
/// header is absent or malformed.
pub fn request_deadline(metadata: &MetadataMap) -> Option<Instant> {
    let value = metadata.get(GRPC_TIMEOUT)?.to_str().ok()?;
    Instant::now().checked_add(parse_grpc_timeout(value)?)
}

/// Parses `TimeoutValue TimeoutUnit`: at most eight digits followed by one of
/// `H`, `M`, `S`, `m`, `u`, `n`.
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let (digits, unit) = value.split_at_checked(value.len().checked_sub(1)?)?;
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

pub fn insert_location(metadata: &mut MetadataMap, location: &'static str) {
    metadata.insert(LOCATION, AsciiMetadataValue::from_static(location));
}

/// Stamps `metadata` with the current local time.
pub fn insert_timestamp(metadata: &mut MetadataMap) {
    match timestamp_now().parse::<AsciiMetadataValue>() {
        Ok(value) => {
            metadata.insert(TIMESTAMP, value);
        }
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Skipping unencodable timestamp: {_e}");
        }
    }
}

/// Trailer map holding only a fresh `timestamp`.
pub fn timestamp_trailer() -> MetadataMap {
    let mut trailer = MetadataMap::new();
    insert_timestamp(&mut trailer);
    trailer
}
