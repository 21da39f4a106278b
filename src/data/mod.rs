//! Core data models for booking segments
//!
//! This module contains the dataset produced by the booking source, the travel
//! segments inside it, and the mapping from a segment to the labels shown in
//! the segment list.

pub mod source;

pub use source::{is_expired, BookingService, BookingSource, FetchError, InvalidTtl, SourceConfig};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Placeholder shown when an airport code is missing
const UNKNOWN_CODE: &str = "Unknown";

/// Decodes an optional field, treating null or a value of the wrong shape as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// A fetched set of booking segments with its freshness window
///
/// Created by the booking source on every fetch and replaced wholesale on
/// refresh. `expiry_timestamp` is always later than `fetch_timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDataset {
    /// Travel legs in booking order
    pub segments: Vec<Segment>,
    /// When the data was obtained
    pub fetch_timestamp: DateTime<Utc>,
    /// After this instant the dataset is stale
    pub expiry_timestamp: DateTime<Utc>,
}

impl BookingDataset {
    /// Returns true once `now` is past the expiry timestamp
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_timestamp
    }
}

/// Identifier of a segment, unique within one dataset
///
/// The upstream payload uses integers, but any other JSON value is kept as
/// given so it can still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentId {
    Number(i64),
    Text(String),
    Other(Value),
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentId::Number(n) => write!(f, "{}", n),
            SegmentId::Text(s) => f.write_str(s),
            SegmentId::Other(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for SegmentId {
    fn from(n: i64) -> Self {
        SegmentId::Number(n)
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        SegmentId::Text(s.to_string())
    }
}

/// One travel leg
///
/// Upstream segments are not validated: a missing id or a field of the wrong
/// shape decodes as absent instead of failing the whole dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<SegmentId>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub origin_and_destination_pair: Option<OriginAndDestinationPair>,
}

/// Where a segment starts and ends
///
/// Every part is optional in the upstream data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginAndDestinationPair {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub origin: Option<Airport>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub destination: Option<Airport>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub origin_city: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub destination_city: Option<String>,
}

/// An airport reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Segment {
    /// Decodes one element of an upstream `segments` list
    ///
    /// An element that is not an object becomes an empty segment.
    pub fn from_value(value: &Value) -> Segment {
        Segment::deserialize(value).unwrap_or_default()
    }

    /// Heading shown in the segment list, e.g. "Segment 1"
    ///
    /// A segment without an id renders as just "Segment".
    pub fn title(&self) -> String {
        match &self.id {
            Some(id) => format!("Segment {}", id),
            None => "Segment".to_string(),
        }
    }

    fn origin_code(&self) -> Option<&str> {
        self.origin_and_destination_pair
            .as_ref()?
            .origin
            .as_ref()?
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
    }

    fn destination_code(&self) -> Option<&str> {
        self.origin_and_destination_pair
            .as_ref()?
            .destination
            .as_ref()?
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
    }

    /// Route shown in the segment list, e.g. "SFO - JFK"
    ///
    /// Missing codes render as "Unknown".
    pub fn route_label(&self) -> String {
        format!(
            "{} - {}",
            self.origin_code().unwrap_or(UNKNOWN_CODE),
            self.destination_code().unwrap_or(UNKNOWN_CODE)
        )
    }

    /// City pair, e.g. "San Francisco - New York"
    ///
    /// Only present when both cities are known and non-empty.
    pub fn city_label(&self) -> Option<String> {
        let pair = self.origin_and_destination_pair.as_ref()?;
        let origin = pair.origin_city.as_deref().filter(|c| !c.is_empty())?;
        let destination = pair.destination_city.as_deref().filter(|c| !c.is_empty())?;
        Some(format!("{} - {}", origin, destination))
    }
}
