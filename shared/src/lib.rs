use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// A single geolocation reading. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of uncertainty in meters
    pub accuracy: f64,
    pub captured_at: u64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, captured_at: u64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            captured_at,
        }
    }
}

/// Position payload as it appears on the wire.
///
/// Browsers frequently omit everything but the coordinates, so accuracy defaults
/// to zero and a missing timestamp is filled in by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: f64,
    /// Whole milliseconds since the Unix epoch. Fractional or negative values
    /// make the frame malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl WirePosition {
    pub fn into_sample(self, received_at: u64) -> PositionSample {
        PositionSample::new(
            self.latitude,
            self.longitude,
            self.accuracy,
            self.timestamp.unwrap_or(received_at),
        )
    }
}

impl From<PositionSample> for WirePosition {
    fn from(sample: PositionSample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            timestamp: Some(sample.captured_at),
        }
    }
}

/// Messages sent from a client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        position: WirePosition,
    },
    LeaveRoom,
    RefreshDistances {
        position: WirePosition,
    },
    #[serde(other)]
    Unknown,
}

/// Messages sent from the server to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    UserId { user_id: String },
    /// `distance` is in kilometers, `accuracy` in meters.
    #[serde(rename_all = "camelCase")]
    Distance {
        distance: f64,
        user_id: String,
        accuracy: f64,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { user_id: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Frame was not valid JSON
    InvalidJson(String),
    /// Valid JSON, but a required field was missing or had the wrong shape
    Malformed(String),
    Encode(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidJson(msg) => write!(f, "invalid JSON: {}", msg),
            ProtocolError::Malformed(msg) => write!(f, "malformed message: {}", msg),
            ProtocolError::Encode(msg) => write!(f, "failed to encode message: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => ProtocolError::Malformed(err.to_string()),
            _ => ProtocolError::InvalidJson(err.to_string()),
        }
    }
}

pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Great-circle distance in meters between two samples (haversine formula).
pub fn haversine_distance(a: &PositionSample, b: &PositionSample) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h just past 1 near antipodes
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Propagated uncertainty of a distance derived from two samples, in meters.
///
/// The two accuracy radii are independent, so they combine in quadrature.
pub fn combined_accuracy(a: &PositionSample, b: &PositionSample) -> f64 {
    (a.accuracy.powi(2) + b.accuracy.powi(2)).sqrt()
}

// Get current timestamp in milliseconds
pub fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}
