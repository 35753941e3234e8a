//! Extracts vehicle activities from SIRI VM JSON payloads.
//!
//! Activities are found wherever a `VehicleActivity` array appears in the
//! document, at any depth, so the exact delivery envelope does not matter.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::payload::RawPayload;

const ACTIVITY_KEY: &str = "VehicleActivity";
const VEHICLE_ID: &str = "/MonitoredVehicleJourney/FramedVehicleJourneyRef/DatedVehicleJourneyRef";
const LATITUDE: &str = "/MonitoredVehicleJourney/VehicleLocation/Latitude";
const LONGITUDE: &str = "/MonitoredVehicleJourney/VehicleLocation/Longitude";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One vehicle position taken from a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleActivity {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// The full `MonitoredVehicleJourney` record.
    pub raw_journey: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    MissingVehicleId,
    MissingLocation,
}

impl VehicleActivity {
    fn from_node(node: &Value) -> Result<Self, Rejection> {
        let vehicle_id = node
            .pointer(VEHICLE_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(Rejection::MissingVehicleId)?;

        let latitude = node.pointer(LATITUDE).and_then(Value::as_f64);
        let longitude = node.pointer(LONGITUDE).and_then(Value::as_f64);
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Err(Rejection::MissingLocation);
        };

        Ok(Self {
            vehicle_id: vehicle_id.to_string(),
            latitude,
            longitude,
            raw_journey: node["MonitoredVehicleJourney"].clone(),
        })
    }
}

/// Result of extracting one payload.
#[derive(Debug, Default)]
pub struct Extraction {
    pub activities: Vec<VehicleActivity>,
    /// Activity nodes skipped for lacking a vehicle id or a position.
    pub dropped: usize,
}

/// Parses `payload` and returns every usable vehicle activity in document
/// order.
///
/// # Errors
///
/// Returns an error only if the payload is not JSON. A document without any
/// `VehicleActivity` nodes yields an empty [`Extraction`].
pub fn extract_activities(payload: &RawPayload) -> Result<Extraction, ExtractError> {
    let root: Value = serde_json::from_slice(payload.body())?;

    let mut nodes = Vec::new();
    collect_activity_nodes(&root, &mut nodes);

    let mut extraction = Extraction::default();
    for node in nodes {
        match VehicleActivity::from_node(node) {
            Ok(activity) => extraction.activities.push(activity),
            Err(reason) => {
                debug!(?reason, "Dropping vehicle activity");
                extraction.dropped += 1;
            }
        }
    }
    Ok(extraction)
}

/// Depth-first walk collecting the elements of every `VehicleActivity` array.
fn collect_activity_nodes<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == ACTIVITY_KEY {
                    if let Value::Array(items) = child {
                        out.extend(items.iter());
                    }
                }
                collect_activity_nodes(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_activity_nodes(item, out);
            }
        }
        _ => {}
    }
}
