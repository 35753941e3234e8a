//! Write side of the geospatial index.

pub mod tile38;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot reach geospatial index: {0}")]
    Connection(String),
    #[error("index command failed: {0}")]
    Command(String),
    #[error("cannot encode geometry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// GeoJSON geometry stored per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        /// `[longitude, latitude]`, GeoJSON order.
        coordinates: [f64; 2],
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<Value>,
    },
}

impl Geometry {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Geometry::Point {
            coordinates: [longitude, latitude],
            properties: None,
        }
    }

    pub fn with_properties(self, props: Value) -> Self {
        match self {
            Geometry::Point { coordinates, .. } => Geometry::Point {
                coordinates,
                properties: Some(props),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, IndexError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Let the index expire the entry with its configured TTL.
    pub expire: bool,
}

/// Keyed geometry store. `upsert` overwrites whatever is at
/// `collection/key`.
#[async_trait]
pub trait GeoIndex: Send {
    async fn upsert(
        &mut self,
        collection: &str,
        key: &str,
        geometry: &Geometry,
        options: SetOptions,
    ) -> Result<(), IndexError>;
}
