//! Turns vehicle activities into index upserts.

use crate::geo::{GeoIndex, Geometry, IndexError, SetOptions};
use crate::parser::VehicleActivity;
use thiserror::Error;

/// Default collection all vehicle positions are written under.
pub const DEFAULT_TRACK_KEY: &str = "tracks";

#[derive(Debug, Error)]
#[error("projection of vehicle '{vehicle_id}' failed: {source}")]
pub struct ProjectionError {
    pub vehicle_id: String,
    #[source]
    pub source: IndexError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectOptions {
    /// Attach the full journey record as geometry properties.
    pub verbose: bool,
    /// Ask the index to expire the entry.
    pub expire: bool,
}

/// Builds the geometry stored for `activity`.
pub fn activity_geometry(activity: &VehicleActivity, verbose: bool) -> Geometry {
    let point = Geometry::point(activity.longitude, activity.latitude);
    if verbose {
        point.with_properties(activity.raw_journey.clone())
    } else {
        point
    }
}

/// Writes activities into one track collection. Each write is a blind
/// overwrite of the vehicle's key.
pub struct Projector<I> {
    index: I,
    track_key: String,
    options: ProjectOptions,
}

impl<I: GeoIndex> Projector<I> {
    pub fn new(index: I, track_key: impl Into<String>, options: ProjectOptions) -> Self {
        Self {
            index,
            track_key: track_key.into(),
            options,
        }
    }

    pub fn track_key(&self) -> &str {
        &self.track_key
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub async fn project(&mut self, activity: &VehicleActivity) -> Result<(), ProjectionError> {
        let geometry = activity_geometry(activity, self.options.verbose);
        let options = SetOptions {
            expire: self.options.expire,
        };

        self.index
            .upsert(&self.track_key, &activity.vehicle_id, &geometry, options)
            .await
            .map_err(|source| ProjectionError {
                vehicle_id: activity.vehicle_id.clone(),
                source,
            })
    }
}
