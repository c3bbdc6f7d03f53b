//! Per-viewer privacy projection.
//!
//! Owners see their own entities exactly. Everyone else sees each axis
//! snapped to a fixed 0.01° grid (about 1.1 km of latitude). The grid is in
//! degrees, so the east-west cell width shrinks with latitude.

mod distance;

pub use distance::{haversine_km, DiscoveryArea};

use crate::model::{Coordinates, Entity, ProjectedEntity, UserId};

/// Decimal places kept for non-owner viewers
pub const GRID_DECIMALS: i32 = 2;

/// Round one axis to [`GRID_DECIMALS`] places, half away from zero.
pub fn round_to_grid(value: f64) -> f64 {
    let scale = 10f64.powi(GRID_DECIMALS);
    // f64::round rounds half away from zero
    (value * scale).round() / scale
}

/// Project `entity` for `viewer`.
///
/// Returns `None` when the entity is not sharing a location.
pub fn project(entity: &Entity, viewer: &UserId) -> Option<ProjectedEntity> {
    let location = entity.location?;
    let exact = entity.owner_id == *viewer;

    let location = if exact {
        location
    } else {
        Coordinates::new(
            round_to_grid(location.latitude),
            round_to_grid(location.longitude),
        )
    };

    Some(ProjectedEntity {
        id: entity.id.clone(),
        owner_id: entity.owner_id.clone(),
        location,
        exact,
        updated_at: entity.updated_at,
    })
}
