use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Inclusive time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl TimeRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> TimeRange {
        TimeRange { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Temporal and exclusion criteria of a filter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub time_range: Option<TimeRange>,
    pub excluded_assets: Vec<Uuid>,
    pub excluded_surveyed_surfaces: Vec<Uuid>,
    /// Design providing the reference elevation of an elevation range filter.
    pub elevation_range_design: Option<Uuid>,
}

impl AttributeFilter {
    pub fn has_time_component(&self) -> bool {
        self.time_range.is_some()
    }

    pub fn has_elevation_range_design(&self) -> bool {
        self.elevation_range_design.is_some()
    }

    pub fn excludes_asset(&self, asset_id: &Uuid) -> bool {
        self.excluded_assets.contains(asset_id)
    }

    pub fn excludes_surveyed_surface(&self, surveyed_surface_id: &Uuid) -> bool {
        self.excluded_surveyed_surfaces.contains(surveyed_surface_id)
    }
}
