//! Geofence classification
//!
//! Decides whether a network entity belongs to the region of interest. Two tests exist:
//! identifier whitelists (airports, position prefixes) and a point-in-polygon test against the
//! region boundary for aircraft that are neither departing nor arriving locally.

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::Coord;

use crate::region::Region;
use crate::vatsim::{VatsimAtis, VatsimController, VatsimPilot};

/// Suffix of an area control center position callsign
const CENTER_SUFFIX: &str = "CTR";

/// Check if a (latitude, longitude) point lies inside the region boundary.
///
/// Points exactly on an edge or vertex count as inside, so an aircraft tracking along the
/// boundary does not flap in and out of the online set between polls.
pub fn point_in_region(region: &Region, latitude: f64, longitude: f64) -> bool {
    if !latitude.is_finite() || !longitude.is_finite() {
        return false;
    }

    let coord = Coord {
        x: longitude,
        y: latitude,
    };
    matches!(
        region.boundary().coordinate_position(&coord),
        CoordPos::Inside | CoordPos::OnBoundary
    )
}

/// Pilots belong if their flight plan departs or arrives at a region airport, otherwise if
/// their current position is inside the boundary.
pub fn pilot_in_region(region: &Region, pilot: &VatsimPilot) -> bool {
    if let Some(plan) = &pilot.flight_plan
        && (region.has_airport(&plan.departure) || region.has_airport(&plan.arrival))
    {
        return true;
    }
    point_in_region(region, pilot.latitude, pilot.longitude)
}

/// Controllers belong if the callsign prefix is a region position, the callsign is not an
/// excluded sentinel, and the connection is not an observer.
pub fn controller_in_region(region: &Region, controller: &VatsimController) -> bool {
    let Some(prefix) = controller.callsign.get(..3) else {
        return false;
    };

    region.has_controller_prefix(prefix)
        && !region.is_excluded_callsign(&controller.callsign)
        && controller.facility != 0
}

/// Neighboring center facility id for `<FACILITY>_..._CTR` callsigns
pub fn neighbor_center<'a>(region: &Region, callsign: &'a str) -> Option<&'a str> {
    let mut parts = callsign.split('_');
    let facility = parts.next()?;
    let suffix = parts.next_back()?;

    (suffix == CENTER_SUFFIX && region.has_neighbor_center(facility)).then_some(facility)
}

/// Airport served by an ATIS station, if it is a region airport
pub fn atis_airport<'a>(region: &Region, atis: &'a VatsimAtis) -> Option<&'a str> {
    let airport = atis.callsign.get(..4)?;
    region.has_airport(airport).then_some(airport)
}

/// Swap a coordinate pair: (longitude, latitude) ⇄ (latitude, longitude).
///
/// GeoJSON positions are (lon, lat); everything else in this crate is (lat, lon).
pub fn reverse_pair(pair: [f64; 2]) -> [f64; 2] {
    [pair[1], pair[0]]
}
