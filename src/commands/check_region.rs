use anyhow::Result;
use artcc_sync::geofence::point_in_region;
use std::path::PathBuf;
use tracing::info;

use super::load_region;

/// Validate the region and optionally classify one point
pub async fn handle_check_region(
    region_file: Option<PathBuf>,
    point: Option<(f64, f64)>,
) -> Result<()> {
    let region = load_region(region_file)?;

    info!(
        "Region {}: {} airports, {} boundary vertices",
        region.name(),
        region.airports().len(),
        region.boundary().exterior().0.len()
    );
    info!("Airports: {}", region.airports().join(" "));

    if let Some((latitude, longitude)) = point {
        let inside = point_in_region(&region, latitude, longitude);
        info!(
            "({}, {}) is {} {}",
            latitude,
            longitude,
            if inside { "inside" } else { "outside" },
            region.name()
        );
    }
    Ok(())
}
