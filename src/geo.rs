//! Great-circle distance helpers for the nearby-schools search.

use crate::models::School;

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance between two coordinates in kilometers, by the Haversine formula.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Format a distance for display: meters under 1 km, otherwise one decimal.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as i64)
    } else {
        format!("{:.1} km", km)
    }
}

/// A school paired with its distance from a reference point, when the
/// listing carries coordinates.
#[derive(Debug, Clone)]
pub struct SchoolWithDistance {
    pub school: School,
    pub distance_km: Option<f64>,
}

/// Annotate schools with their distance from (lat, lon) and sort nearest
/// first. Schools without coordinates sort last in their incoming order.
pub fn rank_by_distance(schools: Vec<School>, lat: f64, lon: f64) -> Vec<SchoolWithDistance> {
    let mut ranked: Vec<SchoolWithDistance> = schools
        .into_iter()
        .map(|school| {
            let distance_km = school
                .location
                .map(|loc| haversine_km(lat, lon, loc.latitude, loc.longitude));
            SchoolWithDistance {
                school,
                distance_km,
            }
        })
        .collect();

    ranked.sort_by(|a, b| match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked
}
