//! Spherical distance for `$geoNear`

use bson::Bson;

/// Earth radius in meters used for spherical queries
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Great-circle distance in meters between two (longitude, latitude) points
pub fn haversine(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lon1, lat1) = (from.0.to_radians(), from.1.to_radians());
    let (lon2, lat2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}

/// Read a GeoJSON point or a legacy `[lon, lat]` pair
pub fn point(value: &Bson) -> Option<(f64, f64)> {
    let coordinates = match value {
        Bson::Document(doc) => {
            if doc.get_str("type").ok()? != "Point" {
                return None;
            }
            doc.get_array("coordinates").ok()?
        }
        Bson::Array(items) => items,
        _ => return None,
    };
    match coordinates.as_slice() {
        [lon, lat] => Some((super::value::as_f64(lon)?, super::value::as_f64(lat)?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_haversine_known_distance() {
        let new_york = (-74.0060, 40.7128);
        let los_angeles = (-118.2437, 34.0522);
        let km = haversine(new_york, los_angeles) / 1000.0;
        assert!((km - 3940.0).abs() < 20.0, "got {}", km);
        assert_eq!(haversine(new_york, new_york), 0.0);
    }

    #[test]
    fn test_point_forms() {
        let geo = Bson::Document(doc! { "type": "Point", "coordinates": [2.3522, 48.8566] });
        assert_eq!(point(&geo), Some((2.3522, 48.8566)));
        assert_eq!(point(&Bson::Array(vec![1.into(), 2.into()])), Some((1.0, 2.0)));
        assert_eq!(point(&Bson::Document(doc! { "type": "Polygon" })), None);
    }
}
