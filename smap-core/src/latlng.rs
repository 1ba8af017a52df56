use geo::BoundingRect;
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon, Rect,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmapError};

/// Geographic coordinate pair. Serialized as `[lat, lng]`, the order map
/// callers hand positions and centers around in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and with a latitude a map can actually show.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && (-90.0..=90.0).contains(&self.lat)
    }

    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.lng,
            y: self.lat,
        }
    }

    /// Parse a loosely typed `[lat, lng]` value, as handed over by scripting
    /// callers.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let expected = || SmapError::invalid_option_type("center", "an indexed array [lat, lng]");
        let arr = value.as_array().ok_or_else(expected)?;
        if arr.len() < 2 {
            return Err(expected());
        }
        let lat = arr[0].as_f64().ok_or_else(expected)?;
        let lng = arr[1].as_f64().ok_or_else(expected)?;
        Ok(Self::new(lat, lng))
    }
}

impl From<[f64; 2]> for LatLng {
    fn from(v: [f64; 2]) -> Self {
        LatLng::new(v[0], v[1])
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(v: LatLng) -> Self {
        [v.lat, v.lng]
    }
}

impl From<Coord<f64>> for LatLng {
    fn from(c: Coord<f64>) -> Self {
        LatLng::new(c.y, c.x)
    }
}

/// Axis-aligned geographic bounds. An empty value is "invalid" in the
/// engine's sense: it covers nothing and must never be fitted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatLngBounds(Option<Rect<f64>>);

impl LatLngBounds {
    pub const fn empty() -> Self {
        Self(None)
    }

    pub fn from_point(p: LatLng) -> Self {
        Self(Some(Rect::new(p.to_coord(), p.to_coord())))
    }

    pub fn from_corners(south_west: LatLng, north_east: LatLng) -> Self {
        Self(Some(Rect::new(south_west.to_coord(), north_east.to_coord())))
    }

    pub fn from_rect(rect: Option<Rect<f64>>) -> Self {
        Self(rect)
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn rect(&self) -> Option<Rect<f64>> {
        self.0
    }

    pub fn south_west(&self) -> Option<LatLng> {
        self.0.map(|r| r.min().into())
    }

    pub fn north_east(&self) -> Option<LatLng> {
        self.0.map(|r| r.max().into())
    }

    pub fn center(&self) -> Option<LatLng> {
        self.0.map(|r| r.center().into())
    }

    /// Grow to cover `other`. Extending with invalid bounds is a no-op.
    pub fn extend(&mut self, other: &LatLngBounds) {
        self.0 = match (self.0, other.0) {
            (None, rhs) => rhs,
            (lhs, None) => lhs,
            (Some(a), Some(b)) => Some(Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )),
        };
    }

    pub fn extend_point(&mut self, p: LatLng) {
        self.extend(&LatLngBounds::from_point(p));
    }

    pub fn contains(&self, p: LatLng) -> bool {
        match self.0 {
            Some(r) => {
                let c = p.to_coord();
                c.x >= r.min().x && c.x <= r.max().x && c.y >= r.min().y && c.y <= r.max().y
            }
            None => false,
        }
    }
}

impl FromIterator<LatLngBounds> for LatLngBounds {
    fn from_iter<I: IntoIterator<Item = LatLngBounds>>(iter: I) -> Self {
        let mut acc = LatLngBounds::empty();
        for b in iter {
            acc.extend(&b);
        }
        acc
    }
}

/// GeoJSON position, `[lng, lat]` with an optional trailing altitude.
pub type Position = Vec<f64>;

/// GeoJSON geometry object accepted by shape records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShapeGeometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<ShapeGeometry> },
}

fn coord(p: &Position) -> Result<Coord<f64>> {
    match p.as_slice() {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        _ => Err(SmapError::invalid_geometry(format!(
            "position {p:?} is not a finite [lng, lat] pair"
        ))),
    }
}

fn line(points: &[Position]) -> Result<LineString<f64>> {
    if points.is_empty() {
        return Err(SmapError::invalid_geometry("empty coordinate list"));
    }
    points.iter().map(coord).collect::<Result<Vec<_>>>().map(LineString::new)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| SmapError::invalid_geometry("polygon without an exterior ring"))?;
    let interiors = interiors.iter().map(|r| line(r)).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(line(exterior)?, interiors))
}

impl ShapeGeometry {
    /// Convert into a `geo` geometry, validating every position on the way.
    pub fn to_geometry(&self) -> Result<Geometry<f64>> {
        Ok(match self {
            ShapeGeometry::Point { coordinates } => Point::from(coord(coordinates)?).into(),
            ShapeGeometry::MultiPoint { coordinates } => {
                let pts = line(coordinates)?.into_points();
                MultiPoint::new(pts).into()
            }
            ShapeGeometry::LineString { coordinates } => line(coordinates)?.into(),
            ShapeGeometry::MultiLineString { coordinates } => {
                if coordinates.is_empty() {
                    return Err(SmapError::invalid_geometry("empty multi line string"));
                }
                let lines = coordinates.iter().map(|l| line(l)).collect::<Result<Vec<_>>>()?;
                MultiLineString::new(lines).into()
            }
            ShapeGeometry::Polygon { coordinates } => polygon(coordinates)?.into(),
            ShapeGeometry::MultiPolygon { coordinates } => {
                if coordinates.is_empty() {
                    return Err(SmapError::invalid_geometry("empty multi polygon"));
                }
                let polys = coordinates.iter().map(|p| polygon(p)).collect::<Result<Vec<_>>>()?;
                MultiPolygon::new(polys).into()
            }
            ShapeGeometry::GeometryCollection { geometries } => {
                if geometries.is_empty() {
                    return Err(SmapError::invalid_geometry("empty geometry collection"));
                }
                let inner = geometries
                    .iter()
                    .map(ShapeGeometry::to_geometry)
                    .collect::<Result<Vec<_>>>()?;
                Geometry::GeometryCollection(GeometryCollection::new_from(inner))
            }
        })
    }

    pub fn bounds(&self) -> Result<LatLngBounds> {
        let geometry = self.to_geometry()?;
        Ok(LatLngBounds::from_rect(geometry.bounding_rect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn latlng_round_trips_as_lat_lng_array() {
        let p: LatLng = serde_json::from_str("[48.85, 2.35]").unwrap();
        assert_eq!(p, LatLng::new(48.85, 2.35));
        assert_eq!(serde_json::to_string(&p).unwrap(), "[48.85,2.35]");
    }

    #[test]
    fn latlng_from_json_rejects_non_arrays() {
        assert!(LatLng::from_json(&serde_json::json!("48,2")).is_err());
        assert!(LatLng::from_json(&serde_json::json!([48.0])).is_err());
        assert!(LatLng::from_json(&serde_json::json!({"lat": 1, "lng": 2})).is_err());
        assert_eq!(
            LatLng::from_json(&serde_json::json!([48, 2])).unwrap(),
            LatLng::new(48.0, 2.0)
        );
    }

    #[test]
    fn out_of_range_latitude_is_invalid() {
        assert!(LatLng::new(45.0, 200.0).is_valid());
        assert!(!LatLng::new(95.0, 0.0).is_valid());
        assert!(!LatLng::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn extending_with_empty_bounds_keeps_the_original() {
        let mut b = LatLngBounds::from_point(LatLng::new(1.0, 2.0));
        b.extend(&LatLngBounds::empty());
        assert_eq!(b, LatLngBounds::from_point(LatLng::new(1.0, 2.0)));

        let mut e = LatLngBounds::empty();
        e.extend(&LatLngBounds::empty());
        assert!(!e.is_valid());
    }

    #[test]
    fn union_covers_both_operands() {
        let a = LatLngBounds::from_corners(LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0));
        let b = LatLngBounds::from_corners(LatLng::new(-2.0, 3.0), LatLng::new(-1.0, 4.0));
        let u: LatLngBounds = [a, b].into_iter().collect();
        assert_eq!(u.south_west(), Some(LatLng::new(-2.0, 0.0)));
        assert_eq!(u.north_east(), Some(LatLng::new(1.0, 4.0)));
        assert!(u.contains(LatLng::new(0.5, 2.0)));
    }

    #[test]
    fn polygon_bounds_swap_geojson_axis_order() {
        let g: ShapeGeometry = serde_json::from_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[2.0, 48.0], [3.0, 48.0], [3.0, 49.5], [2.0, 48.0]]]
        }))
        .unwrap();
        let b = g.bounds().unwrap();
        assert_eq!(b.south_west(), Some(LatLng::new(48.0, 2.0)));
        assert_eq!(b.north_east(), Some(LatLng::new(49.5, 3.0)));
    }

    #[test]
    fn altitude_is_ignored_and_short_positions_fail() {
        let ok = ShapeGeometry::LineString {
            coordinates: vec![vec![1.0, 2.0, 300.0], vec![2.0, 3.0]],
        };
        assert!(ok.bounds().unwrap().is_valid());

        let bad = ShapeGeometry::Point {
            coordinates: vec![1.0],
        };
        assert!(matches!(bad.bounds(), Err(SmapError::InvalidGeometry(_))));
    }

    #[test]
    fn empty_polygon_is_rejected() {
        let g = ShapeGeometry::Polygon {
            coordinates: vec![],
        };
        assert!(g.to_geometry().is_err());
    }
}
