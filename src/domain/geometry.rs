//! Geometries, envelopes and axis-order normalization.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn swapped(self) -> Self {
        Self {
            x: self.y,
            y: self.x,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "snake_case")]
pub enum Shape {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    /// Exterior ring only.
    Polygon(Vec<Coordinate>),
    MultiPoint(Vec<Coordinate>),
}

impl Shape {
    fn coordinates(&self) -> &[Coordinate] {
        match self {
            Shape::Point(point) => std::slice::from_ref(point),
            Shape::LineString(points) | Shape::Polygon(points) | Shape::MultiPoint(points) => {
                points
            }
        }
    }

    fn map(&self, f: impl Fn(Coordinate) -> Coordinate) -> Shape {
        match self {
            Shape::Point(point) => Shape::Point(f(*point)),
            Shape::LineString(points) => Shape::LineString(points.iter().copied().map(f).collect()),
            Shape::Polygon(points) => Shape::Polygon(points.iter().copied().map(f).collect()),
            Shape::MultiPoint(points) => Shape::MultiPoint(points.iter().copied().map(f).collect()),
        }
    }
}

/// A stored geometry with an optional spatial reference identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<i32>,
    pub shape: Shape,
}

impl Geometry {
    pub fn new(srid: Option<i32>, shape: Shape) -> Self {
        Self { srid, shape }
    }

    pub fn point(srid: i32, x: f64, y: f64) -> Self {
        Self::new(Some(srid), Shape::Point(Coordinate::new(x, y)))
    }

    pub fn is_empty(&self) -> bool {
        self.shape.coordinates().is_empty()
    }

    /// Bounding box of all coordinates; `None` for an empty geometry.
    pub fn envelope(&self) -> Option<Envelope> {
        Envelope::covering(self.shape.coordinates().iter().copied())
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        }
    }

    pub fn covering(points: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Envelope>, c| {
            Some(match acc {
                None => Envelope::new(c.x, c.y, c.x, c.y),
                Some(env) => Envelope {
                    min_x: env.min_x.min(c.x),
                    min_y: env.min_y.min(c.y),
                    max_x: env.max_x.max(c.x),
                    max_y: env.max_y.max(c.y),
                },
            })
        })
    }

    pub fn expand_to_include(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }
}

/// An envelope tagged with the spatial reference it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencedEnvelope {
    pub srid: i32,
    pub envelope: Envelope,
}

impl ReferencedEnvelope {
    pub fn new(srid: i32, envelope: Envelope) -> Self {
        Self { srid, envelope }
    }

    /// Joins two envelopes without mixing spatial references: the same SRID
    /// grows the envelope, otherwise the one with the smaller SRID is kept.
    /// The result does not depend on the order of the joins.
    pub fn expand_to_include(&mut self, other: &ReferencedEnvelope) {
        if other.srid == self.srid {
            self.envelope.expand_to_include(&other.envelope);
        } else if other.srid < self.srid {
            *self = *other;
        }
    }
}

/// Swaps coordinate axes for spatial references whose storage order
/// differs from the advertised (northing-first) order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AxisNormalizer {
    northing_first: BTreeSet<i32>,
    default_srid: i32,
}

impl AxisNormalizer {
    pub fn new(default_srid: i32, northing_first: impl IntoIterator<Item = i32>) -> Self {
        Self {
            northing_first: northing_first.into_iter().collect(),
            default_srid,
        }
    }

    pub fn default_srid(&self) -> i32 {
        self.default_srid
    }

    pub fn srid_of(&self, geometry: &Geometry) -> i32 {
        geometry.srid.unwrap_or(self.default_srid)
    }

    pub fn normalize(&self, geometry: &Geometry) -> Geometry {
        let srid = self.srid_of(geometry);
        let shape = if self.northing_first.contains(&srid) {
            geometry.shape.map(Coordinate::swapped)
        } else {
            geometry.shape.clone()
        };
        Geometry::new(Some(srid), shape)
    }

    /// Unions normalized geometries into one envelope tagged with the SRID
    /// of the first non-empty geometry.
    pub fn union_envelope<'a>(
        &self,
        geometries: impl IntoIterator<Item = &'a Geometry>,
    ) -> Option<ReferencedEnvelope> {
        let mut result: Option<ReferencedEnvelope> = None;
        for geometry in geometries {
            let normalized = self.normalize(geometry);
            let Some(envelope) = normalized.envelope() else {
                continue;
            };
            match result.as_mut() {
                Some(current) => current.envelope.expand_to_include(&envelope),
                None => result = Some(ReferencedEnvelope::new(self.srid_of(geometry), envelope)),
            }
        }
        result
    }
}
