//! Clipping of elements to tile boundaries
//!
//! All arithmetic happens on fixed-point integers (see [`utils::COORDINATE_SCALE`]) so that
//! clipping the same geometry at different levels of detail never accumulates floating
//! point drift. Ways are clipped segment by segment with an integer Cohen-Sutherland
//! clipper; areas go through a polygon intersection with the tile rectangle.
//!
//! A single input can produce several pieces. One piece is returned as an element of the
//! same kind; several pieces are wrapped into a [`Relation`] carrying the input's id and
//! tags, so callers must be ready for a way or area to come back as a relation.

use crate::{Area, BoundingBox, Coordinate, Element, QuadKey, Relation, Way, utils};
use geo::{BooleanOps, Contains, LineString, MultiPolygon, Polygon, Rect};

/// Rings whose doubled area (in squared fixed-point units) is below this are dropped
pub const AREA_TOLERANCE: i128 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FixedPoint {
    x: i64,
    y: i64,
}

impl From<&Coordinate> for FixedPoint {
    fn from(coordinate: &Coordinate) -> Self {
        Self {
            x: utils::to_fixed(coordinate.longitude),
            y: utils::to_fixed(coordinate.latitude),
        }
    }
}

impl From<FixedPoint> for Coordinate {
    fn from(point: FixedPoint) -> Self {
        Coordinate::new(utils::from_fixed(point.y), utils::from_fixed(point.x))
    }
}

#[derive(Clone, Copy, Debug)]
struct FixedRect {
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
}

impl FixedRect {
    fn from_bbox(bbox: &BoundingBox) -> Option<Self> {
        let (min, max) = (bbox.min()?, bbox.max()?);
        Some(Self {
            min_x: utils::to_fixed(min.longitude),
            min_y: utils::to_fixed(min.latitude),
            max_x: utils::to_fixed(max.longitude),
            max_y: utils::to_fixed(max.latitude),
        })
    }

    #[inline]
    fn contains(&self, point: FixedPoint) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    fn to_polygon(self) -> Polygon<f64> {
        Rect::new(
            geo::Coord {
                x: self.min_x as f64,
                y: self.min_y as f64,
            },
            geo::Coord {
                x: self.max_x as f64,
                y: self.max_y as f64,
            },
        )
        .to_polygon()
    }
}

/// Where the vertices of a geometry lie relative to a tile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PointLocation {
    AllInside,
    AllOutside,
    Mixed,
}

/// Empty geometry counts as being outside
fn classify(coordinates: &[Coordinate], rect: &FixedRect) -> PointLocation {
    let mut inside = 0usize;
    for coordinate in coordinates {
        if rect.contains(FixedPoint::from(coordinate)) {
            inside += 1;
        }
    }
    match inside {
        0 => PointLocation::AllOutside,
        n if n == coordinates.len() => PointLocation::AllInside,
        _ => PointLocation::Mixed,
    }
}

/// Clip an element to a tile
///
/// Returns zero, one or several elements:
/// - nodes are returned unchanged;
/// - ways/areas fully inside are returned unchanged;
/// - ways fully outside produce nothing, areas without any overlap produce an empty
///   placeholder with the same id and tags;
/// - otherwise the truncated geometry, wrapped in a relation when it splits into pieces.
pub fn clip(element: &Element, quadkey: &QuadKey, tile_bbox: &BoundingBox) -> Vec<Element> {
    let Some(rect) = FixedRect::from_bbox(tile_bbox) else {
        return Vec::new();
    };

    let clipped = match element {
        Element::Node(_) => vec![element.clone()],
        Element::Way(way) => clip_way(way, &rect),
        Element::Area(area) => clip_area(area, &rect),
        Element::Relation(relation) => clip_relation(relation, &rect)
            .map(|relation| vec![Element::Relation(relation)])
            .unwrap_or_default(),
    };

    tracing::trace!(
        "Clipped element {} to tile {}: {} piece(s)",
        element.id(),
        quadkey,
        clipped.len()
    );
    clipped
}

fn clip_way(way: &Way, rect: &FixedRect) -> Vec<Element> {
    match classify(&way.coordinates, rect) {
        PointLocation::AllInside => return vec![Element::Way(way.clone())],
        PointLocation::AllOutside if !bbox_overlaps(&way.coordinates, rect) => return Vec::new(),
        _ => {}
    }

    let mut pieces = clip_path(&way.coordinates, rect)
        .into_iter()
        .map(|coordinates| Way {
            id: way.id,
            tags: way.tags.clone(),
            coordinates,
        })
        .map(Element::Way)
        .collect::<Vec<_>>();

    match pieces.len() {
        0 | 1 => pieces,
        _ => vec![Element::Relation(Relation {
            id: way.id,
            tags: way.tags.clone(),
            elements: std::mem::take(&mut pieces),
        })],
    }
}

fn clip_area(area: &Area, rect: &FixedRect) -> Vec<Element> {
    let placeholder = || {
        vec![Element::Area(Area {
            id: area.id,
            tags: area.tags.clone(),
            coordinates: Vec::new(),
        })]
    };

    match classify(&area.coordinates, rect) {
        PointLocation::AllInside => return vec![Element::Area(area.clone())],
        // The polygon can still cover the tile even when none of its vertices is inside
        PointLocation::AllOutside if !bbox_overlaps(&area.coordinates, rect) => {
            return placeholder();
        }
        _ => {}
    }

    let counter_clockwise = area.signed_area() >= 0.0;
    let subject = MultiPolygon::new(vec![fixed_polygon(&area.coordinates)]);
    let rings = intersect_rings(&subject, rect, counter_clockwise);

    let mut pieces: Vec<Element> = rings
        .into_iter()
        .map(|ring| {
            Element::Area(Area {
                id: area.id,
                tags: area.tags.clone(),
                coordinates: ring,
            })
        })
        .collect();

    match pieces.len() {
        0 => placeholder(),
        1 => pieces,
        _ => vec![Element::Relation(Relation {
            id: area.id,
            tags: area.tags.clone(),
            elements: std::mem::take(&mut pieces),
        })],
    }
}

/// Clip every child, then rebuild the outer/inner structure of the relation's areas
///
/// A clockwise child area is a hole of the first counter-clockwise area containing it.
/// Each outer is clipped together with its own holes and keeps its own id and tags.
/// Clockwise areas outside every outer are clipped as standalone areas.
fn clip_relation(relation: &Relation, rect: &FixedRect) -> Option<Relation> {
    if relation_location(relation, rect) == PointLocation::AllInside {
        return Some(relation.clone());
    }

    let mut elements = Vec::new();
    let mut outers: Vec<(&Area, Polygon<f64>)> = Vec::new();
    let mut clockwise: Vec<(&Area, Polygon<f64>)> = Vec::new();

    for child in &relation.elements {
        match child {
            Element::Node(node) => {
                if rect.contains(FixedPoint::from(&node.coordinate)) {
                    elements.push(Element::Node(node.clone()));
                }
            }
            Element::Way(way) => extend_flat(&mut elements, clip_way(way, rect)),
            Element::Area(area) => {
                if area.coordinates.len() < 3 {
                    continue;
                }
                let polygon = fixed_polygon(&area.coordinates);
                if area.signed_area() >= 0.0 {
                    outers.push((area, polygon));
                } else {
                    clockwise.push((area, polygon));
                }
            }
            Element::Relation(nested) => {
                if let Some(clipped) = clip_relation(nested, rect) {
                    elements.push(Element::Relation(clipped));
                }
            }
        }
    }

    let mut holes: Vec<Vec<Polygon<f64>>> = vec![Vec::new(); outers.len()];
    for (area, polygon) in clockwise {
        match outers.iter().position(|(_, outer)| outer.contains(&polygon)) {
            Some(index) => holes[index].push(polygon),
            None => extend_flat(
                &mut elements,
                clip_area(area, rect)
                    .into_iter()
                    .filter(|piece| !piece.is_empty())
                    .collect(),
            ),
        }
    }

    for ((area, polygon), holes) in outers.into_iter().zip(holes) {
        let outer = MultiPolygon::new(vec![polygon]);
        let shape = if holes.is_empty() {
            outer
        } else {
            outer.difference(&union_all(holes))
        };
        for ring in intersect_rings(&shape, rect, true) {
            elements.push(Element::Area(Area {
                id: area.id,
                tags: area.tags.clone(),
                coordinates: ring,
            }));
        }
    }

    if elements.is_empty() {
        return None;
    }

    Some(Relation {
        id: relation.id,
        tags: relation.tags.clone(),
        elements,
    })
}

/// Append clip output, unwrapping the relation used for split pieces
fn extend_flat(elements: &mut Vec<Element>, pieces: Vec<Element>) {
    for piece in pieces {
        match piece {
            Element::Relation(split) => elements.extend(split.elements),
            other => elements.push(other),
        }
    }
}

fn relation_location(relation: &Relation, rect: &FixedRect) -> PointLocation {
    let mut seen_inside = false;
    let mut seen_outside = false;
    let mut visit = |location: PointLocation| match location {
        PointLocation::AllInside => seen_inside = true,
        PointLocation::AllOutside => seen_outside = true,
        PointLocation::Mixed => {
            seen_inside = true;
            seen_outside = true;
        }
    };

    for child in &relation.elements {
        match child {
            Element::Node(node) => visit(classify(std::slice::from_ref(&node.coordinate), rect)),
            Element::Way(Way { coordinates, .. }) | Element::Area(Area { coordinates, .. }) => {
                visit(classify(coordinates, rect))
            }
            Element::Relation(nested) => visit(relation_location(nested, rect)),
        }
    }

    match (seen_inside, seen_outside) {
        (true, false) => PointLocation::AllInside,
        (true, true) => PointLocation::Mixed,
        _ => PointLocation::AllOutside,
    }
}

fn bbox_overlaps(coordinates: &[Coordinate], rect: &FixedRect) -> bool {
    let bbox = BoundingBox::from_coordinates(coordinates);
    match (bbox.min(), bbox.max()) {
        (Some(min), Some(max)) => {
            let (min, max) = (FixedPoint::from(&min), FixedPoint::from(&max));
            !(max.x < rect.min_x || min.x > rect.max_x || max.y < rect.min_y || min.y > rect.max_y)
        }
        _ => false,
    }
}

// ============================================================================
// Open paths
// ============================================================================

const LEFT: u8 = 1;
const RIGHT: u8 = 2;
const BOTTOM: u8 = 4;
const TOP: u8 = 8;

#[inline]
fn outcode(point: FixedPoint, rect: &FixedRect) -> u8 {
    let mut code = 0u8;
    if point.x < rect.min_x {
        code |= LEFT;
    } else if point.x > rect.max_x {
        code |= RIGHT;
    }
    if point.y < rect.min_y {
        code |= BOTTOM;
    } else if point.y > rect.max_y {
        code |= TOP;
    }
    code
}

/// Integer division rounding half away from zero
#[inline]
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let (n, d) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };
    if n >= 0 {
        (n + d / 2) / d
    } else {
        -((-n + d / 2) / d)
    }
}

/// Point where segment `a -> b` crosses the rectangle edge named by `code`
fn edge_intersection(a: FixedPoint, b: FixedPoint, code: u8, rect: &FixedRect) -> FixedPoint {
    let (ax, ay, bx, by) = (a.x as i128, a.y as i128, b.x as i128, b.y as i128);
    if code & (TOP | BOTTOM) != 0 {
        let y = i128::from(if code & TOP != 0 { rect.max_y } else { rect.min_y });
        let x = ax + div_round((bx - ax) * (y - ay), by - ay);
        FixedPoint {
            x: x as i64,
            y: y as i64,
        }
    } else {
        let x = i128::from(if code & RIGHT != 0 { rect.max_x } else { rect.min_x });
        let y = ay + div_round((by - ay) * (x - ax), bx - ax);
        FixedPoint {
            x: x as i64,
            y: y as i64,
        }
    }
}

/// Cohen-Sutherland on integers; returns the visible part of `a -> b`, keeping its direction
fn clip_segment(
    mut a: FixedPoint,
    mut b: FixedPoint,
    rect: &FixedRect,
) -> Option<(FixedPoint, FixedPoint)> {
    let mut code_a = outcode(a, rect);
    let mut code_b = outcode(b, rect);

    // Each step pins one coordinate to an edge, so a handful of rounds always suffices
    for _ in 0..8 {
        if code_a | code_b == 0 {
            return Some((a, b));
        }
        if code_a & code_b != 0 {
            return None;
        }
        if code_a != 0 {
            a = edge_intersection(a, b, code_a, rect);
            code_a = outcode(a, rect);
        } else {
            b = edge_intersection(a, b, code_b, rect);
            code_b = outcode(b, rect);
        }
    }
    None
}

/// Split a polyline into the runs that lie inside the rectangle
fn clip_path(coordinates: &[Coordinate], rect: &FixedRect) -> Vec<Vec<Coordinate>> {
    let points: Vec<FixedPoint> = coordinates.iter().map(FixedPoint::from).collect();
    let mut pieces: Vec<Vec<FixedPoint>> = Vec::new();
    let mut current: Vec<FixedPoint> = Vec::new();

    let mut finish = |current: &mut Vec<FixedPoint>| {
        if current.len() >= 2 {
            pieces.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for pair in points.windows(2) {
        match clip_segment(pair[0], pair[1], rect) {
            Some((start, end)) => {
                if current.last() != Some(&start) {
                    finish(&mut current);
                    current.push(start);
                }
                if current.last() != Some(&end) {
                    current.push(end);
                }
            }
            None => finish(&mut current),
        }
    }
    finish(&mut current);

    pieces
        .into_iter()
        .map(|piece| piece.into_iter().map(Coordinate::from).collect())
        .collect()
}

// ============================================================================
// Polygons
// ============================================================================

/// Polygon in fixed-point units (stored as integral f64 for the boolean operations)
fn fixed_polygon(coordinates: &[Coordinate]) -> Polygon<f64> {
    let ring: LineString<f64> = coordinates
        .iter()
        .map(|coordinate| {
            let point = FixedPoint::from(coordinate);
            geo::Coord {
                x: point.x as f64,
                y: point.y as f64,
            }
        })
        .collect();
    Polygon::new(ring, Vec::new())
}

fn union_all(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
            acc.union(&polygon)
        })
}

/// Intersect a shape with the tile and return its rings as coordinate lists
///
/// Outer rings get the requested winding, holes the opposite one. Rings collapsing below
/// [`AREA_TOLERANCE`] are dropped.
fn intersect_rings(
    shape: &MultiPolygon<f64>,
    rect: &FixedRect,
    outer_counter_clockwise: bool,
) -> Vec<Vec<Coordinate>> {
    let clipped = shape.intersection(&rect.to_polygon());
    let mut rings = Vec::new();
    for polygon in &clipped {
        if let Some(ring) = normalize_ring(polygon.exterior(), outer_counter_clockwise) {
            rings.push(ring);
        }
        for interior in polygon.interiors() {
            if let Some(ring) = normalize_ring(interior, !outer_counter_clockwise) {
                rings.push(ring);
            }
        }
    }
    rings
}

/// Snap a boolean-op ring back onto the fixed-point grid and fix its winding
fn normalize_ring(ring: &LineString<f64>, counter_clockwise: bool) -> Option<Vec<Coordinate>> {
    let mut points: Vec<FixedPoint> = Vec::with_capacity(ring.0.len());
    for coord in &ring.0 {
        let point = FixedPoint {
            x: coord.x.round() as i64,
            y: coord.y.round() as i64,
        };
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }

    let doubled_area = fixed_signed_area(&points);
    if doubled_area.abs() < AREA_TOLERANCE {
        return None;
    }
    if (doubled_area > 0) != counter_clockwise {
        points.reverse();
    }
    Some(points.into_iter().map(Coordinate::from).collect())
}

fn fixed_signed_area(points: &[FixedPoint]) -> i128 {
    let mut sum: i128 = 0;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        sum += current.x as i128 * next.y as i128 - next.x as i128 * current.y as i128;
    }
    sum
}
