//! Map elements: nodes, ways, areas and relations
//!
//! Elements form a closed sum type. Consumers match exhaustively on [`Element`] instead
//! of dispatching through a visitor.

use crate::{BoundingBox, Coordinate};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A `(key, value)` pair of string table ids
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tag {
    pub key: u32,
    pub value: u32,
}

impl Tag {
    #[inline]
    pub const fn new(key: u32, value: u32) -> Self {
        Self { key, value }
    }
}

/// Tag set, kept sorted by key
///
/// Most map features carry only a handful of tags, so small sets stay inline.
pub type Tags = SmallVec<[Tag; 4]>;

/// Sort tags by key (then value) so they can be binary searched
pub fn sorted_tags(tags: impl IntoIterator<Item = Tag>) -> Tags {
    let mut tags: Tags = tags.into_iter().collect();
    tags.sort_unstable();
    tags
}

/// A single point feature
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    pub id: u64,
    pub tags: Tags,
    pub coordinate: Coordinate,
}

/// An open polyline
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Way {
    pub id: u64,
    pub tags: Tags,
    pub coordinates: Vec<Coordinate>,
}

/// A closed ring; the first coordinate is not repeated at the end
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Area {
    pub id: u64,
    pub tags: Tags,
    pub coordinates: Vec<Coordinate>,
}

/// A heterogeneous collection of owned child elements
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Relation {
    pub id: u64,
    pub tags: Tags,
    pub elements: Vec<Element>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementKind {
    Node,
    Way,
    Area,
    Relation,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Element {
    Node(Node),
    Way(Way),
    Area(Area),
    Relation(Relation),
}

impl Node {
    pub fn new(id: u64, tags: impl IntoIterator<Item = Tag>, coordinate: Coordinate) -> Self {
        Self {
            id,
            tags: sorted_tags(tags),
            coordinate,
        }
    }
}

impl Way {
    pub fn new(id: u64, tags: impl IntoIterator<Item = Tag>, coordinates: Vec<Coordinate>) -> Self {
        Self {
            id,
            tags: sorted_tags(tags),
            coordinates,
        }
    }
}

impl Area {
    pub fn new(id: u64, tags: impl IntoIterator<Item = Tag>, coordinates: Vec<Coordinate>) -> Self {
        Self {
            id,
            tags: sorted_tags(tags),
            coordinates,
        }
    }

    /// Twice the signed area in degree units; positive for counter-clockwise rings
    pub fn signed_area(&self) -> f64 {
        signed_ring_area(&self.coordinates)
    }
}

impl Relation {
    pub fn new(id: u64, tags: impl IntoIterator<Item = Tag>, elements: Vec<Element>) -> Self {
        Self {
            id,
            tags: sorted_tags(tags),
            elements,
        }
    }
}

impl Element {
    #[inline]
    pub fn id(&self) -> u64 {
        match self {
            Element::Node(node) => node.id,
            Element::Way(way) => way.id,
            Element::Area(area) => area.id,
            Element::Relation(relation) => relation.id,
        }
    }

    #[inline]
    pub fn tags(&self) -> &Tags {
        match self {
            Element::Node(node) => &node.tags,
            Element::Way(way) => &way.tags,
            Element::Area(area) => &area.tags,
            Element::Relation(relation) => &relation.tags,
        }
    }

    #[inline]
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Node(_) => ElementKind::Node,
            Element::Way(_) => ElementKind::Way,
            Element::Area(_) => ElementKind::Area,
            Element::Relation(_) => ElementKind::Relation,
        }
    }

    /// Look up a tag value by key id
    pub fn tag_value(&self, key: u32) -> Option<u32> {
        let tags = self.tags();
        tags.binary_search_by_key(&key, |tag| tag.key)
            .ok()
            .map(|index| tags[index].value)
    }

    /// Whether the element has no coordinates at all (clipping placeholders)
    pub fn is_empty(&self) -> bool {
        match self {
            Element::Node(_) => false,
            Element::Way(way) => way.coordinates.is_empty(),
            Element::Area(area) => area.coordinates.is_empty(),
            Element::Relation(relation) => relation.elements.iter().all(Element::is_empty),
        }
    }

    /// Smallest box containing all coordinates, recursively for relations
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        self.expand_bounding_box(&mut bbox);
        bbox
    }

    fn expand_bounding_box(&self, bbox: &mut BoundingBox) {
        match self {
            Element::Node(node) => bbox.expand(node.coordinate),
            Element::Way(Way { coordinates, .. }) | Element::Area(Area { coordinates, .. }) => {
                for coordinate in coordinates {
                    bbox.expand(*coordinate);
                }
            }
            Element::Relation(relation) => {
                for child in &relation.elements {
                    child.expand_bounding_box(bbox);
                }
            }
        }
    }
}

impl From<Node> for Element {
    fn from(node: Node) -> Self {
        Element::Node(node)
    }
}

impl From<Way> for Element {
    fn from(way: Way) -> Self {
        Element::Way(way)
    }
}

impl From<Area> for Element {
    fn from(area: Area) -> Self {
        Element::Area(area)
    }
}

impl From<Relation> for Element {
    fn from(relation: Relation) -> Self {
        Element::Relation(relation)
    }
}

/// Shoelace formula over (longitude, latitude); the ring may or may not repeat its first point
pub(crate) fn signed_ring_area(coordinates: &[Coordinate]) -> f64 {
    if coordinates.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, current) in coordinates.iter().enumerate() {
        let next = &coordinates[(i + 1) % coordinates.len()];
        sum += current.longitude * next.latitude - next.longitude * current.latitude;
    }
    sum
}
