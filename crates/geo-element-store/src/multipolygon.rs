//! Multipolygon assembly
//!
//! Relation members are loose way fragments tagged `outer`/`inner`. Assembly stitches the
//! fragments into closed rings by matching endpoints, then nests the rings by containment
//! to find which ring is a hole of which polygon.
//!
//! Output convention: outer rings are counter-clockwise, holes clockwise. The closing
//! point is never repeated.

use crate::element::signed_ring_area;
use crate::{Area, Coordinate, Relation, Tags, Way};
use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{LineString, Polygon};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of element a relation member refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemberKind {
    Way,
    Area,
    Relation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemberRole {
    Outer,
    Inner,
    Other,
}

impl MemberRole {
    /// Parse a role string; anything but `outer`/`inner` is [`MemberRole::Other`]
    pub fn parse(role: &str) -> Self {
        match role {
            "outer" => MemberRole::Outer,
            "inner" => MemberRole::Inner,
            _ => MemberRole::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelationMember {
    pub id: u64,
    pub kind: MemberKind,
    pub role: MemberRole,
}

impl RelationMember {
    pub fn new(id: u64, kind: MemberKind, role: MemberRole) -> Self {
        Self { id, kind, role }
    }
}

/// Resolves member ids to already parsed geometry
pub trait MemberLookup {
    fn way(&self, id: u64) -> Option<&Way>;

    fn area(&self, id: u64) -> Option<&Area>;

    /// Assemble a nested relation member; `None` when it cannot be resolved
    fn resolve_relation(&self, _id: u64) -> Option<Vec<Area>> {
        None
    }
}

#[derive(Clone, Copy, Debug)]
enum SpliceEnd {
    Back,
    BackReversed,
    Front,
    FrontReversed,
}

/// Working sequence used while stitching; open until its ends meet
#[derive(Clone, Debug)]
struct CoordinateSequence {
    coordinates: VecDeque<Coordinate>,
    outer: bool,
    /// Tags of the first outer member that contributed to this sequence
    tags: Option<Tags>,
}

impl CoordinateSequence {
    fn open(coordinates: &[Coordinate], outer: bool, tags: &Tags) -> Self {
        Self {
            coordinates: coordinates.iter().copied().collect(),
            outer,
            tags: outer.then(|| tags.clone()),
        }
    }

    /// Ring from area coordinates, closed by repeating the first point
    fn ring(coordinates: &[Coordinate], outer: bool, tags: &Tags) -> Self {
        let mut sequence = Self::open(coordinates, outer, tags);
        if let Some(&first) = sequence.coordinates.front()
            && sequence.coordinates.back() != Some(&first)
        {
            sequence.coordinates.push_back(first);
        }
        sequence
    }

    fn front(&self) -> Option<Coordinate> {
        self.coordinates.front().copied()
    }

    fn back(&self) -> Option<Coordinate> {
        self.coordinates.back().copied()
    }

    fn is_closed(&self) -> bool {
        self.coordinates.len() >= 4 && self.front() == self.back()
    }

    fn reverse(&mut self) {
        self.coordinates.make_contiguous().reverse();
    }

    /// Append `other` after the last point; `other` must start where `self` ends
    fn push_back(&mut self, other: CoordinateSequence) {
        self.coordinates.extend(other.coordinates.into_iter().skip(1));
        self.merge_tags(other.tags);
    }

    /// Prepend `other` before the first point; `other` must end where `self` starts
    fn push_front(&mut self, mut other: CoordinateSequence) {
        other.coordinates.pop_back();
        for coordinate in other.coordinates.into_iter().rev() {
            self.coordinates.push_front(coordinate);
        }
        self.merge_tags(other.tags);
    }

    fn merge_tags(&mut self, tags: Option<Tags>) {
        if self.tags.is_none() {
            self.tags = tags;
        }
    }

    /// Which end `other` can be attached to, if any
    fn splice_end(&self, other: &CoordinateSequence) -> Option<SpliceEnd> {
        let (front, back) = (self.front()?, self.back()?);
        let (other_front, other_back) = (other.front()?, other.back()?);
        if other_front == back {
            Some(SpliceEnd::Back)
        } else if other_back == back {
            Some(SpliceEnd::BackReversed)
        } else if other_back == front {
            Some(SpliceEnd::Front)
        } else if other_front == front {
            Some(SpliceEnd::FrontReversed)
        } else {
            None
        }
    }

    fn splice(&mut self, mut other: CoordinateSequence, end: SpliceEnd) {
        match end {
            SpliceEnd::Back => self.push_back(other),
            SpliceEnd::BackReversed => {
                other.reverse();
                self.push_back(other);
            }
            SpliceEnd::Front => self.push_front(other),
            SpliceEnd::FrontReversed => {
                other.reverse();
                self.push_front(other);
            }
        }
    }

    /// Ring coordinates without the closing point
    fn into_ring(self) -> Vec<Coordinate> {
        let mut coordinates: Vec<Coordinate> = self.coordinates.into();
        if coordinates.len() > 1 && coordinates.first() == coordinates.last() {
            coordinates.pop();
        }
        coordinates
    }
}

/// A closed ring ready for nesting
struct Ring {
    coordinates: Vec<Coordinate>,
    polygon: Polygon<f64>,
    tags: Option<Tags>,
}

impl Ring {
    fn new(sequence: CoordinateSequence) -> Option<Self> {
        let tags = sequence.tags.clone();
        let coordinates = sequence.into_ring();
        if coordinates.len() < 3 {
            return None;
        }
        let exterior: LineString<f64> = coordinates.iter().map(|&c| geo::Coord::from(c)).collect();
        Some(Self {
            polygon: Polygon::new(exterior, Vec::new()),
            coordinates,
            tags,
        })
    }

    /// No vertex of `other` outside this ring and at least one strictly inside
    fn contains(&self, other: &Ring) -> bool {
        let mut inside = false;
        for &coordinate in &other.coordinates {
            match self.polygon.coordinate_position(&geo::Coord::from(coordinate)) {
                CoordPos::Outside => return false,
                CoordPos::Inside => inside = true,
                CoordPos::OnBoundary => {}
            }
        }
        inside
    }

    fn oriented(&self, counter_clockwise: bool) -> Vec<Coordinate> {
        let mut coordinates = self.coordinates.clone();
        if (signed_ring_area(&coordinates) > 0.0) != counter_clockwise {
            coordinates.reverse();
        }
        coordinates
    }
}

/// Builds areas for one multipolygon relation
pub struct MultipolygonProcessor<'a, L: MemberLookup + ?Sized> {
    id: u64,
    tags: &'a Tags,
    members: &'a [RelationMember],
    lookup: &'a L,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a, L: MemberLookup + ?Sized> MultipolygonProcessor<'a, L> {
    pub fn new(id: u64, tags: &'a Tags, members: &'a [RelationMember], lookup: &'a L) -> Self {
        Self {
            id,
            tags,
            members,
            lookup,
        }
    }

    /// Assemble the relation into areas; empty when it cannot be assembled
    pub fn process(&self) -> Vec<Area> {
        #[cfg(feature = "profiling")]
        profiling::scope!("multipolygon::process");

        let sequences = self.collect_sequences();
        if !sequences.iter().any(|sequence| sequence.outer) {
            tracing::debug!("Relation {} has no resolvable outer member", self.id);
            return Vec::new();
        }

        let outer_count = sequences.iter().filter(|sequence| sequence.outer).count();
        if outer_count == 1 && sequences.iter().all(CoordinateSequence::is_closed) {
            return self.simple_case(sequences);
        }

        let Some(rings) = self.stitch(sequences) else {
            tracing::warn!("Relation {} has unclosed rings, dropping it", self.id);
            return Vec::new();
        };
        self.nest(rings)
    }

    /// Assemble and wrap the areas into a relation carrying this relation's id and tags
    pub fn process_relation(&self) -> Option<Relation> {
        let areas = self.process();
        if areas.is_empty() {
            return None;
        }
        Some(Relation {
            id: self.id,
            tags: self.tags.clone(),
            elements: areas.into_iter().map(Into::into).collect(),
        })
    }

    fn collect_sequences(&self) -> Vec<CoordinateSequence> {
        let mut sequences = Vec::new();
        for member in self.members {
            let outer = match member.role {
                MemberRole::Outer => true,
                MemberRole::Inner => false,
                MemberRole::Other => continue,
            };
            match member.kind {
                MemberKind::Way => match self.lookup.way(member.id) {
                    Some(way) if way.coordinates.len() >= 2 => sequences.push(
                        CoordinateSequence::open(&way.coordinates, outer, &way.tags),
                    ),
                    Some(_) => {}
                    None => self.missing(member),
                },
                MemberKind::Area => match self.lookup.area(member.id) {
                    Some(area) if area.coordinates.len() >= 3 => sequences.push(
                        CoordinateSequence::ring(&area.coordinates, outer, &area.tags),
                    ),
                    Some(_) => {}
                    None => self.missing(member),
                },
                MemberKind::Relation => match self.lookup.resolve_relation(member.id) {
                    Some(areas) => {
                        // Nested multipolygons contribute with their own orientation
                        for area in areas {
                            let outer = outer && area.signed_area() > 0.0;
                            sequences.push(CoordinateSequence::ring(
                                &area.coordinates,
                                outer,
                                &area.tags,
                            ));
                        }
                    }
                    None => self.missing(member),
                },
            }
        }
        sequences
    }

    fn missing(&self, member: &RelationMember) {
        tracing::warn!(
            "Relation {} references unresolved {:?} {}",
            self.id,
            member.kind,
            member.id
        );
    }

    /// One closed outer and closed inners map straight to areas
    fn simple_case(&self, sequences: Vec<CoordinateSequence>) -> Vec<Area> {
        let outer_tags = sequences
            .iter()
            .find(|sequence| sequence.outer)
            .and_then(|sequence| sequence.tags.clone());
        let tags = self.area_tags(outer_tags.as_ref());

        // Outer first
        let mut sorted = sequences;
        sorted.sort_by_key(|sequence| !sequence.outer);

        sorted
            .into_iter()
            .filter_map(|sequence| {
                let outer = sequence.outer;
                Ring::new(sequence).map(|ring| self.area(ring.oriented(outer), &tags))
            })
            .collect()
    }

    /// Join open sequences into closed rings; `None` if some ring stays open
    ///
    /// Fragments splice regardless of their member role: nesting decides later which
    /// rings are outers and which are holes.
    fn stitch(&self, sequences: Vec<CoordinateSequence>) -> Option<Vec<Ring>> {
        let (mut closed, mut pending): (Vec<_>, Vec<_>) =
            sequences.into_iter().partition(CoordinateSequence::is_closed);

        while let Some(mut current) = pending.pop() {
            while !current.is_closed() {
                let found = pending
                    .iter()
                    .enumerate()
                    .find_map(|(index, candidate)| {
                        current.splice_end(candidate).map(|end| (index, end))
                    });
                let (index, end) = found?;
                let candidate = pending.swap_remove(index);
                current.splice(candidate, end);
            }
            closed.push(current);
        }

        Some(closed.into_iter().filter_map(Ring::new).collect())
    }

    /// Peel top-level rings off one at a time, each with its direct holes
    fn nest(&self, rings: Vec<Ring>) -> Vec<Area> {
        let count = rings.len();
        let contains: Vec<Vec<bool>> = (0..count)
            .map(|i| {
                (0..count)
                    .map(|j| i != j && rings[i].contains(&rings[j]))
                    .collect()
            })
            .collect();

        let mut remaining: Vec<usize> = (0..count).collect();
        let mut areas = Vec::new();

        while !remaining.is_empty() {
            let outer = remaining
                .iter()
                .copied()
                .find(|&i| !remaining.iter().any(|&j| contains[j][i]))
                .unwrap_or(remaining[0]);

            let inners: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&j| {
                    j != outer
                        && contains[outer][j]
                        && !remaining
                            .iter()
                            .any(|&k| k != outer && k != j && contains[k][j])
                })
                .collect();

            let tags = self.area_tags(rings[outer].tags.as_ref());
            areas.push(self.area(rings[outer].oriented(true), &tags));
            for &inner in &inners {
                areas.push(self.area(rings[inner].oriented(false), &tags));
            }

            remaining.retain(|i| *i != outer && !inners.contains(i));
        }

        areas
    }

    /// Relation tags win unless they are only the type marker
    fn area_tags(&self, member_tags: Option<&Tags>) -> Tags {
        match member_tags {
            Some(tags) if self.tags.len() <= 1 => tags.clone(),
            _ => self.tags.clone(),
        }
    }

    fn area(&self, coordinates: Vec<Coordinate>, tags: &Tags) -> Area {
        Area {
            id: self.id,
            tags: tags.clone(),
            coordinates,
        }
    }
}

/// Parsed members of a relation waiting for assembly
#[derive(Clone, Debug)]
struct PendingRelation {
    tags: Tags,
    members: Vec<RelationMember>,
}

/// In-memory member lookup that also resolves nested relations
#[derive(Debug, Default)]
pub struct MemberIndex {
    ways: HashMap<u64, Way>,
    areas: HashMap<u64, Area>,
    relations: HashMap<u64, PendingRelation>,
    resolving: RefCell<HashSet<u64>>,
}

impl MemberIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_way(&mut self, way: Way) {
        self.ways.insert(way.id, way);
    }

    pub fn add_area(&mut self, area: Area) {
        self.areas.insert(area.id, area);
    }

    pub fn add_relation(&mut self, id: u64, tags: Tags, members: Vec<RelationMember>) {
        self.relations
            .insert(id, PendingRelation { tags, members });
    }

    /// Assemble a registered relation into a relation of areas
    pub fn assemble(&self, id: u64) -> Option<Relation> {
        let areas = self.resolve_relation(id)?;
        if areas.is_empty() {
            return None;
        }
        let tags = self.relations.get(&id)?.tags.clone();
        Some(Relation {
            id,
            tags,
            elements: areas.into_iter().map(Into::into).collect(),
        })
    }
}

impl MemberLookup for MemberIndex {
    fn way(&self, id: u64) -> Option<&Way> {
        self.ways.get(&id)
    }

    fn area(&self, id: u64) -> Option<&Area> {
        self.areas.get(&id)
    }

    fn resolve_relation(&self, id: u64) -> Option<Vec<Area>> {
        let relation = self.relations.get(&id)?;
        if !self.resolving.borrow_mut().insert(id) {
            tracing::warn!("Relation {} is part of a membership cycle", id);
            return None;
        }
        let areas =
            MultipolygonProcessor::new(id, &relation.tags, &relation.members, self).process();
        self.resolving.borrow_mut().remove(&id);
        Some(areas)
    }
}
