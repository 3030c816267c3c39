//! End-to-end behaviour of the element store through the public API

use geo_element_store::{
    Area, BoundingBox, CLIP_KEY, Coordinate, Element, ElementStore, FixedStyleOracle, GeoStore,
    InMemoryStore, LodRange, MemberIndex, MemberKind, MemberRole, MultipolygonProcessor,
    PersistentStore, PersistentStoreConfig, QuadKey, RelationMember, SIZE_KEY, Style, Tag, Tags,
    Way, clipper, coordinate_to_tile, for_each_tile_intersecting,
};
use std::sync::Arc;
use tempfile::TempDir;

fn coords(points: &[(f64, f64)]) -> Vec<Coordinate> {
    points
        .iter()
        .map(|&(lat, lon)| Coordinate::new(lat, lon))
        .collect()
}

fn clipping(lods: LodRange) -> FixedStyleOracle {
    FixedStyleOracle::new(lods, Style::new().with(CLIP_KEY, "true"))
}

fn search(geo_store: &GeoStore, quadkey: &QuadKey, oracle: &FixedStyleOracle) -> Vec<Element> {
    let mut found = Vec::new();
    geo_store
        .search(quadkey, oracle, &mut |element| found.push(element.clone()))
        .unwrap();
    found
}

fn memory_geo_store() -> (GeoStore, Arc<InMemoryStore>) {
    let memory = Arc::new(InMemoryStore::new());
    let mut geo_store = GeoStore::new();
    geo_store.register_store("memory", memory.clone());
    (geo_store, memory)
}

#[test]
fn test_way_fans_out_over_two_tiles() {
    let (geo_store, memory) = memory_geo_store();
    let lods = LodRange::single(1).unwrap();
    let oracle = clipping(lods);
    let way = Element::from(Way::new(
        1,
        [Tag::new(1, 2)],
        coords(&[(10.0, 10.0), (10.0, -10.0)]),
    ));

    assert!(geo_store.add_in_lod_range("memory", &way, lods, &oracle).unwrap());
    assert_eq!(memory.tile_count(), 2);

    let west = search(&geo_store, &QuadKey::new(1, 0, 0).unwrap(), &oracle);
    let east = search(&geo_store, &QuadKey::new(1, 1, 0).unwrap(), &oracle);
    let (Element::Way(west), Element::Way(east)) = (&west[0], &east[0]) else {
        panic!("expected ways, got {west:?} and {east:?}");
    };

    // Pieces follow the input direction and share the border point
    assert_eq!(west.coordinates, coords(&[(10.0, 0.0), (10.0, -10.0)]));
    assert_eq!(east.coordinates, coords(&[(10.0, 10.0), (10.0, 0.0)]));
    assert_eq!(west.id, 1);
    assert_eq!(east.tags.as_slice(), &[Tag::new(1, 2)]);
}

#[test]
fn test_eastbound_way_pieces_run_west_to_east() {
    let lods = LodRange::single(1).unwrap();
    let way = Element::from(Way::new(
        7,
        Tags::new(),
        coords(&[(10.0, -10.0), (10.0, 10.0)]),
    ));

    let mut pieces = Vec::new();
    for_each_tile_intersecting(&way.bounding_box(), lods.start(), |quadkey, tile_bbox| {
        pieces.push((quadkey, clipper::clip(&way, &quadkey, tile_bbox)));
    });

    assert_eq!(
        pieces,
        vec![
            (
                QuadKey::new(1, 0, 0).unwrap(),
                vec![Element::from(Way::new(7, Tags::new(), coords(&[(10.0, -10.0), (10.0, 0.0)])))],
            ),
            (
                QuadKey::new(1, 1, 0).unwrap(),
                vec![Element::from(Way::new(7, Tags::new(), coords(&[(10.0, 0.0), (10.0, 10.0)])))],
            ),
        ]
    );
}

#[test]
fn test_double_crossing_materializes_as_relation() {
    let (geo_store, _) = memory_geo_store();
    let lods = LodRange::single(1).unwrap();
    let oracle = clipping(lods);
    let way = Element::from(Way::new(
        2,
        Tags::new(),
        coords(&[(10.0, 10.0), (10.0, -10.0), (20.0, -10.0), (20.0, 10.0)]),
    ));
    geo_store.add_in_lod_range("memory", &way, lods, &oracle).unwrap();

    let east = search(&geo_store, &QuadKey::new(1, 1, 0).unwrap(), &oracle);
    assert_eq!(east.len(), 1);
    let Element::Relation(relation) = &east[0] else {
        panic!("expected a relation, got {east:?}");
    };
    assert_eq!(relation.id, 2);
    assert_eq!(relation.elements.len(), 2);
    assert!(relation.elements.iter().all(|e| matches!(e, Element::Way(_))));
}

#[test]
fn test_persistent_round_trip_through_geo_store() {
    let temp = TempDir::new().unwrap();
    let disk = Arc::new(PersistentStore::new(PersistentStoreConfig::new(temp.path())).unwrap());
    let mut geo_store = GeoStore::new();
    geo_store.register_store("disk", disk.clone());

    let quadkey = coordinate_to_tile(&Coordinate::new(51.505, 13.405), 12);
    let oracle = FixedStyleOracle::new(LodRange::single(12).unwrap(), Style::new());
    let area = Element::from(Area::new(
        3,
        [Tag::new(4, 5), Tag::new(6, 7)],
        coords(&[
            (51.501_234_567_890_1, 13.400_000_000_000_2),
            (51.501_234_567_890_1, 13.410_987_654_321),
            (51.511_111_111_111_1, 13.410_987_654_321),
        ]),
    ));
    assert!(geo_store.add_to_tile("disk", &area, &quadkey, &oracle).unwrap());
    geo_store.commit().unwrap();

    let found = search(&geo_store, &quadkey, &oracle);
    assert_eq!(found, vec![area]);
    assert!(geo_store.has_data(&quadkey).unwrap());
    assert_eq!(disk.open_tiles(), 1);
}

#[test]
fn test_persistent_lru_eviction_and_reopen() {
    let temp = TempDir::new().unwrap();
    let disk = PersistentStore::new(
        PersistentStoreConfig::new(temp.path()).with_cache_capacity(3),
    )
    .unwrap();
    let way = Element::from(Way::new(9, Tags::new(), coords(&[(1.0, 1.0), (2.0, 2.0)])));

    let tiles: Vec<QuadKey> = (0..5).map(|x| QuadKey::new(6, x, 7).unwrap()).collect();
    for quadkey in &tiles {
        disk.store(&way, quadkey).unwrap();
    }
    assert_eq!(disk.open_tiles(), 3);
    assert!(!disk.is_open(&tiles[0]));
    assert!(!disk.is_open(&tiles[1]));

    let mut found = Vec::new();
    disk.search(&tiles[0], &mut |element| found.push(element.clone()))
        .unwrap();
    assert_eq!(found, vec![way]);
    assert!(disk.is_open(&tiles[0]));
    assert_eq!(disk.open_tiles(), 3);
}

#[test]
fn test_size_filter_keeps_small_ways_out() {
    let (geo_store, memory) = memory_geo_store();
    let lods = LodRange::new(1, 8).unwrap();
    let oracle = FixedStyleOracle::new(lods, Style::new().with(SIZE_KEY, "50%"));
    // 0.6 degrees wide: under half a tile up to LOD 8
    let way = Element::from(Way::new(
        4,
        Tags::new(),
        coords(&[(45.0, 7.0), (45.3, 7.6)]),
    ));

    assert!(!geo_store.add_in_lod_range("memory", &way, lods, &oracle).unwrap());
    assert_eq!(memory.tile_count(), 0);
}

#[test]
fn test_reclipping_inside_element_is_identity() {
    let quadkey = QuadKey::new(8, 133, 86).unwrap();
    let tile_bbox = quadkey.bounding_box();
    let center = tile_bbox.center().unwrap();
    let way = Element::from(Way::new(
        5,
        Tags::new(),
        vec![
            Coordinate::new(center.latitude - 0.1, center.longitude - 0.1),
            Coordinate::new(center.latitude + 0.1, center.longitude + 0.123_456_789_123),
        ],
    ));

    let once = clipper::clip(&way, &quadkey, &tile_bbox);
    assert_eq!(once, vec![way]);
    assert_eq!(clipper::clip(&once[0], &quadkey, &tile_bbox), once);
}

#[test]
fn test_tile_enumeration_matches_brute_force() {
    let bbox = BoundingBox::new(Coordinate::new(-33.9, 151.1), Coordinate::new(-33.7, 151.3));
    for lod in [3u8, 8, 11] {
        let mut tiles = Vec::new();
        for_each_tile_intersecting(&bbox, lod, |quadkey, tile_bbox| {
            assert_eq!(*tile_bbox, quadkey.bounding_box());
            tiles.push(quadkey);
        });

        let side = 1u32 << lod;
        let expected: Vec<QuadKey> = (0..side)
            .flat_map(|y| (0..side).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                // Restrict the brute force to the southern/eastern quarter for speed
                x >= side / 2 && y >= side / 2
            })
            .map(|(x, y)| QuadKey::new(lod, x, y).unwrap())
            .filter(|quadkey| quadkey.bounding_box().intersects(&bbox))
            .collect();
        assert_eq!(tiles, expected, "lod {lod}");
    }
}

#[test]
fn test_multipolygon_into_clipped_tiles() {
    let mut index = MemberIndex::new();
    index.add_way(Way::new(
        10,
        [Tag::new(7, 7)],
        coords(&[(10.0, -10.0), (10.0, 10.0), (30.0, 10.0), (30.0, -10.0), (10.0, -10.0)]),
    ));
    index.add_way(Way::new(
        11,
        Tags::new(),
        coords(&[(15.0, 2.0), (15.0, 8.0), (25.0, 8.0), (25.0, 2.0), (15.0, 2.0)]),
    ));
    let tags = Tags::from_slice(&[Tag::new(1, 1)]);
    let members = [
        RelationMember::new(10, MemberKind::Way, MemberRole::Outer),
        RelationMember::new(11, MemberKind::Way, MemberRole::Inner),
    ];

    let relation = MultipolygonProcessor::new(100, &tags, &members, &index)
        .process_relation()
        .unwrap();
    assert_eq!(relation.elements.len(), 2);
    let Element::Area(outer) = &relation.elements[0] else {
        panic!("expected an area");
    };
    let Element::Area(inner) = &relation.elements[1] else {
        panic!("expected an area");
    };
    assert_eq!((outer.coordinates.len(), inner.coordinates.len()), (4, 4));
    assert!(outer.signed_area() > 0.0);
    assert!(inner.signed_area() < 0.0);

    // The eastern half keeps the hole, the western half is a plain rectangle
    let (geo_store, _) = memory_geo_store();
    let lods = LodRange::single(1).unwrap();
    let oracle = clipping(lods);
    geo_store
        .add_in_lod_range("memory", &Element::from(relation), lods, &oracle)
        .unwrap();

    let east = search(&geo_store, &QuadKey::new(1, 1, 0).unwrap(), &oracle);
    let Element::Relation(east) = &east[0] else {
        panic!("expected a relation");
    };
    assert_eq!(east.elements.len(), 2);

    let west = search(&geo_store, &QuadKey::new(1, 0, 0).unwrap(), &oracle);
    let Element::Relation(west) = &west[0] else {
        panic!("expected a relation");
    };
    assert_eq!(west.elements.len(), 1);
}

#[test]
fn test_multipolygon_with_gap_yields_nothing() {
    let mut index = MemberIndex::new();
    index.add_way(Way::new(1, Tags::new(), coords(&[(0.0, 0.0), (0.0, 5.0), (5.0, 5.0)])));
    index.add_way(Way::new(2, Tags::new(), coords(&[(5.0, 6.0), (0.0, 0.0)])));
    let tags = Tags::new();
    let members = [
        RelationMember::new(1, MemberKind::Way, MemberRole::Outer),
        RelationMember::new(2, MemberKind::Way, MemberRole::Outer),
    ];
    assert!(
        MultipolygonProcessor::new(1, &tags, &members, &index)
            .process()
            .is_empty()
    );
}
