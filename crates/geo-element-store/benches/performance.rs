//! Performance benchmarks for geo-element-store
//!
//! Run with: cargo bench --package geo-element-store

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo_element_store::{
    Area, CLIP_KEY, Coordinate, Element, ElementStore, FixedStyleOracle, GeoStore, InMemoryStore,
    LodRange, PersistentStore, PersistentStoreConfig, QuadKey, Style, Tag, Way, clipper,
    coordinate_to_tile,
};
use std::sync::Arc;

/// A wiggly polyline of `num_points` points around a base coordinate
fn generate_way(id: u64, num_points: usize, base_lat: f64, base_lon: f64) -> Element {
    let coordinates = (0..num_points)
        .map(|i| {
            let t = i as f64 / num_points as f64;
            Coordinate::new(
                base_lat + t * 0.1 + (t * 50.0).sin() * 0.001,
                base_lon + t * 0.1 + (t * 30.0).cos() * 0.001,
            )
        })
        .collect();
    Element::from(Way::new(id, [Tag::new(1, 1)], coordinates))
}

/// A regular polygon of `num_points` vertices, counter-clockwise
fn generate_area(id: u64, num_points: usize, center: Coordinate, radius: f64) -> Element {
    let coordinates = (0..num_points)
        .map(|i| {
            let angle = i as f64 / num_points as f64 * std::f64::consts::TAU;
            Coordinate::new(
                center.latitude + angle.sin() * radius,
                center.longitude + angle.cos() * radius,
            )
        })
        .collect();
    Element::from(Area::new(id, [Tag::new(2, 2)], coordinates))
}

fn generate_elements(count: usize, points: usize) -> Vec<Element> {
    (0..count)
        .map(|i| {
            let lat_offset = (i % 10) as f64 * 0.1;
            let lon_offset = (i / 10) as f64 * 0.1;
            generate_way(i as u64 + 1, points, 51.5 + lat_offset, -0.1 + lon_offset)
        })
        .collect()
}

fn clip_oracle(lods: LodRange) -> FixedStyleOracle {
    FixedStyleOracle::new(lods, Style::new().with(CLIP_KEY, "true"))
}

// ============================================================================
// Clipping
// ============================================================================

fn bench_clipping(c: &mut Criterion) {
    let mut group = c.benchmark_group("clip");

    for lod in [10u8, 14] {
        let way = generate_way(1, 10_000, 51.5, -0.1);
        let quadkey = coordinate_to_tile(&Coordinate::new(51.55, -0.05), lod);
        let tile_bbox = quadkey.bounding_box();
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(BenchmarkId::new("way_10k", lod), &lod, |b, _| {
            b.iter(|| clipper::clip(&way, &quadkey, &tile_bbox));
        });

        let area = generate_area(2, 2_000, Coordinate::new(51.55, -0.05), 0.05);
        group.bench_with_input(BenchmarkId::new("area_2k", lod), &lod, |b, _| {
            b.iter(|| clipper::clip(&area, &quadkey, &tile_bbox));
        });
    }

    group.finish();
}

// ============================================================================
// Store / search
// ============================================================================

fn bench_add_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_all");
    group.sample_size(20);

    let elements = generate_elements(100, 500);
    let lods = LodRange::new(10, 14).unwrap();
    let oracle = clip_oracle(lods);

    group.throughput(Throughput::Elements(elements.len() as u64));
    group.bench_function("memory_100x500", |b| {
        b.iter(|| {
            let mut geo_store = GeoStore::new();
            geo_store.register_store("memory", Arc::new(InMemoryStore::new()));
            geo_store.add_all("memory", &elements, lods, &oracle).unwrap()
        });
    });

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    let elements = generate_elements(100, 500);
    let lods = LodRange::new(12, 12).unwrap();
    let oracle = clip_oracle(lods);

    let temp = tempfile::TempDir::new().unwrap();
    let persistent = Arc::new(
        PersistentStore::new(PersistentStoreConfig::new(temp.path())).unwrap(),
    );
    let mut geo_store = GeoStore::new();
    geo_store.register_store("memory", Arc::new(InMemoryStore::new()));
    geo_store.register_store("disk", persistent.clone());
    geo_store.add_all("memory", &elements, lods, &oracle).unwrap();
    geo_store.add_all("disk", &elements, lods, &oracle).unwrap();
    persistent.commit().unwrap();

    let quadkey: QuadKey = coordinate_to_tile(&Coordinate::new(51.55, -0.05), 12);
    group.bench_function("tile_two_backends", |b| {
        b.iter(|| {
            let mut count = 0usize;
            geo_store
                .search(&quadkey, &oracle, &mut |_| count += 1)
                .unwrap();
            count
        });
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_clipping, bench_add_all, bench_search);

criterion_main!(benches);
