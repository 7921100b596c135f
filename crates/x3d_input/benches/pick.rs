//! Pick engine benchmarks over a grid of cubes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use x3d_core::{Mat4, Ray, Segment, Vec3};
use x3d_input::{
    IntersectMode, MemoryScene, ObjectData, PickEngine, PickGeometry, PickShape, PickSort, RenderScene,
    TriangleMesh, ALL_MASK,
};
use x3d_nodes::{NodeKind, SceneGraph};

/// `side * side` unit cubes on the z = -10 plane, two units apart
fn grid(side: usize) -> MemoryScene {
    let mut graph = SceneGraph::new();
    let mut scene = MemoryScene::new();
    let root = scene.root();
    let offset = side as f32 - 1.0;
    for i in 0..side {
        for j in 0..side {
            let node = graph.create_node(NodeKind::Shape);
            let x = i as f32 * 2.0 - offset;
            let y = j as f32 * 2.0 - offset;
            scene.add_shape(
                root,
                Mat4::translation(x, y, -10.0),
                TriangleMesh::cuboid(Vec3::ONE),
                ObjectData::for_node(node),
            );
        }
    }
    scene
}

fn bench_pointer_pick(c: &mut Criterion) {
    let mut group = c.benchmark_group("pointer_pick");
    for side in [4, 16, 32] {
        let scene = grid(side);
        let mut engine = PickEngine::default();
        let ray = PickShape::Ray(Ray::new(Vec3::new(0.1, 0.2, 0.0), Vec3::FORWARD));
        group.bench_with_input(BenchmarkId::new("closest_geometry", side * side), &scene, |b, scene| {
            b.iter(|| {
                let results =
                    engine.pick_shape(scene, scene.root(), black_box(ray), IntersectMode::Geometry, PickSort::Closest);
                black_box(results.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("nearest_surface", side * side), &scene, |b, scene| {
            b.iter(|| black_box(engine.nearest_surface(scene, scene.root(), black_box(ray)).is_some()))
        });
    }
    group.finish();
}

fn bench_line_sensor(c: &mut Criterion) {
    let scene = grid(16);
    let mut engine = PickEngine::new(64);
    let geometry = PickGeometry::Segments(
        (0..8)
            .map(|i| {
                let y = i as f32 * 2.0 - 7.0;
                Segment::new(Vec3::new(-20.0, y, -10.0), Vec3::new(20.0, y, -10.0))
            })
            .collect(),
    );
    let targets = [scene.root()];
    c.bench_function("line_sensor_all_sorted", |b| {
        b.iter(|| {
            let results = engine.pick(
                &scene,
                &targets,
                black_box(&geometry),
                IntersectMode::Bounds,
                PickSort::AllSorted,
                ALL_MASK,
            );
            black_box(results.len())
        })
    });
}

criterion_group!(benches, bench_pointer_pick, bench_line_sensor);
criterion_main!(benches);
