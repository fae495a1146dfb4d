use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rigid2d::{BodyDef, Circle, JointDef, PhysicsWorld, Polygon, RevoluteJointDef, Shape, Vec2};

const DT: f64 = 1.0 / 60.0;
const STEPS: usize = 30;

fn ground(world: &mut PhysicsWorld, half_width: f64) {
    let body = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.5))).unwrap();
    let shape = Shape::Polygon(Polygon::new_box(half_width, 0.5).unwrap());
    world.create_fixture_from_shape(body, shape, 0.0).unwrap();
}

// --- Helper for creating stack benchmarks ---
fn run_circle_stack_bench(world: &mut PhysicsWorld, num_circles: usize) {
    let radius = 0.5;
    let shape = Shape::Circle(Circle::new(radius).unwrap());

    // Stack in columns of ten with a slight gap
    for i in 0..num_circles {
        let column = (i / 10) as f64;
        let row = (i % 10) as f64;
        let position = Vec2::new(column * 2.0 * radius * 1.1, radius + row * radius * 2.1);
        let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
        world.create_fixture_from_shape(body, shape.clone(), 1.0).unwrap();
    }

    for _ in 0..STEPS {
        world.step(black_box(DT), 8, 3);
    }
}

// --- Helper for creating chain benchmarks ---
fn run_revolute_chain_bench(world: &mut PhysicsWorld, num_links: usize) {
    let link_length = 0.5;
    let shape = Shape::Polygon(Polygon::new_box(link_length / 2.0, 0.05).unwrap());

    let anchor_pos = Vec2::new(0.0, 20.0);
    let mut last = world.create_body(&BodyDef::fixed(anchor_pos)).unwrap();

    for i in 0..num_links {
        let position = anchor_pos + Vec2::new(link_length * (i as f64 + 0.5), 0.0);
        let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
        world.create_fixture_from_shape(body, shape.clone(), 1.0).unwrap();

        let pivot = anchor_pos + Vec2::new(link_length * i as f64, 0.0);
        let def = RevoluteJointDef::initialize(world.body(last).unwrap(), world.body(body).unwrap(), pivot);
        world.create_joint(&JointDef::new(last, body, def)).unwrap();
        last = body;
    }

    for _ in 0..STEPS {
        world.step(black_box(DT), 8, 3);
    }
}

// Benchmark for stacks of circles settling on the ground
fn bench_circle_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("circle_stack");

    for num_circles in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_circles), num_circles, |b, &n| {
            b.iter(|| {
                let mut world = PhysicsWorld::new(Vec2::new(0.0, -10.0));
                ground(&mut world, 50.0);
                run_circle_stack_bench(&mut world, black_box(n));
            });
        });
    }
    group.finish();
}

// Benchmark for a chain of links hanging from revolute joints
fn bench_revolute_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("revolute_chain");

    for num_links in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_links), num_links, |b, &n| {
            b.iter(|| {
                let mut world = PhysicsWorld::new(Vec2::new(0.0, -10.0));
                run_revolute_chain_bench(&mut world, black_box(n));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_circle_stack, bench_revolute_chain);
criterion_main!(benches);
