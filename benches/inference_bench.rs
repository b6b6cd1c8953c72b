use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gprops::builder::GraphBuilder;
use gprops::{DataType, GraphProperties, Item, Shape};

// Latency scenarios for static inference.
// Every generated item is valid with the standard rule registry.

/// Straight chain of `n` elementwise nodes over one placeholder.
fn generate_chain(n: usize) -> Item {
    let mut b = GraphBuilder::new("chain");
    b.placeholder("x", DataType::FLOAT, Shape::known(&[32, 64]));
    let mut prev = "x".to_string();
    for i in 0..n {
        let name = format!("n{}", i);
        let op = if i % 3 == 0 { "AddN" } else { "Relu" };
        b.node(&name, op, &[prev.as_str()]);
        prev = name;
    }
    b.fetch(&prev);
    b.finish()
}

/// `depth` nested while loops, each concatenating its value along a
/// different axis, so every level needs a widening pass.
fn generate_nested_loops(depth: usize) -> Item {
    fn level(b: &mut GraphBuilder, frame: String, value: String, axis: i64, remaining: usize) {
        let counter = format!("{}/init", frame);
        b.int_scalar(&counter, 0).control(&value);
        let limit = format!("{}/limit", frame);
        let less = format!("{}/Less", frame);
        let axis_node = format!("{}/axis", frame);
        let concat = format!("{}/concat", frame);
        let add = format!("{}/add", frame);
        let one = format!("{}/one", frame);
        let inner = format!("{}/while", frame);
        b.while_loop(
            &frame,
            &[counter.as_str(), value.as_str()],
            |b, merges| {
                b.int_scalar(&limit, 4).control(&merges[0]);
                b.node(&less, "Less", &[merges[0].as_str(), limit.as_str()]);
                less.clone()
            },
            |b, ids| {
                if remaining > 0 {
                    level(b, inner, ids[1].clone(), (axis + 1) % 3, remaining - 1);
                }
                b.int_scalar(&one, 1).control(&ids[0]);
                b.node(&add, "Add", &[ids[0].as_str(), one.as_str()]);
                b.int_scalar(&axis_node, axis).control(&ids[0]);
                b.node(
                    &concat,
                    "ConcatV2",
                    &[ids[1].as_str(), ids[1].as_str(), axis_node.as_str()],
                );
                vec![add.clone(), concat.clone()]
            },
        );
    }

    let mut b = GraphBuilder::new("nested");
    b.filled("ones", &[1, 1, 1], 1.0);
    level(&mut b, "while".to_string(), "ones".to_string(), 0, depth.saturating_sub(1));
    b.finish()
}

/// `n` queues in sequence, each fed by the previous dequeue.
fn generate_queue_chain(n: usize) -> Item {
    let mut b = GraphBuilder::new("queues");
    b.random_normal("rnd", &[8, 16]);
    let mut prev = "rnd".to_string();
    for i in 0..n {
        let queue = format!("q{}", i);
        let enqueue = format!("q{}/enqueue", i);
        let dequeue = format!("q{}/dequeue", i);
        b.queue(&queue, &[DataType::FLOAT], &[]);
        b.enqueue(&enqueue, &queue, &[prev.as_str()]);
        b.dequeue(&dequeue, &queue, &[DataType::FLOAT]);
        prev = dequeue;
    }
    b.finish()
}

fn infer(item: &Item) {
    let mut props = GraphProperties::new(item);
    props
        .infer_statically()
        .expect("benchmark item must infer");
    black_box(props.passes());
}

// Latency vs chain length.
fn bench_chain_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("static/chain_scaling");

    for n in [10_usize, 100, 1_000, 5_000] {
        let item = generate_chain(n);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}nodes", n)),
            &item,
            |b, item| b.iter(|| infer(black_box(item))),
        );
    }

    group.finish();
}

// Latency vs loop nesting depth.
fn bench_loop_nesting(c: &mut Criterion) {
    let mut group = c.benchmark_group("static/loop_nesting");

    for depth in [1_usize, 2, 4, 8] {
        let item = generate_nested_loops(depth);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("depth{}", depth)),
            &item,
            |b, item| b.iter(|| infer(black_box(item))),
        );
    }

    group.finish();
}

// Latency vs number of chained queues.
fn bench_queue_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("static/queue_chain");

    for n in [1_usize, 10, 100] {
        let item = generate_queue_chain(n);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}queues", n)),
            &item,
            |b, item| b.iter(|| infer(black_box(item))),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_chain_scaling,
    bench_loop_nesting,
    bench_queue_chain,
);
criterion_main!(benches);
