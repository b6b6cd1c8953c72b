// Queue scenarios: properties flowing from enqueues to dequeues, through
// self-feeding queues, batched enqueue/dequeue, and queues combined with
// while loops in both nesting directions.

mod common;

use common::{concat_loop, output, outputs};
use gprops::builder::GraphBuilder;
use gprops::diag::codes;
use gprops::{DataType, GraphProperties, Shape};

// ── Test helpers ────────────────────────────────────────────────────────────

fn shuffle_queue(b: &mut GraphBuilder, name: &str) {
    b.node(name, "RandomShuffleQueueV2", &[])
        .type_list_attr("component_types", &[DataType::FLOAT]);
}

fn queues_item() -> gprops::Item {
    let mut b = GraphBuilder::new("queues");
    b.random_normal("rnd", &[3, 7]);

    b.queue("Queue1", &[DataType::FLOAT], &[]);
    b.enqueue("Enqueue1", "Queue1", &["rnd"]);
    b.dequeue("Dequeue1", "Queue1", &[DataType::FLOAT]);
    b.node("Square1", "Square", &["Dequeue1"]);

    shuffle_queue(&mut b, "Queue2");
    b.enqueue("Enqueue2", "Queue2", &["Square1"]);
    b.dequeue("Dequeue2", "Queue2", &[DataType::FLOAT]);
    b.node("Square2", "Square", &["Dequeue2"]);

    // Queue3 only ever receives its own output merged with Square2.
    b.queue("Queue3", &[DataType::FLOAT], &[]);
    b.dequeue("Dequeue3", "Queue3", &[DataType::FLOAT]);
    b.node("Merge3", "Merge", &["Dequeue3", "Square2"]);
    b.enqueue("Enqueue3", "Queue3", &["Merge3"]);

    // Queue4 sees one known shape and one unknown-rank tensor.
    shuffle_queue(&mut b, "Queue4");
    b.enqueue("Enqueue4", "Queue4", &["Square2"]);
    b.enqueue("Enqueue4_2", "Queue4", &["Dequeue3"]);
    b.dequeue("Dequeue4", "Queue4", &[DataType::FLOAT]);

    b.random_normal("rnd2", &[10])
        .type_attr("dtype", DataType::DOUBLE);
    b.random_normal("rnd3", &[1, 2, 3]);
    let types = [DataType::FLOAT, DataType::DOUBLE, DataType::FLOAT];
    b.queue(
        "Queue5",
        &types,
        &[
            Shape::known(&[3, 7]),
            Shape::known(&[10]),
            Shape::known(&[1, 2, 3]),
        ],
    );
    b.enqueue("Enqueue5", "Queue5", &["rnd", "rnd2", "rnd3"]);
    b.dequeue("Dequeue5", "Queue5", &types);
    b.finish()
}

// ── Plain queues ────────────────────────────────────────────────────────────

#[test]
fn dequeues_report_enqueued_properties() {
    let item = queues_item();
    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();

    assert_eq!(outputs(&props, "Queue1"), ["resource: []"]);
    assert!(outputs(&props, "Enqueue1").is_empty());
    assert_eq!(outputs(&props, "Dequeue1"), ["float: [3,7]"]);
    assert_eq!(outputs(&props, "Dequeue2"), ["float: [3,7]"]);
    assert_eq!(outputs(&props, "Dequeue4"), ["float: [3,7]"]);
    assert_eq!(
        outputs(&props, "Dequeue5"),
        ["float: [3,7]", "double: [10]", "float: [1,2,3]"]
    );
}

#[test]
fn self_feeding_queue_stays_unknown() {
    let item = queues_item();
    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();

    assert_eq!(outputs(&props, "Dequeue3"), ["float: ?"]);
    assert_eq!(output(&props, "Merge3"), "float: ?");
    assert!(props.converged());
}

#[test]
fn dequeue_without_enqueues_uses_declared_shape() {
    let mut b = GraphBuilder::new("declared");
    b.queue("q", &[DataType::INT64], &[Shape::known(&[5])]);
    b.dequeue("d", "q", &[DataType::INT64]);
    b.queue("q_1", &[DataType::INT64], &[]);
    b.dequeue("d_1", "q_1", &[DataType::INT64]);
    let item = b.finish();

    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();
    assert_eq!(outputs(&props, "d"), ["int64: [5]"]);
    assert_eq!(outputs(&props, "d_1"), ["int64: ?"]);
}

#[test]
fn batched_enqueue_and_dequeue() {
    let mut b = GraphBuilder::new("batched");
    b.placeholder("x", DataType::FLOAT, Shape::known(&[8, 3]));
    b.queue("q", &[DataType::FLOAT], &[]);
    b.node("enqueue_many", "QueueEnqueueManyV2", &["q", "x"]);
    b.int_scalar("n", 4);
    b.node("dequeue_many", "QueueDequeueManyV2", &["q", "n"])
        .type_list_attr("component_types", &[DataType::FLOAT]);
    b.node("dequeue_up_to", "QueueDequeueUpToV2", &["q", "n"])
        .type_list_attr("component_types", &[DataType::FLOAT]);
    b.node("size", "QueueSizeV2", &["q"]);
    let item = b.finish();

    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();
    assert_eq!(outputs(&props, "dequeue_many"), ["float: [4,3]"]);
    assert_eq!(outputs(&props, "dequeue_up_to"), ["float: [-1,3]"]);
    assert_eq!(outputs(&props, "size"), ["int32: []"]);
}

#[test]
fn v1_queue_handle_is_string_ref() {
    let mut b = GraphBuilder::new("v1");
    b.node("q", "FIFOQueue", &[])
        .type_list_attr("component_types", &[DataType::FLOAT]);
    b.placeholder("x", DataType::FLOAT, Shape::known(&[2]));
    b.node("enqueue", "QueueEnqueue", &["q", "x"]);
    b.node("dequeue", "QueueDequeue", &["q"])
        .type_list_attr("component_types", &[DataType::FLOAT]);
    let item = b.finish();

    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();
    assert_eq!(outputs(&props, "q"), ["string_ref: [2]"]);
    assert_eq!(outputs(&props, "dequeue"), ["float: [2]"]);
}

#[test]
fn enqueue_contradicting_component_type_fails_at_dequeue() {
    let mut b = GraphBuilder::new("queue_dtypes");
    b.queue("q", &[DataType::FLOAT], &[]);
    b.placeholder("x", DataType::DOUBLE, Shape::known(&[2]));
    b.enqueue("enqueue", "q", &["x"]);
    b.dequeue("dequeue", "q", &[DataType::FLOAT]);
    let item = b.finish();

    let mut props = GraphProperties::new(&item);
    let err = props.infer_statically().unwrap_err();
    assert_eq!(err.code(), codes::E0202);
    assert_eq!(err.node(), Some("dequeue"));
}

// ── Queues and loops ────────────────────────────────────────────────────────

#[test]
fn queue_inside_loop_feeds_inner_loop() {
    let mut b = GraphBuilder::new("loops_and_queues");
    b.queue("queue", &[DataType::FLOAT], &[]);
    b.int_scalar("i0", 0);
    b.filled("ones", &[1, 1, 1], 1.0);
    concat_loop(&mut b, "while", "i0", "ones", 2, |b, x| {
        b.enter("while/queue", "queue", "while", true);
        b.enqueue("while/enqueue", "while/queue", &[x]);
        b.dequeue("while/dequeue", "while/queue", &[DataType::FLOAT]);
        b.int_scalar("while/while/Const", 0).control(x);
        concat_loop(b, "while/while", "while/while/Const", "while/dequeue", 0, |_, _| {});
    });
    let item = b.finish();

    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();

    for name in ["while/Merge_1", "while/NextIteration_1", "while/Exit_1"] {
        assert_eq!(output(&props, name), "float: [1,1,-1]", "{}", name);
    }
    assert_eq!(output(&props, "while/dequeue"), "float: [1,1,-1]");
    for name in [
        "while/while/Merge_1",
        "while/while/NextIteration_1",
        "while/while/Exit_1",
    ] {
        assert_eq!(output(&props, name), "float: [-1,1,-1]", "{}", name);
    }
}

#[test]
fn loop_between_two_queues() {
    let mut b = GraphBuilder::new("queues_and_loops");
    b.queue("Queue", &[DataType::FLOAT], &[]);
    b.random_normal("rnd", &[2, 2]);
    b.enqueue("Enqueue", "Queue", &["rnd"]);
    b.dequeue("Dequeue", "Queue", &[DataType::FLOAT]);
    b.int_scalar("i0", 0);
    let exits = concat_loop(&mut b, "while", "i0", "Dequeue", 0, |_, _| {});

    b.queue("Queue_1", &[DataType::FLOAT], &[]);
    b.enqueue("Enqueue_1", "Queue_1", &[exits[1].as_str()]);
    b.dequeue("Dequeue_1", "Queue_1", &[DataType::FLOAT]);
    b.int_scalar("concat/axis", 1);
    b.node("concat", "ConcatV2", &["Dequeue_1", "Dequeue_1", "concat/axis"]);
    b.fetch("concat");
    let item = b.finish();

    let mut props = GraphProperties::new(&item);
    props.infer_statically().unwrap();

    for name in ["while/Merge_1", "while/NextIteration_1", "while/Exit_1"] {
        assert_eq!(output(&props, name), "float: [-1,2]", "{}", name);
    }
    assert_eq!(output(&props, "Dequeue_1"), "float: [-1,2]");
    assert_eq!(output(&props, "concat"), "float: [-1,4]");
}
