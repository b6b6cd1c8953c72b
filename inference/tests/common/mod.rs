// Shared helpers for the integration tests.

#![allow(dead_code)]

use gprops::GraphProperties;

/// Output properties of `name`, rendered.
pub fn outputs(props: &GraphProperties<'_>, name: &str) -> Vec<String> {
    props
        .output_properties(name)
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Input properties of `name`, rendered.
pub fn inputs(props: &GraphProperties<'_>, name: &str) -> Vec<String> {
    props
        .input_properties(name)
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// First output of `name`, rendered; panics when the node has none.
pub fn output(props: &GraphProperties<'_>, name: &str) -> String {
    props
        .output_properties(name)
        .first()
        .unwrap_or_else(|| panic!("no output properties for '{}'", name))
        .to_string()
}

use gprops::builder::GraphBuilder;

/// While loop over `(counter, value)` that counts to ten and concatenates
/// `value` with itself along `axis` each iteration. `extra` runs inside the
/// body before the concat and receives the value's Identity node. Returns
/// the Exit names.
pub fn concat_loop<F>(
    b: &mut GraphBuilder,
    frame: &str,
    counter: &str,
    value: &str,
    axis: i64,
    extra: F,
) -> Vec<String>
where
    F: FnOnce(&mut GraphBuilder, &str),
{
    b.while_loop(
        frame,
        &[counter, value],
        |b, merges| {
            let limit = format!("{}/Less/y", frame);
            let less = format!("{}/Less", frame);
            b.int_scalar(&limit, 10).control(&merges[0]);
            b.node(&less, "Less", &[merges[0].as_str(), limit.as_str()]);
            less
        },
        |b, ids| {
            extra(b, &ids[1]);
            let one = format!("{}/add/y", frame);
            let add = format!("{}/add", frame);
            let axis_node = format!("{}/concat/axis", frame);
            let concat = format!("{}/concat", frame);
            b.int_scalar(&one, 1).control(&ids[0]);
            b.node(&add, "Add", &[ids[0].as_str(), one.as_str()]);
            b.int_scalar(&axis_node, axis).control(&ids[0]);
            b.node(
                &concat,
                "ConcatV2",
                &[ids[1].as_str(), ids[1].as_str(), axis_node.as_str()],
            );
            vec![add, concat]
        },
    )
}
