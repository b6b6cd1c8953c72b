// dot.rs — Graphviz DOT output annotated with inferred properties
//
// Renders an item after inference: one box per node labelled with its op and
// output properties, data edges labelled with the properties flowing along
// them, and one cluster per loop frame.
//
// Preconditions: `props` has completed an inference call.
// Postconditions: returns a valid DOT string; node order follows the item.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::graph_index::OpRole;
use crate::item::InputRef;
use crate::properties::GraphProperties;

/// Emit the inferred graph as a Graphviz DOT string.
pub fn emit_dot(props: &GraphProperties<'_>) -> String {
    let item = props.item();
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph gprops {{");
    let _ = writeln!(buf, "    rankdir=TB;");
    let _ = writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10, shape=box];");
    let _ = writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];");

    // Group nodes by frame; BTreeMap keeps cluster order deterministic.
    let mut frames: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut root = Vec::new();
    for (i, node) in item.nodes.iter().enumerate() {
        match props.frame_of(&node.name) {
            Some(frame) => frames.entry(frame).or_default().push(i),
            None => root.push(i),
        }
    }

    let _ = writeln!(buf);
    for &i in &root {
        write_node(&mut buf, props, i, "    ");
    }
    for (frame, nodes) in &frames {
        let _ = writeln!(buf);
        let _ = writeln!(buf, "    subgraph cluster_{} {{", sanitize(frame));
        let _ = writeln!(buf, "        label=\"frame: {}\";", escape(frame));
        let _ = writeln!(buf, "        style=rounded;");
        let _ = writeln!(buf, "        color=gray50;");
        for &i in nodes {
            write_node(&mut buf, props, i, "        ");
        }
        let _ = writeln!(buf, "    }}");
    }

    let _ = writeln!(buf);
    for node in &item.nodes {
        let target = sanitize(&node.name);
        let mut data_index = 0;
        for input in &node.input {
            match input {
                InputRef::Data(t) => {
                    let label = props
                        .input_properties(&node.name)
                        .get(data_index)
                        .map(|p| p.to_string())
                        .unwrap_or_default();
                    data_index += 1;
                    let back_edge = item.node(&t.node).is_some_and(|p| {
                        OpRole::of(&p.op) == OpRole::NextIteration
                            && OpRole::of(&node.op) == OpRole::Merge
                    });
                    let style = if back_edge {
                        ", style=bold, color=blue"
                    } else {
                        ""
                    };
                    let _ = writeln!(
                        buf,
                        "    {} -> {} [label=\"{}\"{}];",
                        sanitize(&t.node),
                        target,
                        escape(&label),
                        style
                    );
                }
                InputRef::Control(name) => {
                    let _ = writeln!(
                        buf,
                        "    {} -> {} [style=dashed, color=gray60];",
                        sanitize(name),
                        target
                    );
                }
            }
        }
    }

    let _ = writeln!(buf, "}}");
    buf
}

fn write_node(buf: &mut String, props: &GraphProperties<'_>, index: usize, indent: &str) {
    let node = &props.item().nodes[index];
    let mut label = format!("{}\\n{}", escape(&node.name), escape(&node.op));
    for (slot, out) in props.output_properties(&node.name).iter().enumerate() {
        let _ = write!(label, "\\n{}: {}", slot, escape(&out.to_string()));
    }
    let fill = match OpRole::of(&node.op) {
        OpRole::Other => "lightblue",
        _ => "lightyellow",
    };
    let _ = writeln!(
        buf,
        "{indent}{} [style=filled, fillcolor={fill}, label=\"{label}\"];",
        sanitize(&node.name)
    );
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    let body: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("n_{body}")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::types::{DataType, Shape};

    #[test]
    fn labels_edges_and_clusters_frames() {
        let mut b = GraphBuilder::new("dot");
        b.placeholder("x", DataType::FLOAT, Shape::known(&[2]));
        b.placeholder("go", DataType::BOOL, Shape::scalar());
        b.while_loop(
            "while",
            &["x"],
            |b, _| {
                b.enter("while/go", "go", "while", true);
                "while/go".to_string()
            },
            |_, ids| ids.to_vec(),
        );
        let item = b.finish();
        let mut props = GraphProperties::new(&item);
        props.infer_statically().unwrap();
        let dot = emit_dot(&props);

        assert!(dot.starts_with("digraph gprops {"));
        assert!(dot.contains("subgraph cluster_n_while {"));
        assert!(dot.contains("label=\"frame: while\";"));
        assert!(dot.contains("n_x -> n_while_Enter [label=\"float: [2]\"];"));
        assert!(dot.contains("n_while_NextIteration -> n_while_Merge [label=\"float: [2]\", style=bold, color=blue];"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize("while/Switch_1"), "n_while_Switch_1");
        assert_eq!(escape("a\"b"), "a\\\"b");
    }
}
