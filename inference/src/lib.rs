// gprops — Graph property inference
//
// Library root. Static shape/dtype inference over dataflow graphs with
// control-flow frames and shared resources, plus a dynamic path that reads
// properties from one recorded execution.

pub mod builder;
pub mod diag;
pub mod dot;
pub mod dynamic;
pub mod error;
pub mod frame;
pub mod graph_index;
pub mod item;
pub mod lattice;
pub mod propagate;
pub mod properties;
pub mod registry;
pub mod resource;
pub mod rules;
pub mod types;

pub use dynamic::{Cluster, ClusterError, RecordedCluster, StepTrace};
pub use error::{GraphDefect, InferenceError};
pub use item::{Item, Node};
pub use properties::{GraphProperties, InferenceOptions, UnknownOpPolicy};
pub use registry::Registry;
pub use types::{DataType, Dim, Shape, TensorProperties};
