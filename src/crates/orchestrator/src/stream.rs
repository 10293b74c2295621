//! Client streaming frames.
//!
//! Subscribers first receive one `init` frame with the dag structure,
//! then one `update` frame per store transition. The WebSocket (or any
//! other transport) framing these onto the wire lives outside this
//! crate.

use report_core::{DagStructure, NodeResult, NodeState, NodeStatus};
use serde::{Deserialize, Serialize};

/// One frame of a run's subscription stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// Sent once at attach: the full graph shape.
    Init { dag: DagStructure },

    /// Sent per node transition.
    Update { node_id: u32, status: NodeStatus, result: NodeResult },
}

impl StreamFrame {
    /// Build the update frame for one store transition.
    pub fn update(node_id: u32, state: NodeState) -> Self {
        StreamFrame::Update { node_id, status: state.status, result: state.result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_core::{DagLink, DagNode};

    #[test]
    fn init_frame_wire_shape() {
        let frame = StreamFrame::Init {
            dag: DagStructure {
                nodes: vec![DagNode { id: 1, label: "Intro".into() }],
                links: vec![DagLink { source: 1, target: 2 }],
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "init");
        assert_eq!(json["dag"]["nodes"][0]["label"], "Intro");
        assert_eq!(json["dag"]["links"][0]["source"], 1);
    }

    #[test]
    fn update_frame_wire_shape() {
        let frame = StreamFrame::update(3, NodeState::processing("working"));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "update");
        assert_eq!(json["node_id"], 3);
        assert_eq!(json["status"], "processing");
        assert_eq!(json["result"], "working");
    }
}
