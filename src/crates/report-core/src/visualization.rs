//! Graphviz export for prompt graphs.

use crate::graph::PromptGraph;

/// Render the graph in DOT form, one node per prompt labeled with its
/// section title. Handy for eyeballing a prompt set before a run.
pub fn to_dot(graph: &PromptGraph) -> String {
    let mut out = String::from("digraph prompts {\n    rankdir=TB;\n");
    for id in graph.node_ids() {
        let prompt = graph.prompt(id).expect("node id comes from the graph");
        let label = prompt.section_title.replace('"', "\\\"");
        let shape = if prompt.system { "box" } else { "ellipse" };
        out.push_str(&format!("    n{id} [label=\"{id}. {label}\", shape={shape}];\n"));
    }
    for id in graph.node_ids() {
        for succ in graph.successors(id) {
            out.push_str(&format!("    n{id} -> n{succ};\n"));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_output_contains_nodes_and_edges() {
        let doc = r#"
prompts:
  Intro: { id: 1, text: "intro", system: true }
  Body: { id: 2, text: "body" }
prompt_dag:
  - "1 -> 2"
"#;
        let graph = PromptGraph::from_yaml(doc).unwrap();
        let dot = to_dot(&graph);
        assert!(dot.contains("n1 [label=\"1. Intro\", shape=box]"));
        assert!(dot.contains("n2 [label=\"2. Body\", shape=ellipse]"));
        assert!(dot.contains("n1 -> n2;"));
    }
}
