//! Prompt dependency graph.
//!
//! A [`PromptGraph`] is loaded once per run from a prompt-set document
//! and is immutable afterwards. The document carries a `prompts` map of
//! section title to prompt entry and a `prompt_dag` list of chain
//! literals (`"1 -> 2 -> 3"`) over prompt ids. Loading validates that
//! every edge endpoint exists and that the edge set is acyclic; a graph
//! that fails validation is never handed to the orchestrator.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// One prompt of a prompt set, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: u32,
    pub section_title: String,
    pub text: String,
    pub system: bool,
}

/// Raw prompt entry as it appears in the YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptEntry {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub system: bool,
    /// Overrides the mapping key as the display title when present.
    #[serde(default)]
    pub section_name: Option<String>,
}

/// The deserialized prompt-set document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptSetDoc {
    #[serde(default)]
    pub prompts: BTreeMap<String, PromptEntry>,
    #[serde(default)]
    pub prompt_dag: Vec<String>,
}

/// Node descriptor in the exported dag structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: u32,
    pub label: String,
}

/// Edge descriptor in the exported dag structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagLink {
    pub source: u32,
    pub target: u32,
}

/// Plain nodes-and-links rendering of the graph, sent to subscribers in
/// the `init` frame and written into persisted runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagStructure {
    pub nodes: Vec<DagNode>,
    pub links: Vec<DagLink>,
}

/// Directed acyclic graph of prompts keyed by integer id.
#[derive(Debug, Clone)]
pub struct PromptGraph {
    prompts: BTreeMap<u32, Prompt>,
    preds: BTreeMap<u32, BTreeSet<u32>>,
    succs: BTreeMap<u32, BTreeSet<u32>>,
    topo: Vec<u32>,
}

impl PromptGraph {
    /// Parse a YAML prompt-set document and build the validated graph.
    pub fn from_yaml(doc: &str) -> Result<Self, GraphError> {
        let parsed: PromptSetDoc = serde_yaml::from_str(doc)?;
        Self::from_document(parsed)
    }

    /// Build a validated graph from an already-parsed document.
    pub fn from_document(doc: PromptSetDoc) -> Result<Self, GraphError> {
        let mut prompts: BTreeMap<u32, Prompt> = BTreeMap::new();

        for (section, entry) in doc.prompts {
            // Entries without a prompt body are section placeholders; skip them.
            let Some(text) = entry.text else { continue };

            let id = entry.id.ok_or_else(|| GraphError::InvalidPrompt {
                section: section.clone(),
                reason: "missing id".to_string(),
            })?;
            if id == 0 {
                return Err(GraphError::InvalidPrompt {
                    section,
                    reason: "id must be a positive integer".to_string(),
                });
            }

            let section_title = entry.section_name.unwrap_or_else(|| section.clone());
            let prompt = Prompt { id, section_title, text, system: entry.system };
            if prompts.insert(id, prompt).is_some() {
                return Err(GraphError::InvalidPrompt {
                    section,
                    reason: format!("duplicate id {id}"),
                });
            }
        }

        let mut preds: BTreeMap<u32, BTreeSet<u32>> =
            prompts.keys().map(|&id| (id, BTreeSet::new())).collect();
        let mut succs: BTreeMap<u32, BTreeSet<u32>> =
            prompts.keys().map(|&id| (id, BTreeSet::new())).collect();

        for literal in &doc.prompt_dag {
            let chain = parse_chain(literal)?;
            for &node in &chain {
                if !prompts.contains_key(&node) {
                    return Err(GraphError::DanglingEdge { node });
                }
            }
            for pair in chain.windows(2) {
                let (from, to) = (pair[0], pair[1]);
                if let Some(out) = succs.get_mut(&from) {
                    out.insert(to);
                }
                if let Some(incoming) = preds.get_mut(&to) {
                    incoming.insert(from);
                }
            }
        }

        detect_cycle(&succs)?;
        let topo = kahn_order(&preds, &succs);
        debug_assert_eq!(topo.len(), prompts.len());

        tracing::debug!(
            nodes = prompts.len(),
            edges = succs.values().map(|s| s.len()).sum::<usize>(),
            "prompt graph loaded"
        );

        Ok(Self { prompts, preds, succs, topo })
    }

    /// Look up a prompt by id.
    pub fn prompt(&self, id: u32) -> Option<&Prompt> {
        self.prompts.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.prompts.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.prompts.keys().copied()
    }

    /// Deterministic topological order (ties broken by ascending id).
    pub fn topological_order(&self) -> &[u32] {
        &self.topo
    }

    /// Direct parents of `id`.
    pub fn predecessors(&self, id: u32) -> Vec<u32> {
        self.preds.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Direct children of `id`.
    pub fn successors(&self, id: u32) -> Vec<u32> {
        self.succs.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Transitive predecessors of `id` (not including `id` itself).
    pub fn ancestors(&self, id: u32) -> BTreeSet<u32> {
        let mut seen = BTreeSet::new();
        let mut frontier: VecDeque<u32> = self.predecessors(id).into();
        while let Some(node) = frontier.pop_front() {
            if seen.insert(node) {
                frontier.extend(self.predecessors(node));
            }
        }
        seen
    }

    /// Nodes-and-links export used for the streaming `init` frame.
    pub fn dag_structure(&self) -> DagStructure {
        let nodes = self
            .prompts
            .values()
            .map(|p| DagNode { id: p.id, label: p.section_title.clone() })
            .collect();
        let links = self
            .succs
            .iter()
            .flat_map(|(&source, targets)| {
                targets.iter().map(move |&target| DagLink { source, target })
            })
            .collect();
        DagStructure { nodes, links }
    }
}

/// Expand a chain literal like `"1 -> 2 -> 3"` into a list of ids.
fn parse_chain(literal: &str) -> Result<Vec<u32>, GraphError> {
    literal
        .split("->")
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| GraphError::InvalidChain { literal: literal.to_string() })
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first cycle detection with three-color marking.
fn detect_cycle(succs: &BTreeMap<u32, BTreeSet<u32>>) -> Result<(), GraphError> {
    let mut colors: BTreeMap<u32, Color> = succs.keys().map(|&id| (id, Color::White)).collect();

    // Iterative DFS; a gray node reached again closes a cycle.
    for &root in succs.keys() {
        if colors[&root] != Color::White {
            continue;
        }
        let mut stack: Vec<(u32, bool)> = vec![(root, false)];
        while let Some((node, children_done)) = stack.pop() {
            if children_done {
                colors.insert(node, Color::Black);
                continue;
            }
            if colors[&node] == Color::Black {
                continue;
            }
            colors.insert(node, Color::Gray);
            stack.push((node, true));
            for &next in &succs[&node] {
                match colors[&next] {
                    Color::Gray => return Err(GraphError::CycleDetected { node: next }),
                    Color::White => stack.push((next, false)),
                    Color::Black => {}
                }
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm with a min-heap so equal-depth nodes come out in
/// ascending id order, keeping scheduling reproducible across runs.
fn kahn_order(
    preds: &BTreeMap<u32, BTreeSet<u32>>,
    succs: &BTreeMap<u32, BTreeSet<u32>>,
) -> Vec<u32> {
    let mut in_degree: BTreeMap<u32, usize> =
        preds.iter().map(|(&id, p)| (id, p.len())).collect();
    let mut ready: BinaryHeap<Reverse<u32>> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(preds.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &next in &succs[&node] {
            let deg = in_degree.get_mut(&next).expect("successor tracked in degree map");
            *deg -= 1;
            if *deg == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
prompts:
  Initial:
    id: 1
    text: "You are preparing an analytical report."
    system: true
  Overview:
    id: 2
    text: "Describe the company's business."
  Financials:
    id: 3
    text: "Summarize the company's financial standing."
    section_name: "Financial Standing"
  Conclusion:
    id: 4
    text: "Draw overall conclusions."
prompt_dag:
  - "1 -> 2 -> 4"
  - "1 -> 3 -> 4"
"#;

    #[test]
    fn loads_prompts_and_edges() {
        let graph = PromptGraph::from_yaml(SAMPLE).unwrap();
        assert_eq!(graph.len(), 4);
        assert!(graph.prompt(1).unwrap().system);
        assert_eq!(graph.prompt(3).unwrap().section_title, "Financial Standing");
        assert_eq!(graph.predecessors(4), vec![2, 3]);
        assert_eq!(graph.successors(1), vec![2, 3]);
    }

    #[test]
    fn topological_order_is_deterministic() {
        let graph = PromptGraph::from_yaml(SAMPLE).unwrap();
        assert_eq!(graph.topological_order(), &[1, 2, 3, 4]);
    }

    #[test]
    fn ancestors_are_transitive() {
        let graph = PromptGraph::from_yaml(SAMPLE).unwrap();
        let ancestors = graph.ancestors(4);
        assert_eq!(ancestors.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(graph.ancestors(1).is_empty());
    }

    #[test]
    fn missing_id_is_rejected() {
        let doc = r#"
prompts:
  Broken:
    text: "No id here."
prompt_dag: []
"#;
        let err = PromptGraph::from_yaml(doc).unwrap_err();
        assert!(matches!(err, GraphError::InvalidPrompt { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let doc = r#"
prompts:
  A: { id: 1, text: "a" }
  B: { id: 2, text: "b" }
  C: { id: 3, text: "c" }
prompt_dag:
  - "1 -> 2"
  - "2 -> 3"
  - "3 -> 1"
"#;
        let err = PromptGraph::from_yaml(doc).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let doc = r#"
prompts:
  A: { id: 1, text: "a" }
prompt_dag:
  - "1 -> 9"
"#;
        let err = PromptGraph::from_yaml(doc).unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge { node: 9 }));
    }

    #[test]
    fn malformed_chain_is_rejected() {
        let doc = r#"
prompts:
  A: { id: 1, text: "a" }
prompt_dag:
  - "1 -> two"
"#;
        let err = PromptGraph::from_yaml(doc).unwrap_err();
        assert!(matches!(err, GraphError::InvalidChain { .. }));
    }

    #[test]
    fn dag_structure_lists_nodes_and_links() {
        let graph = PromptGraph::from_yaml(SAMPLE).unwrap();
        let dag = graph.dag_structure();
        assert_eq!(dag.nodes.len(), 4);
        assert_eq!(dag.nodes[0].label, "Initial");
        assert!(dag.links.contains(&DagLink { source: 3, target: 4 }));
        assert_eq!(dag.links.len(), 4);
    }

    #[test]
    fn entries_without_text_are_skipped() {
        let doc = r#"
prompts:
  Placeholder:
    id: 7
  Real:
    id: 1
    text: "body"
prompt_dag: []
"#;
        let graph = PromptGraph::from_yaml(doc).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.prompt(7).is_none());
    }
}
