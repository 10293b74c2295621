//! Ancestor chat history assembly.

use report_core::{AncestorMessage, PromptGraph, ResultStore};

/// Build the chat history a node's LLM call receives.
///
/// Walks `ancestors(node) ∪ {node}` in the graph's topological order.
/// System ancestors contribute a system message; other ancestors
/// contribute their prompt as a user message followed, when the
/// ancestor completed, by its LLM reply. A failed ancestor leaves no
/// reply behind. The node's own prompt comes last with no reply.
pub fn ancestor_history(
    graph: &PromptGraph,
    store: &ResultStore,
    node_id: u32,
) -> Vec<AncestorMessage> {
    let mut members = graph.ancestors(node_id);
    members.insert(node_id);

    let mut history = Vec::new();
    for &id in graph.topological_order() {
        if !members.contains(&id) {
            continue;
        }
        let Some(prompt) = graph.prompt(id) else { continue };

        if prompt.system {
            history.push(AncestorMessage::system(prompt.text.clone()));
            continue;
        }

        history.push(AncestorMessage::user(prompt.text.clone()));
        if id == node_id {
            continue;
        }
        if let Some(section) = store.get(id).and_then(|s| s.result.as_section().cloned()) {
            history.push(AncestorMessage::llm(section.llm_text));
        }
    }
    history
}

/// Insert the financial numeric context as a synthetic user message at
/// position 1 of the history.
pub fn insert_numeric_context(history: &mut Vec<AncestorMessage>, context: &str) {
    let position = 1.min(history.len());
    history.insert(position, AncestorMessage::user(context.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_core::{Entity, OnlineData, SectionResult};

    const DIAMOND: &str = r#"
prompts:
  One: { id: 1, text: "prompt one" }
  Two: { id: 2, text: "prompt two" }
  Three: { id: 3, text: "prompt three" }
  Four: { id: 4, text: "prompt four" }
prompt_dag:
  - "1 -> 2 -> 4"
  - "1 -> 3 -> 4"
"#;

    fn completed(store: &ResultStore, id: u32, text: &str) {
        store.mark_processing(id, "").unwrap();
        store
            .store(
                id,
                SectionResult {
                    llm_text: text.to_string(),
                    online_data: OnlineData::default(),
                    section_title: format!("Section {id}"),
                },
            )
            .unwrap();
    }

    #[test]
    fn diamond_history_interleaves_prompts_and_replies() {
        let graph = PromptGraph::from_yaml(DIAMOND).unwrap();
        let store = ResultStore::new();
        store.init(graph.node_ids());
        completed(&store, 1, "reply one");
        completed(&store, 2, "reply two");
        completed(&store, 3, "reply three");

        let history = ancestor_history(&graph, &store, 4);
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "prompt one",
                "reply one",
                "prompt two",
                "reply two",
                "prompt three",
                "reply three",
                "prompt four",
            ]
        );
        assert_eq!(history.last().unwrap().entity, Entity::User);
    }

    #[test]
    fn system_ancestor_has_no_reply() {
        let doc = r#"
prompts:
  Init: { id: 1, text: "system context", system: true }
  Child: { id: 2, text: "child prompt" }
prompt_dag:
  - "1 -> 2"
"#;
        let graph = PromptGraph::from_yaml(doc).unwrap();
        let store = ResultStore::new();
        store.init(graph.node_ids());
        completed(&store, 1, "should never appear");

        let history = ancestor_history(&graph, &store, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entity, Entity::System);
        assert_eq!(history[0].text, "system context");
        assert_eq!(history[1].entity, Entity::User);
        assert_eq!(history[1].text, "child prompt");
    }

    #[test]
    fn failed_ancestor_leaves_no_reply() {
        let graph = PromptGraph::from_yaml(DIAMOND).unwrap();
        let store = ResultStore::new();
        store.init(graph.node_ids());
        completed(&store, 1, "reply one");
        store.mark_processing(2, "").unwrap();
        store.mark_failed(2, "boom").unwrap();
        completed(&store, 3, "reply three");

        let history = ancestor_history(&graph, &store, 4);
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "prompt one",
                "reply one",
                "prompt two",
                "prompt three",
                "reply three",
                "prompt four",
            ]
        );
    }

    #[test]
    fn numeric_context_lands_at_position_one() {
        let mut history = vec![
            AncestorMessage::system("sys"),
            AncestorMessage::user("prompt"),
        ];
        insert_numeric_context(&mut history, "Revenue: 10M");
        assert_eq!(history[1].text, "Revenue: 10M");
        assert_eq!(history[1].entity, Entity::User);
        assert_eq!(history.len(), 3);

        let mut empty = Vec::new();
        insert_numeric_context(&mut empty, "ctx");
        assert_eq!(empty[0].text, "ctx");
    }
}
