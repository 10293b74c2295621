//! Markdown report assembly.
//!
//! A pure function of the store snapshot and the graph: identical
//! inputs produce byte-identical Markdown.

use std::collections::BTreeMap;

use report_core::{NodeState, OnlineResource, PromptGraph};

/// Assemble the final Markdown report.
///
/// Sections appear in topological order for every node with a
/// `complete` result; Markdown headings inside a section body are
/// demoted one level so the section headings stay dominant. A closing
/// `# References` section lists each section's online resources.
pub fn assemble(
    snapshot: &BTreeMap<u32, NodeState>,
    graph: &PromptGraph,
    prompt_set_name: &str,
    focus: &str,
) -> String {
    let mut out = String::from("# Aggregated Report\n\n");
    out.push_str(&format!("**Prompt set:** {prompt_set_name}  \n**Focus:** {focus}\n\n"));

    let completed: Vec<(usize, &report_core::SectionResult)> = graph
        .topological_order()
        .iter()
        .filter_map(|id| snapshot.get(id).and_then(|s| s.result.as_section()))
        .enumerate()
        .map(|(i, section)| (i + 1, section))
        .collect();

    for &(index, section) in &completed {
        out.push_str(&format!("## {index}. {}\n\n", section.section_title));
        out.push_str(&demote_headings(&section.llm_text));
        out.push_str("\n\n");
    }

    out.push_str("# References\n");
    for &(index, section) in &completed {
        if section.online_data.results.is_empty() {
            continue;
        }
        out.push_str(&format!("\n## {index}. {}\n\n", section.section_title));
        for resource in &section.online_data.results {
            out.push_str(&reference_entry(resource));
        }
    }

    out
}

/// Demote every Markdown heading by one `#`, leaving fenced code blocks
/// untouched.
fn demote_headings(text: &str) -> String {
    let mut in_fence = false;
    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                line.to_string()
            } else if !in_fence && line.starts_with('#') {
                format!("#{line}")
            } else {
                line.to_string()
            }
        })
        .collect();
    lines.join("\n")
}

fn reference_entry(resource: &OnlineResource) -> String {
    let title = if resource.title.is_empty() { "Untitled" } else { &resource.title };
    let linked = if resource.url.is_empty() {
        title.to_string()
    } else {
        format!("[{title}]({})", resource.url)
    };

    let excerpt = if !resource.snippet.is_empty() {
        resource.snippet.clone()
    } else {
        resource.scrapped_text.chars().take(150).collect()
    };

    let source =
        if resource.display_url.is_empty() { &resource.url } else { &resource.display_url };

    let mut entry = format!("- {linked}");
    if !excerpt.is_empty() {
        entry.push_str(&format!(" — {excerpt}"));
    }
    entry.push_str(&format!("\n  Source: {source}\n"));
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_core::{OnlineData, ResourceKind, ResultStore, SectionResult};

    fn graph() -> PromptGraph {
        PromptGraph::from_yaml(
            r#"
prompts:
  Intro: { id: 1, text: "intro prompt" }
  Body: { id: 2, text: "body prompt" }
prompt_dag:
  - "1 -> 2"
"#,
        )
        .unwrap()
    }

    fn store_with_sections() -> ResultStore {
        let store = ResultStore::new();
        let graph = graph();
        store.init(graph.node_ids());
        for (id, title, text) in [
            (1, "Intro", "Intro text.\n# Inner heading\nMore."),
            (2, "Body", "Body text."),
        ] {
            store.mark_processing(id, "").unwrap();
            store
                .store(
                    id,
                    SectionResult {
                        llm_text: text.to_string(),
                        online_data: OnlineData {
                            results: if id == 2 {
                                vec![OnlineResource {
                                    url: "https://src.example/a".into(),
                                    display_url: "src.example".into(),
                                    title: "A Source".into(),
                                    snippet: "short excerpt".into(),
                                    scrapped_text: "body".into(),
                                    extension: ResourceKind::Html,
                                }]
                            } else {
                                Vec::new()
                            },
                        },
                        section_title: title.to_string(),
                    },
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn report_orders_sections_and_demotes_headings() {
        let store = store_with_sections();
        let report = assemble(&store.snapshot(), &graph(), "demo-set", "Acme");

        assert!(report.starts_with("# Aggregated Report\n"));
        assert!(report.contains("**Prompt set:** demo-set"));
        assert!(report.contains("**Focus:** Acme"));
        assert!(report.contains("## 1. Intro"));
        assert!(report.contains("## 2. Body"));
        assert!(report.find("## 1. Intro").unwrap() < report.find("## 2. Body").unwrap());
        // The inner heading got demoted below the section heading.
        assert!(report.contains("\n## Inner heading"));
        assert!(!report.contains("\n# Inner heading"));
    }

    #[test]
    fn references_list_links_and_sources() {
        let store = store_with_sections();
        let report = assemble(&store.snapshot(), &graph(), "demo-set", "Acme");

        assert!(report.contains("# References"));
        assert!(report.contains("- [A Source](https://src.example/a) — short excerpt"));
        assert!(report.contains("  Source: src.example"));
    }

    #[test]
    fn failed_nodes_are_omitted() {
        let graph = graph();
        let store = ResultStore::new();
        store.init(graph.node_ids());
        store.mark_processing(1, "").unwrap();
        store
            .store(
                1,
                SectionResult {
                    llm_text: "only section".into(),
                    online_data: OnlineData::default(),
                    section_title: "Intro".into(),
                },
            )
            .unwrap();
        store.mark_processing(2, "").unwrap();
        store.mark_failed(2, "boom").unwrap();

        let report = assemble(&store.snapshot(), &graph, "set", "focus");
        assert!(report.contains("## 1. Intro"));
        assert!(!report.contains("Body"));
    }

    #[test]
    fn identical_snapshots_yield_identical_markdown() {
        let store = store_with_sections();
        let graph = graph();
        let a = assemble(&store.snapshot(), &graph, "set", "focus");
        let b = assemble(&store.snapshot(), &graph, "set", "focus");
        assert_eq!(a, b);
    }

    #[test]
    fn code_fences_are_not_demoted() {
        let text = "Intro\n```\n# not a heading\n```\n# real heading";
        let demoted = demote_headings(text);
        assert!(demoted.contains("\n# not a heading\n"));
        assert!(demoted.ends_with("## real heading"));
    }
}
