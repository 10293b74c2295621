//! The run engine: one task per graph node, scheduled by dependency.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use report_core::{NodeState, OnlineData, PromptGraph, ResultStore, SectionResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ancestry::{ancestor_history, insert_numeric_context};
use crate::config::{Collaborators, RunConfig, RunOptions};
use crate::molder::{mold, SYSTEM_PROMPT_COMPLETION};
use crate::{OrchestratorError, Result};

/// Metadata about the run an orchestrator last executed (or was
/// restored from), used when persisting.
#[derive(Debug, Clone, Default)]
pub struct RunInfo {
    pub focus: String,
    pub online: bool,
}

/// Owns one run of a prompt set: the graph, the store, and the
/// collaborators the node tasks call out to.
pub struct Orchestrator {
    prompt_set_name: String,
    doc_text: String,
    graph: Arc<PromptGraph>,
    store: ResultStore,
    collaborators: Option<Collaborators>,
    config: RunConfig,
    run_info: Mutex<RunInfo>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("prompt_set_name", &self.prompt_set_name)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build an orchestrator over a prompt-set document. Fails (and
    /// leaks no state) when the document does not form a valid DAG.
    pub fn new(
        prompt_set_name: impl Into<String>,
        doc_text: impl Into<String>,
        collaborators: Collaborators,
        config: RunConfig,
    ) -> Result<Self> {
        let doc_text = doc_text.into();
        let graph = Arc::new(PromptGraph::from_yaml(&doc_text)?);
        Ok(Self {
            prompt_set_name: prompt_set_name.into(),
            doc_text,
            graph,
            store: ResultStore::new(),
            collaborators: Some(collaborators),
            config,
            run_info: Mutex::new(RunInfo::default()),
        })
    }

    /// Rebuild a read-only orchestrator from persisted state. The
    /// store and graph serve subscribers and the assembler; `run` is
    /// refused.
    pub fn restored(
        prompt_set_name: impl Into<String>,
        doc_text: impl Into<String>,
        snapshot: std::collections::BTreeMap<u32, NodeState>,
        run_info: RunInfo,
    ) -> Result<Self> {
        let doc_text = doc_text.into();
        let graph = Arc::new(PromptGraph::from_yaml(&doc_text)?);
        Ok(Self {
            prompt_set_name: prompt_set_name.into(),
            doc_text,
            graph,
            store: ResultStore::from_snapshot(snapshot),
            collaborators: None,
            config: RunConfig::default(),
            run_info: Mutex::new(run_info),
        })
    }

    pub fn prompt_set_name(&self) -> &str {
        &self.prompt_set_name
    }

    /// The verbatim prompt-set document this run was built from.
    pub fn doc_text(&self) -> &str {
        &self.doc_text
    }

    pub fn graph(&self) -> &Arc<PromptGraph> {
        &self.graph
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn is_read_only(&self) -> bool {
        self.collaborators.is_none()
    }

    pub fn run_info(&self) -> RunInfo {
        self.run_info.lock().clone()
    }

    /// Start the run: initialize every node as pending, then spawn one
    /// task per node in topological order. Returns immediately with a
    /// handle; completion is observed via [`RunHandle::wait`] or the
    /// store's subscription stream.
    pub fn run(&self, focus: impl Into<String>, options: RunOptions) -> Result<RunHandle> {
        let collaborators =
            self.collaborators.clone().ok_or(OrchestratorError::ReadOnlyRun)?;
        let focus = focus.into();
        *self.run_info.lock() = RunInfo { focus: focus.clone(), online: options.web_search };

        self.store.init(self.graph.node_ids());

        let context = Arc::new(NodeContext {
            graph: Arc::clone(&self.graph),
            store: self.store.clone(),
            collaborators,
            config: self.config.clone(),
            options,
            focus: focus.clone(),
            numeric_context: tokio::sync::OnceCell::new(),
        });

        // Completion signals: every node flips its watch channel once,
        // terminal; children join on their predecessors' receivers.
        let mut signals: HashMap<u32, (watch::Sender<bool>, watch::Receiver<bool>)> =
            HashMap::new();
        for id in self.graph.node_ids() {
            signals.insert(id, watch::channel(false));
        }

        let mut tasks = Vec::with_capacity(self.graph.len());
        for &id in self.graph.topological_order() {
            let predecessors: Vec<watch::Receiver<bool>> = self
                .graph
                .predecessors(id)
                .iter()
                .map(|p| signals[p].1.clone())
                .collect();
            let done = signals[&id].0.clone();
            let ctx = Arc::clone(&context);
            tasks.push(tokio::spawn(run_node(ctx, id, predecessors, done)));
        }

        tracing::info!(
            prompt_set = %self.prompt_set_name,
            %focus,
            nodes = tasks.len(),
            mock = options.mock,
            web_search = options.web_search,
            "run started"
        );

        Ok(RunHandle { store: self.store.clone(), tasks: Mutex::new(tasks) })
    }
}

/// Handle to a live run.
pub struct RunHandle {
    store: ResultStore,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle").finish_non_exhaustive()
    }
}

impl RunHandle {
    /// The live result store for this run.
    pub fn results(&self) -> ResultStore {
        self.store.clone()
    }

    /// Resolve once every node reached a terminal state. Reports the
    /// failed nodes, if any; sibling failures surface here and nowhere
    /// else.
    pub async fn wait(&self) -> Result<()> {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "node task did not run to completion");
            }
        }

        // Cancelled or aborted tasks may have left nodes non-terminal;
        // close them out so the run invariant holds.
        let mut failed = Vec::new();
        for (id, state) in self.store.snapshot() {
            match state.status {
                report_core::NodeStatus::Failed => failed.push(id),
                report_core::NodeStatus::Complete => {}
                _ => {
                    let _ = self.store.mark_failed(id, "run cancelled");
                    failed.push(id);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::NodesFailed { ids: failed })
        }
    }

    /// Cancel all outstanding node tasks. Tasks past their last
    /// suspension point may still write one final terminal state.
    pub fn cancel(&self) {
        for task in self.tasks.lock().iter() {
            task.abort();
        }
    }
}

struct NodeContext {
    graph: Arc<PromptGraph>,
    store: ResultStore,
    collaborators: Collaborators,
    config: RunConfig,
    options: RunOptions,
    focus: String,
    // Fetched once per run, on first use, and shared by every node.
    numeric_context: tokio::sync::OnceCell<Option<String>>,
}

impl NodeContext {
    async fn numeric_context(&self) -> Option<String> {
        self.numeric_context
            .get_or_init(|| async {
                match self.collaborators.finance.numeric_context(&self.focus).await {
                    Ok(context) if context != crate::finance::INFO_NOT_FOUND => Some(context),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "financial lookup failed, continuing without");
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

async fn run_node(
    ctx: Arc<NodeContext>,
    id: u32,
    predecessors: Vec<watch::Receiver<bool>>,
    done: watch::Sender<bool>,
) {
    for mut signal in predecessors {
        // A closed channel means the predecessor task is gone; its
        // terminal state is already in the store either way.
        let _ = signal.wait_for(|finished| *finished).await;
    }

    match process_node(&ctx, id).await {
        Ok(section) => {
            if let Err(e) = ctx.store.store(id, section) {
                tracing::error!(node = id, error = %e, "storing node result failed");
            }
            tracing::info!(node = id, "node complete");
        }
        Err(e) => {
            tracing::warn!(node = id, error = %e, "node failed");
            if let Err(store_err) = ctx.store.mark_failed(id, e.to_string()) {
                tracing::error!(node = id, error = %store_err, "marking node failed failed");
            }
        }
    }

    let _ = done.send(true);
}

async fn process_node(ctx: &NodeContext, id: u32) -> Result<SectionResult> {
    let prompt = ctx
        .graph
        .prompt(id)
        .cloned()
        .ok_or(OrchestratorError::Store(report_core::StoreError::UnknownNode(id)))?;

    ctx.store.mark_processing(id, format!("Processing '{}'", prompt.section_title))?;

    if prompt.system {
        return Ok(SectionResult {
            llm_text: SYSTEM_PROMPT_COMPLETION.to_string(),
            online_data: OnlineData::default(),
            section_title: prompt.section_title,
        });
    }

    if ctx.options.mock {
        return Ok(SectionResult {
            llm_text: llm::mock::MOCK_COMPLETION.to_string(),
            online_data: OnlineData::default(),
            section_title: prompt.section_title,
        });
    }

    let numeric_context =
        if ctx.options.is_company { ctx.numeric_context().await } else { None };

    let online_data = if ctx.options.web_search {
        ctx.collaborators
            .search
            .fetch(&ctx.collaborators.llm, &prompt.text, &ctx.focus, &ctx.config)
            .await?
    } else {
        OnlineData::default()
    };

    let mut history = ancestor_history(&ctx.graph, &ctx.store, id);
    if let Some(context) = numeric_context.as_deref() {
        insert_numeric_context(&mut history, context);
    }

    let outcome = mold(
        &*ctx.collaborators.llm,
        &ctx.focus,
        &history,
        &online_data,
        ctx.options.web_search,
        ctx.config.use_search_variant,
        ctx.config.max_llm_retries,
    )
    .await?;

    Ok(SectionResult {
        llm_text: outcome.llm_text,
        online_data: outcome.online_data,
        section_title: prompt.section_title,
    })
}
