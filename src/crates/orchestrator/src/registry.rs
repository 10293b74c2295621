//! Run registry: externally-visible run ids, prompt-set resolution and
//! run persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use report_core::{DagStructure, NodeState, Subscription};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembler;
use crate::config::{Collaborators, RunConfig};
use crate::run::{Orchestrator, RunInfo};
use crate::stream::StreamFrame;
use crate::{OrchestratorError, Result};

/// Filesystem layout for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory of prompt-set documents, one `<name>.yaml` each.
    pub prompts_dir: PathBuf,
    /// Directory persisted runs are saved under, one subdirectory per
    /// run id.
    pub runs_dir: PathBuf,
}

/// Metadata stored with every persisted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub prompt_set: String,
    pub focus: String,
    pub online: bool,
    pub saved_at: String,
}

/// The persisted result document of one run.
#[derive(Serialize, Deserialize)]
struct PersistedRun {
    report: String,
    dag: DagStructure,
    graph: BTreeMap<u32, NodeState>,
    metadata: RunMetadata,
}

const RESULT_FILE: &str = "result.json";
const PROMPT_SET_FILE: &str = "prompt_set.yaml";

/// Maps run ids to live orchestrators and owns save/restore.
pub struct RunRegistry {
    config: RegistryConfig,
    collaborators: Collaborators,
    run_config: RunConfig,
    runs: DashMap<String, Arc<Orchestrator>>,
}

impl RunRegistry {
    pub fn new(
        config: RegistryConfig,
        collaborators: Collaborators,
        run_config: RunConfig,
    ) -> Self {
        Self { config, collaborators, run_config, runs: DashMap::new() }
    }

    /// Create a fresh run over the named prompt set.
    pub fn create(&self, prompt_set_name: &str) -> Result<(String, Arc<Orchestrator>)> {
        let path = self.config.prompts_dir.join(format!("{prompt_set_name}.yaml"));
        let doc_text = std::fs::read_to_string(&path)
            .map_err(|_| OrchestratorError::UnknownPromptSet(prompt_set_name.to_string()))?;

        let orchestrator = Arc::new(Orchestrator::new(
            prompt_set_name,
            doc_text,
            self.collaborators.clone(),
            self.run_config.clone(),
        )?);

        let run_id = Uuid::new_v4().to_string();
        self.runs.insert(run_id.clone(), Arc::clone(&orchestrator));
        tracing::info!(%run_id, prompt_set = prompt_set_name, "run registered");
        Ok((run_id, orchestrator))
    }

    /// Look up a live (or restored) run.
    pub fn get(&self, run_id: &str) -> Option<Arc<Orchestrator>> {
        self.runs.get(run_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Attach to a run's stream: the `init` frame plus a subscription
    /// producing `update` frames.
    pub fn attach(&self, run_id: &str) -> Result<(StreamFrame, Subscription)> {
        let orchestrator =
            self.get(run_id).ok_or_else(|| OrchestratorError::UnknownRun(run_id.to_string()))?;
        let init = StreamFrame::Init { dag: orchestrator.graph().dag_structure() };
        Ok((init, orchestrator.store().subscribe()))
    }

    /// Persist a run: the assembled report, dag, node states and
    /// metadata, plus a verbatim copy of the prompt-set document.
    pub fn save(&self, run_id: &str) -> Result<PathBuf> {
        let orchestrator =
            self.get(run_id).ok_or_else(|| OrchestratorError::UnknownRun(run_id.to_string()))?;
        let info = orchestrator.run_info();
        let snapshot = orchestrator.store().snapshot();

        let report = assembler::assemble(
            &snapshot,
            orchestrator.graph(),
            orchestrator.prompt_set_name(),
            &info.focus,
        );
        let persisted = PersistedRun {
            report,
            dag: orchestrator.graph().dag_structure(),
            graph: snapshot,
            metadata: RunMetadata {
                prompt_set: orchestrator.prompt_set_name().to_string(),
                focus: info.focus,
                online: info.online,
                saved_at: chrono::Utc::now().to_rfc3339(),
            },
        };

        let dir = self.config.runs_dir.join(run_id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(RESULT_FILE), serde_json::to_vec_pretty(&persisted)?)?;
        std::fs::write(dir.join(PROMPT_SET_FILE), orchestrator.doc_text())?;
        tracing::info!(%run_id, path = %dir.display(), "run saved");
        Ok(dir)
    }

    /// Restore a persisted run as a read-only orchestrator, usable by
    /// the assembler and subscribers but not for re-execution.
    pub fn load(&self, run_id: &str) -> Result<Arc<Orchestrator>> {
        let dir = self.config.runs_dir.join(run_id);
        let persisted = read_persisted(&dir.join(RESULT_FILE))?;
        let doc_text = std::fs::read_to_string(dir.join(PROMPT_SET_FILE))
            .map_err(|e| OrchestratorError::InvalidPersistedRun(e.to_string()))?;

        let orchestrator = Arc::new(Orchestrator::restored(
            persisted.metadata.prompt_set.clone(),
            doc_text,
            persisted.graph,
            RunInfo { focus: persisted.metadata.focus.clone(), online: persisted.metadata.online },
        )?);

        self.runs.insert(run_id.to_string(), Arc::clone(&orchestrator));
        tracing::info!(%run_id, "run restored read-only");
        Ok(orchestrator)
    }
}

fn read_persisted(path: &Path) -> Result<PersistedRun> {
    let bytes = std::fs::read(path)
        .map_err(|e| OrchestratorError::InvalidPersistedRun(e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OrchestratorError::InvalidPersistedRun(e.to_string()))
}
