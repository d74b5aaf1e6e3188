use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::Hash32;
use crate::identity::{Identity, IdentityLedger};
use crate::registry::PathRegistry;

/// State persisted for one task identity across build invocations.
///
/// All paths are relative to the build or source root and forward-slash
/// normalized, so state is comparable across machines with different
/// absolute path roots. Entries are never deleted; a stale entry is merely
/// unused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// The task's computed output state as of the last successful run.
    pub signature: Option<Hash32>,
    /// Generated file paths the task most recently declared, build-root
    /// relative.
    pub outputs: Vec<Utf8PathBuf>,
    /// Subset of `outputs` that must be re-fed into the enclosing link step
    /// even when the generation task itself is skipped.
    pub link_inputs: Vec<Utf8PathBuf>,
    /// Dependency files discovered dynamically during the last run, source
    /// root relative.
    pub script_deps: Vec<Utf8PathBuf>,
}

#[derive(Serialize, Deserialize, Default)]
struct Persisted {
    tasks: HashMap<Identity, TaskState>,
}

/// Mutable build-wide state shared by all generation tasks, passed by
/// reference into each task operation.
///
/// All reads and writes to the per-identity map are additive and
/// deduplicating; entries are keyed uniquely by identity, so cross-task
/// interference can only happen on bugs (which the [`IdentityLedger`]
/// catches).
#[derive(Debug)]
pub struct BuildState {
    registry: PathRegistry,
    ledger: IdentityLedger,
    tasks: Mutex<HashMap<Identity, TaskState>>,
    node_sigs: Mutex<HashMap<Utf8PathBuf, Hash32>>,
}

impl BuildState {
    pub fn new(source_root: impl Into<Utf8PathBuf>, build_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            registry: PathRegistry::new(source_root, build_root),
            ledger: IdentityLedger::default(),
            tasks: Mutex::new(HashMap::new()),
            node_sigs: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    /// Snapshot of the persisted state for one identity.
    pub fn get(&self, id: Identity) -> Option<TaskState> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    /// Reset the per-run fields at the start of a run. Clearing the
    /// signature as well means an interrupted run can never be mistaken for
    /// an up-to-date one on the next build.
    pub fn clear_run_state(&self, id: Identity) {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(id).or_default();
        entry.script_deps.clear();
        entry.link_inputs.clear();
        entry.signature = None;
    }

    /// Append a build-root-relative output path to the persisted link
    /// inputs, deduplicated.
    pub fn push_link_input(&self, id: Identity, path: Utf8PathBuf) {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(id).or_default();
        if !entry.link_inputs.contains(&path) {
            entry.link_inputs.push(path);
        }
    }

    /// Append a source-root-relative dependency path to the persisted
    /// script deps, deduplicated.
    pub fn push_script_dep(&self, id: Identity, path: Utf8PathBuf) {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(id).or_default();
        if !entry.script_deps.contains(&path) {
            entry.script_deps.push(path);
        }
    }

    /// Record the final signature and output list after a successful run.
    pub fn finish_run(&self, id: Identity, signature: Hash32, outputs: Vec<Utf8PathBuf>) {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(id).or_default();
        entry.signature = Some(signature);
        entry.outputs = outputs;
    }

    /// Signature override for a node, taking precedence over the file's
    /// content hash when task signatures are computed.
    pub fn node_sig(&self, path: &Utf8Path) -> Option<Hash32> {
        self.node_sigs.lock().unwrap().get(path).copied()
    }

    pub fn set_node_sig(&self, path: Utf8PathBuf, sig: Hash32) {
        self.node_sigs.lock().unwrap().insert(path, sig);
    }

    /// Write the per-identity map to the cross-invocation cache file.
    pub fn save(&self, path: &Utf8Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let persisted = Persisted {
            tasks: self.tasks.lock().unwrap().clone(),
        };

        let file = fs::File::create(path)?;
        ciborium::into_writer(&persisted, file).map_err(std::io::Error::other)
    }

    /// Load a build state from the cross-invocation cache file. A missing
    /// file yields an empty state; this is the first build.
    pub fn load(
        path: &Utf8Path,
        source_root: impl Into<Utf8PathBuf>,
        build_root: impl Into<Utf8PathBuf>,
    ) -> std::io::Result<Self> {
        let persisted = match fs::File::open(path) {
            Ok(file) => {
                ciborium::from_reader::<Persisted, _>(file).map_err(std::io::Error::other)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Persisted::default(),
            Err(err) => return Err(err),
        };

        Ok(Self {
            registry: PathRegistry::new(source_root, build_root),
            ledger: IdentityLedger::default(),
            tasks: Mutex::new(persisted.tasks),
            node_sigs: Mutex::new(HashMap::new()),
        })
    }
}
