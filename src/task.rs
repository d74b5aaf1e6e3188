use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Hash32;
use crate::args;
use crate::env::GeneratorEnv;
use crate::error::{InvokeError, TaskError};
use crate::identity::{Identity, IdentityHasher};
use crate::invoke;
use crate::output::{self, GenRecord};
use crate::state::BuildState;
use crate::status::{RunnableStatus, Staleness};
use crate::unit::BuildUnit;

/// Hook for the host scheduler's header dependency scan (e.g. a C
/// preprocessor include scanner run over the task's input headers).
pub trait HeaderScanner: Send + Sync {
    fn scan(&self, input: &Utf8Path) -> Vec<Utf8PathBuf>;
}

/// Default scanner: no header scanning.
pub struct NoScan;

impl HeaderScanner for NoScan {
    fn scan(&self, _input: &Utf8Path) -> Vec<Utf8PathBuf> {
        Vec::new()
    }
}

/// One unit of code-generation work.
///
/// A task is created when a build unit declares a code-generation pass and
/// lives for one build invocation; only the derived signature and output
/// list survive across builds, keyed by the task's [`Identity`].
///
/// Within one task the lifecycle is strictly sequential: identity →
/// decision → (prepare → invoke → register). No ordering is guaranteed
/// between distinct tasks; the host scheduler may run them on any thread.
pub struct GenTask {
    /// Working directory of the owning build unit.
    unit_dir: Utf8PathBuf,
    pub(crate) input_dir: Utf8PathBuf,
    pub(crate) output_dir: Utf8PathBuf,
    /// Source headers to scan, absolute or relative to `input_dir`.
    pub(crate) inputs: Vec<Utf8PathBuf>,
    /// Generator scripts, absolute or relative to `unit_dir`.
    pub(crate) scripts: Vec<Utf8PathBuf>,
    pub(crate) includes: Vec<Utf8PathBuf>,
    pub(crate) defines: Vec<String>,
    /// Free-form user arguments, passed ahead of the prepared tail.
    arguments: Vec<String>,
    /// Full prepared argument list, built by [`Self::prepare`].
    argv: Vec<String>,
    prepared: bool,
    pub(crate) error_output_file: Option<Utf8PathBuf>,
    /// Build-root-relative outputs registered during this build pass.
    outputs: Vec<Utf8PathBuf>,
    identity: Option<Identity>,
    signature: Option<Hash32>,
}

impl GenTask {
    pub fn new(
        unit_dir: impl Into<Utf8PathBuf>,
        input_dir: impl Into<Utf8PathBuf>,
        output_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            inputs: Vec::new(),
            scripts: Vec::new(),
            includes: Vec::new(),
            defines: Vec::new(),
            arguments: Vec::new(),
            argv: Vec::new(),
            prepared: false,
            error_output_file: None,
            outputs: Vec::new(),
            identity: None,
            signature: None,
        }
    }

    pub fn add_input(&mut self, input: impl Into<Utf8PathBuf>) {
        self.inputs.push(input.into());
    }

    pub fn add_script(&mut self, script: impl Into<Utf8PathBuf>) {
        self.scripts.push(script.into());
    }

    pub fn add_include(&mut self, include: impl Into<Utf8PathBuf>) {
        self.includes.push(include.into());
    }

    pub fn add_define(&mut self, define: impl Into<String>) {
        self.defines.push(define.into());
    }

    /// Add a free-form argument to the generator invocation.
    pub fn add_argument(&mut self, argument: impl Into<String>) {
        self.arguments.push(argument.into());
    }

    /// Outputs registered during this build pass, build-root relative.
    pub fn outputs(&self) -> &[Utf8PathBuf] {
        &self.outputs
    }

    /// The prepared argument list, empty until [`Self::prepare`] runs.
    pub fn arguments(&self) -> &[String] {
        &self.argv
    }

    /// Compute the task's content-derived identity, caching it for the
    /// task's lifetime and claiming it in the build-wide ledger. A second
    /// claim of the same identity by a distinct task aborts the build.
    ///
    /// Components are accumulated in a fixed order: unit dir, input dir,
    /// output dir, inputs, scripts, includes, defines, user arguments.
    pub fn identity(&mut self, state: &BuildState) -> Result<Identity, TaskError> {
        if let Some(id) = self.identity {
            return Ok(id);
        }

        let registry = state.registry();
        let mut hasher = IdentityHasher::new();
        hasher.update_path(&registry.absolutize(&self.unit_dir));
        hasher.update_path(&registry.absolutize(&self.input_dir));
        hasher.update_path(&registry.absolutize(&self.output_dir));
        for input in &self.inputs {
            hasher.update_path(&self.input_abs(input));
        }
        for script in &self.scripts {
            hasher.update_path(&self.script_abs(script));
        }
        for include in &self.includes {
            hasher.update_path(&registry.absolutize(include));
        }
        for define in &self.defines {
            hasher.update_str(define);
        }
        for argument in &self.arguments {
            hasher.update_str(argument);
        }

        let id = hasher.finish();
        self.identity = Some(id);
        state.ledger().record(id)?;

        Ok(id)
    }

    /// Opaque summary of the task's computed output state: the contents of
    /// every input, script and dynamically discovered dependency file.
    /// Cached until [`Self::invalidate_signature`].
    pub fn signature(&mut self, state: &BuildState) -> Result<Hash32, TaskError> {
        if let Some(sig) = self.signature {
            return Ok(sig);
        }

        let id = self.identity(state)?;
        let mut hasher = blake3::Hasher::new();

        for input in &self.inputs {
            hasher.update(content_sig(state, &self.input_abs(input)).as_bytes());
        }
        for script in &self.scripts {
            hasher.update(content_sig(state, &self.script_abs(script)).as_bytes());
        }
        if let Some(cached) = state.get(id) {
            for dep in &cached.script_deps {
                let abs = state.registry().source_root().join(dep);
                hasher.update(content_sig(state, &abs).as_bytes());
            }
        }

        let sig = Hash32::from(hasher.finalize());
        self.signature = Some(sig);
        Ok(sig)
    }

    /// Drop the cached signature. Required after registration: newly
    /// discovered outputs and dependencies change what this task's correct
    /// signature means going forward.
    pub fn invalidate_signature(&mut self) {
        self.signature = None;
    }

    /// Request capture of the generator's error output into a dedicated
    /// file under the build root, surfaced verbatim on failure.
    pub fn capture_error_output(&mut self, state: &BuildState) -> Result<(), TaskError> {
        let id = self.identity(state)?;
        let rel = state
            .registry()
            .declare(format!("CodeGenErrorOutput/error_output_{}.log", id.to_hex()));
        self.error_output_file = Some(state.registry().build_root().join(rel));
        Ok(())
    }

    /// Populate the full argument list and create the output directory.
    /// Idempotent; [`Self::run`] calls it when the host did not.
    pub fn prepare(&mut self, env: &GeneratorEnv, state: &BuildState) -> Result<(), TaskError> {
        if self.prepared {
            return Ok(());
        }

        fs::create_dir_all(&self.output_dir)?;

        let mut argv = self.arguments.clone();
        argv.extend(args::build_arguments(self, env, state));
        self.argv = argv;
        self.prepared = true;

        Ok(())
    }

    /// Execute the external generator and register its structured output.
    ///
    /// Persisted state for this identity is reset first, so an interrupted
    /// run can never masquerade as a completed one, and is only finalized
    /// (signature + outputs) after registration succeeds.
    pub fn run(
        &mut self,
        unit: &mut dyn BuildUnit,
        env: &GeneratorEnv,
        state: &BuildState,
    ) -> Result<(), TaskError> {
        let id = self.identity(state)?;
        self.prepare(env, state)?;

        state.clear_run_state(id);
        self.outputs.clear();

        let strategies = invoke::strategy_order(env.invoke_command_line_directly);
        let executable = env.executable_path();

        let stdout = 'invoke: {
            for (attempt, &strategy) in strategies.iter().enumerate() {
                let result = invoke::invoke(
                    strategy,
                    &executable,
                    &self.argv,
                    id,
                    state.registry().build_root(),
                );

                match result {
                    Ok(out) => break 'invoke out,
                    Err(err) => {
                        log_failure_diagnostics(&err);
                        if attempt + 1 == strategies.len() {
                            return Err(self.tool_error(err));
                        }
                        tracing::warn!(
                            "unable to run code generator directly, falling back to args-file invocation"
                        );
                    }
                }
            }
            unreachable!("the strategy list is never empty")
        };

        self.handle_output(&stdout, unit, state)?;

        // New outputs/deps were discovered; the cached signature is stale.
        self.invalidate_signature();
        let sig = self.signature(state)?;
        state.finish_run(id, sig, self.outputs.clone());

        Ok(())
    }

    /// Decode the generator's structured output and dispatch each record.
    /// Fails without touching persisted state when the output is malformed
    /// or carries an unknown record type.
    pub fn handle_output(
        &mut self,
        text: &str,
        unit: &mut dyn BuildUnit,
        state: &BuildState,
    ) -> Result<(), TaskError> {
        let records = output::parse_records(text)?;

        for record in records {
            match record {
                GenRecord::Info { info } => tracing::debug!("{info}"),
                // The exit code is authoritative; error records are
                // diagnostics for the user, not a failure by themselves.
                GenRecord::Error { error } => tracing::error!("{error}"),
                GenRecord::GeneratedFile {
                    file_name,
                    should_be_added_to_build,
                } => {
                    self.register_output_file(
                        Utf8Path::new(&file_name),
                        should_be_added_to_build,
                        unit,
                        state,
                    )?;
                }
                GenRecord::DependencyFile { file_name } => {
                    self.register_dependency_file(Utf8Path::new(&file_name), state)?;
                }
            }
        }

        Ok(())
    }

    /// Register a file the generator claims to have produced. The file must
    /// resolve inside the build output tree; its directory becomes an
    /// include path of the owning unit, and when flagged for the build it is
    /// recorded as a persistent link input and fed into the unit's link step.
    pub fn register_output_file(
        &mut self,
        path: &Utf8Path,
        add_to_build: bool,
        unit: &mut dyn BuildUnit,
        state: &BuildState,
    ) -> Result<(), TaskError> {
        let id = self.identity(state)?;

        let rel = state.registry().resolve_output(path).ok_or_else(|| {
            TaskError::Config(format!("unable to find generated file as node: {path}"))
        })?;

        if !self.outputs.contains(&rel) {
            self.outputs.push(rel.clone());
        }

        let abs = state.registry().build_root().join(&rel);
        if let Some(parent) = abs.parent() {
            unit.add_include_path(parent);
        }

        if add_to_build {
            state.push_link_input(id, rel);
            unit.add_link_input(&abs).map_err(|err| {
                TaskError::Config(format!(
                    "created file {abs} marked for \"should add to build\" was not added to a link step: {err}"
                ))
            })?;
        }

        Ok(())
    }

    /// Register a dependency file the generator discovered. A file that
    /// cannot be found in the source tree is an optional hint, not a hard
    /// requirement: logged as an error, the task continues.
    pub fn register_dependency_file(
        &mut self,
        path: &Utf8Path,
        state: &BuildState,
    ) -> Result<(), TaskError> {
        let id = self.identity(state)?;

        match state.registry().resolve_dependency(path) {
            Some(rel) => state.push_script_dep(id, rel),
            None => tracing::error!("unable to find dependency file as node: {path}"),
        }

        Ok(())
    }

    /// Decide whether the generation step must run, can be skipped, or has
    /// to wait, given the host scheduler's generic staleness verdict.
    ///
    /// A skip re-establishes every side effect a real run would have
    /// produced (include paths, link inputs and the unit's view of the
    /// generated sources) so downstream consumers cannot tell the
    /// difference.
    pub fn runnable_status(
        &mut self,
        upstream: Staleness,
        unit: &mut dyn BuildUnit,
        state: &BuildState,
    ) -> Result<RunnableStatus, TaskError> {
        match upstream {
            Staleness::Undetermined => return Ok(RunnableStatus::Defer),
            Staleness::Stale => return Ok(RunnableStatus::Run),
            Staleness::Fresh => {}
        }

        let id = self.identity(state)?;
        let Some(cached) = state.get(id) else {
            return Ok(RunnableStatus::Run);
        };

        let fresh = self.signature(state)?;
        if cached.signature != Some(fresh) {
            tracing::debug!("running generation task {id}, signature different");
            return Ok(RunnableStatus::Run);
        }

        let build_root = state.registry().build_root();
        for output in &cached.outputs {
            if !build_root.join(output).is_file() {
                tracing::debug!("running generation task {id}, output file {output} not found");
                return Ok(RunnableStatus::Run);
            }
        }

        // Not being re-run; wire the cached outputs back into the unit.
        for output in &cached.outputs {
            let abs = build_root.join(output);
            if let Some(parent) = abs.parent() {
                unit.add_include_path(parent);
            }
        }
        unit.add_include_path(&self.output_dir);

        for link in &cached.link_inputs {
            let abs = build_root.join(link);
            unit.add_link_input(&abs).map_err(|err| {
                TaskError::Config(format!(
                    "cached link input {abs} could not be re-added to a link step: {err}"
                ))
            })?;
        }

        for output in &cached.outputs {
            unit.add_source(&build_root.join(output));
        }
        self.outputs = cached.outputs;

        Ok(RunnableStatus::Skip)
    }

    /// Dependency sweep for the host scheduler: header-scan results for each
    /// input, everything under the generator tool directory, the generator
    /// scripts, and dependencies discovered on previous runs.
    pub fn scan(
        &mut self,
        scanner: &dyn HeaderScanner,
        env: &GeneratorEnv,
        state: &BuildState,
    ) -> Result<Vec<Utf8PathBuf>, TaskError> {
        let mut deps = Vec::new();

        for input in &self.inputs {
            deps.extend(scanner.scan(&self.input_abs(input)));
        }

        if env.tool_dir.is_dir() {
            let pattern = format!("{}/**/*", env.tool_dir);
            match glob::glob(&pattern) {
                Ok(paths) => {
                    for entry in paths.flatten() {
                        if entry.is_file()
                            && let Ok(path) = Utf8PathBuf::from_path_buf(entry)
                        {
                            deps.push(path);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("unable to scan the code generator directory: {err}")
                }
            }
        } else {
            tracing::warn!(
                "unable to find the code generator directory; generation tasks will not depend on the tool"
            );
        }

        for script in &self.scripts {
            deps.push(self.script_abs(script));
        }

        let id = self.identity(state)?;
        if let Some(cached) = state.get(id) {
            for dep in &cached.script_deps {
                deps.push(state.registry().source_root().join(dep));
            }
        }

        Ok(deps)
    }

    /// Restore content-derived signatures for outputs that are not link
    /// inputs. Generated headers can double as inputs of this very task, so
    /// their node signature must not be polluted by the task signature, while
    /// files consumed by later compile steps keep it.
    pub fn post_run(&mut self, state: &BuildState) -> Result<(), TaskError> {
        let id = self.identity(state)?;
        let sig = self.signature(state)?;
        let link_inputs = state.get(id).map(|s| s.link_inputs).unwrap_or_default();
        let build_root = state.registry().build_root().to_owned();

        for output in &self.outputs {
            if link_inputs.contains(output) {
                state.set_node_sig(output.clone(), sig);
            } else {
                let content = Hash32::hash_file(build_root.join(output))?;
                state.set_node_sig(output.clone(), content);
            }
        }

        Ok(())
    }

    fn tool_error(&self, source: InvokeError) -> TaskError {
        let error_file = self
            .error_output_file
            .as_ref()
            .and_then(|path| fs::read_to_string(path).ok());

        if let (Some(path), Some(text)) = (&self.error_output_file, &error_file) {
            tracing::error!("error output stored in {path}:\n{text}");
        }

        TaskError::Tool { source, error_file }
    }

    pub(crate) fn input_abs(&self, input: &Utf8Path) -> Utf8PathBuf {
        if input.is_absolute() {
            input.to_owned()
        } else {
            self.input_dir.join(input)
        }
    }

    pub(crate) fn input_relative<'a>(&self, input: &'a Utf8Path) -> &'a Utf8Path {
        input.strip_prefix(&self.input_dir).unwrap_or(input)
    }

    pub(crate) fn script_abs(&self, script: &Utf8Path) -> Utf8PathBuf {
        if script.is_absolute() {
            script.to_owned()
        } else {
            self.unit_dir.join(script)
        }
    }
}

/// Content signature for one absolute path, honoring node signature
/// overrides for files under the build root. A file that cannot be read
/// folds in as its own path, which forces a difference until it appears.
fn content_sig(state: &BuildState, path: &Utf8Path) -> Hash32 {
    if let Ok(rel) = path.strip_prefix(state.registry().build_root())
        && let Some(sig) = state.node_sig(rel)
    {
        return sig;
    }

    match Hash32::hash_file(path) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::debug!("unable to hash {path}: {err}");
            Hash32::hash(path.as_str())
        }
    }
}

/// Surface whatever diagnostics a failed invocation still produced. Only
/// info/error records are logged; a failed run must not register state.
fn log_failure_diagnostics(err: &InvokeError) {
    let stdout = match err {
        InvokeError::Failed { stdout, .. } | InvokeError::StderrNoise { stdout, .. } => stdout,
        _ => return,
    };

    if let Ok(records) = output::parse_records(stdout) {
        for record in records {
            match record {
                GenRecord::Info { info } => tracing::debug!("{info}"),
                GenRecord::Error { error } => tracing::error!("{error}"),
                _ => {}
            }
        }
    }
}
