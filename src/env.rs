use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Default force-include header carrying the code generation tag
/// definitions, relative to the source root. Used when the environment does
/// not override it.
pub const DEFAULT_TAGS_HEADER: &str = "Code/Framework/AZCore/AZCore/Preprocessor/CodeGen.h";

/// Environment for the external code generator, supplied by the host's
/// configuration layer as an opaque key-value source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorEnv {
    /// Directory containing the code generator tool. Everything under it is
    /// treated as a dependency of every generation task.
    pub tool_dir: Utf8PathBuf,
    /// Executable file name within `tool_dir`.
    pub executable: String,

    /// Python home fed to the generator's embedded interpreter.
    #[serde(default)]
    pub python_home: Option<Utf8PathBuf>,
    #[serde(default)]
    pub python_paths: Vec<Utf8PathBuf>,
    #[serde(default)]
    pub python_home_debug: Option<Utf8PathBuf>,
    #[serde(default)]
    pub python_debug_paths: Vec<Utf8PathBuf>,

    /// Override for the tag-definition header fed via force-include,
    /// relative to the source root. Falls back to [`DEFAULT_TAGS_HEADER`].
    #[serde(default)]
    pub tags_header: Option<Utf8PathBuf>,

    /// Resource-library search path appended as `-resource-dir` when set.
    #[serde(default)]
    pub resource_dir: Option<Utf8PathBuf>,

    #[serde(default)]
    pub ignore_includes: bool,
    #[serde(default)]
    pub suppress_errors_as_warnings: bool,
    #[serde(default)]
    pub verbose: bool,

    /// Attempt a direct command line before falling back to the argument
    /// file. The fallback also kicks in preemptively when the command line
    /// would exceed the safe host length.
    #[serde(default)]
    pub invoke_command_line_directly: bool,
}

impl GeneratorEnv {
    pub fn executable_path(&self) -> Utf8PathBuf {
        self.tool_dir.join(&self.executable)
    }

    /// Absolute path of the force-include tags header.
    pub fn tags_header(&self, source_root: &Utf8Path) -> Utf8PathBuf {
        let header = self
            .tags_header
            .as_deref()
            .unwrap_or(Utf8Path::new(DEFAULT_TAGS_HEADER));

        if header.is_absolute() {
            header.to_owned()
        } else {
            source_root.join(header)
        }
    }
}
