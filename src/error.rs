use thiserror::Error;

use crate::identity::Identity;
use crate::invoke::COMMAND_LENGTH_LIMIT;

/// Top-level failure of a single generation task.
///
/// Every failure surfaces through the task's `run`-equivalent return value;
/// the host scheduler decides whether a failed task halts the whole build.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A mistake in the task or build-unit configuration, fatal for this task.
    #[error("configuration error: {0}")]
    Config(String),

    /// The external code generator failed. Carries the raw diagnostics and,
    /// when output redirection was configured, the captured error file.
    #[error("code generator failed: {source}")]
    Tool {
        source: InvokeError,
        /// Contents of the error-capture file, when one was configured.
        error_file: Option<String>,
    },

    #[error(transparent)]
    Output(#[from] OutputError),

    /// Two distinct task configurations hashed to the same identity. The
    /// identity function or its inputs are broken; continuing risks reusing
    /// the wrong cached artifact, so this must abort the build loudly.
    #[error("duplicate task identity {0} observed for distinct task configurations")]
    Consistency(Identity),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to execute the external code generator.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("command line length {length} exceeds the safe host limit of {COMMAND_LENGTH_LIMIT}")]
    CommandTooLong { length: usize },

    #[error("failed to spawn code generator `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("code generator execution failed ({code:?}): `{command}`\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The generator's contract is "silent unless something went wrong"; any
    /// stderr output is a failure signal even on a zero exit code.
    #[error("code generator wrote to stderr even though it indicated success: `{command}`\nstderr:\n{stderr}")]
    StderrNoise {
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("failed to write argument file {path}: {source}")]
    ArgsFile {
        path: String,
        source: std::io::Error,
    },
}

/// Failure to decode or register the generator's structured output.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The output was not parseable JSON. The external tool errored before
    /// entering its generation phase (e.g. bad command-line arguments), so
    /// the raw text is surfaced verbatim.
    #[error("failed to parse code generator output as json: {error}\noutput string was:\n{raw}")]
    Malformed { error: String, raw: String },

    /// A record carried a `type` discriminator this engine does not know.
    #[error("unknown output record type returned from the code generator: {kind}")]
    UnknownType { kind: String },

    /// A record with a known `type` was missing fields or carried the wrong
    /// shapes.
    #[error("invalid `{kind}` record in code generator output: {error}")]
    Record { kind: String, error: String },
}
