use std::fs;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::InvokeError;
use crate::identity::Identity;

/// Command lines at or past this length are known to fail to execute on
/// Windows-class hosts, so direct invocation is not even attempted and the
/// argument-file fallback kicks in immediately.
pub const COMMAND_LENGTH_LIMIT: usize = 8192;

/// How to hand the argument list to the external generator. Strategies are
/// tried in order until one succeeds or all are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeStrategy {
    /// Everything on one command line.
    Direct,
    /// Arguments written to a file, one per line, passed as `@<path>`.
    ArgsFile,
}

/// The strategies to attempt for one invocation, in order.
pub(crate) fn strategy_order(direct_first: bool) -> &'static [InvokeStrategy] {
    if direct_first {
        &[InvokeStrategy::Direct, InvokeStrategy::ArgsFile]
    } else {
        &[InvokeStrategy::ArgsFile]
    }
}

/// Execute the code generator with one strategy, returning its stdout.
///
/// Success requires a zero exit code and a silent stderr; the generator's
/// contract is "silent unless something went wrong", so stderr noise fails
/// the invocation even when the exit code claims success.
pub(crate) fn invoke(
    strategy: InvokeStrategy,
    executable: &Utf8Path,
    args: &[String],
    id: Identity,
    build_root: &Utf8Path,
) -> Result<String, InvokeError> {
    match strategy {
        InvokeStrategy::Direct => {
            let length = executable.as_str().len()
                + args.iter().map(|a| a.len() + 1).sum::<usize>();

            if length >= COMMAND_LENGTH_LIMIT {
                return Err(InvokeError::CommandTooLong { length });
            }

            exec(executable, args)
        }
        InvokeStrategy::ArgsFile => {
            let path = args_file_path(build_root, id);
            write_args_file(&path, args)?;
            exec(executable, &[format!("@{path}")])
        }
    }
}

pub(crate) fn args_file_path(build_root: &Utf8Path, id: Identity) -> Utf8PathBuf {
    build_root.join(format!("CodeGenArguments/arguments_file_{}.args", id.to_hex()))
}

fn write_args_file(path: &Utf8Path, args: &[String]) -> Result<(), InvokeError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, args.join("\n"))
    };

    write().map_err(|source| InvokeError::ArgsFile {
        path: path.to_string(),
        source,
    })
}

fn exec(executable: &Utf8Path, args: &[String]) -> Result<String, InvokeError> {
    let command = std::iter::once(executable.as_str())
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    tracing::debug!("invoking code generator with command: {command}");

    let output = Command::new(executable)
        .args(args)
        .output()
        .map_err(|source| InvokeError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(InvokeError::Failed {
            command,
            code: output.status.code(),
            stdout,
            stderr,
        });
    }

    if !stderr.trim().is_empty() {
        return Err(InvokeError::StderrNoise {
            command,
            stdout,
            stderr,
        });
    }

    Ok(stdout)
}
