use camino::Utf8Path;

use crate::env::GeneratorEnv;
use crate::identity::clean_path;
use crate::state::BuildState;
use crate::task::GenTask;

/// Assemble the prepared tail of the generator's argument list for one
/// task, in a fixed order.
///
/// The output is stable for a given task and environment. User arguments
/// added via `add_argument` come before this tail, matching the order the
/// generator expects.
pub(crate) fn build_arguments(
    task: &GenTask,
    env: &GeneratorEnv,
    state: &BuildState,
) -> Vec<String> {
    fn flag(args: &mut Vec<String>, name: &str, value: String) {
        args.push(name.to_string());
        args.push(value);
    }

    let mut args = Vec::new();

    // We expect json output for friendlier parsing.
    args.push("-output-using-json".to_string());

    flag(&mut args, "-input-path", clean_path(&task.input_dir));
    flag(&mut args, "-output-path", clean_path(&task.output_dir));

    for input in &task.inputs {
        flag(&mut args, "-input-file", clean_path(task.input_relative(input)));
    }

    if let Some(home) = &env.python_home {
        flag(&mut args, "-python-home", python_path(home, state));
    }
    for path in &env.python_paths {
        flag(&mut args, "-python-path", python_path(path, state));
    }
    if let Some(home) = &env.python_home_debug {
        flag(&mut args, "-python-home-debug", python_path(home, state));
    }
    for path in &env.python_debug_paths {
        flag(&mut args, "-python-debug-path", python_path(path, state));
    }

    if env.ignore_includes {
        args.push("-ignore-includes".to_string());
    }
    if env.suppress_errors_as_warnings {
        args.push("-suppress-errors-as-warnings".to_string());
    }
    if env.verbose {
        args.push("-v".to_string());
    }

    #[cfg(target_os = "linux")]
    {
        args.push("-include-path".to_string());
        args.push("/usr/include/c++/v1".to_string());
    }

    for include in &task.includes {
        flag(
            &mut args,
            "-include-path",
            clean_path(&state.registry().absolutize(include)),
        );
    }

    for define in &task.defines {
        flag(&mut args, "-define", define.clone());
    }

    for script in &task.scripts {
        flag(&mut args, "-codegen-script", clean_path(&task.script_abs(script)));
    }

    // Header that contains the code generation tag definitions.
    flag(
        &mut args,
        "-force-include",
        clean_path(&env.tags_header(state.registry().source_root())),
    );

    if let Some(error_file) = &task.error_output_file {
        flag(&mut args, "-redirect-output-file", clean_path(error_file));
    }

    if let Some(resource_dir) = &env.resource_dir {
        flag(&mut args, "-resource-dir", clean_path(resource_dir));
    }

    args
}

/// Resolve a python home/path entry to an absolute, normalized path.
/// Relative entries are assumed relative to the source root.
fn python_path(path: &Utf8Path, state: &BuildState) -> String {
    let abs = state.registry().absolutize(path);
    if !abs.exists() {
        tracing::warn!("path given as python path does not exist: {abs}");
    }
    clean_path(&abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn fixture() -> (GenTask, GeneratorEnv, BuildState) {
        let state = BuildState::new("/src", "/bld");
        let mut task = GenTask::new("/src/Gem", "/src/Gem", "/bld/Gem/gen");
        task.add_input("Foo.h");
        task.add_include("/src/Include");
        task.add_define("AZ_CODEGEN=1");
        task.add_script("Gen.py");

        let env = GeneratorEnv {
            tool_dir: "/tools/azcg".into(),
            executable: "codegen".into(),
            ..Default::default()
        };

        (task, env, state)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .map(|i| args[i + 1].as_str())
    }

    #[test]
    fn output_is_stable() {
        let (task, env, state) = fixture();
        let a = build_arguments(&task, &env, &state);
        let b = build_arguments(&task, &env, &state);
        assert_eq!(a, b);
    }

    #[test]
    fn emits_flags_in_fixed_order() {
        let (task, env, state) = fixture();
        let args = build_arguments(&task, &env, &state);

        assert_eq!(args[0], "-output-using-json");
        assert_eq!(value_after(&args, "-input-path"), Some("/src/Gem"));
        assert_eq!(value_after(&args, "-output-path"), Some("/bld/Gem/gen"));
        // Input files are expressed relative to the input dir.
        assert_eq!(value_after(&args, "-input-file"), Some("Foo.h"));
        assert_eq!(value_after(&args, "-define"), Some("AZ_CODEGEN=1"));
        assert_eq!(value_after(&args, "-codegen-script"), Some("/src/Gem/Gen.py"));

        let include = args.iter().position(|a| a == "-include-path").unwrap();
        let script = args.iter().position(|a| a == "-codegen-script").unwrap();
        let force = args.iter().position(|a| a == "-force-include").unwrap();
        assert!(include < script && script < force);
    }

    #[test]
    fn force_include_defaults_to_known_header() {
        let (task, env, state) = fixture();
        let args = build_arguments(&task, &env, &state);
        let header = value_after(&args, "-force-include").unwrap();
        assert!(header.starts_with("/src/"));
        assert!(header.ends_with("CodeGen.h"));
    }

    #[test]
    fn redirect_flag_only_when_capture_requested() {
        let (mut task, env, state) = fixture();
        assert_eq!(
            value_after(&build_arguments(&task, &env, &state), "-redirect-output-file"),
            None
        );

        task.capture_error_output(&state).unwrap();
        let args = build_arguments(&task, &env, &state);
        let redirect = value_after(&args, "-redirect-output-file").unwrap();
        assert!(redirect.contains("CodeGenErrorOutput/error_output_"));
    }

    #[test]
    fn resource_dir_is_appended_when_present() {
        let (task, mut env, state) = fixture();
        env.resource_dir = Some(Utf8PathBuf::from("/tools/clang/lib"));
        let args = build_arguments(&task, &env, &state);
        assert_eq!(args.last().unwrap(), "/tools/clang/lib");
        assert_eq!(args[args.len() - 2], "-resource-dir");
    }
}
