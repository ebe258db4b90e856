// src/system/executor.rs

use crate::constants::FLAG_ON;
use crate::models::Invocation;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Exported to every script.
pub const ENV_SCRIPT_NAME: &str = "RUNSH_SCRIPT_NAME";
/// Set to `1` when the invocation carried `-v/--verbose`.
pub const ENV_VERBOSE: &str = "RUNSH_VERBOSE";
/// Set to `1` when the invocation carried `-q/--quiet`.
pub const ENV_QUIET: &str = "RUNSH_QUIET";

/// Exit code reported when the child was stopped by Ctrl+C.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Scripts currently running in the foreground of this process.
static FOREGROUND_SCRIPTS: AtomicUsize = AtomicUsize::new(0);
static INTERRUPT_HANDLER: Once = Once::new();

/// Installs the Ctrl+C handler once per process.
///
/// While a script runs, the interrupt is left to the script (it shares our
/// process group) and its exit status decides the outcome, so the temporary
/// script file is still removed. Outside of a script, runsh exits with
/// [`INTERRUPTED_EXIT_CODE`].
pub fn install_interrupt_handler() {
    INTERRUPT_HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            if FOREGROUND_SCRIPTS.load(Ordering::SeqCst) == 0 {
                eprintln!();
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            log::debug!("Interrupt received; waiting for the script to finish");
        });
        if let Err(e) = installed {
            log::debug!("Could not install the Ctrl+C handler: {}", e);
        }
    });
}

/// Errors raised while running a script.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The configured shell has unbalanced quotes.
    #[error("Shell command '{0}' could not be parsed.")]
    ShellParse(String),
    /// The configured shell is blank.
    #[error("No shell configured to run scripts.")]
    EmptyShell,
    /// The temporary script file could not be written.
    #[error("Could not prepare script '{name}' for execution: {source}")]
    Prepare {
        name: String,
        #[source]
        source: io::Error,
    },
    /// The shell program could not be started.
    #[error("Shell '{shell}' could not be started: {source}")]
    SpawnFailed {
        shell: String,
        #[source]
        source: io::Error,
    },
    /// The script failed. `code` is forwarded as runsh's exit code.
    #[error("Script '{name}' exited with code {code}.")]
    NonZeroExit { name: String, code: i32 },
    /// The script was stopped by Ctrl+C.
    #[error("Script '{name}' was interrupted.")]
    Interrupted { name: String },
}

/// Splits a configured shell command line (`"bash -e"`) into program and arguments.
pub fn split_shell(shell: &str) -> Result<(String, Vec<String>), ExecutionError> {
    let mut parts = shlex::split(shell.trim())
        .ok_or_else(|| ExecutionError::ShellParse(shell.to_string()))?
        .into_iter();
    let program = parts.next().ok_or(ExecutionError::EmptyShell)?;
    Ok((program, parts.collect()))
}

/// The variables exported to a script: its bindings plus the runsh built-ins.
pub fn build_environment(name: &str, invocation: &Invocation) -> BTreeMap<String, String> {
    let mut env = invocation.vars.clone();
    env.insert(ENV_SCRIPT_NAME.to_string(), name.to_string());
    if invocation.builtins.verbose {
        env.insert(ENV_VERBOSE.to_string(), FLAG_ON.to_string());
    }
    if invocation.builtins.quiet {
        env.insert(ENV_QUIET.to_string(), FLAG_ON.to_string());
    }
    env
}

/// Runs `content` as script `name` with the given shell and waits for it.
///
/// The content is written to a temporary file which is removed when this
/// function returns, whatever the outcome. Positionals are passed as `$1..$n`
/// and stdio is inherited.
pub fn run_script(
    name: &str,
    content: &str,
    shell: &str,
    invocation: &Invocation,
) -> Result<(), ExecutionError> {
    let (program, shell_args) = split_shell(shell)?;
    install_interrupt_handler();
    FOREGROUND_SCRIPTS.fetch_add(1, Ordering::SeqCst);
    let _foreground = scopeguard::guard((), |_| {
        FOREGROUND_SCRIPTS.fetch_sub(1, Ordering::SeqCst);
    });

    let prepare_err = |source: io::Error| ExecutionError::Prepare {
        name: name.to_string(),
        source,
    };

    let mut script_file = tempfile::Builder::new()
        .prefix("runsh-")
        .suffix(".sh")
        .tempfile()
        .map_err(prepare_err)?;
    script_file
        .write_all(content.as_bytes())
        .and_then(|_| script_file.flush())
        .map_err(prepare_err)?;
    make_executable(script_file.path()).map_err(prepare_err)?;

    log::debug!(
        "Running '{}' with '{}' ({} positionals, {} vars)",
        name,
        shell,
        invocation.positionals.len(),
        invocation.vars.len()
    );

    let mut command = StdCommand::new(&program);
    command
        .args(&shell_args)
        .arg(script_file.path())
        .args(&invocation.positionals)
        .envs(build_environment(name, invocation))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let status = command
        .spawn()
        .and_then(|mut child| child.wait())
        .map_err(|source| ExecutionError::SpawnFailed {
            shell: shell.to_string(),
            source,
        })?;

    check_status(name, status)
}

fn check_status(name: &str, status: ExitStatus) -> Result<(), ExecutionError> {
    if status.success() {
        return Ok(());
    }
    match exit_code(status) {
        INTERRUPTED_EXIT_CODE => Err(ExecutionError::Interrupted {
            name: name.to_string(),
        }),
        code => Err(ExecutionError::NonZeroExit {
            name: name.to_string(),
            code,
        }),
    }
}

/// The shell-style exit code of a finished process: its own code, or
/// `128 + signal` when it was killed by a signal.
#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuiltinFlags;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_split_shell() {
        assert_eq!(
            split_shell("bash -e").unwrap(),
            ("bash".to_string(), vec!["-e".to_string()])
        );
        assert_eq!(
            split_shell("'/opt/my shell/sh'").unwrap(),
            ("/opt/my shell/sh".to_string(), Vec::new())
        );
        assert!(matches!(split_shell("   "), Err(ExecutionError::EmptyShell)));
        assert!(matches!(
            split_shell("bash \"-e"),
            Err(ExecutionError::ShellParse(_))
        ));
    }

    #[test]
    fn test_build_environment() {
        let mut invocation = Invocation::default();
        invocation.vars.insert("NAME".to_string(), "Ada".to_string());
        let env = build_environment("greet", &invocation);
        assert_eq!(env.get("NAME").map(String::as_str), Some("Ada"));
        assert_eq!(env.get(ENV_SCRIPT_NAME).map(String::as_str), Some("greet"));
        assert!(!env.contains_key(ENV_VERBOSE));

        invocation.builtins = BuiltinFlags {
            verbose: true,
            quiet: true,
            ..Default::default()
        };
        let env = build_environment("greet", &invocation);
        assert_eq!(env.get(ENV_VERBOSE).map(String::as_str), Some("1"));
        assert_eq!(env.get(ENV_QUIET).map(String::as_str), Some("1"));
    }

    // --- Process Tests ---

    #[cfg(unix)]
    #[test]
    fn test_run_script_exports_vars_and_positionals() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut invocation = Invocation::default();
        invocation.vars.insert("NAME".to_string(), "Ada".to_string());
        invocation.vars.insert("OUT".to_string(), out.display().to_string());
        invocation.positionals = vec!["first".to_string(), "second arg".to_string()];

        let script = "printf '%s|%s|%s|%s' \"$NAME\" \"$1\" \"$2\" \"$RUNSH_SCRIPT_NAME\" > \"$OUT\"\n";
        run_script("greet", script, "sh", &invocation).unwrap();

        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "Ada|first|second arg|greet"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_script_forwards_exit_code() {
        let err = run_script("fail", "exit 3\n", "sh", &Invocation::default()).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::NonZeroExit { ref name, code: 3 } if name == "fail"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_script_signal_maps_to_shell_code() {
        let err = run_script("term", "kill -TERM $$\n", "sh", &Invocation::default()).unwrap_err();
        assert!(matches!(err, ExecutionError::NonZeroExit { code: 143, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_during_script_still_removes_temp_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("path.txt");
        let mut invocation = Invocation::default();
        invocation.vars.insert("OUT".to_string(), out.display().to_string());

        // `$PPID` is this process; `$0` is the temporary script file.
        let script = "printf '%s' \"$0\" > \"$OUT\"\nkill -INT $PPID\nsleep 0.5\n";
        run_script("interrupted", script, "sh", &invocation).unwrap();

        let script_path = fs::read_to_string(&out).unwrap();
        assert!(script_path.contains("runsh-"), "{}", script_path);
        assert!(!Path::new(&script_path).exists());
    }

    #[test]
    fn test_missing_shell_is_spawn_error() {
        let err = run_script(
            "x",
            "true\n",
            "runsh-no-such-shell-binary",
            &Invocation::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::SpawnFailed { .. }));
    }
}
