//! Helpers shelling out to the `go` tool.
//!
//! [`Builder`] compiles packages, [`Executor`] inspects modules with `go list`
//! and builds binaries out of them.
use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

mod builder;
mod modules;

pub use self::{
    builder::{BuildOptions, Builder, BuilderOptions, ModMode},
    modules::{Executor, ExecutorOptions, Module},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error running {command}, output:\n{output}")]
    Command { command: String, output: String },
    #[error("error decoding module: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("module {0:?} not found")]
    ModuleNotFound(String),
    #[error("module {0} does not specify a directory")]
    NoModuleDir(String),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to prepare build directory: {0}")]
    TempDir(#[source] std::io::Error),
}

fn describe(program: &Path, args: &[&str]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().map(|s| s.to_string()));
    parts.join(" ")
}

fn run(dir: Option<&Path>, program: &Path, args: &[&str]) -> Result<Output, Error> {
    let command = describe(program, args);
    tracing::debug!("running {}", command);
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(|source| Error::Spawn {
        command: command.clone(),
        source,
    })?;
    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(Error::Command {
            command,
            output: text,
        });
    }
    Ok(output)
}

/// Runs `program` in `dir` (or the current directory) and waits for it.
///
/// On failure, both stdout and stderr of the command end up in [`Error::Command`].
pub fn exec_command(dir: Option<&Path>, program: impl AsRef<Path>, args: &[&str]) -> Result<(), Error> {
    run(dir, program.as_ref(), args).map(drop)
}

/// Like [`exec_command`], returning what the command printed on stdout.
pub fn exec_command_output(
    dir: Option<&Path>,
    program: impl AsRef<Path>,
    args: &[&str],
) -> Result<Vec<u8>, Error> {
    run(dir, program.as_ref(), args).map(|output| output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_commands() {
        exec_command(None, "true", &[]).unwrap();
        let out = exec_command_output(None, "sh", &["-c", "echo hello"]).unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[test]
    fn runs_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        exec_command(Some(dir.path()), "sh", &["-c", "test -f marker"]).unwrap();
    }

    #[test]
    fn failures_carry_output() {
        let err = exec_command(None, "sh", &["-c", "echo out; echo err >&2; exit 3"]).unwrap_err();
        match err {
            Error::Command { command, output } => {
                assert_eq!(command, "sh -c echo out; echo err >&2; exit 3");
                assert_eq!(output, "out\nerr\n");
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert!(matches!(
            exec_command(None, "false", &[]),
            Err(Error::Command { .. })
        ));
        assert!(matches!(
            exec_command(None, "/nonexistent/binary", &[]),
            Err(Error::Spawn { .. })
        ));
    }
}
