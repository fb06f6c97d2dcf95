use super::{
    builder::{BuildOptions, Builder, BuilderOptions},
    exec_command_output, Error,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// A module as printed by `go list -json -m`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Module {
    pub path: String,
    pub version: String,
    pub replace: Option<Box<Module>>,
    pub time: Option<DateTime<Utc>>,
    pub indirect: bool,
    pub main: bool,
    pub dir: String,
    pub go_mod: String,
    pub go_version: String,
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Directory of the main module, the current one if unset
    pub dir: Option<PathBuf>,
    pub go_binary: PathBuf,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        ExecutorOptions {
            dir: None,
            go_binary: PathBuf::from("go"),
        }
    }
}

/// Queries the module graph of the main module.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    opts: ExecutorOptions,
}

impl Executor {
    pub fn new(opts: ExecutorOptions) -> Self {
        Executor { opts }
    }

    fn list_modules(&self, pattern: &str) -> Result<Vec<Module>, Error> {
        let stdout = exec_command_output(
            self.opts.dir.as_deref(),
            &self.opts.go_binary,
            &["list", "-json", "-m", pattern],
        )?;
        // go prints a stream of objects, not an array
        serde_json::Deserializer::from_slice(&stdout)
            .into_iter::<Module>()
            .collect::<Result<_, _>>()
            .map_err(Error::from)
    }

    /// All modules of the build list.
    pub fn list(&self) -> Result<Vec<Module>, Error> {
        self.list_modules("all")
    }

    pub fn get(&self, name: &str) -> Result<Module, Error> {
        self.list_modules(name)?
            .into_iter()
            .find(|m| m.path == name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    /// Directory of module `name`, joined with `parts`.
    pub fn dir(&self, name: &str, parts: &[&str]) -> Result<PathBuf, Error> {
        let module = self.get(name)?;
        if module.dir.is_empty() {
            return Err(Error::NoModuleDir(name.to_string()));
        }
        Ok(parts
            .iter()
            .fold(PathBuf::from(module.dir), |dir, part| dir.join(part)))
    }

    /// Builds the package at `parts` inside module `name` into `output`.
    ///
    /// The module is copied into a scratch directory first, so tidying it
    /// never touches the module cache.
    pub fn build(&self, output: impl AsRef<Path>, name: &str, parts: &[&str]) -> Result<(), Error> {
        let dir = self.dir(name, &[])?;
        let target = if parts.is_empty() {
            ".".to_string()
        } else {
            format!("./{}", parts.join("/"))
        };

        let build_dir = tempfile::Builder::new()
            .prefix("build-")
            .tempdir()
            .map_err(Error::TempDir)?;
        copy_dir(&dir, build_dir.path())?;

        let builder = Builder::new(BuilderOptions {
            dir: Some(build_dir.path().to_path_buf()),
            tidy: true,
            go_binary: self.opts.go_binary.clone(),
        });
        let res = builder.build(&target, output, &BuildOptions::default());
        if let Err(err) = build_dir.close() {
            tracing::warn!("failed to remove build directory: {:#}", err);
        }
        res
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Io { path, source }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<(), Error> {
    fs::create_dir_all(dst).map_err(io_error(dst))?;
    for entry in fs::read_dir(src).map_err(io_error(src))? {
        let entry = entry.map_err(io_error(src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type().map_err(io_error(&from))?.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

/// Copies a file, leaving the copy writable for its owner.
/// Files in the module cache are read-only.
fn copy_file(from: &Path, to: &Path) -> Result<(), Error> {
    fs::copy(from, to).map_err(io_error(from))?;
    let mut perms = fs::metadata(to).map_err(io_error(to))?.permissions();
    if perms.readonly() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(perms.mode() | 0o200);
        }
        #[cfg(not(unix))]
        perms.set_readonly(false);
        fs::set_permissions(to, perms).map_err(io_error(to))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::builder::tests::{calls, fake_go};

    const LIST: &str = r#"
case "$*" in
  "list -json -m all")
    printf '%s\n' '{"Path":"example.com/app","Main":true,"Dir":"/src/app","GoVersion":"1.22"}'
    printf '%s\n' '{"Path":"example.com/lib","Version":"v1.2.0","Time":"2024-01-02T03:04:05Z","Indirect":true,' '"Replace":{"Path":"../lib"}}'
    ;;
  "list -json -m example.com/lib")
    printf '{"Path":"example.com/lib","Version":"v1.2.0","Dir":"%s"}\n' "$MODULE_DIR"
    ;;
  "list -json -m example.com/nodir")
    echo '{"Path":"example.com/nodir"}'
    ;;
  "list -json -m example.com/renamed")
    echo '{"Path":"example.com/other"}'
    ;;
  "mod tidy")
    test -w go.mod
    ;;
  build*)
    test -f go.mod && test -f cmd/tool/main.go
    ;;
esac
"#;

    fn executor(tools: &Path, module_dir: &Path) -> Executor {
        let extra = format!("MODULE_DIR='{}'\n{}", module_dir.display(), LIST);
        Executor::new(ExecutorOptions {
            dir: None,
            go_binary: fake_go(tools, &extra),
        })
    }

    #[test]
    fn lists_modules() {
        let tools = tempfile::tempdir().unwrap();
        let mods = executor(tools.path(), Path::new("/unused")).list().unwrap();
        assert_eq!(mods.len(), 2);
        assert!(mods[0].main);
        assert_eq!(mods[0].go_version, "1.22");
        assert_eq!(mods[1].version, "v1.2.0");
        assert!(mods[1].indirect);
        assert_eq!(
            mods[1].time.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-01-02T03:04:05+00:00")
        );
        assert_eq!(mods[1].replace.as_ref().map(|r| r.path.as_str()), Some("../lib"));
    }

    #[test]
    fn module_lookup() {
        let tools = tempfile::tempdir().unwrap();
        let exec = executor(tools.path(), Path::new("/go/pkg/mod/example.com/lib@v1.2.0"));

        assert_eq!(
            exec.dir("example.com/lib", &["config", "crd"]).unwrap(),
            Path::new("/go/pkg/mod/example.com/lib@v1.2.0/config/crd")
        );
        assert!(matches!(
            exec.dir("example.com/nodir", &[]),
            Err(Error::NoModuleDir(_))
        ));
        assert!(matches!(
            exec.get("example.com/renamed"),
            Err(Error::ModuleNotFound(_))
        ));
    }

    #[test]
    fn builds_copy_of_module() {
        let tools = tempfile::tempdir().unwrap();
        let module = tempfile::tempdir().unwrap();
        fs::create_dir_all(module.path().join("cmd/tool")).unwrap();
        fs::write(module.path().join("cmd/tool/main.go"), "package main\n").unwrap();
        fs::write(module.path().join("go.mod"), "module example.com/lib\n").unwrap();
        let mut perms = fs::metadata(module.path().join("go.mod")).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(module.path().join("go.mod"), perms).unwrap();

        let exec = executor(tools.path(), module.path());
        exec.build("/tmp/tool", "example.com/lib", &["cmd", "tool"]).unwrap();
        assert_eq!(
            calls(tools.path()),
            [
                "list -json -m example.com/lib",
                "mod tidy",
                "build -o /tmp/tool ./cmd/tool"
            ]
        );
    }
}
