use super::{exec_command, Error};
use std::path::{Path, PathBuf};

/// Value of `go build -mod`
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ModMode {
    Mod,
    Readonly,
    Vendor,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub mod_mode: Option<ModMode>,
    /// Passes `-a`, rebuilding packages that are already up to date.
    pub force_rebuild: bool,
}

#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Working directory, the current one if unset
    pub dir: Option<PathBuf>,
    /// Run `go mod tidy` before building
    pub tidy: bool,
    pub go_binary: PathBuf,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            dir: None,
            tidy: false,
            go_binary: PathBuf::from("go"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Builder {
    opts: BuilderOptions,
}

impl Builder {
    pub fn new(opts: BuilderOptions) -> Self {
        Builder { opts }
    }

    fn go(&self, args: &[&str]) -> Result<(), Error> {
        exec_command(self.opts.dir.as_deref(), &self.opts.go_binary, args)
    }

    /// Builds the package `target` into the binary `output`.
    ///
    /// A relative `output` is resolved against the current directory, not
    /// against the builder's working directory.
    pub fn build(&self, target: &str, output: impl AsRef<Path>, opts: &BuildOptions) -> Result<(), Error> {
        if self.opts.tidy {
            self.go(&["mod", "tidy"])?;
        }

        let output = output.as_ref();
        let output = std::path::absolute(output).map_err(|source| Error::Io {
            path: output.to_path_buf(),
            source,
        })?;
        let output = output.to_string_lossy();
        let mod_mode = opts.mod_mode.map(|m| m.to_string());

        let mut args = vec!["build", "-o", output.as_ref()];
        if let Some(mod_mode) = &mod_mode {
            args.extend(["-mod", mod_mode.as_str()]);
        }
        if opts.force_rebuild {
            args.push("-a");
        }
        args.push(target);
        self.go(&args)
    }
}
