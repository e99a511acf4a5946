//! Turns engine references into launch commands.
//!
//! Resolution never starts an engine. The only side effects are read-only
//! lookups (the repository root via `git`, the Go module path via `go.mod`),
//! each performed at most once per `Resolver`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::ResolveError;
use crate::reference::{EngineReference, Toolchain};

/// How to start an engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Engine reference resolver with memoized repository lookups.
///
/// Construct one per process and share it by reference.
#[derive(Debug)]
pub struct Resolver {
    root: OnceLock<Option<PathBuf>>,
    go_module: OnceLock<Option<String>>,
    install_root: PathBuf,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            root: OnceLock::new(),
            go_module: OnceLock::new(),
            install_root: default_install_root(),
        }
    }
}

impl Resolver {
    /// Resolver that finds the repository root lazily from the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver whose repository lookups have already run.
    ///
    /// The lookups spawn `git` synchronously, so call this before entering
    /// async code that resolves engines.
    pub fn discover() -> Self {
        let resolver = Self::new();
        let root = resolver.repo_root().map(Path::to_path_buf);
        let module = resolver.go_module().map(str::to_string);
        debug!(root = ?root, module = ?module, "repository layout detected");
        resolver
    }

    /// Resolver pinned to a known repository root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let resolver = Self::default();
        let _ = resolver.root.set(Some(root.into()));
        resolver
    }

    /// Resolver that behaves as if run outside any repository.
    pub fn detached() -> Self {
        let resolver = Self::default();
        let _ = resolver.root.set(None);
        resolver
    }

    /// Directory that remotely fetched Cargo engines are installed under.
    pub fn with_install_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_root = dir.into();
        self
    }

    /// Repository root, looked up on first use.
    pub fn repo_root(&self) -> Option<&Path> {
        self.root.get_or_init(find_repo_root).as_deref()
    }

    fn go_module(&self) -> Option<&str> {
        self.go_module
            .get_or_init(|| self.repo_root().and_then(read_go_module))
            .as_deref()
    }

    /// Compute the launch command for a toolchain reference.
    pub fn resolve(&self, reference: &EngineReference) -> Result<LaunchCommand, ResolveError> {
        let launch = match reference {
            EngineReference::Alias(name) => {
                return Err(ResolveError::AliasNotLaunchable(name.clone()))
            }
            EngineReference::Toolchain {
                toolchain: Toolchain::Go,
                path,
                version,
            } => self.resolve_go(path, version.as_deref()),
            EngineReference::Toolchain {
                toolchain: Toolchain::Cargo,
                path,
                version,
            } => self.resolve_cargo(reference.short_name(), path, version.as_deref()),
        };
        debug!(engine = %reference, command = %launch, "resolved engine");
        Ok(launch)
    }

    fn resolve_go(&self, path: &str, version: Option<&str>) -> LaunchCommand {
        if let (Some(root), Some(module)) = (self.repo_root(), self.go_module()) {
            let relative = if path == module {
                Some(".".to_string())
            } else {
                path.strip_prefix(module)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .map(|rest| format!("./{rest}"))
            };
            if let Some(relative) = relative {
                return LaunchCommand::new("go")
                    .arg("run")
                    .arg(relative)
                    .current_dir(root);
            }
        }
        LaunchCommand::new("go")
            .arg("run")
            .arg(format!("{path}@{}", version.unwrap_or("latest")))
    }

    /// A package is local only when the repository carries its manifest at
    /// `<root>/<path>/Cargo.toml`. Anything else is fetched from the registry.
    fn resolve_cargo(
        &self,
        short_name: &str,
        path: &str,
        version: Option<&str>,
    ) -> LaunchCommand {
        if let Some(root) = self.repo_root() {
            let manifest = root.join(path).join("Cargo.toml");
            if root.join("Cargo.toml").is_file() && manifest.is_file() {
                return LaunchCommand::new("cargo")
                    .arg("run")
                    .arg("--quiet")
                    .arg("--manifest-path")
                    .arg(manifest.to_string_lossy())
                    .arg("--bin")
                    .arg(short_name)
                    .arg("--")
                    .current_dir(root);
            }
        }
        debug!(package = %path, "package not in this repository, installing from registry");
        let install_dir = self
            .install_root
            .join(short_name)
            .join(version.unwrap_or("latest"));
        LaunchCommand::new("sh")
            .arg("-c")
            .arg(CARGO_INSTALL_SCRIPT)
            .arg("stagehand-cargo-engine")
            .arg(install_dir.to_string_lossy())
            .arg(short_name)
            .arg(version.unwrap_or_default())
    }
}

/// Installs a crate once per (name, version) and execs its binary.
///
/// Positional arguments: install dir, crate name, version (empty for the
/// latest release), then whatever the client appends. Install output goes
/// to stderr since stdout carries the protocol.
const CARGO_INSTALL_SCRIPT: &str = r#"dir=$1 name=$2 version=$3
shift 3
if [ ! -x "$dir/bin/$name" ]; then
  cargo install --quiet --locked --root "$dir" ${version:+--version "$version"} "$name" >&2 || exit 1
fi
exec "$dir/bin/$name" "$@""#;

fn default_install_root() -> PathBuf {
    let cache = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    cache.join("stagehand").join("engines")
}

fn find_repo_root() -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()?;
    if !output.status.success() {
        debug!("not inside a git work tree");
        return None;
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        None
    } else {
        Some(PathBuf::from(root))
    }
}

fn read_go_module(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("go.mod")).ok()?;
    content.lines().find_map(|line| {
        line.trim()
            .strip_prefix("module")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(|rest| rest.trim().trim_matches('"').to_string())
            .filter(|m| !m.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(s: &str) -> EngineReference {
        s.parse().unwrap()
    }

    fn go_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("go.mod"),
            "// engines\nmodule example.com/forge\n\ngo 1.22\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn go_reference_inside_module_runs_local_package() {
        let repo = go_repo();
        let resolver = Resolver::with_root(repo.path());
        let launch = resolver
            .resolve(&reference("go://example.com/forge/cmd/testenv-kind@v0.4.0"))
            .unwrap();
        assert_eq!(launch.program, "go");
        assert_eq!(launch.args, vec!["run", "./cmd/testenv-kind"]);
        assert_eq!(launch.current_dir.as_deref(), Some(repo.path()));
    }

    #[test]
    fn go_reference_outside_module_uses_versioned_remote_form() {
        let repo = go_repo();
        let resolver = Resolver::with_root(repo.path());
        let launch = resolver
            .resolve(&reference("go://other.org/engines/lint@v1.0.0"))
            .unwrap();
        assert_eq!(launch.args, vec!["run", "other.org/engines/lint@v1.0.0"]);
        assert!(launch.current_dir.is_none());
    }

    #[test]
    fn detached_resolver_falls_back_without_failing() {
        let resolver = Resolver::detached();
        let launch = resolver
            .resolve(&reference("go://example.com/forge/cmd/build-go"))
            .unwrap();
        assert_eq!(launch.args, vec!["run", "example.com/forge/cmd/build-go@latest"]);

        let launch = resolver
            .resolve(&reference("cargo://tools/fmt-rust"))
            .unwrap();
        assert_eq!(launch.program, "sh");
        assert_eq!(launch.args.last().map(String::as_str), Some(""));
    }

    #[test]
    fn cargo_fallback_carries_the_version() {
        let cache = tempfile::tempdir().unwrap();
        let resolver = Resolver::detached().with_install_root(cache.path());
        let launch = resolver
            .resolve(&reference("cargo://tools/fmt-rust@0.2.0"))
            .unwrap();

        assert_eq!(launch.program, "sh");
        assert_eq!(launch.args[0], "-c");
        assert!(launch.args[1].contains("cargo install"));
        let install_dir = cache.path().join("fmt-rust").join("0.2.0");
        assert_eq!(
            &launch.args[3..],
            &[
                install_dir.to_string_lossy().to_string(),
                "fmt-rust".to_string(),
                "0.2.0".to_string(),
            ]
        );
    }

    #[test]
    fn cargo_reference_in_workspace_runs_local_bin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").unwrap();
        let package = dir.path().join("crates/lint-rust");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(package.join("Cargo.toml"), "[package]\nname = \"lint-rust\"\n").unwrap();

        let resolver = Resolver::with_root(dir.path());
        let launch = resolver.resolve(&reference("cargo://crates/lint-rust")).unwrap();
        assert_eq!(launch.program, "cargo");
        let manifest = package.join("Cargo.toml").to_string_lossy().to_string();
        assert!(launch.args.contains(&manifest));
        assert!(launch.args.contains(&"lint-rust".to_string()));
        assert_eq!(launch.args.last().map(String::as_str), Some("--"));
    }

    #[test]
    fn unrelated_cargo_workspace_does_not_capture_remote_engines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").unwrap();
        let cache = tempfile::tempdir().unwrap();

        let resolver = Resolver::with_root(dir.path()).with_install_root(cache.path());
        let launch = resolver
            .resolve(&reference("cargo://tools/fmt-rust@0.2.0"))
            .unwrap();
        assert_eq!(launch.program, "sh");
        assert!(launch.args.contains(&"0.2.0".to_string()));
        assert!(launch.current_dir.is_none());
    }

    #[test]
    fn resolution_is_idempotent() {
        let repo = go_repo();
        let resolver = Resolver::with_root(repo.path());
        let r = reference("go://example.com/forge/cmd/testenv-lcr@v0.1.0");
        assert_eq!(resolver.resolve(&r).unwrap(), resolver.resolve(&r).unwrap());
    }

    #[test]
    fn module_is_memoized_after_first_lookup() {
        let repo = go_repo();
        let resolver = Resolver::with_root(repo.path());
        let r = reference("go://example.com/forge/cmd/a");
        let first = resolver.resolve(&r).unwrap();

        std::fs::write(repo.path().join("go.mod"), "module changed.org/x\n").unwrap();
        assert_eq!(resolver.resolve(&r).unwrap(), first);
    }

    #[test]
    fn alias_is_not_launchable() {
        let err = Resolver::detached()
            .resolve(&reference("alias://kind-env"))
            .unwrap_err();
        assert_eq!(err, ResolveError::AliasNotLaunchable("kind-env".to_string()));
    }

    #[test]
    fn go_module_parsing_handles_quotes_and_noise() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "modulex foo\nmodule \"a.b/c\"\n").unwrap();
        assert_eq!(read_go_module(dir.path()).as_deref(), Some("a.b/c"));
    }
}
