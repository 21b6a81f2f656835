//! Kernelspec directory conventions and interpreter path comparison.

use std::path::{Component, Path, PathBuf};

use crate::env::Environment;

/// Relative location of kernelspecs inside an environment prefix.
pub const KERNELS_SUBPATH: [&str; 3] = ["share", "jupyter", "kernels"];

/// Directory holding the kernelspecs installed into an environment.
///
/// Pure. An empty or bogus prefix yields a path that simply finds nothing.
pub fn kernel_search_path(sys_prefix: &Path) -> PathBuf {
    KERNELS_SUBPATH
        .iter()
        .fold(sys_prefix.to_path_buf(), |path, segment| path.join(segment))
}

/// Source of the root (non-environment) kernelspec directories.
pub trait PathProvider: Send + Sync {
    fn kernel_spec_root_paths(&self) -> Vec<PathBuf>;
}

/// The `kernels` directory of every Jupyter data dir, in lookup order:
/// `JUPYTER_PATH` entries, the user data dir, then the system data dirs.
///
/// - macOS: ~/Library/Jupyter, /usr/local/share/jupyter, /usr/share/jupyter
/// - Linux: ~/.local/share/jupyter, /usr/local/share/jupyter, /usr/share/jupyter
/// - Windows: %APPDATA%\jupyter, %PROGRAMDATA%\jupyter
#[derive(Debug, Clone, Default)]
pub struct UserJupyterPaths;

impl PathProvider for UserJupyterPaths {
    fn kernel_spec_root_paths(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for data_dir in runtimelib::dirs::data_dirs() {
            if data_dir.as_os_str().is_empty() {
                continue;
            }
            let kernels = data_dir.join("kernels");
            if !roots.contains(&kernels) {
                roots.push(kernels);
            }
        }
        roots
    }
}

/// Lexically normalize a path: drop `.` and resolve `..` without touching disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = out.components().next_back();
                let after_normal = matches!(last, Some(Component::Normal(_)));
                // `..` at the root stays at the root
                let at_root = matches!(last, Some(Component::RootDir | Component::Prefix(_)));
                if after_normal {
                    out.pop();
                } else if !at_root {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Comparable form of a path for the current platform.
///
/// Windows paths compare case-insensitively and without a trailing `.exe`.
fn comparable(path: &Path) -> String {
    let normalized = normalize_path(path).to_string_lossy().to_string();
    if cfg!(windows) {
        let lower = normalized.replace('/', "\\").to_lowercase();
        if lower.ends_with(".exe") {
            lower[..lower.len() - ".exe".len()].to_string()
        } else {
            lower
        }
    } else {
        normalized
    }
}

/// Whether two paths name the same file after normalization.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    comparable(a) == comparable(b)
}

/// Whether `path` is `root` or lies beneath it.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = comparable(path);
    let root = comparable(root);
    if root.is_empty() {
        return false;
    }
    let sep = std::path::MAIN_SEPARATOR;
    path == root
        || path
            .strip_prefix(root.trim_end_matches(sep))
            .is_some_and(|rest| rest.starts_with(sep))
}

/// Whether `candidate` is the interpreter of `env`.
///
/// Matches the recorded executable directly, or any `python*` launcher in
/// the environment's `bin`/`Scripts` directory (or its root on Windows).
/// Venv launchers are often symlinks whose target differs from the
/// executable recorded for the environment.
pub fn is_interpreter_of(candidate: &Path, env: &Environment) -> bool {
    if paths_equal(candidate, &env.executable) {
        return true;
    }

    let is_python = candidate
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase().starts_with("python"))
        .unwrap_or(false);
    if !is_python || env.sys_prefix.as_os_str().is_empty() {
        return false;
    }

    let Some(parent) = candidate.parent() else {
        return false;
    };
    if paths_equal(parent, &env.sys_prefix) {
        return cfg!(windows);
    }
    let launcher_dir = parent
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase());
    matches!(launcher_dir.as_deref(), Some("bin") | Some("scripts"))
        && parent
            .parent()
            .is_some_and(|prefix| paths_equal(prefix, &env.sys_prefix))
}
