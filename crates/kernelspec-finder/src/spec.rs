//! Kernelspec records.
//!
//! `kernel.json` is parsed into [`JupyterKernelspec`]. [`KernelSpecDocument`]
//! is the loaded, immutable value handed to result-stream subscribers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jupyter_protocol::JupyterKernelspec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A candidate kernelspec file found under a search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpecReference {
    pub path: PathBuf,
}

/// A loaded kernel definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpecDocument {
    /// Unique name (the kernelspec directory name).
    pub name: String,
    pub display_name: String,
    /// Launch command, in order.
    pub argv: Vec<String>,
    pub language: String,
    /// Label of the executable the kernel runs under (e.g. `python`).
    pub executable: String,
    /// File the document was loaded from. `None` for synthetic specs.
    pub spec_file: Option<PathBuf>,
    /// The free-form `metadata` block of `kernel.json`.
    pub metadata: Option<HashMap<String, Value>>,
    /// Id of the environment the document was discovered in.
    pub environment_id: Option<String>,
}

impl KernelSpecDocument {
    /// Build a document from a parsed `kernel.json`.
    pub fn from_file(name: impl Into<String>, file: JupyterKernelspec, spec_file: &Path) -> Self {
        let executable = file
            .argv
            .first()
            .and_then(|arg0| Path::new(arg0).file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name: name.into(),
            display_name: file.display_name,
            argv: file.argv,
            language: file.language,
            executable,
            spec_file: Some(spec_file.to_path_buf()),
            metadata: file.metadata,
            environment_id: None,
        }
    }

    /// `metadata.interpreter.path`, if set and non-empty.
    pub fn interpreter_hint(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get("interpreter")?
            .get("path")?
            .as_str()
            .filter(|p| !p.is_empty())
    }

    /// Identity used to de-duplicate search results.
    pub fn key(&self) -> SpecKey {
        SpecKey {
            name: self.name.clone(),
            environment_id: self.environment_id.clone(),
        }
    }
}

/// De-duplication identity: unique name within an originating environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecKey {
    pub name: String,
    pub environment_id: Option<String>,
}
