//! Host Seam
//!
//! The domain operations of the host application, as seen by the batch executor and
//! the compilation ledger. Every method is called on the affinity thread only.

use crate::error::HostError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod memory;

pub use memory::MemoryHost;

/// Level-triggered view of the host's compile flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileProbe {
    Idle,
    Compiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Outcome of the most recently finished compile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileSummary {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileSummary {
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Domain operations the command bus drives.
///
/// Implementations own all host state; the runtime guarantees they are only touched
/// from the single thread that drains the dispatcher.
pub trait HostOperations {
    fn context_exists(&self, name: &str) -> bool;

    fn create_context(&mut self, name: &str) -> Result<(), HostError>;

    fn open_context(&mut self, name: &str) -> Result<(), HostError>;

    /// Attach a widget; `parent` of `None` means the active context root.
    /// Returns the resolved parent name.
    fn add_widget(
        &mut self,
        name: &str,
        kind: &str,
        parent: Option<&str>,
    ) -> Result<String, HostError>;

    fn remove_widget(&mut self, name: &str) -> Result<(), HostError>;

    fn rename_widget(&mut self, name: &str, new_name: &str) -> Result<(), HostError>;

    fn set_property(&mut self, target: &str, property: &str, value: &Value)
        -> Result<(), HostError>;

    /// Ask the host to start a compile. The compile itself proceeds over later ticks.
    fn request_compile(&mut self) -> Result<(), HostError>;

    /// Persist pending context changes.
    fn save(&mut self) -> Result<(), HostError>;

    /// Poll the compile flag. Called once per tick.
    fn compile_probe(&mut self) -> CompileProbe;

    /// Diagnostics of the compile that most recently finished.
    fn compile_summary(&self) -> CompileSummary;
}
