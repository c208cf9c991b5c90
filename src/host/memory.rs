//! In-memory reference host.
//!
//! Named contexts hold flat widget maps with parent links. Compiles are simulated over
//! host ticks and finish with whatever diagnostics were staged beforehand.

use super::{CompileProbe, CompileSummary, Diagnostic, HostOperations};
use crate::error::HostError;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub kind: String,
    /// Parent widget name, or the owning context name for root widgets.
    pub parent: String,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct ContextState {
    widgets: BTreeMap<String, Widget>,
    dirty: bool,
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    contexts: BTreeMap<String, ContextState>,
    active: Option<String>,
    save_count: usize,
    compile_ticks: u32,
    compile_remaining: Option<u32>,
    compile_count: usize,
    staged: Vec<Diagnostic>,
    last_summary: CompileSummary,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticks a compile reports `Compiling` before it finishes (at least one).
    pub fn with_compile_ticks(mut self, ticks: u32) -> Self {
        self.compile_ticks = ticks;
        self
    }

    /// Diagnostics the next finished compile will report.
    pub fn stage_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.staged = diagnostics;
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    pub fn active_context(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn context_names(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    pub fn widget(&self, context: &str, name: &str) -> Option<&Widget> {
        self.contexts.get(context)?.widgets.get(name)
    }

    pub fn is_dirty(&self, context: &str) -> bool {
        self.contexts.get(context).map(|c| c.dirty).unwrap_or(false)
    }

    fn active_state(&mut self) -> Result<(String, &mut ContextState), HostError> {
        let name = self.active.clone().ok_or(HostError::NoActiveContext)?;
        let state = self
            .contexts
            .get_mut(&name)
            .ok_or(HostError::NoActiveContext)?;
        Ok((name, state))
    }

    fn widget_not_found(kind: &'static str, name: &str, state: &ContextState) -> HostError {
        HostError::NotFound {
            kind,
            name: name.to_string(),
            available: state.widgets.keys().cloned().collect(),
        }
    }
}

impl HostOperations for MemoryHost {
    fn context_exists(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    fn create_context(&mut self, name: &str) -> Result<(), HostError> {
        if name.trim().is_empty() {
            return Err(HostError::Rejected("context name cannot be empty".to_string()));
        }
        if self.contexts.contains_key(name) {
            return Err(HostError::AlreadyExists {
                kind: "context",
                name: name.to_string(),
            });
        }
        self.contexts.insert(
            name.to_string(),
            ContextState {
                widgets: BTreeMap::new(),
                dirty: true,
            },
        );
        self.active = Some(name.to_string());
        info!(context = name, "Context created");
        Ok(())
    }

    fn open_context(&mut self, name: &str) -> Result<(), HostError> {
        if !self.contexts.contains_key(name) {
            return Err(HostError::NotFound {
                kind: "context",
                name: name.to_string(),
                available: self.context_names(),
            });
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    fn add_widget(
        &mut self,
        name: &str,
        kind: &str,
        parent: Option<&str>,
    ) -> Result<String, HostError> {
        let (context, resolved_parent) = match parent {
            Some(p) if self.contexts.contains_key(p) => (p.to_string(), p.to_string()),
            Some(p) => {
                let active = self.active.clone();
                let in_active = active
                    .as_ref()
                    .and_then(|a| self.contexts.get(a))
                    .map(|state| state.widgets.contains_key(p))
                    .unwrap_or(false);
                match active {
                    Some(active) if in_active => (active, p.to_string()),
                    _ => {
                        let mut available = self.context_names();
                        if let Some(state) = self.active.as_ref().and_then(|a| self.contexts.get(a))
                        {
                            available.extend(state.widgets.keys().cloned());
                        }
                        return Err(HostError::NotFound {
                            kind: "parent",
                            name: p.to_string(),
                            available,
                        });
                    }
                }
            }
            None => {
                let active = self.active.clone().ok_or(HostError::NoActiveContext)?;
                (active.clone(), active)
            }
        };

        let state = self
            .contexts
            .get_mut(&context)
            .ok_or(HostError::NoActiveContext)?;
        if state.widgets.contains_key(name) || name == context {
            return Err(HostError::AlreadyExists {
                kind: "widget",
                name: name.to_string(),
            });
        }
        state.widgets.insert(
            name.to_string(),
            Widget {
                kind: kind.to_string(),
                parent: resolved_parent.clone(),
                properties: BTreeMap::new(),
            },
        );
        state.dirty = true;
        debug!(context = %context, widget = name, parent = %resolved_parent, "Widget added");
        Ok(resolved_parent)
    }

    fn remove_widget(&mut self, name: &str) -> Result<(), HostError> {
        let (_, state) = self.active_state()?;
        if !state.widgets.contains_key(name) {
            return Err(Self::widget_not_found("widget", name, state));
        }
        let mut doomed = vec![name.to_string()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor].clone();
            doomed.extend(
                state
                    .widgets
                    .iter()
                    .filter(|(_, w)| w.parent == current)
                    .map(|(n, _)| n.clone()),
            );
            cursor += 1;
        }
        for widget in &doomed {
            state.widgets.remove(widget);
        }
        state.dirty = true;
        Ok(())
    }

    fn rename_widget(&mut self, name: &str, new_name: &str) -> Result<(), HostError> {
        let (context, state) = self.active_state()?;
        if state.widgets.contains_key(new_name) || new_name == context {
            return Err(HostError::AlreadyExists {
                kind: "widget",
                name: new_name.to_string(),
            });
        }
        let widget = state
            .widgets
            .remove(name)
            .ok_or_else(|| Self::widget_not_found("widget", name, state))?;
        state.widgets.insert(new_name.to_string(), widget);
        for child in state.widgets.values_mut() {
            if child.parent == name {
                child.parent = new_name.to_string();
            }
        }
        state.dirty = true;
        Ok(())
    }

    fn set_property(
        &mut self,
        target: &str,
        property: &str,
        value: &Value,
    ) -> Result<(), HostError> {
        let (_, state) = self.active_state()?;
        if !state.widgets.contains_key(target) {
            return Err(Self::widget_not_found("target", target, state));
        }
        if let Some(widget) = state.widgets.get_mut(target) {
            widget
                .properties
                .insert(property.to_string(), value.clone());
        }
        state.dirty = true;
        Ok(())
    }

    fn request_compile(&mut self) -> Result<(), HostError> {
        if self.compile_remaining.is_some() {
            debug!("Compile already in progress; request coalesced");
            return Ok(());
        }
        self.compile_remaining = Some(self.compile_ticks.max(1));
        self.compile_count += 1;
        Ok(())
    }

    fn save(&mut self) -> Result<(), HostError> {
        for state in self.contexts.values_mut() {
            state.dirty = false;
        }
        self.save_count += 1;
        Ok(())
    }

    fn compile_probe(&mut self) -> CompileProbe {
        match self.compile_remaining {
            Some(0) => {
                self.compile_remaining = None;
                self.last_summary = CompileSummary {
                    diagnostics: std::mem::take(&mut self.staged),
                };
                CompileProbe::Idle
            }
            Some(n) => {
                self.compile_remaining = Some(n - 1);
                CompileProbe::Compiling
            }
            None => CompileProbe::Idle,
        }
    }

    fn compile_summary(&self) -> CompileSummary {
        self.last_summary.clone()
    }
}
