//! Workspace scripts: a TOML description of blocks, their nesting and their
//! connections, used by hosts that have no drag-and-drop surface.
//!
//! ```toml
//! [[block]]
//! label = "loop"
//! opcode = "repeat"
//! params = { times = 3 }
//! children = [{ opcode = "move" }, { opcode = "turn-right" }]
//!
//! [[connection]]
//! from = "start"
//! to = "loop"
//! distance = 4.5
//! ```

pub mod error;

use std::collections::BTreeMap;
use std::ops::Range;

use serde::Deserialize;
use toml::Spanned;

use crate::block::{BlockId, Condition, Opcode, ParamValue, Parameters};
use crate::chain::{ConnectError, Proximity};
use crate::event::LogEvent;
use crate::workspace::{Workspace, WorkspaceError};

pub use error::LoadError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    #[serde(default)]
    settings: toml::Table,
    #[serde(default, rename = "block")]
    blocks: Vec<BlockEntry>,
    #[serde(default, rename = "connection")]
    connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockEntry {
    #[serde(default)]
    label: Option<Spanned<String>>,
    opcode: Spanned<String>,
    #[serde(default)]
    params: BTreeMap<String, Spanned<toml::Value>>,
    #[serde(default)]
    children: Vec<BlockEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectionEntry {
    from: Spanned<String>,
    to: Spanned<String>,
    /// Gap between the two blocks in host pixels.
    #[serde(default)]
    distance: Option<f64>,
    /// Precomputed verdict; used when no distance is given.
    #[serde(default)]
    adjacent: Option<bool>,
}

/// A loaded workspace and what the host needs alongside it.
#[derive(Debug)]
pub struct Script {
    pub workspace: Workspace,
    /// `[settings]` keys other than `tolerance`, left for the host.
    pub settings: toml::Table,
    /// Block labels declared in the script.
    pub labels: BTreeMap<String, BlockId>,
    /// Connection events produced while assembling the workspace.
    pub events: Vec<LogEvent>,
    pub warnings: Vec<LoadError>,
}

/// Loader entry point.
pub struct Loader {
    source: String,
    file_id: usize,
}

impl Loader {
    pub fn new(source: String, file_id: usize) -> Self {
        Loader { source, file_id }
    }

    /// Build a workspace from the script. Warnings never stop loading;
    /// any error does.
    pub fn load(&self) -> Result<Script, Vec<LoadError>> {
        let mut file: ScriptFile = toml::from_str(&self.source)
            .map_err(|e| vec![LoadError::from_toml(&e, self.file_id)])?;

        let tolerance = self.take_tolerance(&mut file.settings)?;
        let mut state = LoadState::new(self.file_id, tolerance);
        for entry in file.blocks {
            state.add_block(entry, None);
        }
        for connection in file.connections {
            state.add_connection(connection);
        }

        if !state.errors.is_empty() {
            return Err(state.errors);
        }
        let events = state.workspace.take_events();
        Ok(Script {
            workspace: state.workspace,
            settings: file.settings,
            labels: state.labels,
            events,
            warnings: state.warnings,
        })
    }

    fn take_tolerance(&self, settings: &mut toml::Table) -> Result<Option<f64>, Vec<LoadError>> {
        let span = self.locate("tolerance");
        match settings.remove("tolerance") {
            None => Ok(None),
            Some(toml::Value::Integer(n)) if n >= 0 => Ok(Some(n as f64)),
            Some(toml::Value::Float(f)) if f.is_finite() && f >= 0.0 => Ok(Some(f)),
            Some(other) => Err(vec![
                LoadError::error(
                    format!("`tolerance` must be a non-negative number, found {}", other),
                    span,
                    self.file_id,
                )
                .with_note("tolerance is the snap distance in pixels (default 20)"),
            ]),
        }
    }

    /// Best-effort span of the first occurrence of `needle`.
    fn locate(&self, needle: &str) -> Range<usize> {
        self.source
            .find(needle)
            .map(|start| start..start + needle.len())
            .unwrap_or(0..0)
    }
}

struct LoadState {
    file_id: usize,
    workspace: Workspace,
    labels: BTreeMap<String, BlockId>,
    label_spans: BTreeMap<String, Range<usize>>,
    warnings: Vec<LoadError>,
    errors: Vec<LoadError>,
}

impl LoadState {
    fn new(file_id: usize, tolerance: Option<f64>) -> Self {
        let workspace = match tolerance {
            Some(t) => Workspace::with_tolerance(t),
            None => Workspace::new(),
        };
        LoadState {
            file_id,
            workspace,
            labels: BTreeMap::new(),
            label_spans: BTreeMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_block(&mut self, entry: BlockEntry, parent: Option<BlockId>) {
        let opcode_span = entry.opcode.span();
        let opcode = Opcode::from_tag(entry.opcode.get_ref());
        if let Opcode::Unknown(tag) = &opcode {
            self.warnings.push(
                LoadError::warning(format!("unknown block type `{}`", tag), opcode_span.clone(), self.file_id)
                    .with_note("the block is kept and reported when the program runs")
                    .with_note(format!("known blocks: {}", Opcode::TAGS.join(", "))),
            );
        }
        let mut children = entry.children;
        if !children.is_empty() && !opcode.is_container() {
            self.errors.push(
                LoadError::error(
                    format!("`{}` blocks cannot contain other blocks", opcode),
                    opcode_span.clone(),
                    self.file_id,
                )
                .with_note("only repeat, forever and if take children"),
            );
            children.clear();
        }

        let params = self.convert_params(entry.params);
        let id = match parent {
            None => self.workspace.add(opcode, params),
            Some(container) => match self.workspace.add_child(container, opcode, params) {
                Ok(id) => id,
                Err(e) => {
                    self.errors
                        .push(LoadError::error(e.to_string(), opcode_span, self.file_id));
                    return;
                }
            },
        };

        if let Some(label) = entry.label {
            let span = label.span();
            let name = label.into_inner();
            match self.label_spans.get(&name) {
                Some(first) => self.errors.push(
                    LoadError::error(format!("duplicate label `{}`", name), span, self.file_id)
                        .also_at(first.clone(), "first used here"),
                ),
                None => {
                    self.label_spans.insert(name.clone(), span);
                    self.labels.insert(name, id);
                }
            }
        }

        for child in children {
            self.add_block(child, Some(id));
        }
    }

    fn convert_params(&mut self, raw: BTreeMap<String, Spanned<toml::Value>>) -> Parameters {
        let mut params = Parameters::new();
        for (name, value) in raw {
            let span = value.span();
            let value = match value.into_inner() {
                toml::Value::Integer(n) => ParamValue::Number(n as f64),
                toml::Value::Float(f) => ParamValue::Number(f),
                toml::Value::String(s) if name == "condition" => {
                    if Condition::from_choice(&s) == Condition::Always && s.trim() != "always" {
                        self.warnings.push(
                            LoadError::warning(format!("unknown condition `{}`", s), span, self.file_id)
                                .with_note(format!(
                                    "expected one of {}; it will be treated as `always`",
                                    [
                                        Condition::Always,
                                        Condition::MouseClicked,
                                        Condition::KeyPressed,
                                        Condition::SpriteEdge,
                                    ]
                                    .map(|c| c.choice())
                                    .join(", ")
                                )),
                        );
                    }
                    ParamValue::Choice(s)
                }
                toml::Value::String(s) => ParamValue::Text(s),
                other => {
                    self.warnings.push(
                        LoadError::warning(
                            format!("parameter `{}` must be a number or text, found {}", name, other.type_str()),
                            span,
                            self.file_id,
                        )
                        .with_note("the block's default is used instead"),
                    );
                    continue;
                }
            };
            params.set(&name, value);
        }
        params
    }

    fn resolve(&mut self, label: &Spanned<String>) -> Option<BlockId> {
        let found = self.labels.get(label.get_ref()).copied();
        if found.is_none() {
            self.errors.push(LoadError::error(
                format!("no block labelled `{}`", label.get_ref()),
                label.span(),
                self.file_id,
            ));
        }
        found
    }

    fn add_connection(&mut self, entry: ConnectionEntry) {
        let (Some(from), Some(to)) = (self.resolve(&entry.from), self.resolve(&entry.to)) else {
            return;
        };
        let proximity = match (entry.distance, entry.adjacent) {
            (Some(d), _) => Proximity::Distance(d),
            (None, Some(adjacent)) => Proximity::Adjacent(adjacent),
            (None, None) => Proximity::Adjacent(true),
        };
        let (from_label, to_label) = (entry.from.get_ref(), entry.to.get_ref());

        match self.workspace.connect(from, to, proximity) {
            Ok(true) => {}
            Ok(false) => self.warnings.push(
                LoadError::warning(
                    format!("`{}` is too far from `{}` to connect", to_label, from_label),
                    entry.to.span(),
                    self.file_id,
                )
                .also_at(entry.from.span(), "chain ends here")
                .with_note(format!(
                    "snap tolerance is {} px",
                    self.workspace.registry().tolerance()
                )),
            ),
            Err(err) => {
                let message = match err {
                    WorkspaceError::Connect(ConnectError::WouldCycle { .. }) => {
                        format!("connecting `{}` -> `{}` would form a cycle", from_label, to_label)
                    }
                    WorkspaceError::Connect(ConnectError::SelfConnection(_)) => {
                        format!("`{}` cannot follow itself", from_label)
                    }
                    WorkspaceError::NotTopLevel(id) => {
                        let label = if id == from { from_label } else { to_label };
                        format!("`{}` is inside a container and cannot be chained", label)
                    }
                    other => other.to_string(),
                };
                self.errors.push(
                    LoadError::error(message, entry.to.span(), self.file_id)
                        .also_at(entry.from.span(), "connecting from here"),
                );
            }
        }
    }
}
