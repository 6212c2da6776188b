//! Wire types for the agent engine's patch-log protocol.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One batch of patch operations yielded by the engine's run-log stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchBatch {
    #[serde(default)]
    pub ops: Vec<PatchOp>,
}

impl PatchBatch {
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }
}

/// A single JSON-Patch-style operation against the run-state tree.
///
/// The upstream engine emits these in strict order; they are never reordered
/// or retried here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    #[serde(rename = "op")]
    pub kind: PatchOpKind,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

impl PatchOp {
    /// Convenience constructor for an `add` operation.
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            kind: PatchOpKind::Add,
            path: path.into(),
            value,
        }
    }
}

/// Patch verb vocabulary.
///
/// Anything outside the known set deserializes to `Other` and is skipped by
/// the accumulator rather than failing the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
    Other,
}

impl PatchOpKind {
    pub fn from_verb(verb: &str) -> Self {
        match verb {
            "add" => PatchOpKind::Add,
            "remove" => PatchOpKind::Remove,
            "replace" => PatchOpKind::Replace,
            _ => PatchOpKind::Other,
        }
    }

    pub fn as_verb(&self) -> &'static str {
        match self {
            PatchOpKind::Add => "add",
            PatchOpKind::Remove => "remove",
            PatchOpKind::Replace => "replace",
            PatchOpKind::Other => "unknown",
        }
    }
}

impl Serialize for PatchOpKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_verb())
    }
}

impl<'de> Deserialize<'de> for PatchOpKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let verb = String::deserialize(deserializer)?;
        Ok(PatchOpKind::from_verb(&verb))
    }
}
