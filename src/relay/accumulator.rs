//! Pure fold of patch operations into the run-state snapshot.
//!
//! The accumulator never fails: operations that reference impossible
//! locations (indexing into a scalar, out-of-range array index, unknown
//! verb) are skipped so malformed upstream data cannot abort a session. The
//! input snapshot is left untouched; callers get a new value back and keep
//! the previous one inspectable for diagnostics.

use serde_json::{Map, Value};

use crate::engine::{PatchOp, PatchOpKind};

/// Apply an ordered sequence of operations to a snapshot, returning the new
/// snapshot.
pub fn apply(snapshot: &Value, ops: &[PatchOp]) -> Value {
    let mut next = snapshot.clone();
    for op in ops {
        apply_op(&mut next, op);
    }
    next
}

fn apply_op(root: &mut Value, op: &PatchOp) {
    let segments = parse_pointer(&op.path);
    match op.kind {
        PatchOpKind::Add => add(root, &segments, op.value.clone()),
        PatchOpKind::Replace => replace(root, &segments, op.value.clone()),
        PatchOpKind::Remove => remove(root, &segments),
        PatchOpKind::Other => {}
    }
}

/// Split a slash-delimited pointer into unescaped segments (`~1` -> `/`,
/// `~0` -> `~`). The empty pointer targets the document root.
fn parse_pointer(path: &str) -> Vec<String> {
    path.split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn add(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let Some(parent) = descend_creating(root, parents) else {
        return;
    };
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
            } else if let Ok(index) = last.parse::<usize>() {
                if index <= items.len() {
                    items.insert(index, value);
                }
            }
        }
        _ => {}
    }
}

fn replace(root: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        *root = value;
        return;
    }
    if let Some(slot) = descend(root, segments) {
        *slot = value;
    }
}

fn remove(root: &mut Value, segments: &[String]) {
    let Some((last, parents)) = segments.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    let Some(parent) = descend(root, parents) else {
        return;
    };
    match parent {
        Value::Object(map) => {
            map.remove(last);
        }
        Value::Array(items) => {
            if let Ok(index) = last.parse::<usize>() {
                if index < items.len() {
                    items.remove(index);
                }
            }
        }
        _ => {}
    }
}

/// Walk down the tree, materializing missing object levels on the way.
fn descend_creating<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn descend<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}
