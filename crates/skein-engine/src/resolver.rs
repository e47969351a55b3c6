//! Reference resolution
//!
//! Evaluates `{{...}}` expressions embedded in node configuration against
//! the current execution context. Supports dotted-path lookups over the
//! `variables`, `meta`, `nodes`, `nex`, and `loop` namespaces, plus a single
//! space-padded binary arithmetic operator per expression, e.g.
//! `{{variables.a + variables.b}}` or `{{variables.x - 1}}`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::context::{FlowContext, LoopState, NodeRecord};
use crate::graph::JsonMap;

/// Matches `{{nodes.nodeId.output.field}}`, `{{variables.key}}`, etc.
static REF_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap());

/// Matches a value that is exactly one `{{...}}` token.
static WHOLE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{\{([^}]+)\}\}$").unwrap());

const OP_CANDIDATES: [&str; 4] = [" + ", " - ", " * ", " / "];

/// Resolve all `{{ref}}` expressions in a string against the context.
pub fn resolve(template: &str, ctx: &FlowContext) -> String {
    resolve_with_loop(template, ctx, None)
}

/// Same as [`resolve`] but with optional loop state for `{{loop.index}}` and
/// `{{loop.accumulated}}`.
pub fn resolve_with_loop(template: &str, ctx: &FlowContext, loop_state: Option<&LoopState>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    REF_PATTERN
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let path = caps[1].trim();
            match resolve_path_or_expression(path, ctx, loop_state) {
                Some(value) => display_value(&value),
                None => {
                    if path.starts_with("nodes.") || path.starts_with("variables.") {
                        log::warn!(
                            "Reference resolved to null: {{{{{path}}}}}; check the path and that START output.body is set"
                        );
                    }
                    // Missing nex keys stay silent; they are optional references.
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Resolve an entire config map. A string value that is exactly one token is
/// replaced by the resolved value with its native type (number, map, list);
/// a string mixing tokens with literal text resolves inline and stays a
/// string. Non-string values pass through untouched.
pub fn resolve_map(config: &JsonMap, ctx: &FlowContext) -> JsonMap {
    resolve_map_with_loop(config, ctx, None)
}

/// Same as [`resolve_map`] but with optional loop state for `{{loop.*}}`.
pub fn resolve_map_with_loop(
    config: &JsonMap,
    ctx: &FlowContext,
    loop_state: Option<&LoopState>,
) -> JsonMap {
    let mut resolved = JsonMap::new();
    for (key, value) in config {
        let Value::String(s) = value else {
            resolved.insert(key.clone(), value.clone());
            continue;
        };
        if let Some(caps) = WHOLE_TOKEN.captures(s.trim()) {
            let inner = caps[1].trim();
            let obj = resolve_path_or_expression(inner, ctx, loop_state)
                .unwrap_or(Value::String(String::new()));
            resolved.insert(key.clone(), obj);
        } else {
            resolved.insert(key.clone(), Value::String(resolve_with_loop(s, ctx, loop_state)));
        }
    }
    resolved
}

/// Resolve a path or `{{path}}` template to a typed value, for AI input
/// bindings and similar object-typed lookups. No arithmetic.
pub fn resolve_to_value(path_or_template: &str, ctx: &FlowContext) -> Option<Value> {
    let path = match (path_or_template.find("{{"), path_or_template.find("}}")) {
        (Some(start), Some(end)) if end > start => path_or_template[start + 2..end].trim(),
        _ => path_or_template.trim(),
    };
    if path.is_empty() {
        return None;
    }
    resolve_path(path, ctx, None)
}

/// Render a resolved value for inline string substitution: scalars print
/// bare, maps and lists print as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn resolve_path_or_expression(
    path: &str,
    ctx: &FlowContext,
    loop_state: Option<&LoopState>,
) -> Option<Value> {
    for candidate in OP_CANDIDATES {
        if let Some(idx) = path.find(candidate) {
            let left = resolve_operand(path[..idx].trim(), ctx, loop_state);
            let right = resolve_operand(path[idx + candidate.len()..].trim(), ctx, loop_state);
            return Some(evaluate_op(candidate.trim(), left, right));
        }
    }
    resolve_path(path, ctx, loop_state)
}

/// An expression operand is a path, or a bare numeric literal as in
/// `{{variables.x - 1}}`.
fn resolve_operand(operand: &str, ctx: &FlowContext, loop_state: Option<&LoopState>) -> Option<Value> {
    resolve_path(operand, ctx, loop_state).or_else(|| {
        operand
            .parse::<f64>()
            .ok()
            .map(whole_number)
    })
}

fn evaluate_op(op: &str, left: Option<Value>, right: Option<Value>) -> Value {
    if op == "+" {
        if let (Some(Value::Number(l)), Some(Value::Number(r))) = (&left, &right) {
            if let (Some(l), Some(r)) = (l.as_f64(), r.as_f64()) {
                return whole_number(l + r);
            }
        }
        let mut concat = left.as_ref().map(display_value).unwrap_or_default();
        concat.push_str(&right.as_ref().map(display_value).unwrap_or_default());
        return Value::String(concat);
    }

    let (Some(l), Some(r)) = (to_f64(left.as_ref()), to_f64(right.as_ref())) else {
        return Value::String(String::new());
    };
    let result = match op {
        "-" => l - r,
        "*" => l * r,
        "/" if r != 0.0 => l / r,
        _ => return Value::String(String::new()),
    };
    if result.is_nan() || result.is_infinite() {
        return Value::String(String::new());
    }
    whole_number(result)
}

/// Integral results normalize to integer representation so arithmetic never
/// produces "30.0" artifacts.
fn whole_number(d: f64) -> Value {
    if d.is_finite() && d == d.floor() {
        Value::from(d as i64)
    } else {
        Value::from(d)
    }
}

fn to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn resolve_path(path: &str, ctx: &FlowContext, loop_state: Option<&LoopState>) -> Option<Value> {
    let path = path.strip_prefix("input.").map(str::trim).unwrap_or(path);
    if path.is_empty() {
        return None;
    }
    let parts: Vec<&str> = path.split('.').collect();

    match parts[0] {
        // nex.NAME.field: the flat named-output container; keys are case-sensitive.
        "nex" if parts.len() >= 2 => walk_nested(&ctx.nex, &path[4..]),

        "loop" if parts.len() >= 2 => {
            let state = loop_state?;
            match parts[1] {
                "index" => Some(Value::from(state.index)),
                "accumulated" => Some(Value::Array(state.accumulated.clone())),
                _ => None,
            }
        }

        "variables" if parts.len() == 2 => non_null(ctx.variable(parts[1]).cloned()),

        "meta" if parts.len() == 2 => match parts[1] {
            "flowId" => Some(Value::String(ctx.meta.flow_id.clone())),
            "executionId" => Some(Value::String(ctx.meta.execution_id.clone())),
            "startedAt" => Some(Value::String(ctx.meta.started_at.to_rfc3339())),
            _ => None,
        },

        "nodes" if parts.len() >= 3 => {
            let record = if parts[1].eq_ignore_ascii_case("start") {
                ctx.start_record()?
            } else {
                ctx.node_record(parts[1])?
            };
            let output = output_map(record, parts[2])?;
            walk_object(output, &parts[3..])
        }

        _ => None,
    }
}

fn output_map<'a>(record: &'a NodeRecord, output_type: &str) -> Option<&'a JsonMap> {
    match output_type {
        "successOutput" => record.success_output.as_ref(),
        "failureOutput" => record.failure_output.as_ref(),
        "output" => record.output.as_ref(),
        _ => None,
    }
}

/// Navigate into a node's output map, one map per segment; the final
/// segment may hold any value.
fn walk_object(map: &JsonMap, segments: &[&str]) -> Option<Value> {
    if segments.is_empty() {
        return Some(Value::Object(map.clone()));
    }
    let mut current = map;
    for (i, segment) in segments.iter().enumerate() {
        let next = current.get(*segment)?;
        if i == segments.len() - 1 {
            return non_null(Some(next.clone()));
        }
        current = next.as_object()?;
    }
    None
}

/// Walk a map/list tree by dot path (e.g. `user.result.userId`). Handles
/// maps, lists (integer index), and scalars. Returns `None` if any step is
/// missing.
fn walk_nested(root: &JsonMap, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?.trim();
    if first.is_empty() {
        return None;
    }
    let mut current = root.get(first)?;
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    non_null(Some(current.clone()))
}

/// A JSON null behaves like a missing value.
fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
