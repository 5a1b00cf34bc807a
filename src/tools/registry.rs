//! Tool registry for AttoClaw
//!
//! The registry validates tool arguments against each tool's JSON-schema
//! parameter spec and reifies every failure mode into a result string the
//! LLM can recover from. Execution therefore never raises: missing tools,
//! invalid parameters, and tool panics alike come back as `"Error..."`
//! strings with a fixed retry hint appended.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::providers::ToolDefinition;

use super::{Tool, ToolContext};

/// Hint appended to every error result fed back to the LLM.
const RETRY_HINT: &str = "\n\n[Analyze the error above and try a different approach.]";

/// A registry that holds and executes tools.
///
/// # Example
///
/// ```rust
/// use attoclaw::tools::{ToolRegistry, ToolContext, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// let result = registry
///     .execute("echo", json!({"message": "hello"}), &ToolContext::new())
///     .await;
/// assert_eq!(result, "hello");
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    ///
    /// Always returns a string: on any failure the string begins with
    /// `"Error"` and carries the retry hint, so the engine can feed it
    /// straight back into the conversation.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.get(name) else {
            let mut available: Vec<&str> = self.names();
            available.sort_unstable();
            return format!(
                "Error: Tool '{}' not found. Available: {}",
                name,
                available.join(", ")
            );
        };

        let violations = validate_arguments(&tool.parameters(), &args);
        if !violations.is_empty() {
            return format!(
                "Error: Invalid parameters for tool '{}': {}{}",
                name,
                violations.join("; "),
                RETRY_HINT
            );
        }

        let start = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(result) => {
                info!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                if result.starts_with("Error") {
                    format!("{}{}", result, RETRY_HINT)
                } else {
                    result
                }
            }
            Err(e) => {
                error!(
                    tool = name,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                format!("Error executing {}: {}{}", name, e, RETRY_HINT)
            }
        }
    }

    /// Get all tool definitions for the LLM provider call.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// The names of all registered tools.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a tool exists in the registry.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `args` against a JSON-schema-like parameter spec.
///
/// Supports `type` over {string, integer, number, boolean, array, object},
/// `enum`, numeric `minimum`/`maximum`, string `minLength`/`maxLength`,
/// object `required`/`properties` and array `items` descent. Additional
/// properties are tolerated. Returns a list of human-readable violations,
/// empty on success.
pub fn validate_arguments(schema: &Value, args: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    check_value(schema, args, "", &mut violations);
    violations
}

fn check_value(schema: &Value, value: &Value, path: &str, out: &mut Vec<String>) {
    let display_path = if path.is_empty() { "(root)" } else { path };

    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        let matches = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            out.push(format!(
                "{} must be of type {}, got {}",
                display_path,
                expected,
                type_name(value)
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(value_repr).collect();
            out.push(format!(
                "{} must be one of [{}]",
                display_path,
                options.join(", ")
            ));
            return;
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = schema.get("minLength").and_then(|v| v.as_u64()) {
            if (len as u64) < min {
                out.push(format!("{} must have at least {} characters", display_path, min));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(|v| v.as_u64()) {
            if (len as u64) > max {
                out.push(format!("{} must have at most {} characters", display_path, max));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(|v| v.as_f64()) {
            if n < min {
                out.push(format!("{} must be >= {}", display_path, min));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(|v| v.as_f64()) {
            if n > max {
                out.push(format!("{} must be <= {}", display_path, max));
            }
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if !obj.contains_key(field) {
                    out.push(format!("missing required parameter '{}{}'", prefix(path), field));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
            for (key, sub_schema) in properties {
                if let Some(sub_value) = obj.get(key) {
                    if sub_value.is_null() {
                        continue;
                    }
                    let sub_path = format!("{}{}", prefix(path), key);
                    check_value(sub_schema, sub_value, &sub_path, out);
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            let sub_path = format!("{}[{}]", display_path, i);
            check_value(items, item, &sub_path, out);
        }
    }
}

fn prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}.", path)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn value_repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
