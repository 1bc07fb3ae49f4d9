//! Lenient capability parsing shared by the protocol clients.
//!
//! Agents list capabilities either as bare strings or as objects whose schema
//! fields go by several names (`input_schema`, `inputSchema`, `parameters`,
//! ...). Entries are captured as raw JSON first so that schemas reach the
//! [`Capability`] record byte-for-byte.

use orchestrator_core::{Capability, OrchestratorError, OrchestratorResult, Schema};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// One capability-like object as an agent reports it
#[derive(Debug, Default, Deserialize)]
pub struct CapabilityEntry {
    /// Name
    #[serde(default)]
    pub name: Option<String>,
    /// Identifier, used when no name is given
    #[serde(default)]
    pub id: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    input_schema: Option<Box<RawValue>>,
    #[serde(default, rename = "inputSchema")]
    input_schema_camel: Option<Box<RawValue>>,
    #[serde(default)]
    parameters: Option<Box<RawValue>>,
    #[serde(default)]
    input_format: Option<Box<RawValue>>,

    #[serde(default)]
    output_schema: Option<Box<RawValue>>,
    #[serde(default, rename = "outputSchema")]
    output_schema_camel: Option<Box<RawValue>>,
    #[serde(default)]
    returns: Option<Box<RawValue>>,
    #[serde(default)]
    output_format: Option<Box<RawValue>>,
    #[serde(default)]
    schema: Option<Box<RawValue>>,

    /// Examples
    #[serde(default)]
    pub examples: Vec<Value>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CapabilityEntry {
    /// An entry carrying only a name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Name, falling back to the identifier
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// First input schema present under any of its names
    pub fn take_input_schema(&mut self) -> Option<Schema> {
        first_schema([
            self.input_schema.take(),
            self.input_schema_camel.take(),
            self.parameters.take(),
            self.input_format.take(),
        ])
    }

    /// First output schema present under any of its names
    pub fn take_output_schema(&mut self) -> Option<Schema> {
        first_schema([
            self.output_schema.take(),
            self.output_schema_camel.take(),
            self.returns.take(),
            self.output_format.take(),
            self.schema.take(),
        ])
    }

    /// Convert into a capability.
    ///
    /// `prefix` is prepended to the name (MCP uses `tool:`), `default_description`
    /// fills an empty description and `tags` are added before the agent's own.
    pub fn into_capability(
        mut self,
        prefix: &str,
        default_description: impl FnOnce(&str) -> String,
        tags: &[&str],
    ) -> Option<Capability> {
        let name = self.display_name()?.to_string();
        let description = self
            .description
            .take()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| default_description(&name));
        let input = self.take_input_schema();
        let output = self.take_output_schema();
        let agent_tags = std::mem::take(&mut self.tags);

        Capability::new(format!("{prefix}{name}"), description)
            .ok()
            .map(|cap| {
                cap.with_input_schema(input)
                    .with_output_schema(output)
                    .with_examples(std::mem::take(&mut self.examples))
                    .with_tags(tags.iter().copied())
                    .with_tags(agent_tags)
            })
    }
}

fn first_schema<const N: usize>(candidates: [Option<Box<RawValue>>; N]) -> Option<Schema> {
    candidates
        .into_iter()
        .flatten()
        .map(Schema::from_raw)
        .find(|s| !s.is_null())
}

/// Parse a list whose items are capability names or capability objects.
///
/// Malformed items are skipped; one bad entry does not hide the rest.
pub fn parse_entries(items: &[Box<RawValue>]) -> Vec<CapabilityEntry> {
    items
        .iter()
        .filter_map(|item| {
            let text = item.get().trim_start();
            if text.starts_with('"') {
                serde_json::from_str::<String>(item.get())
                    .ok()
                    .map(CapabilityEntry::named)
            } else if text.starts_with('{') {
                match serde_json::from_str::<CapabilityEntry>(item.get()) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        debug!(error = %e, "Skipping malformed capability entry");
                        None
                    }
                }
            } else {
                None
            }
        })
        .collect()
}

/// Split a document that is either a bare array or an object wrapping the
/// array under `key`.
///
/// # Errors
/// Returns a protocol error if the body is neither
pub fn list_or_wrapped(body: &[u8], key: &str) -> OrchestratorResult<Vec<Box<RawValue>>> {
    let raw: Box<RawValue> = serde_json::from_slice(body)
        .map_err(|e| OrchestratorError::protocol(format!("invalid JSON body: {e}")))?;
    let text = raw.get().trim_start();
    if text.starts_with('[') {
        return serde_json::from_str(raw.get())
            .map_err(|e| OrchestratorError::protocol(format!("invalid {key} list: {e}")));
    }
    if text.starts_with('{') {
        let fields: HashMap<String, Box<RawValue>> = serde_json::from_str(raw.get())
            .map_err(|e| OrchestratorError::protocol(format!("invalid {key} document: {e}")))?;
        return match fields.get(key) {
            Some(inner) if inner.get().trim_start().starts_with('[') => {
                serde_json::from_str(inner.get())
                    .map_err(|e| OrchestratorError::protocol(format!("invalid {key} list: {e}")))
            }
            _ => Ok(Vec::new()),
        };
    }
    Err(OrchestratorError::protocol(format!(
        "expected a {key} list or object"
    )))
}
