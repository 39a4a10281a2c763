use serde::Serialize;
use serde_json::{Map, Value};

use log::warn;

/// Draft of the `JSON` schema used by every composed document.
pub const JSON_SCHEMA_VERSION: &str = "http://json-schema.org/draft-07/schema#";

// Type of a schema document root.
const ROOT_TYPE: &str = "object";

/// Deep-merges `source` into `destination`.
///
/// Objects are merged key by key, creating any missing destination child.
/// Every other value, arrays included, replaces the destination leaf
/// wholesale. When an object arrives over a non-object destination, the
/// destination is turned into an empty object first.
///
/// There is no conflict detection: the last fragment writing a leaf wins,
/// so fragments must be merged from the most generic to the most specific.
pub fn merge(destination: &mut Value, source: &Value) {
    match source {
        Value::Object(source) => {
            if !destination.is_object() {
                *destination = Value::Object(Map::new());
            }
            if let Value::Object(destination) = destination {
                merge_map(destination, source);
            }
        }
        _ => destination.clone_from(source),
    }
}

fn merge_map(destination: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        merge(
            destination.entry(key.as_str()).or_insert(Value::Null),
            value,
        );
    }
}

/// A schema document.
///
/// It is composed of some metadata and a `properties` tree into which
/// fragments are merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDocument {
    #[serde(rename = "$schema")]
    schema: &'static str,
    title: String,
    #[serde(rename = "type")]
    kind: &'static str,
    properties: Map<String, Value>,
}

impl SchemaDocument {
    /// Creates an empty [`SchemaDocument`] with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            schema: JSON_SCHEMA_VERSION,
            title: title.into(),
            kind: ROOT_TYPE,
            properties: Map::new(),
        }
    }

    /// Merges a fragment into the `properties` tree.
    ///
    /// A fragment must be an object, otherwise it is discarded.
    pub fn merge(&mut self, fragment: &Value) {
        match fragment {
            Value::Object(fragment) => merge_map(&mut self.properties, fragment),
            _ => warn!("Discard schema fragment: it is not an object"),
        }
    }

    /// Inserts a property, replacing any previous definition of it.
    pub fn insert(&mut self, name: impl Into<String>, property: Value) {
        self.properties.insert(name.into(), property);
    }

    /// Returns the document title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the `properties` tree.
    #[must_use]
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }
}

/// All fragments contributing to a schema document.
///
/// The firmware fragment accumulates every fragment set by the firmware
/// author, while module fragments are kept in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSources {
    firmware: Option<Value>,
    modules: Vec<Value>,
}

impl SchemaSources {
    /// Creates empty [`SchemaSources`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            firmware: None,
            modules: Vec::new(),
        }
    }

    /// Merges a firmware fragment with the ones set before.
    pub fn firmware(&mut self, fragment: &Value) {
        merge(
            self.firmware.get_or_insert_with(|| Value::Object(Map::new())),
            fragment,
        );
    }

    /// Appends the fragment of a feature module.
    pub fn module(&mut self, fragment: Value) {
        self.modules.push(fragment);
    }

    /// Builds a [`SchemaDocument`].
    ///
    /// The firmware fragment, if any, is merged first. Module fragments
    /// follow in registration order.
    #[must_use]
    pub fn document(&self, title: &str) -> SchemaDocument {
        let mut document = SchemaDocument::new(title);
        if let Some(firmware) = &self.firmware {
            document.merge(firmware);
        }
        for module in &self.modules {
            document.merge(module);
        }
        document
    }
}
