//! Serialized component descriptors.
//!
//! This is the wire format produced by composite expansion and consumed by
//! tree construction:
//!
//! ```json
//! { "type": "serialized", "componentType": "number", "componentIdx": 7,
//!   "attributes": {}, "children": [], "state": {"value": 3},
//!   "downstreamDependencies": {"source": 2, "prop": "value"} }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::arena::ComponentIdx;
use crate::error::{Result, SourcePosition};
use crate::value::Value;

/// Constant `"type"` tag of a serialized descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializedTag {
    #[default]
    Serialized,
}

/// A shadow link: the described component mirrors `prop` of `source` and
/// forwards edits of its primary variable back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowLink {
    pub source: ComponentIdx,
    pub prop: String,
}

/// A component description that has not been instantiated yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedComponent {
    #[serde(rename = "type", default)]
    pub tag: SerializedTag,
    pub component_type: String,
    /// Filled in once the descriptor has been instantiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_idx: Option<ComponentIdx>,
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
    #[serde(default)]
    pub children: Vec<SerializedComponent>,
    /// Initial essential values, keyed by state variable.
    #[serde(default)]
    pub state: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream_dependencies: Option<ShadowLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
}

impl SerializedComponent {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            tag: SerializedTag::Serialized,
            component_type: component_type.into(),
            component_idx: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            state: IndexMap::new(),
            downstream_dependencies: None,
            position: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        self.attribute("name", name)
    }

    pub fn child(mut self, child: SerializedComponent) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I: IntoIterator<Item = SerializedComponent>>(mut self, children: I) -> Self {
        self.children.extend(children);
        self
    }

    pub fn state(mut self, variable: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(variable.into(), value.into());
        self
    }

    pub fn shadowing(mut self, source: ComponentIdx, prop: impl Into<String>) -> Self {
        self.downstream_dependencies = Some(ShadowLink {
            source,
            prop: prop.into(),
        });
        self
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.position = Some(SourcePosition { line, column });
        self
    }

    /// Whether both descriptors describe the same content, regardless of
    /// which component was instantiated from either.
    pub fn describes_same(&self, other: &Self) -> bool {
        self.component_type == other.component_type
            && self.attributes == other.attributes
            && self.state == other.state
            && self.downstream_dependencies == other.downstream_dependencies
            && self.position == other.position
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.describes_same(b))
    }

    /// Marker replacement standing in for content that failed to generate.
    pub fn error_marker(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(ERROR_COMPONENT_TYPE).state("message", message)
    }
}

/// Component type of the error marker.
pub const ERROR_COMPONENT_TYPE: &str = "_error";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_wire_field_names() {
        let serialized = SerializedComponent::new("number")
            .state("value", 3)
            .shadowing(ComponentIdx(2), "value");
        let json: serde_json::Value = serde_json::from_str(&serialized.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "serialized");
        assert_eq!(json["componentType"], "number");
        assert_eq!(json["state"]["value"], 3);
        assert_eq!(json["downstreamDependencies"]["source"], 2);
        assert!(json.get("componentIdx").is_none());
    }

    #[test]
    fn parses_minimal_descriptor() {
        let parsed = SerializedComponent::from_json(
            r#"{"componentType": "group", "children": [{"componentType": "text", "state": {"value": "hi"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.children.len(), 1);
        assert_eq!(parsed.children[0].state["value"], Value::text("hi"));
    }

    #[test]
    fn error_marker_carries_message() {
        let marker = SerializedComponent::error_marker("step cannot be zero");
        assert_eq!(marker.component_type, ERROR_COMPONENT_TYPE);
        assert_eq!(marker.state["message"], Value::text("step cannot be zero"));
    }

    #[test]
    fn instantiated_index_does_not_change_the_description() {
        let fresh = SerializedComponent::new("number").state("value", 4);
        let mut built = fresh.clone();
        built.component_idx = Some(ComponentIdx(9));
        assert!(built.describes_same(&fresh));
        assert!(!built.describes_same(&fresh.clone().state("value", 5)));
    }
}
