//! Tagged port declarations negotiated before a graph is built
//!
//! A node configuration names its streams with entries of the form
//! `TAG:name`, `TAG:index:name` or plain `name`. [`TagMap`] parses one list of
//! such entries, and a node turns the maps it accepts into a [`NodeContract`]
//! that records the type carried by every port. The pipeline wires streams
//! and side packets from the contract alone, so no data is touched here.

use super::errors::NodeError;
use super::ports::{PortDirection, PortSchema};
use std::collections::HashSet;
use std::fmt;

/// One parsed `TAG:index:name` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    /// Uppercase tag, empty for untagged entries
    pub tag: String,
    /// Index within the tag
    pub index: usize,
    /// Stream or side packet name this entry binds to
    pub stream: String,
}

impl fmt::Display for TagEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.tag.is_empty(), self.index) {
            (true, _) => write!(f, "{}", self.stream),
            (false, 0) => write!(f, "{}:{}", self.tag, self.stream),
            (false, i) => write!(f, "{}:{}:{}", self.tag, i, self.stream),
        }
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn malformed(raw: &str, reason: &str) -> NodeError {
    NodeError::InvalidConfiguration(format!("malformed entry '{}': {}", raw, reason))
}

/// Parsed list of tagged entries, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<TagEntry>,
}

impl TagMap {
    /// Parse configuration entries
    ///
    /// Untagged entries receive consecutive indices in the order they appear.
    /// Tagged entries without an explicit index use index 0. Indices of every
    /// tag must be unique and contiguous from 0, and a stream name may only
    /// appear once.
    pub fn parse<S: AsRef<str>>(entries_text: &[S]) -> Result<Self, NodeError> {
        let mut entries = Vec::with_capacity(entries_text.len());
        let mut untagged = 0usize;

        for raw in entries_text {
            let raw = raw.as_ref();
            let parts: Vec<&str> = raw.split(':').collect();
            let (tag, index, stream) = match parts.as_slice() {
                [name] => {
                    untagged += 1;
                    (String::new(), untagged - 1, *name)
                }
                [tag, name] => (tag.to_string(), 0, *name),
                [tag, index, name] => {
                    let index = index
                        .parse::<usize>()
                        .map_err(|_| malformed(raw, "index is not a number"))?;
                    (tag.to_string(), index, *name)
                }
                _ => return Err(malformed(raw, "too many ':' separators")),
            };

            if !tag.is_empty() && !is_valid_tag(&tag) {
                return Err(malformed(raw, "tags use uppercase letters, digits and '_'"));
            }
            if !is_valid_name(stream) {
                return Err(malformed(raw, "names use lowercase letters, digits and '_'"));
            }

            entries.push(TagEntry {
                tag,
                index,
                stream: stream.to_string(),
            });
        }

        let map = Self { entries };
        map.check_unique()?;
        Ok(map)
    }

    fn check_unique(&self) -> Result<(), NodeError> {
        let mut slots = HashSet::new();
        let mut names = HashSet::new();
        for entry in &self.entries {
            if !slots.insert((entry.tag.as_str(), entry.index)) {
                return Err(NodeError::InvalidConfiguration(format!(
                    "tag '{}' index {} is declared twice",
                    entry.tag, entry.index
                )));
            }
            if !names.insert(entry.stream.as_str()) {
                return Err(NodeError::InvalidConfiguration(format!(
                    "name '{}' is bound twice",
                    entry.stream
                )));
            }
        }

        for entry in &self.entries {
            let count = self.entries.iter().filter(|e| e.tag == entry.tag).count();
            if entry.index >= count {
                return Err(NodeError::InvalidConfiguration(format!(
                    "indices of tag '{}' must be contiguous from 0",
                    entry.tag
                )));
            }
        }
        Ok(())
    }

    /// Total number of entries across all tags
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    /// Look up an entry by tag and index (use `""` for untagged entries)
    pub fn get(&self, tag: &str, index: usize) -> Option<&TagEntry> {
        self.entries
            .iter()
            .find(|e| e.tag == tag && e.index == index)
    }

    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }
}

/// Typed ports a node instance requires, resolved from its configuration
///
/// Port indices are assigned in the order ports are added. Nodes keep the
/// returned index and use it on every call instead of looking tags up again.
#[derive(Debug, Clone)]
pub struct NodeContract {
    node_type: String,
    inputs: Vec<PortSchema>,
    side_inputs: Vec<PortSchema>,
    outputs: Vec<PortSchema>,
}

impl NodeContract {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            inputs: Vec::new(),
            side_inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Declare an input stream carrying `T`, returning its port index
    pub fn add_input<T: 'static>(&mut self, entry: &TagEntry) -> usize {
        let index = self.inputs.len();
        self.inputs
            .push(PortSchema::new::<T>(entry, index, PortDirection::Input));
        index
    }

    /// Declare an input side packet carrying `T`, returning its port index
    pub fn add_side_input<T: 'static>(&mut self, entry: &TagEntry) -> usize {
        let index = self.side_inputs.len();
        self.side_inputs
            .push(PortSchema::new::<T>(entry, index, PortDirection::SideInput));
        index
    }

    /// Declare an output stream carrying `T`, returning its port index
    pub fn add_output<T: 'static>(&mut self, entry: &TagEntry) -> usize {
        let index = self.outputs.len();
        self.outputs
            .push(PortSchema::new::<T>(entry, index, PortDirection::Output));
        index
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn inputs(&self) -> &[PortSchema] {
        &self.inputs
    }

    pub fn side_inputs(&self) -> &[PortSchema] {
        &self.side_inputs
    }

    pub fn outputs(&self) -> &[PortSchema] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    #[test]
    fn test_parse_forms() {
        let map = TagMap::parse(&["MINUEND:input_matrix", "VALUE:1:b", "VALUE:a", "plain"]).unwrap();
        assert_eq!(map.num_entries(), 4);
        assert!(map.has_tag("MINUEND"));
        assert!(!map.has_tag("SUBTRAHEND"));
        assert_eq!(map.get("MINUEND", 0).unwrap().stream, "input_matrix");
        assert_eq!(map.get("VALUE", 1).unwrap().stream, "b");
        assert_eq!(map.get("VALUE", 0).unwrap().stream, "a");
        assert_eq!(map.get("", 0).unwrap().stream, "plain");
    }

    #[test]
    fn test_untagged_indices_are_consecutive() {
        let map = TagMap::parse(&["first", "second"]).unwrap();
        assert_eq!(map.get("", 0).unwrap().stream, "first");
        assert_eq!(map.get("", 1).unwrap().stream, "second");
        assert!(!map.has_tag("FIRST"));
    }

    #[test]
    fn test_malformed_entries_rejected() {
        for raw in ["minuend:x", "MINUEND:Input", "A:B:C:d", "TAG:x:name", "", "1TAG:name"] {
            let result = TagMap::parse(&[raw]);
            assert!(
                matches!(result, Err(NodeError::InvalidConfiguration(_))),
                "'{}' should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(TagMap::parse(&["MINUEND:a", "MINUEND:b"]).is_err());
        assert!(TagMap::parse(&["MINUEND:a", "SUBTRAHEND:a"]).is_err());
        assert!(TagMap::parse(&["VALUE:1:a"]).is_err());
    }

    #[test]
    fn test_entry_display_round_trips_config_form() {
        let map = TagMap::parse(&["SUBTRAHEND:side", "VALUE:a", "VALUE:1:b", "out"]).unwrap();
        let shown: Vec<String> = map.entries().iter().map(|e| e.to_string()).collect();
        assert_eq!(shown, vec!["SUBTRAHEND:side", "VALUE:a", "VALUE:1:b", "out"]);
    }

    #[test]
    fn test_contract_assigns_port_indices() {
        let inputs = TagMap::parse(&["A:x", "B:y"]).unwrap();
        let mut contract = NodeContract::new("Test");
        let a = contract.add_input::<u32>(inputs.get("A", 0).unwrap());
        let b = contract.add_input::<f32>(inputs.get("B", 0).unwrap());
        assert_eq!((a, b), (0, 1));
        assert_eq!(contract.inputs()[1].type_id, TypeId::of::<f32>());
        assert_eq!(contract.inputs()[1].stream, "y");
        assert!(contract.outputs().is_empty());
    }
}
