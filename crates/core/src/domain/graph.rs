use std::collections::BTreeMap;

use crate::domain::node::{Node, NodeId, NodeRecord};
use crate::error::CoreError;

/// Immutable registry of campus nodes, adjacency and exit flags.
///
/// Built once at startup and shared by reference for the lifetime of the
/// process. Adjacency is symmetrized on load: if the source data lists A as
/// adjacent to B, the registry also records B adjacent to A.
#[derive(Debug, Clone)]
pub struct GraphRegistry {
    nodes: BTreeMap<NodeId, Node>,
}

impl GraphRegistry {
    /// Build a registry from raw node records, validating references and
    /// symmetrizing adjacency.
    pub fn from_records(records: Vec<NodeRecord>) -> Result<Self, CoreError> {
        if records.is_empty() {
            return Err(CoreError::EmptyGraph);
        }

        let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
        for record in &records {
            let node = Node {
                id: record.id.clone(),
                x: record.x,
                y: record.y,
                adjacent: Default::default(),
                is_exit: record.exit_node,
                name: record.name.clone(),
            };
            if nodes.insert(record.id.clone(), node).is_some() {
                return Err(CoreError::DuplicateNode(record.id.to_string()));
            }
        }

        for record in &records {
            for neighbor in &record.adjacent {
                if !nodes.contains_key(neighbor) {
                    return Err(CoreError::UnknownNeighbor {
                        node: record.id.to_string(),
                        neighbor: neighbor.to_string(),
                    });
                }
                if let Some(node) = nodes.get_mut(&record.id) {
                    node.adjacent.insert(neighbor.clone());
                }
                if let Some(node) = nodes.get_mut(neighbor) {
                    node.adjacent.insert(record.id.clone());
                }
            }
        }

        if !nodes.values().any(|n| n.is_exit) {
            return Err(CoreError::NoExits);
        }

        Ok(Self { nodes })
    }

    /// Parse a JSON array of node records (the `graph.json` format).
    pub fn from_json(data: &str) -> Result<Self, CoreError> {
        let records: Vec<NodeRecord> = serde_json::from_str(data)?;
        Self::from_records(records)
    }

    /// The bundled 32-node campus graph.
    pub fn campus() -> Result<Self, CoreError> {
        Self::from_json(include_str!("../../assets/campus.json"))
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Human-readable name for a node, falling back to the raw id.
    pub fn display_name<'a>(&'a self, id: &'a NodeId) -> &'a str {
        match self.nodes.get(id) {
            Some(node) if !node.name.is_empty() => &node.name,
            _ => id.as_str(),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn exits(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_exit)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, adjacent: &[&str], exit_node: bool) -> NodeRecord {
        NodeRecord {
            id: NodeId::from(id),
            x: 0.0,
            y: 0.0,
            adjacent: adjacent.iter().map(|a| NodeId::from(*a)).collect(),
            exit_node,
            name: String::new(),
        }
    }

    #[test]
    fn test_symmetrizes_one_way_adjacency() {
        // A lists B, B does not list A back.
        let registry = GraphRegistry::from_records(vec![
            record("A", &["B"], false),
            record("B", &[], true),
        ])
        .unwrap();

        assert!(registry.get(&"A".into()).unwrap().is_adjacent_to(&"B".into()));
        assert!(registry.get(&"B".into()).unwrap().is_adjacent_to(&"A".into()));
    }

    #[test]
    fn test_rejects_unknown_neighbor() {
        let result = GraphRegistry::from_records(vec![record("A", &["GHOST"], true)]);
        assert!(matches!(
            result,
            Err(CoreError::UnknownNeighbor { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_and_empty() {
        assert!(matches!(
            GraphRegistry::from_records(vec![
                record("A", &[], true),
                record("A", &[], true)
            ]),
            Err(CoreError::DuplicateNode(_))
        ));
        assert!(matches!(
            GraphRegistry::from_records(vec![]),
            Err(CoreError::EmptyGraph)
        ));
    }

    #[test]
    fn test_rejects_graph_without_exits() {
        let result = GraphRegistry::from_records(vec![
            record("A", &["B"], false),
            record("B", &[], false),
        ]);
        assert!(matches!(result, Err(CoreError::NoExits)));
    }

    #[test]
    fn test_campus_graph_loads_and_is_symmetric() {
        let registry = GraphRegistry::campus().unwrap();
        assert_eq!(registry.len(), 32);
        assert!(registry.exits().count() > 0);

        // The raw data lists P4 adjacent to P1 only from P1's side.
        let p4 = registry.get(&"P4".into()).unwrap();
        assert!(p4.is_adjacent_to(&"P1".into()));

        for node in registry.nodes() {
            for neighbor in &node.adjacent {
                assert!(
                    registry.get(neighbor).unwrap().is_adjacent_to(&node.id),
                    "{} -> {} not symmetric",
                    node.id,
                    neighbor
                );
            }
        }
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let registry = GraphRegistry::campus().unwrap();
        assert!(registry.display_name(&"P14".into()).contains("Hoover"));
        assert_eq!(registry.display_name(&"P99".into()), "P99");
    }

    #[test]
    fn test_exit_enumeration() {
        let registry = GraphRegistry::from_records(vec![
            record("A", &["B"], false),
            record("B", &["C"], true),
            record("C", &[], true),
        ])
        .unwrap();

        let exits: Vec<_> = registry.exits().map(|n| n.id.as_str()).collect();
        assert_eq!(exits, vec!["B", "C"]);
        assert_eq!(registry.len(), 3);
    }
}
