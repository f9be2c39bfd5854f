use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Duplicate node id in graph data: {0}")]
    DuplicateNode(String),

    #[error("Node {node} lists unknown neighbor {neighbor}")]
    UnknownNeighbor { node: String, neighbor: String },

    #[error("Graph data contains no nodes")]
    EmptyGraph,

    #[error("Graph data contains no exit nodes")]
    NoExits,

    #[error("Failed to parse graph data: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::UnknownNeighbor {
            node: "P1".to_string(),
            neighbor: "P99".to_string(),
        };
        assert!(error.to_string().contains("P99"));
    }
}
