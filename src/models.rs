use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A document node as delivered by `GET /api/tree`.
///
/// The service stores a few more fields (timestamps and so on) that the
/// client does not read; serde skips them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<WireNode>>,
}

/// A validated node of the document forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub has_content: bool,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Validates a wire forest and converts it into typed nodes.
///
/// Rejects empty ids and ids that appear more than once anywhere in the
/// forest. Unique ids also rule out cycles, since a node reachable from
/// itself would be seen twice.
pub fn validate_forest(nodes: Vec<WireNode>) -> Result<Vec<TreeNode>, String> {
    let mut seen = HashSet::new();
    convert_nodes(nodes, &mut seen)
}

fn convert_nodes(nodes: Vec<WireNode>, seen: &mut HashSet<String>) -> Result<Vec<TreeNode>, String> {
    let mut converted = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(format!("Node '{}' has an empty id", node.name));
        }
        if !seen.insert(node.id.clone()) {
            return Err(format!("Duplicate node id: {}", node.id));
        }
        let children = convert_nodes(node.children.unwrap_or_default(), seen)?;
        converted.push(TreeNode {
            has_content: node.path.as_deref().is_some_and(|p| !p.is_empty()),
            id: node.id,
            name: node.name,
            children,
        });
    }
    Ok(converted)
}

/// Placement of a dragged node relative to its drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Before,
    After,
    Inside,
}

impl DropPosition {
    /// Resolves the pointer's vertical fraction within a row.
    ///
    /// The top quartile inserts before, the bottom quartile after, and the
    /// middle half (both boundaries included) nests inside.
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction < 0.25 {
            DropPosition::Before
        } else if fraction > 0.75 {
            DropPosition::After
        } else {
            DropPosition::Inside
        }
    }

    /// Resolves from raw pointer offset and row height.
    pub fn from_offset(y: f64, height: f64) -> Self {
        if !height.is_finite() || height <= 0.0 || !y.is_finite() {
            return DropPosition::Inside;
        }
        Self::from_fraction(y / height)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DropPosition::Before => "before",
            DropPosition::After => "after",
            DropPosition::Inside => "inside",
        }
    }
}

impl fmt::Display for DropPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRequest {
    pub node_id: String,
    pub target_id: String,
    pub position: DropPosition,
}

#[derive(Debug, Serialize)]
pub struct CreateNodeRequest {
    pub parent_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RenameNodeRequest {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub context: String,
    pub doc_name: String,
}

/// Document body as served by `/api/doc/{id}`. Folders without a file
/// come back with `empty` set and no content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub empty: bool,
}

impl Document {
    /// Text to use as chat context; empty documents contribute nothing.
    pub fn context(&self) -> &str {
        if self.empty {
            return "";
        }
        self.content.as_deref().unwrap_or_default()
    }
}

/// Payload of one `data:` frame on the chat stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<String>,
}
