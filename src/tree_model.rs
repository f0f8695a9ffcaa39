use crate::models::TreeNode;

/// The in-memory document forest.
///
/// Content is only ever replaced wholesale with the authoritative tree
/// fetched from the service; no node is edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeModel {
    roots: Vec<TreeNode>,
}

impl TreeModel {
    pub fn new(roots: Vec<TreeNode>) -> Self {
        Self { roots }
    }

    pub fn replace(&mut self, roots: Vec<TreeNode>) {
        self.roots = roots;
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes in the forest.
    pub fn len(&self) -> usize {
        fn count(nodes: &[TreeNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    /// Pre-order depth-first search; the first match wins.
    pub fn find_by_id(&self, id: &str) -> Option<&TreeNode> {
        fn find<'a>(nodes: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
            for node in nodes {
                if node.id == id {
                    return Some(node);
                }
                if let Some(found) = find(&node.children, id) {
                    return Some(found);
                }
            }
            None
        }
        find(&self.roots, id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Id of the node whose `children` hold `id`. Roots have no parent.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        fn walk<'a>(nodes: &'a [TreeNode], parent: Option<&'a str>, id: &str) -> Option<Option<&'a str>> {
            for node in nodes {
                if node.id == id {
                    return Some(parent);
                }
                if let Some(found) = walk(&node.children, Some(node.id.as_str()), id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.roots, None, id).flatten()
    }

    /// Ids in pre-order.
    pub fn preorder_ids(&self) -> Vec<&str> {
        fn collect<'a>(nodes: &'a [TreeNode], out: &mut Vec<&'a str>) {
            for node in nodes {
                out.push(&node.id);
                collect(&node.children, out);
            }
        }
        let mut ids = Vec::with_capacity(self.len());
        collect(&self.roots, &mut ids);
        ids
    }

    /// Whether moving `ancestor_id` under or around `candidate_id` would
    /// create a cycle.
    ///
    /// Runs a single pre-order walk and carries an "ancestor found" flag down
    /// the recursion. The flag turns on when the walk enters `ancestor_id`
    /// and is only passed to that node's own children. A candidate therefore
    /// counts as a descendant only if it is visited after the ancestor and
    /// inside the ancestor's subtree span. Later siblings of the ancestor
    /// never qualify. A node is not its own descendant; callers reject
    /// self-drops before asking.
    pub fn is_descendant(&self, ancestor_id: &str, candidate_id: &str) -> bool {
        if ancestor_id == candidate_id {
            return false;
        }

        fn scan(nodes: &[TreeNode], ancestor_id: &str, candidate_id: &str, ancestor_found: bool) -> bool {
            for node in nodes {
                if ancestor_found && node.id == candidate_id {
                    return true;
                }
                let inside = ancestor_found || node.id == ancestor_id;
                if scan(&node.children, ancestor_id, candidate_id, inside) {
                    return true;
                }
            }
            false
        }
        scan(&self.roots, ancestor_id, candidate_id, false)
    }
}
