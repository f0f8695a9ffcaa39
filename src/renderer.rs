use crate::drag::DropTarget;
use crate::models::{DropPosition, TreeNode};
use crate::tree_model::TreeModel;
use std::collections::BTreeSet;

/// View state tracked independently of tree content, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub selected: Option<String>,
    pub expanded: BTreeSet<String>,
    /// Ids that had children at the last `retain_known`, so folders the
    /// user collapsed stay collapsed across refetches.
    folders: BTreeSet<String>,
    pub privileged: bool,
}

impl ViewState {
    pub fn new(privileged: bool) -> Self {
        Self {
            privileged,
            ..Self::default()
        }
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn toggle(&mut self, id: &str) {
        if !self.expanded.remove(id) {
            self.expanded.insert(id.to_string());
        }
    }

    pub fn expand(&mut self, id: &str) {
        self.expanded.insert(id.to_string());
    }

    /// Reconciles view state with a freshly replaced tree.
    ///
    /// Ids that vanished are dropped from selection and expansion. Surviving
    /// folders keep their state. A node that is a folder for the first time,
    /// new or a leaf that just gained children, starts expanded.
    pub fn retain_known(&mut self, model: &TreeModel) {
        let present: BTreeSet<String> = model.preorder_ids().into_iter().map(String::from).collect();
        self.expanded.retain(|id| present.contains(id));
        if self.selected.as_deref().is_some_and(|id| !present.contains(id)) {
            self.selected = None;
        }
        let folders: BTreeSet<String> = present
            .into_iter()
            .filter(|id| model.find_by_id(id).is_some_and(TreeNode::has_children))
            .collect();
        for id in folders.difference(&self.folders) {
            self.expanded.insert(id.clone());
        }
        self.folders = folders;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    None,
    Expanded,
    Collapsed,
}

/// One visible row of the tree view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRow {
    pub id: String,
    pub name: String,
    pub depth: usize,
    pub toggle: Toggle,
    pub has_content: bool,
    pub active: bool,
    pub draggable: bool,
    pub drop_indicator: Option<DropPosition>,
}

/// Projects the forest into visible rows.
///
/// Pure: the same model, view and drop target always give the same rows.
/// Children of collapsed nodes are not emitted.
pub fn render(model: &TreeModel, view: &ViewState, drop_target: Option<&DropTarget>) -> Vec<RenderRow> {
    let mut rows = Vec::new();
    for root in model.roots() {
        flatten_visible(root, 0, view, drop_target, &mut rows);
    }
    rows
}

fn flatten_visible(
    node: &TreeNode,
    depth: usize,
    view: &ViewState,
    drop_target: Option<&DropTarget>,
    rows: &mut Vec<RenderRow>,
) {
    let expanded = view.is_expanded(&node.id);
    let toggle = match (node.has_children(), expanded) {
        (false, _) => Toggle::None,
        (true, true) => Toggle::Expanded,
        (true, false) => Toggle::Collapsed,
    };
    rows.push(RenderRow {
        id: node.id.clone(),
        name: node.name.clone(),
        depth,
        toggle,
        has_content: node.has_content,
        active: view.selected.as_deref() == Some(node.id.as_str()),
        draggable: view.privileged,
        drop_indicator: drop_target
            .filter(|t| t.target_id == node.id)
            .map(|t| t.position),
    });
    if expanded {
        for child in &node.children {
            flatten_visible(child, depth + 1, view, drop_target, rows);
        }
    }
}

/// Plain-text outline of the rendered rows, used by the terminal front end.
pub fn outline(rows: &[RenderRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let toggle = match row.toggle {
            Toggle::None => ' ',
            Toggle::Expanded => '▼',
            Toggle::Collapsed => '▶',
        };
        let dot = if row.has_content { '●' } else { '○' };
        let marker = if row.active { " *" } else { "" };
        out.push_str(&format!(
            "{}{} {} {}{}  [{}]\n",
            "  ".repeat(row.depth),
            toggle,
            dot,
            row.name,
            marker,
            row.id
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, content: bool, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            id: id.into(),
            name: format!("Doc {id}"),
            has_content: content,
            children,
        }
    }

    fn model() -> TreeModel {
        TreeModel::new(vec![
            node("a", false, vec![node("a1", true, vec![]), node("a2", true, vec![])]),
            node("b", true, vec![node("b1", false, vec![])]),
        ])
    }

    fn seeded_view(model: &TreeModel, privileged: bool) -> ViewState {
        let mut view = ViewState::new(privileged);
        view.retain_known(model);
        view
    }

    #[test]
    fn new_folders_start_expanded() {
        let model = model();
        let rows = render(&model, &seeded_view(&model, false), None);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a1", "a2", "b", "b1"]);
        assert_eq!(rows[0].toggle, Toggle::Expanded);
        assert_eq!(rows[1].toggle, Toggle::None);
        assert_eq!(rows[1].depth, 1);
        assert!(rows[1].has_content);
        assert!(!rows[0].draggable);
    }

    #[test]
    fn collapsed_children_are_hidden() {
        let model = model();
        let mut view = seeded_view(&model, true);
        view.toggle("a");
        let rows = render(&model, &view, None);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].toggle, Toggle::Collapsed);
        assert!(rows.iter().all(|r| r.draggable));
    }

    #[test]
    fn selection_and_drop_indicator() {
        let model = model();
        let mut view = seeded_view(&model, true);
        view.selected = Some("a2".into());
        let target = DropTarget {
            target_id: "b".into(),
            position: DropPosition::Before,
        };
        let rows = render(&model, &view, Some(&target));
        assert!(rows.iter().find(|r| r.id == "a2").unwrap().active);
        assert_eq!(rows.iter().filter(|r| r.active).count(), 1);
        assert_eq!(
            rows.iter().find(|r| r.id == "b").unwrap().drop_indicator,
            Some(DropPosition::Before)
        );
    }

    #[test]
    fn render_is_deterministic() {
        let model = model();
        let view = seeded_view(&model, true);
        assert_eq!(render(&model, &view, None), render(&model, &view, None));
    }

    #[test]
    fn expansion_survives_replacement() {
        let mut model = model();
        let mut view = seeded_view(&model, true);
        view.toggle("b");
        view.selected = Some("b1".into());

        // a2 moves under b; b1 is deleted.
        model.replace(vec![
            node("a", false, vec![node("a1", true, vec![])]),
            node("b", true, vec![node("a2", true, vec![])]),
        ]);
        view.retain_known(&model);

        assert!(view.is_expanded("a"));
        assert!(!view.is_expanded("b"), "user collapse must survive refetch");
        assert_eq!(view.selected, None);
        let rows = render(&model, &view, None);
        assert_eq!(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "a1", "b"]);
    }

    #[test]
    fn leaf_that_gains_children_expands() {
        let mut model = model();
        let mut view = seeded_view(&model, true);
        view.toggle("a");

        // a1 dropped inside the leaf b1.
        model.replace(vec![
            node("a", false, vec![node("a2", true, vec![])]),
            node("b", true, vec![node("b1", false, vec![node("a1", true, vec![])])]),
        ]);
        view.retain_known(&model);

        assert!(view.is_expanded("b1"));
        assert!(!view.is_expanded("a"));
        let ids: Vec<_> = render(&model, &view, None).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "b1", "a1"]);
    }

    #[test]
    fn outline_marks_state() {
        let model = model();
        let mut view = seeded_view(&model, false);
        view.selected = Some("a1".into());
        let text = outline(&render(&model, &view, None));
        assert!(text.starts_with("▼ ○ Doc a  [a]\n"));
        assert!(text.contains("  ● Doc a1 *  [a1]\n"));
    }
}
