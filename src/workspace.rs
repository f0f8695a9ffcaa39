use crate::api::TreeService;
use crate::drag::{DragController, DragError, DropOutcome};
use crate::error::{ClientError, Result};
use crate::models::{DropPosition, MoveRequest, TreeNode};
use crate::renderer::{self, RenderRow, ViewState};
use crate::tree_model::TreeModel;
use log::{info, warn};

/// Result of a completed drop, for the view to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// No drag was active or no target was recorded.
    Ignored,
    Rejected(&'static str),
    Moved(MoveRequest),
    /// The move was accepted but the refetch failed, so the tree shown is
    /// still the pre-move one.
    MovedStale(MoveRequest, String),
    /// The service refused the move; the pre-drag tree is kept.
    Failed(String),
}

/// Client-side state for one knowledge base: the tree, view state and the
/// drag controller, plus the service they sync with.
///
/// During a commit, reads see the pre-move tree until the authoritative
/// refetch replaces it.
pub struct Workspace<S: TreeService> {
    service: S,
    model: TreeModel,
    view: ViewState,
    drag: DragController,
}

impl<S: TreeService> Workspace<S> {
    pub fn new(service: S, privileged: bool) -> Self {
        Self {
            service,
            model: TreeModel::default(),
            view: ViewState::new(privileged),
            drag: DragController::new(),
        }
    }

    pub fn model(&self) -> &TreeModel {
        &self.model
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn is_privileged(&self) -> bool {
        self.view.privileged
    }

    pub fn find_by_id(&self, id: &str) -> Option<&TreeNode> {
        self.model.find_by_id(id)
    }

    pub fn is_descendant(&self, ancestor_id: &str, candidate_id: &str) -> bool {
        self.model.is_descendant(ancestor_id, candidate_id)
    }

    /// Fetches the authoritative tree and replaces the model with it.
    /// On failure the current tree is left as it was.
    pub async fn reload(&mut self) -> Result<()> {
        let forest = self.service.fetch_tree().await?;
        self.model.replace(forest);
        self.view.retain_known(&self.model);
        info!("Tree reloaded with {} nodes", self.model.len());
        Ok(())
    }

    pub fn render(&self) -> Vec<RenderRow> {
        renderer::render(&self.model, &self.view, self.drag.current_target())
    }

    /// Selects a node and makes sure its children are visible.
    pub fn select(&mut self, id: &str) -> bool {
        let Some(node) = self.model.find_by_id(id) else {
            return false;
        };
        if node.has_children() {
            self.view.expand(id);
        }
        self.view.selected = Some(id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        self.view.selected = None;
    }

    pub fn toggle(&mut self, id: &str) {
        if self.model.find_by_id(id).is_some_and(TreeNode::has_children) {
            self.view.toggle(id);
        }
    }

    pub fn drag_start(&mut self, id: &str) -> std::result::Result<(), DragError> {
        self.drag.start(id, self.view.privileged)
    }

    pub fn drag_over(&mut self, target_id: &str, y: f64, height: f64) -> Option<DropPosition> {
        self.drag.hover(target_id, y, height)
    }

    pub fn drag_leave(&mut self) {
        self.drag.leave();
    }

    pub fn drag_cancel(&mut self) {
        self.drag.cancel();
    }

    /// Finishes a gesture: validates it, sends the move, and refetches on
    /// success.
    pub async fn drop(&mut self) -> MoveOutcome {
        let request = match self.drag.drop(&self.model) {
            DropOutcome::NoOp => return MoveOutcome::Ignored,
            DropOutcome::Rejected(reason) => return MoveOutcome::Rejected(reason.message()),
            DropOutcome::Commit(request) => request,
        };
        let outcome = self.commit(request).await;
        self.drag.finish_commit();
        outcome
    }

    async fn commit(&mut self, request: MoveRequest) -> MoveOutcome {
        if let Err(e) = self.service.move_node(&request).await {
            warn!("Move of '{}' failed: {}", request.node_id, e);
            return MoveOutcome::Failed(e.user_message());
        }
        if let Err(e) = self.reload().await {
            warn!("Refetch after move failed: {}", e);
            return MoveOutcome::MovedStale(request, e.user_message());
        }
        MoveOutcome::Moved(request)
    }

    /// Moves a node without a pointer gesture, with the same checks as a drop.
    pub async fn move_node(&mut self, node_id: &str, target_id: &str, position: DropPosition) -> MoveOutcome {
        if let Err(e) = self.drag.start(node_id, self.view.privileged) {
            return MoveOutcome::Rejected(e.message());
        }
        let (y, height) = match position {
            DropPosition::Before => (0.0, 1.0),
            DropPosition::Inside => (0.5, 1.0),
            DropPosition::After => (1.0, 1.0),
        };
        if node_id == target_id {
            self.drag.cancel();
            return MoveOutcome::Rejected(crate::drag::SELF_REJECTION);
        }
        self.drag.hover(target_id, y, height);
        self.drop().await
    }

    pub async fn create_node(&mut self, parent_id: Option<&str>, name: &str) -> Result<()> {
        let name = required_name(name)?;
        self.service.create_node(parent_id, name).await?;
        if let Some(parent) = parent_id {
            self.view.expand(parent);
        }
        self.reload().await
    }

    pub async fn rename_node(&mut self, id: &str, name: &str) -> Result<()> {
        let name = required_name(name)?;
        self.service.rename_node(id, name).await?;
        self.reload().await
    }

    pub async fn delete_node(&mut self, id: &str) -> Result<()> {
        self.service.delete_node(id).await?;
        self.reload().await
    }
}

fn required_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::EmptyName);
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    fn node(id: &str, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            id: id.into(),
            name: id.into(),
            has_content: false,
            children,
        }
    }

    /// Service double: serves a queue of trees (`None` fails the fetch;
    /// the last entry repeats) and records every mutation.
    struct FakeService {
        trees: Mutex<Vec<Option<Vec<TreeNode>>>>,
        moves: Mutex<Vec<MoveRequest>>,
        calls: Mutex<Vec<String>>,
        fail_moves: bool,
    }

    impl FakeService {
        fn new(trees: Vec<Vec<TreeNode>>, fail_moves: bool) -> Self {
            Self::with_fetches(trees.into_iter().map(Some).collect(), fail_moves)
        }

        fn with_fetches(trees: Vec<Option<Vec<TreeNode>>>, fail_moves: bool) -> Self {
            Self {
                trees: Mutex::new(trees),
                moves: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                fail_moves,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TreeService for FakeService {
        async fn fetch_tree(&self) -> Result<Vec<TreeNode>> {
            self.calls.lock().unwrap().push("fetch".into());
            let mut trees = self.trees.lock().unwrap();
            let next = if trees.len() > 1 { trees.remove(0) } else { trees[0].clone() };
            next.ok_or(ClientError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: "tree unavailable".into(),
            })
        }

        async fn move_node(&self, request: &MoveRequest) -> Result<()> {
            self.moves.lock().unwrap().push(request.clone());
            if self.fail_moves {
                return Err(ClientError::Status {
                    status: StatusCode::BAD_REQUEST,
                    detail: "target missing".into(),
                });
            }
            Ok(())
        }

        async fn create_node(&self, parent_id: Option<&str>, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("create {parent_id:?} {name}"));
            Ok(())
        }

        async fn rename_node(&self, id: &str, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("rename {id} {name}"));
            Ok(())
        }

        async fn delete_node(&self, id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {id}"));
            Ok(())
        }
    }

    fn before() -> Vec<TreeNode> {
        vec![node("a", vec![node("a1", vec![])]), node("b", vec![node("b1", vec![])])]
    }

    fn after() -> Vec<TreeNode> {
        vec![node("a", vec![]), node("b", vec![node("b1", vec![]), node("a1", vec![])])]
    }

    #[tokio::test]
    async fn successful_drop_refetches_and_keeps_unrelated_expansion() {
        let mut ws = Workspace::new(FakeService::new(vec![before(), after()], false), true);
        ws.reload().await.unwrap();
        ws.toggle("b");
        assert!(!ws.view().is_expanded("b"));

        ws.drag_start("a1").unwrap();
        assert_eq!(ws.drag_over("b", 10.0, 20.0), Some(DropPosition::Inside));
        let outcome = ws.drop().await;

        assert!(matches!(outcome, MoveOutcome::Moved(ref r) if r.target_id == "b"));
        assert!(ws.drag().is_idle());
        assert_eq!(ws.model().parent_of("a1"), Some("b"));
        assert!(!ws.view().is_expanded("b"), "collapsed branch stays collapsed");
        assert!(ws.view().is_expanded("a"));
    }

    #[tokio::test]
    async fn failed_move_keeps_pre_drag_tree() {
        let mut ws = Workspace::new(FakeService::new(vec![before(), after()], true), true);
        ws.reload().await.unwrap();
        let snapshot = ws.model().clone();

        ws.drag_start("a1").unwrap();
        ws.drag_over("b1", 19.0, 20.0);
        let outcome = ws.drop().await;

        assert_eq!(outcome, MoveOutcome::Failed("target missing".into()));
        assert_eq!(ws.model(), &snapshot);
        assert!(ws.drag().is_idle());
    }

    #[tokio::test]
    async fn cycle_never_reaches_service() {
        let mut ws = Workspace::new(FakeService::new(vec![before()], false), true);
        ws.reload().await.unwrap();
        let outcome = ws.move_node("a", "a1", DropPosition::Inside).await;
        assert_eq!(outcome, MoveOutcome::Rejected(crate::drag::CYCLE_REJECTION));
        assert!(ws.service().moves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_privileged_cannot_drag() {
        let mut ws = Workspace::new(FakeService::new(vec![before()], false), false);
        ws.reload().await.unwrap();
        assert_eq!(ws.drag_start("a1"), Err(DragError::NotPrivileged));
        assert_eq!(ws.drop().await, MoveOutcome::Ignored);
        assert!(ws.render().iter().all(|row| !row.draggable));
    }

    #[tokio::test]
    async fn select_expands_collapsed_folder() {
        let mut ws = Workspace::new(FakeService::new(vec![before()], false), true);
        ws.reload().await.unwrap();
        ws.toggle("a");
        assert!(ws.select("a"));
        assert!(ws.view().is_expanded("a"));
        assert!(!ws.select("nope"));
        assert_eq!(ws.view().selected.as_deref(), Some("a"));
        ws.clear_selection();
        assert_eq!(ws.view().selected, None);
    }

    fn ids(rows: Vec<RenderRow>) -> Vec<String> {
        rows.into_iter().map(|row| row.id).collect()
    }

    #[tokio::test]
    async fn drop_inside_leaf_keeps_moved_node_visible() {
        let moved = vec![node("a", vec![]), node("b", vec![node("b1", vec![node("a1", vec![])])])];
        let mut ws = Workspace::new(FakeService::new(vec![before(), moved], false), true);
        ws.reload().await.unwrap();

        ws.drag_start("a1").unwrap();
        assert_eq!(ws.drag_over("b1", 10.0, 20.0), Some(DropPosition::Inside));
        assert!(matches!(ws.drop().await, MoveOutcome::Moved(_)));

        assert_eq!(ids(ws.render()), vec!["a", "b", "b1", "a1"]);
    }

    #[tokio::test]
    async fn failed_refetch_after_move_is_reported() {
        let service = FakeService::with_fetches(vec![Some(before()), None], false);
        let mut ws = Workspace::new(service, true);
        ws.reload().await.unwrap();

        let outcome = ws.move_node("a1", "b", DropPosition::Inside).await;

        match outcome {
            MoveOutcome::MovedStale(request, reason) => {
                assert_eq!(request.node_id, "a1");
                assert_eq!(reason, "tree unavailable");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(ws.model().parent_of("a1"), Some("a"));
        assert!(ws.drag().is_idle());
    }

    #[tokio::test]
    async fn blank_names_never_reach_service() {
        let mut ws = Workspace::new(FakeService::new(vec![before()], false), true);
        ws.reload().await.unwrap();

        assert!(matches!(ws.create_node(None, "   ").await, Err(ClientError::EmptyName)));
        assert!(matches!(ws.rename_node("a", "").await, Err(ClientError::EmptyName)));
        assert_eq!(ws.service().calls(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn create_under_collapsed_parent_refetches_and_shows_child() {
        let created = vec![node("a", vec![node("a1", vec![]), node("new", vec![])]), node("b", vec![node("b1", vec![])])];
        let mut ws = Workspace::new(FakeService::new(vec![before(), created], false), true);
        ws.reload().await.unwrap();
        ws.toggle("a");
        assert_eq!(ids(ws.render()), vec!["a", "b", "b1"]);

        ws.create_node(Some("a"), "  new  ").await.unwrap();

        assert_eq!(ws.service().calls(), vec!["fetch", "create Some(\"a\") new", "fetch"]);
        assert_eq!(ws.model().parent_of("new"), Some("a"));
        assert_eq!(ids(ws.render()), vec!["a", "a1", "new", "b", "b1"]);
    }

    #[tokio::test]
    async fn rename_and_delete_refetch() {
        let mut renamed = before();
        renamed[1].name = "Bee".into();
        let deleted = vec![node("a", vec![node("a1", vec![])])];
        let mut ws = Workspace::new(FakeService::new(vec![before(), renamed, deleted], false), true);
        ws.reload().await.unwrap();
        ws.select("b1");

        ws.rename_node("b", " Bee ").await.unwrap();
        assert_eq!(ws.find_by_id("b").unwrap().name, "Bee");

        ws.delete_node("b").await.unwrap();
        assert!(ws.find_by_id("b").is_none());
        assert_eq!(ws.view().selected, None);
        assert_eq!(
            ws.service().calls(),
            vec!["fetch", "rename b Bee", "fetch", "delete b", "fetch"]
        );
    }
}
