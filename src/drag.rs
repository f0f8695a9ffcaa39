use crate::models::{DropPosition, MoveRequest};
use crate::tree_model::TreeModel;
use log::{debug, info, warn};
use std::fmt;

pub const CYCLE_REJECTION: &str = "Cannot move a node into its own descendants";
pub const SELF_REJECTION: &str = "Cannot drop a node onto itself";

/// The pointer target recorded during a drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub target_id: String,
    pub position: DropPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        dragged_id: String,
        target: Option<DropTarget>,
    },
    Committing(MoveRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragError {
    NotPrivileged,
    AlreadyDragging,
}

impl DragError {
    pub fn message(&self) -> &'static str {
        match self {
            DragError::NotPrivileged => "Only administrators can reorder the tree",
            DragError::AlreadyDragging => "A drag is already in progress",
        }
    }
}

impl fmt::Display for DragError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for DragError {}

/// Why a drop was refused locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragRejection {
    OntoItself,
    IntoDescendant,
}

impl DragRejection {
    pub fn message(&self) -> &'static str {
        match self {
            DragRejection::OntoItself => SELF_REJECTION,
            DragRejection::IntoDescendant => CYCLE_REJECTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Nothing to do: no drag was active or no target was recorded.
    NoOp,
    Rejected(DragRejection),
    /// The controller is now committing this move.
    Commit(MoveRequest),
}

/// Drag-and-drop reorder state machine.
///
/// Idle -> Dragging -> Committing -> Idle. Any validation failure returns to
/// Idle without producing a move request.
#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DragState::Idle)
    }

    pub fn dragged_id(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { dragged_id, .. } => Some(dragged_id),
            DragState::Committing(req) => Some(&req.node_id),
            DragState::Idle => None,
        }
    }

    pub fn current_target(&self) -> Option<&DropTarget> {
        match &self.state {
            DragState::Dragging { target, .. } => target.as_ref(),
            _ => None,
        }
    }

    pub fn start(&mut self, node_id: &str, privileged: bool) -> Result<(), DragError> {
        if !privileged {
            debug!("Rejected drag start on '{}': not privileged", node_id);
            return Err(DragError::NotPrivileged);
        }
        if !self.is_idle() {
            warn!("Rejected drag start on '{}': controller is {:?}", node_id, self.state);
            return Err(DragError::AlreadyDragging);
        }
        debug!("Drag started on '{}'", node_id);
        self.state = DragState::Dragging {
            dragged_id: node_id.to_string(),
            target: None,
        };
        Ok(())
    }

    /// Records the hovered row. Returns the resolved position, or `None`
    /// when the event was ignored.
    pub fn hover(&mut self, target_id: &str, y: f64, height: f64) -> Option<DropPosition> {
        let DragState::Dragging { dragged_id, target } = &mut self.state else {
            return None;
        };
        if dragged_id.as_str() == target_id {
            return None;
        }
        let position = DropPosition::from_offset(y, height);
        *target = Some(DropTarget {
            target_id: target_id.to_string(),
            position,
        });
        Some(position)
    }

    /// The pointer left every row; forget the recorded target.
    pub fn leave(&mut self) {
        if let DragState::Dragging { target, .. } = &mut self.state {
            *target = None;
        }
    }

    /// Validates the gesture and, if legal, moves into Committing.
    pub fn drop(&mut self, model: &TreeModel) -> DropOutcome {
        if !matches!(self.state, DragState::Dragging { .. }) {
            return DropOutcome::NoOp;
        }
        let DragState::Dragging { dragged_id, target } = std::mem::take(&mut self.state) else {
            return DropOutcome::NoOp;
        };
        let Some(DropTarget { target_id, position }) = target else {
            debug!("Drop of '{}' with no target, clearing", dragged_id);
            return DropOutcome::NoOp;
        };
        if dragged_id == target_id {
            return DropOutcome::Rejected(DragRejection::OntoItself);
        }
        if model.is_descendant(&dragged_id, &target_id) {
            warn!("Rejected move of '{}' into its descendant '{}'", dragged_id, target_id);
            return DropOutcome::Rejected(DragRejection::IntoDescendant);
        }

        let request = MoveRequest {
            node_id: dragged_id,
            target_id,
            position,
        };
        info!(
            "Committing move of '{}' {} '{}'",
            request.node_id, request.position, request.target_id
        );
        self.state = DragState::Committing(request.clone());
        DropOutcome::Commit(request)
    }

    /// Ends the commit round trip, whatever its result.
    pub fn finish_commit(&mut self) {
        if matches!(self.state, DragState::Committing(_)) {
            self.state = DragState::Idle;
        }
    }

    /// Abandons the gesture without dropping.
    pub fn cancel(&mut self) {
        if matches!(self.state, DragState::Dragging { .. }) {
            debug!("Drag cancelled");
            self.state = DragState::Idle;
        }
    }
}
