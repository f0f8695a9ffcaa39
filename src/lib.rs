//! Client core for the KnowHub knowledge base: the document tree with
//! drag-and-drop reordering, and streamed AI chat replies.

pub mod api;
pub mod chat;
pub mod config;
pub mod drag;
pub mod error;
pub mod models;
pub mod renderer;
pub mod stream;
pub mod tree_model;
pub mod workspace;

pub use api::{ApiClient, TreeService};
pub use chat::{ChatSession, MessageHandle, MessageSnapshot};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use models::{Document, DropPosition, TreeNode};
pub use stream::{MemberLevel, Phase, StreamMessage};
pub use tree_model::TreeModel;
pub use workspace::{MoveOutcome, Workspace};
