use crate::config::ClientConfig;
use crate::error::{ClientError, Result, GENERIC_FAILURE};
use crate::models::{
    validate_forest, ChatRequest, CreateNodeRequest, Document, ErrorDetail, MoveRequest, RenameNodeRequest,
    TreeNode, WireNode,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Response};
use std::time::Instant;

/// Operations the workspace needs from the tree service.
#[async_trait]
pub trait TreeService: Send + Sync {
    async fn fetch_tree(&self) -> Result<Vec<TreeNode>>;
    async fn move_node(&self, request: &MoveRequest) -> Result<()>;
    async fn create_node(&self, parent_id: Option<&str>, name: &str) -> Result<()>;
    async fn rename_node(&self, id: &str, name: &str) -> Result<()>;
    async fn delete_node(&self, id: &str) -> Result<()>;
}

/// HTTP client for the knowledge-base REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let cookies: Vec<String> = [
            ("knowhub_session", config.session_token.as_deref()),
            ("knowhub_user", config.user_token.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{name}={v}")))
        .collect();
        if !cookies.is_empty() {
            let value = HeaderValue::from_str(&cookies.join("; "))
                .map_err(|_| ClientError::InvalidConfig("session token is not a valid header value".into()))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder().default_headers(headers).build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::InvalidConfig(format!("base URL must be http(s): {base_url}")));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api{}", self.base_url, endpoint)
    }

    pub async fn fetch_document(&self, id: &str) -> Result<Document> {
        debug!("Fetching document '{}'", id);
        let response = self.client.get(self.url(&format!("/doc/{id}"))).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Opens the chat stream. The response is returned as-is, non-2xx
    /// included, so the caller can tell a quota rejection from a stream.
    pub async fn open_chat(&self, request: &ChatRequest) -> Result<Response> {
        debug!("Opening chat stream for doc '{}'", request.doc_name);
        let response = self.client.post(self.url("/ai/chat")).json(request).send().await?;
        Ok(response)
    }
}

/// Converts a non-2xx response into `ClientError::Status`, reading `detail`
/// from the JSON body when there is one.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = read_error_detail(response).await;
    Err(ClientError::Status {
        status,
        detail: detail.unwrap_or_else(|| GENERIC_FAILURE.to_string()),
    })
}

/// `detail` from an error body, if the body is JSON and carries one.
pub async fn read_error_detail(response: Response) -> Option<String> {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorDetail>(&body)
        .ok()
        .and_then(|e| e.detail)
        .filter(|d| !d.trim().is_empty())
}

#[async_trait]
impl TreeService for ApiClient {
    async fn fetch_tree(&self) -> Result<Vec<TreeNode>> {
        info!("Fetching tree from {}", self.base_url);
        let start_time = Instant::now();
        let response = check_status(self.client.get(self.url("/tree")).send().await?).await?;
        let wire: Vec<WireNode> = response.json().await?;
        let forest = validate_forest(wire).map_err(|e| {
            warn!("Rejected tree payload: {}", e);
            ClientError::InvalidTree(e)
        })?;
        info!("Fetched {} root nodes in {:.2?}.", forest.len(), start_time.elapsed());
        Ok(forest)
    }

    async fn move_node(&self, request: &MoveRequest) -> Result<()> {
        info!(
            "Requesting move of '{}' {} '{}'",
            request.node_id, request.position, request.target_id
        );
        let response = self.client.post(self.url("/tree/move")).json(request).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn create_node(&self, parent_id: Option<&str>, name: &str) -> Result<()> {
        debug!("Creating node '{}' under {:?}", name, parent_id);
        let body = CreateNodeRequest {
            parent_id: parent_id.map(String::from),
            name: name.to_string(),
        };
        let response = self.client.post(self.url("/node")).json(&body).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn rename_node(&self, id: &str, name: &str) -> Result<()> {
        debug!("Renaming node '{}' to '{}'", id, name);
        let body = RenameNodeRequest {
            id: id.to_string(),
            name: name.to_string(),
        };
        let response = self.client.put(self.url("/node/rename")).json(&body).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        debug!("Deleting node '{}'", id);
        let response = self.client.delete(self.url(&format!("/node/{id}"))).send().await?;
        check_status(response).await?;
        Ok(())
    }
}
