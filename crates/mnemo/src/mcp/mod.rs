// crates/mnemo/src/mcp/mod.rs
// Host-facing MCP tool surface: a thin #[tool_router] wrapper over
// Lifecycle, with ServerHandler's list_tools/call_tool delegating to the
// ToolRouter. memory_forget carries the richer disambiguation policy.

mod tools;

use crate::lifecycle::Lifecycle;
use rmcp::{
    ErrorData, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use serde::Deserialize;
use std::sync::Arc;

pub use tools::{ForgetOutcome, SearchHit};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MemorySearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub user_id: Option<String>,
    #[schemars(description = "session | long_term | all, default all")]
    pub scope: Option<String>,
    #[schemars(description = "also search the cold archive")]
    pub deep: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MemoryStoreRequest {
    pub text: String,
    pub user_id: Option<String>,
    #[serde(default = "default_true")]
    pub long_term: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MemoryGetRequest {
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MemoryListRequest {
    pub user_id: Option<String>,
    pub scope: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MemoryForgetRequest {
    pub query: Option<String>,
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub scope: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub delete_all: bool,
}

/// MCP server state: a thin wrapper over [`Lifecycle`] exposing the six
/// host-facing memory operations.
#[derive(Clone)]
pub struct MnemoServer {
    pub lifecycle: Arc<Lifecycle>,
    tool_router: ToolRouter<Self>,
}

impl MnemoServer {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl MnemoServer {
    #[tool(description = "Semantic search over stored memories. Returns a text preview and structured hits.")]
    async fn memory_search(
        &self,
        Parameters(req): Parameters<MemorySearchRequest>,
    ) -> Result<String, String> {
        tools::memory_search(self, req).await
    }

    #[tool(description = "Store a durable memory, deduping against existing ones.")]
    async fn memory_store(
        &self,
        Parameters(req): Parameters<MemoryStoreRequest>,
    ) -> Result<String, String> {
        tools::memory_store(self, req).await
    }

    #[tool(description = "Fetch a single memory by id.")]
    async fn memory_get(
        &self,
        Parameters(req): Parameters<MemoryGetRequest>,
    ) -> Result<String, String> {
        tools::memory_get(self, req).await
    }

    #[tool(description = "List memories for a user, optionally scoped to a session.")]
    async fn memory_list(
        &self,
        Parameters(req): Parameters<MemoryListRequest>,
    ) -> Result<String, String> {
        tools::memory_list(self, req).await
    }

    #[tool(description = "Delete a memory by id, by query match, or in bulk.")]
    async fn memory_forget(
        &self,
        Parameters(req): Parameters<MemoryForgetRequest>,
    ) -> Result<String, String> {
        tools::memory_forget(self, req).await
    }

    #[tool(description = "Formatted snapshot of store size, archive size, and write-queue counters.")]
    async fn memory_stats(&self) -> Result<String, String> {
        tools::memory_stats(self).await
    }
}

impl ServerHandler for MnemoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "mnemo".into(),
                title: Some("mnemo - long-term memory for AI hosts".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "mnemo provides durable cross-session memory: search, store, list, fetch, and forget facts.".into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }
}
