//! MCP tool parameter structs with schemars-derived JSON schemas.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchDocumentsParams {
    #[schemars(description = "Free-text query to search for")]
    pub query: String,
    #[schemars(description = "Maximum number of results to return (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NodeIdParams {
    #[schemars(description = "Node id (a UUID for experience boxes, a slug for lexicon entries)")]
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDirectoryParams {
    #[schemars(description = "Root path to list Markdown files under, recursively")]
    pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InjectTagsParams {
    #[schemars(description = "Node id to append inline tags to")]
    pub id: String,
    #[schemars(description = "Tag names to insert as `[Tag: <name>]` markers")]
    pub tags: Vec<String>,
}
