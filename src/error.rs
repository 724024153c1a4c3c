use rmcp::model::ErrorData;

/// Failure taxonomy for the Redis tools. Callers match on the variant;
/// the display string is what ends up in front of the user.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("{0}")]
    MalformedInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnsupportedType(String),

    #[error("Write operation rejected: {0}")]
    ReadOnly(String),
}

impl ToolError {
    pub fn to_mcp_error(&self) -> ErrorData {
        match self {
            ToolError::MalformedInput(_)
            | ToolError::NotFound(_)
            | ToolError::UnsupportedType(_)
            | ToolError::ReadOnly(_) => ErrorData::invalid_params(self.to_string(), None),
            ToolError::Redis(_) => ErrorData::internal_error(self.to_string(), None),
        }
    }
}
