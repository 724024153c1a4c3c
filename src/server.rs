use std::fmt::Write as _;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use crate::command::{
    resolve_explicit, DataKind, DeleteParams, DeleteTarget, GetParams, GetRequest, InfoParams,
    KeyArg, ListParams, SetParams, SetRequest,
};
use crate::error::ToolError;

/// Maximum number of SCAN iterations as a safety valve
const MAX_SCAN_ITERATIONS: usize = 1000;

/// Placeholder written by LSET before LREM when deleting a list element by
/// position; Redis has no direct indexed delete.
const LIST_DELETE_SENTINEL: &str = "__redis_mcp_server_deleted__";

#[derive(Clone)]
pub struct RedisToolServer {
    conn: redis::aio::ConnectionManager,
    allow_write: bool,
    scan_count: u32,
    tool_router: ToolRouter<Self>,
}

impl RedisToolServer {
    pub fn new(conn: redis::aio::ConnectionManager, allow_write: bool, scan_count: u32) -> Self {
        Self {
            conn,
            allow_write,
            scan_count,
            tool_router: Self::tool_router(),
        }
    }

    fn check_write(&self, operation: &str) -> Result<(), ToolError> {
        if !self.allow_write {
            return Err(ToolError::ReadOnly(format!(
                "'{}' requires --allow-write flag",
                operation
            )));
        }
        Ok(())
    }

    /// Validate that a pattern doesn't contain null bytes.
    fn validate_pattern(pattern: &str) -> Result<(), ToolError> {
        if pattern.contains('\0') {
            return Err(ToolError::MalformedInput(
                "Pattern must not contain null bytes".to_string(),
            ));
        }
        Ok(())
    }

    fn require_key(key: &str) -> Result<(), ToolError> {
        if key.trim().is_empty() {
            return Err(ToolError::MalformedInput(
                "Error: Empty key provided".to_string(),
            ));
        }
        Ok(())
    }

    /// Live type of a key, re-read on every call since the type is
    /// caller-mutable between requests. `None` means the key is absent;
    /// types outside the six supported kinds are rejected.
    async fn live_kind(
        conn: &mut redis::aio::ConnectionManager,
        key: &str,
    ) -> Result<Option<DataKind>, ToolError> {
        let type_name: String = redis::cmd("TYPE").arg(key).query_async(conn).await?;
        if type_name == "none" {
            return Ok(None);
        }
        match DataKind::parse(&type_name) {
            Some(kind) => Ok(Some(kind)),
            None => Err(ToolError::UnsupportedType(format!(
                "Unsupported Redis data type for key: {key} (Type: {type_name})"
            ))),
        }
    }
}

// -- Public methods for testability --

impl RedisToolServer {
    pub async fn do_set(&self, params: SetParams) -> Result<String, ToolError> {
        self.check_write("set")?;
        Self::require_key(&params.key)?;
        let mut conn = self.conn.clone();

        // Explicit type beats the live type; the live type beats inference.
        let kind = match params.kind.as_deref() {
            Some(name) => resolve_explicit(name)?,
            None => match Self::live_kind(&mut conn, &params.key).await? {
                Some(kind) => kind,
                None => params.inferred_kind(),
            },
        };

        match SetRequest::build(kind, params)? {
            SetRequest::String {
                key,
                value,
                expire_seconds,
            } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key).arg(&value);
                if let Some(seconds) = expire_seconds {
                    cmd.arg("EX").arg(seconds);
                }
                let _: () = cmd.query_async(&mut conn).await?;
                Ok(format!("Successfully set key: {key}"))
            }
            SetRequest::ListPush { key, value, append } => {
                let command = if append { "RPUSH" } else { "LPUSH" };
                let length: i64 = redis::cmd(command)
                    .arg(&key)
                    .arg(&value)
                    .query_async(&mut conn)
                    .await?;
                Ok(format!(
                    "Successfully pushed value to list: {key} (new length: {length})"
                ))
            }
            SetRequest::ListSet { key, index, value } => {
                let _: () = redis::cmd("LSET")
                    .arg(&key)
                    .arg(index)
                    .arg(&value)
                    .query_async(&mut conn)
                    .await?;
                Ok(format!(
                    "Successfully set list element at index {index} for key: {key}"
                ))
            }
            SetRequest::SetAdd { key, member } => {
                let added: i64 = redis::cmd("SADD")
                    .arg(&key)
                    .arg(&member)
                    .query_async(&mut conn)
                    .await?;
                if added > 0 {
                    Ok(format!("Successfully added new member to set: {key}"))
                } else {
                    Ok(format!("Member already exists in set: {key}"))
                }
            }
            SetRequest::ZSetAdd { key, member, score } => {
                let added: i64 = redis::cmd("ZADD")
                    .arg(&key)
                    .arg(score)
                    .arg(&member)
                    .query_async(&mut conn)
                    .await?;
                if added > 0 {
                    Ok(format!(
                        "Successfully added member to sorted set: {key} (score: {score})"
                    ))
                } else {
                    Ok(format!(
                        "Updated score of existing member in sorted set: {key} (score: {score})"
                    ))
                }
            }
            SetRequest::HashSet { key, field, value } => {
                let _: i64 = redis::cmd("HSET")
                    .arg(&key)
                    .arg(&field)
                    .arg(&value)
                    .query_async(&mut conn)
                    .await?;
                Ok(format!(
                    "Successfully set hash field '{field}' for key: {key}"
                ))
            }
            SetRequest::StreamAdd { key, fields } => {
                let mut cmd = redis::cmd("XADD");
                cmd.arg(&key).arg("*");
                for (field, value) in &fields {
                    cmd.arg(field).arg(value);
                }
                let id: String = cmd.query_async(&mut conn).await?;
                Ok(format!(
                    "Successfully appended record to stream: {key} (id: {id})"
                ))
            }
        }
    }

    pub async fn do_get(&self, params: GetParams) -> Result<String, ToolError> {
        Self::require_key(&params.key)?;
        let mut conn = self.conn.clone();

        let live = Self::live_kind(&mut conn, &params.key).await?;
        let Some(live) = live else {
            return Err(ToolError::NotFound(format!(
                "Key not found: {}",
                params.key
            )));
        };
        let kind = match params.kind.as_deref() {
            Some(name) => resolve_explicit(name)?,
            None => live,
        };

        match GetRequest::build(kind, params)? {
            GetRequest::StringValue { key } => {
                let value: Option<String> =
                    redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
                value.ok_or_else(|| {
                    ToolError::NotFound(format!(
                        "Key exists but value could not be retrieved: {key}"
                    ))
                })
            }
            GetRequest::ListIndex { key, index } => {
                let element: Option<String> = redis::cmd("LINDEX")
                    .arg(&key)
                    .arg(index)
                    .query_async(&mut conn)
                    .await?;
                element.ok_or_else(|| {
                    ToolError::NotFound(format!(
                        "Index out of range or null element at index: {index}"
                    ))
                })
            }
            GetRequest::ListAll { key } => {
                let elements: Vec<String> = redis::cmd("LRANGE")
                    .arg(&key)
                    .arg(0)
                    .arg(-1)
                    .query_async(&mut conn)
                    .await?;
                if elements.is_empty() {
                    return Ok(format!("List is empty for key: {key}"));
                }
                let mut out = format!("List contents for key: {key}\n");
                for (i, element) in elements.iter().enumerate() {
                    let _ = writeln!(out, "{i}: {element}");
                }
                Ok(out)
            }
            GetRequest::SetMembers { key } => {
                let members: Vec<String> = redis::cmd("SMEMBERS")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await?;
                if members.is_empty() {
                    return Ok(format!("Set is empty for key: {key}"));
                }
                let mut out = format!("Set contents for key: {key}\n");
                for member in &members {
                    let _ = writeln!(out, "{member}");
                }
                Ok(out)
            }
            GetRequest::ZSetScore { key, member } => {
                let score: Option<f64> = redis::cmd("ZSCORE")
                    .arg(&key)
                    .arg(&member)
                    .query_async(&mut conn)
                    .await?;
                match score {
                    Some(score) => Ok(format!("Score of '{member}': {score}")),
                    None => Err(ToolError::NotFound(format!(
                        "Member not found in sorted set: {member}"
                    ))),
                }
            }
            GetRequest::ZSetAll { key } => {
                let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
                    .arg(&key)
                    .arg(0)
                    .arg(-1)
                    .arg("WITHSCORES")
                    .query_async(&mut conn)
                    .await?;
                if members.is_empty() {
                    return Ok(format!("Sorted set is empty for key: {key}"));
                }
                let mut out = format!("Sorted set contents for key: {key}\n");
                for (member, score) in &members {
                    let _ = writeln!(out, "{member}: {score}");
                }
                Ok(out)
            }
            GetRequest::HashField { key, field } => {
                let value: Option<String> = redis::cmd("HGET")
                    .arg(&key)
                    .arg(&field)
                    .query_async(&mut conn)
                    .await?;
                value.ok_or_else(|| {
                    ToolError::NotFound(format!("Hash field not found: {field} in key: {key}"))
                })
            }
            GetRequest::HashAll { key } => {
                let entries: Vec<(String, String)> = redis::cmd("HGETALL")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await?;
                if entries.is_empty() {
                    return Ok(format!("Hash is empty for key: {key}"));
                }
                let mut out = format!("Hash contents for key: {key}\n");
                for (field, value) in &entries {
                    let _ = writeln!(out, "{field}: {value}");
                }
                Ok(out)
            }
            GetRequest::StreamRead { key, count } => {
                let records: Vec<(String, Vec<(String, String)>)> = redis::cmd("XRANGE")
                    .arg(&key)
                    .arg("-")
                    .arg("+")
                    .arg("COUNT")
                    .arg(count)
                    .query_async(&mut conn)
                    .await?;
                if records.is_empty() {
                    return Ok(format!(
                        "Stream is empty or no records found for key: {key}"
                    ));
                }
                let mut out = format!("Stream contents for key: {key}\n");
                for (id, fields) in &records {
                    let _ = writeln!(out, "ID: {id}");
                    let rendered: Vec<String> = fields
                        .iter()
                        .map(|(field, value)| format!("{field}={value}"))
                        .collect();
                    let _ = writeln!(out, "Values: {{{}}}\n", rendered.join(", "));
                }
                Ok(out)
            }
        }
    }

    pub async fn do_delete(&self, params: DeleteParams) -> Result<String, ToolError> {
        self.check_write("delete")?;
        let mut conn = self.conn.clone();

        let key = match params.key.clone() {
            KeyArg::Many(keys) => {
                let keys: Vec<String> =
                    keys.into_iter().filter(|k| !k.trim().is_empty()).collect();
                if keys.is_empty() {
                    return Err(ToolError::MalformedInput(
                        "Error: No valid keys provided".to_string(),
                    ));
                }
                // One multi-key DEL round trip, not one per key.
                let deleted: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                return Ok(format!("Successfully deleted {deleted} keys"));
            }
            KeyArg::One(key) => key,
        };
        Self::require_key(&key)?;

        // Only consult the live type when a qualifier needs it; a bare
        // whole-key delete works for any type.
        let has_qualifier = params.field.is_some()
            || params.member.is_some()
            || params.index.is_some()
            || params.value.is_some()
            || params.id.is_some();
        let kind = match params.kind.as_deref() {
            Some(name) => Some(resolve_explicit(name)?),
            None if has_qualifier => Self::live_kind(&mut conn, &key).await?,
            None => None,
        };

        match DeleteTarget::build(kind, key, params)? {
            DeleteTarget::WholeKey { key } => {
                let deleted: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
                if deleted > 0 {
                    Ok(format!("Successfully deleted key: {key}"))
                } else {
                    Err(ToolError::NotFound(format!("Key not found: {key}")))
                }
            }
            DeleteTarget::Fallback {
                key,
                qualifier,
                actual,
            } => {
                tracing::warn!(
                    key = %key,
                    qualifier,
                    actual = %actual,
                    "delete qualifier does not match key type, deleting whole key"
                );
                let deleted: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
                if deleted > 0 {
                    Ok(format!(
                        "Key '{key}' has type {actual}; '{qualifier}' does not apply. Deleted entire key instead"
                    ))
                } else {
                    Err(ToolError::NotFound(format!("Key not found: {key}")))
                }
            }
            DeleteTarget::HashField { key, field } => {
                let removed: i64 = redis::cmd("HDEL")
                    .arg(&key)
                    .arg(&field)
                    .query_async(&mut conn)
                    .await?;
                if removed > 0 {
                    Ok(format!(
                        "Successfully deleted field '{field}' from hash: {key}"
                    ))
                } else {
                    Err(ToolError::NotFound(format!(
                        "Hash field not found: {field} in key: {key}"
                    )))
                }
            }
            DeleteTarget::SetMember { key, member } => {
                let removed: i64 = redis::cmd("SREM")
                    .arg(&key)
                    .arg(&member)
                    .query_async(&mut conn)
                    .await?;
                if removed > 0 {
                    Ok(format!("Successfully removed member from set: {key}"))
                } else {
                    Err(ToolError::NotFound(format!(
                        "Member not found in set: {member}"
                    )))
                }
            }
            DeleteTarget::ZSetMember { key, member } => {
                let removed: i64 = redis::cmd("ZREM")
                    .arg(&key)
                    .arg(&member)
                    .query_async(&mut conn)
                    .await?;
                if removed > 0 {
                    Ok(format!("Successfully removed member from sorted set: {key}"))
                } else {
                    Err(ToolError::NotFound(format!(
                        "Member not found in sorted set: {member}"
                    )))
                }
            }
            DeleteTarget::ListIndex { key, index } => {
                let length: i64 = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await?;
                if index < -length || index >= length {
                    return Err(ToolError::NotFound(format!("Index out of range: {index}")));
                }
                // LSET to a sentinel, then LREM the sentinel; there is no
                // direct indexed delete.
                let _: () = redis::cmd("LSET")
                    .arg(&key)
                    .arg(index)
                    .arg(LIST_DELETE_SENTINEL)
                    .query_async(&mut conn)
                    .await?;
                let _: i64 = redis::cmd("LREM")
                    .arg(&key)
                    .arg(1)
                    .arg(LIST_DELETE_SENTINEL)
                    .query_async(&mut conn)
                    .await?;
                Ok(format!(
                    "Successfully deleted list element at index {index} for key: {key}"
                ))
            }
            DeleteTarget::ListValue { key, value, count } => {
                let removed: i64 = redis::cmd("LREM")
                    .arg(&key)
                    .arg(count)
                    .arg(&value)
                    .query_async(&mut conn)
                    .await?;
                Ok(format!(
                    "Removed {removed} occurrence(s) of value from list: {key}"
                ))
            }
            DeleteTarget::StreamRecord { key, id } => {
                let removed: i64 = redis::cmd("XDEL")
                    .arg(&key)
                    .arg(&id)
                    .query_async(&mut conn)
                    .await?;
                if removed > 0 {
                    Ok(format!(
                        "Successfully deleted record {id} from stream: {key}"
                    ))
                } else {
                    Err(ToolError::NotFound(format!(
                        "Record not found in stream: {id}"
                    )))
                }
            }
        }
    }

    pub async fn do_list_keys(&self, params: ListParams) -> Result<String, ToolError> {
        let mut conn = self.conn.clone();
        let pattern = params.pattern.as_deref().unwrap_or("*");

        Self::validate_pattern(pattern)?;

        let batch_size = params.batch_size.unwrap_or(self.scan_count).max(1);
        let limit = params.limit;

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        let mut iterations = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch_size)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            cursor = next_cursor;
            iterations += 1;

            let capped = limit.is_some_and(|limit| keys.len() >= limit);
            if cursor == 0 || capped || iterations >= MAX_SCAN_ITERATIONS {
                break;
            }
        }

        if let Some(limit) = limit {
            keys.truncate(limit);
        }

        if keys.is_empty() {
            Ok("No keys found matching the pattern".to_string())
        } else {
            Ok(format!("Found keys:\n{}", keys.join("\n")))
        }
    }

    pub async fn do_info(&self, params: InfoParams) -> Result<String, ToolError> {
        let mut conn = self.conn.clone();

        let info: String = if let Some(section) = params.section {
            redis::cmd("INFO")
                .arg(&section)
                .query_async(&mut conn)
                .await?
        } else {
            redis::cmd("INFO").query_async(&mut conn).await?
        };

        Ok(info)
    }
}

fn text_result(message: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(message)])
}

// -- MCP tool handlers (thin wrappers) --

#[tool_router]
impl RedisToolServer {
    #[tool(
        name = "set",
        description = "Set a Redis value. Handles string, list, set, zset, hash, and stream keys; the data type comes from an explicit 'type', the live key, or is inferred from the arguments (field => hash, score => zset, index => list, else string)."
    )]
    async fn set(
        &self,
        Parameters(params): Parameters<SetParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.do_set(params)
            .await
            .map(text_result)
            .map_err(|e| e.to_mcp_error())
    }

    #[tool(
        name = "get",
        description = "Get a value by key. Auto-detects the key type and returns the string value, list elements, set members, sorted set scores, hash fields, or stream records."
    )]
    async fn get(
        &self,
        Parameters(params): Parameters<GetParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.do_get(params)
            .await
            .map(text_result)
            .map_err(|e| e.to_mcp_error())
    }

    #[tool(
        name = "delete",
        description = "Delete one or multiple keys, or a single element within a key: a hash field, a set/zset member, a list element by index or value, or a stream record by id."
    )]
    async fn delete(
        &self,
        Parameters(params): Parameters<DeleteParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.do_delete(params)
            .await
            .map(text_result)
            .map_err(|e| e.to_mcp_error())
    }

    #[tool(
        name = "list",
        description = "List keys matching a glob pattern using SCAN (non-blocking, cursor exhausted in batches)."
    )]
    async fn list(
        &self,
        Parameters(params): Parameters<ListParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.do_list_keys(params)
            .await
            .map(text_result)
            .map_err(|e| e.to_mcp_error())
    }

    #[tool(
        name = "info",
        description = "Get Redis server info. Optionally specify a section: memory, stats, keyspace, server, clients, etc."
    )]
    async fn info(
        &self,
        Parameters(params): Parameters<InfoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.do_info(params)
            .await
            .map(text_result)
            .map_err(|e| e.to_mcp_error())
    }
}

#[tool_handler]
impl ServerHandler for RedisToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "redis-mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Redis server. Tools: set (write a value of any data type), \
                 get (read a key, auto-detecting its type), delete (remove keys \
                 or single elements), list (scan keys by pattern), \
                 info (server stats). Write tools require --allow-write."
                    .to_string(),
            ),
        }
    }
}
