use std::collections::BTreeMap;
use std::fmt;

use rmcp::schemars;
use serde::Deserialize;

use crate::error::ToolError;

/// The closed set of Redis data types the tools dispatch over. Matches on
/// this enum are exhaustive, so a new variant forces every handler to be
/// extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
}

impl DataKind {
    /// Parse a `TYPE` reply or an explicit `type` argument. Returns `None`
    /// for `"none"` and anything else outside the six supported kinds.
    pub fn parse(name: &str) -> Option<DataKind> {
        match name {
            "string" => Some(DataKind::String),
            "list" => Some(DataKind::List),
            "set" => Some(DataKind::Set),
            "zset" => Some(DataKind::ZSet),
            "hash" => Some(DataKind::Hash),
            "stream" => Some(DataKind::Stream),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::String => "string",
            DataKind::List => "list",
            DataKind::Set => "set",
            DataKind::ZSet => "zset",
            DataKind::Hash => "hash",
            DataKind::Stream => "stream",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve an explicit `type` argument, rejecting unknown names.
pub fn resolve_explicit(name: &str) -> Result<DataKind, ToolError> {
    DataKind::parse(name).ok_or_else(|| {
        ToolError::UnsupportedType(format!("Unsupported Redis data type: {name}"))
    })
}

/// One key or several; `delete` accepts both.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum KeyArg {
    One(String),
    Many(Vec<String>),
}

/// A plain string value, or a field map for stream records.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum ValueArg {
    Text(String),
    Map(BTreeMap<String, String>),
}

// -- Tool parameter types --

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetParams {
    #[schemars(description = "Key name to write")]
    pub key: String,

    #[schemars(description = "Value to store: a string, or a field map for stream records")]
    #[serde(default)]
    pub value: Option<ValueArg>,

    #[schemars(
        description = "Explicit data type: string, list, set, zset, hash, stream. Taken from the live key or inferred from the other arguments when omitted"
    )]
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[schemars(description = "Hash field name (implies a hash for a new key)")]
    #[serde(default)]
    pub field: Option<String>,

    #[schemars(description = "Set or sorted set member; 'value' is used when omitted")]
    #[serde(default)]
    pub member: Option<String>,

    #[schemars(description = "Sorted set score (implies a zset for a new key)")]
    #[serde(default)]
    pub score: Option<f64>,

    #[schemars(description = "List position to overwrite (implies a list for a new key)")]
    #[serde(default)]
    pub index: Option<i64>,

    #[schemars(description = "Push to the right end of a list instead of the left")]
    #[serde(default)]
    pub append: bool,

    #[schemars(description = "Expiration in seconds (string keys only)")]
    #[serde(default, rename = "expireSeconds")]
    pub expire_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetParams {
    #[schemars(description = "Key name to read")]
    pub key: String,

    #[schemars(description = "Explicit data type, overriding the live key type")]
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[schemars(description = "Hash field to read; all fields are returned when omitted")]
    #[serde(default)]
    pub field: Option<String>,

    #[schemars(description = "Sorted set member whose score to read; all members when omitted")]
    #[serde(default)]
    pub member: Option<String>,

    #[schemars(description = "List position to read; the whole list when omitted")]
    #[serde(default)]
    pub index: Option<i64>,

    #[schemars(description = "Maximum stream records to read (default: 10)")]
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteParams {
    #[schemars(description = "Key name, or a list of key names to delete in one call")]
    pub key: KeyArg,

    #[schemars(description = "Explicit data type, overriding the live key type")]
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[schemars(description = "Hash field to remove")]
    #[serde(default)]
    pub field: Option<String>,

    #[schemars(description = "Set or sorted set member to remove")]
    #[serde(default)]
    pub member: Option<String>,

    #[schemars(description = "List position to remove")]
    #[serde(default)]
    pub index: Option<i64>,

    #[schemars(description = "List value to remove occurrences of")]
    #[serde(default)]
    pub value: Option<String>,

    #[schemars(description = "Maximum occurrences to remove with 'value' (default: 1)")]
    #[serde(default)]
    pub count: Option<i64>,

    #[schemars(description = "Stream record id to remove")]
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Key pattern to match (e.g. 'user:*', 'session:*'). Default: *")]
    #[serde(default)]
    pub pattern: Option<String>,

    #[schemars(description = "Keys per SCAN round trip")]
    #[serde(default, rename = "batchSize")]
    pub batch_size: Option<u32>,

    #[schemars(description = "Maximum number of keys to return")]
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct InfoParams {
    #[schemars(
        description = "Info section to retrieve (e.g. 'memory', 'stats', 'keyspace', 'server'). Default: all"
    )]
    #[serde(default)]
    pub section: Option<String>,
}

impl SetParams {
    /// Kind inference for a brand-new key with no explicit `type`. The
    /// order is load-bearing: `field` beats `score` beats `index`.
    pub fn inferred_kind(&self) -> DataKind {
        if self.field.is_some() {
            DataKind::Hash
        } else if self.score.is_some() {
            DataKind::ZSet
        } else if self.index.is_some() {
            DataKind::List
        } else {
            DataKind::String
        }
    }
}

// -- Validated per-operation requests --

/// A fully validated `set` operation, one variant per write shape. Built
/// before any Redis command is issued so illegal field combinations are
/// rejected up front.
#[derive(Debug, Clone, PartialEq)]
pub enum SetRequest {
    String {
        key: String,
        value: String,
        expire_seconds: Option<u64>,
    },
    ListPush {
        key: String,
        value: String,
        append: bool,
    },
    ListSet {
        key: String,
        index: i64,
        value: String,
    },
    SetAdd {
        key: String,
        member: String,
    },
    ZSetAdd {
        key: String,
        member: String,
        score: f64,
    },
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    StreamAdd {
        key: String,
        fields: BTreeMap<String, String>,
    },
}

impl SetRequest {
    pub fn build(kind: DataKind, params: SetParams) -> Result<SetRequest, ToolError> {
        let key = params.key;
        match kind {
            DataKind::String => Ok(SetRequest::String {
                key,
                value: require_text_value(params.value)?,
                expire_seconds: params.expire_seconds,
            }),
            DataKind::List => {
                let value = require_text_value(params.value)?;
                match params.index {
                    Some(index) => Ok(SetRequest::ListSet { key, index, value }),
                    None => Ok(SetRequest::ListPush {
                        key,
                        value,
                        append: params.append,
                    }),
                }
            }
            DataKind::Set => Ok(SetRequest::SetAdd {
                key,
                member: require_member(params.member, params.value)?,
            }),
            DataKind::ZSet => {
                let score = params.score.ok_or_else(|| {
                    ToolError::MalformedInput(
                        "Error: 'score' parameter is required for sorted set operations"
                            .to_string(),
                    )
                })?;
                Ok(SetRequest::ZSetAdd {
                    key,
                    member: require_member(params.member, params.value)?,
                    score,
                })
            }
            DataKind::Hash => {
                let field = params.field.filter(|f| !f.is_empty()).ok_or_else(|| {
                    ToolError::MalformedInput(
                        "Error: 'field' parameter is required for hash operations".to_string(),
                    )
                })?;
                Ok(SetRequest::HashSet {
                    key,
                    field,
                    value: require_text_value(params.value)?,
                })
            }
            DataKind::Stream => match params.value {
                Some(ValueArg::Map(fields)) if !fields.is_empty() => {
                    Ok(SetRequest::StreamAdd { key, fields })
                }
                _ => Err(ToolError::MalformedInput(
                    "Error: 'value' must be a non-empty field map for stream records".to_string(),
                )),
            },
        }
    }
}

fn require_text_value(value: Option<ValueArg>) -> Result<String, ToolError> {
    match value {
        Some(ValueArg::Text(v)) => Ok(v),
        Some(ValueArg::Map(_)) => Err(ToolError::MalformedInput(
            "Error: 'value' must be a string for this data type".to_string(),
        )),
        None => Err(ToolError::MalformedInput(
            "Error: 'value' parameter is required".to_string(),
        )),
    }
}

fn require_member(member: Option<String>, value: Option<ValueArg>) -> Result<String, ToolError> {
    match member {
        Some(m) => Ok(m),
        None => require_text_value(value),
    }
}

/// A fully validated `get` operation. Arguments irrelevant to the resolved
/// kind are ignored, matching the permissive original behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum GetRequest {
    StringValue { key: String },
    ListIndex { key: String, index: i64 },
    ListAll { key: String },
    SetMembers { key: String },
    ZSetScore { key: String, member: String },
    ZSetAll { key: String },
    HashField { key: String, field: String },
    HashAll { key: String },
    StreamRead { key: String, count: usize },
}

impl GetRequest {
    pub fn build(kind: DataKind, params: GetParams) -> Result<GetRequest, ToolError> {
        let key = params.key;
        match kind {
            DataKind::String => Ok(GetRequest::StringValue { key }),
            DataKind::List => match params.index {
                Some(index) => Ok(GetRequest::ListIndex { key, index }),
                None => Ok(GetRequest::ListAll { key }),
            },
            DataKind::Set => Ok(GetRequest::SetMembers { key }),
            DataKind::ZSet => match params.member {
                Some(member) => Ok(GetRequest::ZSetScore { key, member }),
                None => Ok(GetRequest::ZSetAll { key }),
            },
            DataKind::Hash => match params.field {
                Some(field) if field.is_empty() => Err(ToolError::MalformedInput(
                    "Error: Empty field provided for hash operation".to_string(),
                )),
                Some(field) => Ok(GetRequest::HashField { key, field }),
                None => Ok(GetRequest::HashAll { key }),
            },
            DataKind::Stream => Ok(GetRequest::StreamRead {
                key,
                count: params.count.unwrap_or(10),
            }),
        }
    }
}

/// What a validated single-key `delete` call will remove. Qualifiers are
/// checked in a fixed order (field, member, index, value, id); a qualifier
/// that does not match the key's kind degrades to a whole-key delete,
/// reported as such.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    WholeKey {
        key: String,
    },
    /// Whole-key delete forced by a qualifier/type mismatch.
    Fallback {
        key: String,
        qualifier: &'static str,
        actual: DataKind,
    },
    HashField {
        key: String,
        field: String,
    },
    SetMember {
        key: String,
        member: String,
    },
    ZSetMember {
        key: String,
        member: String,
    },
    ListIndex {
        key: String,
        index: i64,
    },
    ListValue {
        key: String,
        value: String,
        count: i64,
    },
    StreamRecord {
        key: String,
        id: String,
    },
}

impl DeleteTarget {
    /// `kind` is the resolved type of the key, or `None` when the key does
    /// not exist (every qualifier then degrades to a plain DEL, which
    /// reports not-found).
    pub fn build(
        kind: Option<DataKind>,
        key: String,
        params: DeleteParams,
    ) -> Result<DeleteTarget, ToolError> {
        let Some(kind) = kind else {
            return Ok(DeleteTarget::WholeKey { key });
        };

        if let Some(field) = params.field {
            return Ok(match kind {
                DataKind::Hash => DeleteTarget::HashField { key, field },
                actual => DeleteTarget::Fallback {
                    key,
                    qualifier: "field",
                    actual,
                },
            });
        }
        if let Some(member) = params.member {
            return Ok(match kind {
                DataKind::Set => DeleteTarget::SetMember { key, member },
                DataKind::ZSet => DeleteTarget::ZSetMember { key, member },
                actual => DeleteTarget::Fallback {
                    key,
                    qualifier: "member",
                    actual,
                },
            });
        }
        if let Some(index) = params.index {
            return Ok(match kind {
                DataKind::List => DeleteTarget::ListIndex { key, index },
                actual => DeleteTarget::Fallback {
                    key,
                    qualifier: "index",
                    actual,
                },
            });
        }
        if let Some(value) = params.value {
            return Ok(match kind {
                DataKind::List => DeleteTarget::ListValue {
                    key,
                    value,
                    count: params.count.unwrap_or(1),
                },
                actual => DeleteTarget::Fallback {
                    key,
                    qualifier: "value",
                    actual,
                },
            });
        }
        if let Some(id) = params.id {
            return Ok(match kind {
                DataKind::Stream => DeleteTarget::StreamRecord { key, id },
                actual => DeleteTarget::Fallback {
                    key,
                    qualifier: "id",
                    actual,
                },
            });
        }
        Ok(DeleteTarget::WholeKey { key })
    }
}
