//! MCP server that lets LLMs read and write Redis data of any type.
//!
//! Provides `set`, `get`, `delete`, `list`, and `info` tools dispatching
//! over string, list, set, zset, hash, and stream keys. The data type is
//! taken from the live key, an explicit `type` argument, or inferred from
//! which arguments are present.

pub mod command;
pub mod error;
pub mod server;
