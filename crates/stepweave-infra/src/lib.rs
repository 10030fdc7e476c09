//! Infrastructure layer for stepweave.
//!
//! Contains implementations of the ports defined in `stepweave-core`:
//! SQLite storage, the HTTP agent and MCP clients, the SQL script runner,
//! and the config loader.

pub mod capabilities;
pub mod config;
pub mod http;
pub mod sqlite;
