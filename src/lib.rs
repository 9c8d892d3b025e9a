pub mod api;
pub mod auth;
pub mod board;
pub mod config;
pub mod db;
pub mod embedding;
pub mod mcp;
