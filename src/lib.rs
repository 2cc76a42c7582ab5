pub mod config;
pub mod dispatch;
pub mod error;
pub mod gerrit;
pub mod gitlab;
pub mod http;
pub mod mcp;
pub mod normalize;
pub mod server;
pub mod tools;
pub mod types;
