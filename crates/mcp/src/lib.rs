// Tool-protocol surface of the Arclight gateway: JSON-RPC over stdio,
// the tool registry, and the dispatcher that ties validation, sessions,
// schema, queries, and masking together.

pub mod context;
pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod tools;

pub use context::{GatewayConfig, GatewayState};
pub use dispatcher::Dispatcher;
pub use server::McpServer;
