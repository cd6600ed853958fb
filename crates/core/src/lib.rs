// Core types, error taxonomy, and masking for the Arclight GRC gateway

pub mod connection;
pub mod error;
pub mod masking;
pub mod render;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use types::*;
