//! HTTP surface for batch ingestion, relation establishment, purge and query.

mod error;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use server::GatewayServer;
