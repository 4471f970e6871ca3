use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot listen on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("gateway stopped serving")]
    Serve(#[source] std::io::Error),
}
