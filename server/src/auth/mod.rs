pub mod handshake;
pub mod middleware;
