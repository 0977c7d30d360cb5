// API module
//
// HTTP surface of a node: the peer replication protocol plus the
// operator endpoints

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;
