use actix_web::web;

use super::handlers;

/// Configures the peer protocol and operator routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Peer wire protocol
        .route("/broadcast-transaction", web::post().to(handlers::broadcast_transaction))
        .route("/broadcast-block", web::post().to(handlers::broadcast_block))
        .route("/chain", web::get().to(handlers::get_chain))
        // Operator endpoints
        .route("/transaction", web::post().to(handlers::new_transaction))
        .route("/transactions", web::get().to(handlers::get_open_transactions))
        .route("/mine", web::post().to(handlers::mine_block))
        .route("/balance", web::get().to(handlers::get_balance))
        .route("/balance/{address}", web::get().to(handlers::get_address_balance))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/resolve-conflicts", web::post().to(handlers::resolve_conflicts))
        .route("/node", web::post().to(handlers::add_node))
        .route("/node/{node}", web::delete().to(handlers::remove_node))
        .route("/nodes", web::get().to(handlers::get_nodes))
        .route("/wallet", web::get().to(handlers::get_wallet));
}
