use actix_web::{web, HttpResponse, Responder};

use super::schema::{
    BalanceResponse, BroadcastFailureResponse, NodeRequest, NodesResponse, ResolveResponse, TransactionRequest,
    ValidationResponse, WalletResponse,
};
use crate::blockchain::ledger::LedgerError;
use crate::blockchain::{verification, Address, Block, Transaction};
use crate::replication::messages::MessageResponse;
use crate::replication::node::{MineReport, SubmitReport};
use crate::replication::{BlockMessage, BroadcastOutcome, Node, NodeError};

/// Data structure for the node state
pub type NodeData = web::Data<Node>;

fn message(text: impl Into<String>) -> MessageResponse {
    MessageResponse { message: text.into() }
}

/// Maps a peer-facing outcome onto the wire status codes
fn outcome_response(outcome: BroadcastOutcome, accepted: &str) -> HttpResponse {
    match outcome {
        BroadcastOutcome::Accepted => HttpResponse::Created().json(message(accepted)),
        BroadcastOutcome::Rejected(reason) => HttpResponse::BadRequest().json(message(reason)),
        BroadcastOutcome::Conflict(reason) => HttpResponse::Conflict().json(message(reason)),
    }
}

fn node_error_response(err: NodeError) -> HttpResponse {
    match &err {
        NodeError::Ledger(e) if e.is_validation() => HttpResponse::BadRequest().json(message(err.to_string())),
        NodeError::Ledger(LedgerError::MiningCancelled | LedgerError::StaleTip) => {
            HttpResponse::Conflict().json(message(err.to_string()))
        }
        _ => HttpResponse::InternalServerError().json(message(err.to_string())),
    }
}

/// Receive a transaction broadcast by a peer
#[utoipa::path(
    post,
    path = "/broadcast-transaction",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction admitted", body = MessageResponse),
        (status = 400, description = "Invalid signature, amount or insufficient funds", body = MessageResponse),
        (status = 409, description = "Local chain awaits conflict resolution", body = MessageResponse)
    )
)]
pub async fn broadcast_transaction(node: NodeData, transaction: web::Json<Transaction>) -> impl Responder {
    let outcome = node.receive_transaction(transaction.into_inner()).await;
    outcome_response(outcome, "Successfully added transaction")
}

/// Receive a block broadcast by a peer
#[utoipa::path(
    post,
    path = "/broadcast-block",
    request_body = BlockMessage,
    responses(
        (status = 201, description = "Block appended", body = MessageResponse),
        (status = 400, description = "Invalid proof or previous hash", body = MessageResponse),
        (status = 409, description = "Block does not fit the local chain", body = MessageResponse)
    )
)]
pub async fn broadcast_block(node: NodeData, payload: web::Json<BlockMessage>) -> impl Responder {
    let outcome = node.receive_block(payload.into_inner().block).await;
    outcome_response(outcome, "Block added")
}

/// Get the full chain
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().chain())
}

/// Get all open transactions
#[utoipa::path(
    get,
    path = "/transactions",
    responses(
        (status = 200, description = "Open transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_open_transactions(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().open_transactions())
}

/// Send coins from this node's wallet
///
/// The transaction is admitted locally and broadcast to all peers
#[utoipa::path(
    post,
    path = "/transaction",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction admitted and accepted by peers", body = SubmitReport),
        (status = 400, description = "Transaction refused locally", body = MessageResponse),
        (status = 500, description = "Admitted locally but refused by peers", body = BroadcastFailureResponse)
    )
)]
pub async fn new_transaction(node: NodeData, request: web::Json<TransactionRequest>) -> impl Responder {
    let request = request.into_inner();

    match node.submit_local(Address(request.recipient), request.amount).await {
        Ok(report) if report.broadcast.is_clean() => HttpResponse::Created().json(report),
        Ok(report) => HttpResponse::InternalServerError().json(BroadcastFailureResponse {
            message: "Transaction added locally but refused by peers; resolve conflicts".to_string(),
            broadcast: report.broadcast,
        }),
        Err(err) => node_error_response(err),
    }
}

/// Mine a new block
///
/// Creates a new block from all open transactions plus the mining reward
#[utoipa::path(
    post,
    path = "/mine",
    responses(
        (status = 201, description = "Block mined successfully", body = MineReport),
        (status = 409, description = "Mining was overtaken by a competing block", body = MessageResponse),
        (status = 500, description = "Mining failed", body = MessageResponse)
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    match node.mine().await {
        Ok(report) => HttpResponse::Created().json(report),
        Err(err) => node_error_response(err),
    }
}

/// Get this node's balance
#[utoipa::path(
    get,
    path = "/balance",
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(node: NodeData) -> impl Responder {
    let address = node.address().clone();
    let balance = node.ledger().balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// Get the balance of any address
#[utoipa::path(
    get,
    path = "/balance/{address}",
    params(
        ("address" = String, Path, description = "Public key to query")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_address_balance(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = node.ledger().balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// Check the local chain and open transactions
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    let first_invalid_block = verification::first_invalid_block(&node.ledger().chain());

    HttpResponse::Ok().json(ValidationResponse {
        valid: first_invalid_block.is_none(),
        first_invalid_block,
        open_transactions_valid: node.ledger().verify_open_transactions(),
    })
}

/// Adopt the longest valid chain among peers
#[utoipa::path(
    post,
    path = "/resolve-conflicts",
    responses(
        (status = 200, description = "Resolution finished", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    let replaced = node.resolve_conflicts().await;

    HttpResponse::Ok().json(ResolveResponse {
        replaced,
        length: node.ledger().height(),
    })
}

/// Register a peer
#[utoipa::path(
    post,
    path = "/node",
    request_body = NodeRequest,
    responses(
        (status = 201, description = "Peer registered", body = NodesResponse),
        (status = 400, description = "No peer given", body = MessageResponse)
    )
)]
pub async fn add_node(node: NodeData, request: web::Json<NodeRequest>) -> impl Responder {
    let peer = request.node.trim();
    if peer.is_empty() {
        return HttpResponse::BadRequest().json(message("No node data attached"));
    }

    node.ledger().add_peer(peer);
    HttpResponse::Created().json(NodesResponse {
        nodes: node.ledger().peers(),
    })
}

/// Unregister a peer
#[utoipa::path(
    delete,
    path = "/node/{node}",
    params(
        ("node" = String, Path, description = "Peer address to remove")
    ),
    responses(
        (status = 200, description = "Peer removed", body = NodesResponse),
        (status = 404, description = "Unknown peer", body = MessageResponse)
    )
)]
pub async fn remove_node(node: NodeData, peer: web::Path<String>) -> impl Responder {
    if !node.ledger().remove_peer(&peer) {
        return HttpResponse::NotFound().json(message(format!("Unknown node {}", peer)));
    }

    HttpResponse::Ok().json(NodesResponse {
        nodes: node.ledger().peers(),
    })
}

/// List all peers
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Peers retrieved successfully", body = NodesResponse)
    )
)]
pub async fn get_nodes(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(NodesResponse {
        nodes: node.ledger().peers(),
    })
}

/// Get this node's identity
#[utoipa::path(
    get,
    path = "/wallet",
    responses(
        (status = 200, description = "Wallet retrieved successfully", body = WalletResponse)
    )
)]
pub async fn get_wallet(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(WalletResponse {
        address: node.address().0.clone(),
        balance: node.ledger().balance(node.address()),
        needs_resolution: node.needs_resolution(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::replication::node::tests::LocalNetwork;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_get_chain_returns_genesis() {
        let node = LocalNetwork::default().spawn("a");
        let app = test::init_service(App::new().app_data(web::Data::new(node)).configure(configure_routes)).await;

        let request = test::TestRequest::get().uri("/chain").to_request();
        let chain: Vec<Block> = test::call_and_read_body_json(&app, request).await;

        assert_eq!(chain, vec![Block::genesis()]);
    }

    #[actix_web::test]
    async fn test_mine_then_balance() {
        let node = LocalNetwork::default().spawn("a");
        let app = test::init_service(App::new().app_data(web::Data::new(node)).configure(configure_routes)).await;

        let request = test::TestRequest::post().uri("/mine").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = test::TestRequest::get().uri("/balance").to_request();
        let balance: BalanceResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(balance.balance, 10.0);
    }

    #[actix_web::test]
    async fn test_broadcast_transaction_status_codes() {
        let network = LocalNetwork::default();
        let node = network.spawn("a");
        let app =
            test::init_service(App::new().app_data(web::Data::new(node.clone())).configure(configure_routes)).await;

        // Sender has no funds on this node
        let poor = crate::blockchain::Wallet::new();
        let transaction =
            Transaction::signed(&poor, &crate::blockchain::Ed25519Signer, Address::from("bob"), 5.0).unwrap();
        let request = test::TestRequest::post()
            .uri("/broadcast-transaction")
            .set_json(&transaction)
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let reward = Transaction::reward(Address::from("bob"), 5.0);
        let request = test::TestRequest::post()
            .uri("/broadcast-transaction")
            .set_json(&reward)
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // A funded sender's transfer is admitted once, then refused as a replay
        let funded = network.spawn("b");
        funded.mine().await.unwrap();
        assert!(node.ledger().replace_chain(funded.ledger().chain()));
        let transfer = funded.submit_local(Address::from("bob"), 5.0).await.unwrap().transaction;

        for expected in [StatusCode::CREATED, StatusCode::BAD_REQUEST] {
            let request = test::TestRequest::post()
                .uri("/broadcast-transaction")
                .set_json(&transfer)
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), expected);
        }
    }

    #[actix_web::test]
    async fn test_broadcast_block_status_codes() {
        let network = LocalNetwork::default();
        let node = network.spawn("a");
        let ahead = network.spawn("b");
        let first = ahead.ledger().mine().unwrap();
        let second = ahead.ledger().mine().unwrap();
        let app = test::init_service(App::new().app_data(web::Data::new(node)).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/broadcast-block")
            .set_json(BlockMessage { block: second })
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let mut forged = first.clone();
        forged.previous_hash = "elsewhere".to_string();
        let request = test::TestRequest::post()
            .uri("/broadcast-block")
            .set_json(BlockMessage { block: forged })
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/broadcast-block")
            .set_json(BlockMessage { block: first })
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn test_peer_management_endpoints() {
        let node = LocalNetwork::default().spawn("a");
        let app = test::init_service(App::new().app_data(web::Data::new(node)).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/node")
            .set_json(NodeRequest {
                node: "localhost:5001".to_string(),
            })
            .to_request();
        let nodes: NodesResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(nodes.nodes, vec!["localhost:5001".to_string()]);

        let request = test::TestRequest::delete().uri("/node/localhost:5001").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = test::TestRequest::delete().uri("/node/localhost:5001").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
