use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use minicoin::api;
use minicoin::blockchain::{self, Ed25519Signer, Ledger, MemoryStore, PersistenceStore, SledStore, Wallet};
use minicoin::config::NodeConfig;
use minicoin::replication::{self, HttpTransport, Node};

// Load the configured wallet, or create a fresh one for this run
fn load_wallet(config: &NodeConfig) -> anyhow::Result<Wallet> {
    match &config.secret_key {
        Some(secret_key) => Wallet::from_hex(secret_key).context("Invalid secret key"),
        None => {
            let wallet = Wallet::new();
            warn!("No secret key configured, generated a new wallet");
            info!("Wallet private key: {}", hex::encode(wallet.export_secret_key()));
            Ok(wallet)
        }
    }
}

// Open persistent storage, falling back to memory when it is unavailable
fn open_store(config: &NodeConfig) -> Arc<dyn PersistenceStore> {
    std::fs::create_dir_all(&config.data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match SledStore::new(&config.data_dir) {
        Ok(store) => {
            info!("Using storage at {}", config.data_dir.display());
            Arc::new(store)
        }
        Err(err) => {
            warn!("Failed to open storage: {}", err);
            warn!("Keeping the ledger in memory only");
            Arc::new(MemoryStore::new())
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::broadcast_transaction,
        api::handlers::broadcast_block,
        api::handlers::get_chain,
        api::handlers::get_open_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::get_balance,
        api::handlers::get_address_balance,
        api::handlers::validate_chain,
        api::handlers::resolve_conflicts,
        api::handlers::add_node,
        api::handlers::remove_node,
        api::handlers::get_nodes,
        api::handlers::get_wallet
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::DigitalSignature,
            replication::BlockMessage,
            replication::BroadcastReport,
            replication::messages::MessageResponse,
            replication::node::SubmitReport,
            replication::node::MineReport,
            api::schema::TransactionRequest,
            api::schema::BroadcastFailureResponse,
            api::schema::BalanceResponse,
            api::schema::ValidationResponse,
            api::schema::ResolveResponse,
            api::schema::NodeRequest,
            api::schema::NodesResponse,
            api::schema::WalletResponse
        )
    ),
    tags(
        (name = "minicoin", description = "Ledger node API endpoints")
    ),
    info(
        title = "Minicoin Node API",
        version = "0.1.0",
        description = "Peer replication protocol and operator endpoints of a proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::parse();

    let wallet = load_wallet(&config)?;
    info!("Node identity: {}", wallet.address());

    let ledger = Ledger::open(wallet.address().clone(), Arc::new(Ed25519Signer), open_store(&config));
    for peer in &config.peers {
        ledger.add_peer(peer);
    }
    if !ledger.is_valid() {
        warn!("Local chain is invalid; resolve conflicts before mining");
    }

    let transport = HttpTransport::new(config.peer_timeout()).context("Failed to build peer transport")?;
    let node = web::Data::new(Node::new(Arc::new(ledger), wallet, Arc::new(transport)));

    let (host, port) = config.bind_address();
    info!("Starting HTTP server at http://{}:{}", host, port);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
