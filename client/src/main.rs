use async_trait::async_trait;
use authapp_client::agent::{HttpAgentFactory, parse_root_key};
use authapp_client::backend::AgentServiceFactory;
use authapp_client::config::Config;
use authapp_client::identity::{
    AuthorizeRequest, FlowDecision, InteractiveFlow, LocalIdentityProviderFactory, ProviderError,
};
use authapp_client::network::Network;
use authapp_client::replica::{GreetingCanister, ReplicaState, replica_routes};
use authapp_client::session::state::SessionConfig as SessionStateConfig;
use authapp_client::session::{LoginCancel, LoginOutcome, SessionManager};
use axum::{Router, response::IntoResponse, routing::get};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "authapp", version, about = "Identity-provider session client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local development replica
    Replica,
    #[command(flatten)]
    Client(ClientCommand),
}

#[derive(Subcommand)]
enum ClientCommand {
    /// Greet NAME through the active identity
    Greet { name: String },
    /// Show the principal the backend sees
    Whoami,
    /// Log in through the identity provider
    Login,
    /// End the identity provider session
    Logout,
    /// Show the session state
    Status,
}

/// Login flow answered on the terminal
struct TerminalFlow;

#[async_trait]
impl InteractiveFlow for TerminalFlow {
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<FlowDecision, ProviderError> {
        println!("Identity provider: {}", request.identity_provider_url);
        println!("Session principal: {}", request.session_principal);
        print!("Approve this session? [y/N] ");
        std::io::stdout().flush()?;

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| ProviderError::Flow(e.to_string()))??;

        if matches!(answer.trim(), "y" | "Y" | "yes") {
            Ok(FlowDecision::Approved)
        } else {
            Ok(FlowDecision::Closed)
        }
    }
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

async fn run_replica(config: &Config) -> anyhow::Result<()> {
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    let state = ReplicaState::new(SigningKey::from_bytes(&rand::random()))
        .with_canister(config.backend_id.clone(), Arc::new(GreetingCanister));
    info!("Hosting backend {}", config.backend_id);
    info!("Replica root key: {}", state.root_key_hex()?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = replica_routes(state)
        .merge(Router::new().route("/metrics/prometheus", get(prometheus_metrics)))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = config.replica.bind.parse()?;
    info!("Development replica listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<SessionManager> {
    let trusted_root_key = config
        .trusted_root_key
        .as_deref()
        .map(parse_root_key)
        .transpose()?;
    if !config.network.is_local() && trusted_root_key.is_none() {
        warn!("No TRUSTED_ROOT_KEY configured; replies cannot be verified");
    }

    let agents = HttpAgentFactory::new(config.replica_host.clone())
        .with_trusted_root_key(trusted_root_key);
    let network = Network::new(
        config.network,
        config.backend_id.clone(),
        Arc::new(agents),
        Arc::new(AgentServiceFactory),
    );
    let providers =
        LocalIdentityProviderFactory::new(config.storage_dir.clone(), Arc::new(TerminalFlow));

    let session_config = SessionStateConfig {
        identity_provider_url: config.identity_provider_url(),
        login_timeout: config.session.login_timeout,
        session_ttl: config.session.session_ttl,
    };

    let session = SessionManager::bootstrap(Arc::new(providers), network, session_config).await?;
    session.initialize().await?;
    Ok(session)
}

async fn run_client(config: &Config, command: ClientCommand) -> anyhow::Result<()> {
    let session = connect(config).await?;
    let dispatcher = session.dispatcher().clone();

    match command {
        ClientCommand::Greet { name } => println!("{}", dispatcher.greet(&name).await?),
        ClientCommand::Whoami => println!("{}", dispatcher.whoami().await),
        ClientCommand::Login => {
            let (cancel, signal) = LoginCancel::new();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            match session.login_with_cancel(signal).await? {
                LoginOutcome::Authenticated(principal) => {
                    println!("Logged in as {}", principal);
                    println!("{}", dispatcher.whoami().await);
                }
                LoginOutcome::Abandoned(reason) => {
                    println!("Login abandoned ({})", reason.as_str());
                    // A terminal prompt may still be blocked on stdin
                    std::process::exit(1);
                }
            }
        }
        ClientCommand::Logout => {
            session.logout().await?;
            println!("Logged out");
        }
        ClientCommand::Status => println!("{}", session.state().await),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authapp=info,authapp_client=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: network={:?}, replica={}, backend={}",
        config.network, config.replica_host, config.backend_id
    );

    match cli.command {
        Command::Replica => run_replica(&config).await,
        Command::Client(command) => run_client(&config, command).await,
    }
}
