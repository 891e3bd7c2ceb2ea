//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; one task per connection. Bodies are
//! buffered (bounded by `MAX_BODY_BYTES`) into an `ApiRequest` before routing.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{JwtValidator, SignupSessionStore};
use crate::commerce::{ApprovalPolicy, DealService, LeadService};
use crate::config::Args;
use crate::db::{MongoClient, Stores};
use crate::finance::FinanceService;
use crate::logging::AuditLogger;
use crate::routes::{self, ApiRequest};
use crate::tenancy::{AccountService, OrgService, PlatformService};
use crate::types::{IbError, Result};
use crate::workspace::WorkspaceService;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub stores: Stores,
    /// `None` when running on the in-memory store
    pub mongo: Option<MongoClient>,
    pub audit: AuditLogger,
    pub signups: Arc<SignupSessionStore>,
    pub accounts: AccountService,
    pub orgs: OrgService,
    pub platform: PlatformService,
    pub leads: LeadService,
    pub deals: DealService,
    pub finance: FinanceService,
    pub workspace: WorkspaceService,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every service onto the given stores
    pub fn new(args: Args, stores: Stores, mongo: Option<MongoClient>, audit: AuditLogger) -> Result<Self> {
        let jwt = JwtValidator::new(
            args.jwt_secret()?,
            args.jwt_expiry_seconds,
            args.refresh_expiry_seconds,
        )?;
        let signups = Arc::new(SignupSessionStore::new(
            args.signup.signup_session_ttl_seconds,
            args.signup.signup_max_attempts,
            args.signup.signup_max_sessions,
        ));
        let policy = ApprovalPolicy::from(&args.approval);

        let finance = FinanceService::new(stores.clone(), audit.clone());
        Ok(Self {
            accounts: AccountService::new(
                stores.clone(),
                jwt,
                Arc::clone(&signups),
                audit.clone(),
                args.dev_mode,
            ),
            orgs: OrgService::new(stores.clone(), audit.clone()),
            platform: PlatformService::new(stores.clone(), audit.clone()),
            leads: LeadService::new(stores.clone(), audit.clone()),
            deals: DealService::new(stores.clone(), audit.clone(), policy, finance.clone()),
            workspace: WorkspaceService::new(stores.clone(), audit.clone()),
            finance,
            signups,
            args,
            stores,
            mongo,
            audit,
            started_at: Instant::now(),
        })
    }

    /// State backed by the in-memory store (dev mode and tests)
    pub fn memory(args: Args) -> Result<Self> {
        Self::new(args, Stores::memory(), None, AuditLogger::new())
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("ibops listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - verification codes are returned in responses");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match buffer_request(req, state.args.max_body_bytes).await {
        Ok(api_request) => routes::dispatch(&state, api_request).await,
        Err(e) => routes::error_response(e),
    };

    info!(
        "[{}] {} {} -> {} in {}ms",
        addr,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    Ok(response)
}

/// Collect the body (up to `max_bytes`) and detach the request from hyper
async fn buffer_request(req: Request<Incoming>, max_bytes: usize) -> Result<ApiRequest> {
    let (parts, body) = req.into_parts();

    let body = Limited::new(body, max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                IbError::BadRequest(format!("Request body exceeds {max_bytes} bytes"))
            } else {
                IbError::Http(format!("Failed to read body: {e}"))
            }
        })?
        .to_bytes();

    let authorization = parts
        .headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(ApiRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        authorization,
        body,
    })
}
