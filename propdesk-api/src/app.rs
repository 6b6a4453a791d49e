/// Application state and router builder
///
/// [`AppState`] carries the service graph and the configuration; every
/// handler reaches the engine through `state.services`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use propdesk_api::{app::{build_router, AppState}, config::Config};
/// use propdesk_shared::{email::LogEmailSender, files::LocalFileStore, store::memory::MemoryStore};
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::assemble(
///     config,
///     Arc::new(MemoryStore::new()),
///     Arc::new(LogEmailSender),
///     Arc::new(LocalFileStore::new("uploads")),
/// )?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{identity::require_identity, security::SecurityHeadersLayer},
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use propdesk_shared::{
    auth::{credentials::CredentialEngine, session::IdentityResolver},
    email::{EmailSender, LinkBuilder},
    error::CoreResult,
    files::{FileStore, MAX_UPLOAD_BYTES},
    services::{Dependencies, Services},
    store::Store,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(services: Arc<Services>, config: Config) -> Self {
        Self {
            services,
            config: Arc::new(config),
        }
    }

    /// Wires the service graph over the given collaborators
    pub fn assemble(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn EmailSender>,
        files: Arc<dyn FileStore>,
    ) -> CoreResult<Self> {
        let credentials = CredentialEngine::new(config.credential_policy())?;
        let identity = IdentityResolver::new(store.clone(), config.session_policy());

        let services = Services::new(Dependencies {
            store,
            credentials: Arc::new(credentials),
            identity: Arc::new(identity),
            mailer,
            files,
            links: LinkBuilder::new(config.api.public_url.clone()),
        });

        Ok(Self::new(Arc::new(services), config))
    }

    /// Cookies get `Secure` in production
    pub fn secure_cookies(&self) -> bool {
        self.config.api.production
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /health                                  public
/// /v1/auth/...                             public, except /me
/// /v1/activate/:token                      public (activation token)
/// /v1/vendor/respond?issue_id=&token=      public (vendor link token)
/// /v1/properties, /v1/floors, /v1/appliances,
/// /v1/issues, /v1/invitations, /v1/users,
/// /v1/directory, /v1/activity,
/// /v1/dashboard                            session cookie or bearer
/// ```
///
/// Layers, outermost first: security headers, CORS, request tracing.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/verify-otp", post(routes::auth::verify_otp))
        .route("/resend-otp", post(routes::auth::resend_otp))
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/login-otp/request", post(routes::auth::request_login_otp))
        .route("/login-otp/verify", post(routes::auth::verify_login_otp))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password));

    let session_auth_routes = Router::new().route(
        "/me",
        get(routes::auth::me).delete(routes::auth::delete_me),
    );

    let public_routes = Router::new()
        .nest("/auth", public_auth_routes)
        .route(
            "/activate/:token",
            get(routes::activation::preview).post(routes::activation::activate),
        )
        .route(
            "/vendor/respond",
            get(routes::vendor::view).post(routes::vendor::respond),
        );

    let property_routes = Router::new()
        .route(
            "/",
            get(routes::properties::list_properties).post(routes::properties::create_property),
        )
        .route(
            "/:id",
            get(routes::properties::get_property)
                .put(routes::properties::update_property)
                .delete(routes::properties::delete_property),
        )
        .route("/:id/manager", put(routes::properties::assign_manager))
        .route(
            "/:id/floors",
            get(routes::properties::list_floors).post(routes::properties::add_floor),
        )
        .route(
            "/:id/appliances",
            get(routes::properties::list_appliances).post(routes::properties::add_appliance),
        );

    let floor_routes = Router::new()
        .route(
            "/:id",
            get(routes::floors::get_floor)
                .put(routes::floors::update_floor)
                .delete(routes::floors::delete_floor),
        )
        .route(
            "/:id/plan",
            put(routes::floors::upload_plan).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        );

    let appliance_routes = Router::new()
        .route(
            "/:id",
            get(routes::appliances::get_appliance)
                .put(routes::appliances::update_appliance)
                .delete(routes::appliances::delete_appliance),
        )
        .route("/:id/issues", post(routes::issues::report_issue));

    let issue_routes = Router::new()
        .route("/", get(routes::issues::list_issues))
        .route("/:id", get(routes::issues::get_issue))
        .route("/:id/assign", post(routes::issues::assign_vendor))
        .route("/:id/accept", post(routes::issues::accept))
        .route("/:id/reject", post(routes::issues::reject))
        .route("/:id/bill", post(routes::issues::submit_bill))
        .route("/:id/approve", post(routes::issues::approve_bill));

    let invitation_routes = Router::new()
        .route(
            "/",
            get(routes::invitations::list_invitations).post(routes::invitations::invite_tenant),
        )
        .route("/:id", axum::routing::delete(routes::invitations::revoke_invitation));

    let user_routes = Router::new()
        .route("/:id", axum::routing::delete(routes::users::delete_user))
        .route("/:id/tenancy", put(routes::users::assign_tenant));

    let directory_routes = Router::new()
        .route("/vendors", get(routes::directory::list_vendors))
        .route("/managers", get(routes::directory::list_managers));

    let protected_routes = Router::new()
        .nest("/auth", session_auth_routes)
        .nest("/properties", property_routes)
        .nest("/floors", floor_routes)
        .nest("/appliances", appliance_routes)
        .nest("/issues", issue_routes)
        .nest("/invitations", invitation_routes)
        .nest("/users", user_routes)
        .nest("/directory", directory_routes)
        .route("/activity", get(routes::directory::recent_activity))
        .route(
            "/dashboard/appliance-stats",
            get(routes::directory::appliance_stats),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}
