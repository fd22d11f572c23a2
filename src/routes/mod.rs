use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState, telemetry::request_span};

pub mod audit;
pub mod auth;
pub mod builders;
pub mod channels;
pub mod content;
pub mod customers;
pub mod health;
pub mod import;
pub mod job_tasks;
pub mod jobs;
pub mod media;
pub mod post_instances;
pub mod service_calls;
pub mod users;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let builders_routes = Router::new()
        .route(
            "/",
            get(builders::list_builders).post(builders::create_builder),
        )
        .route(
            "/:id",
            get(builders::get_builder)
                .put(builders::update_builder)
                .delete(builders::delete_builder),
        );

    let jobs_routes = Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/:id",
            get(jobs::get_job)
                .put(jobs::update_job)
                .delete(jobs::delete_job),
        );

    let job_tasks_routes = Router::new()
        .route(
            "/",
            get(job_tasks::list_job_tasks).post(job_tasks::create_job_task),
        )
        .route(
            "/:id",
            axum::routing::put(job_tasks::update_job_task).delete(job_tasks::delete_job_task),
        );

    let service_calls_routes = Router::new()
        .route(
            "/",
            get(service_calls::list_service_calls).post(service_calls::create_service_call),
        )
        .route("/:id", axum::routing::put(service_calls::update_service_call));

    let customers_routes = Router::new()
        .route(
            "/",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route("/:id", axum::routing::put(customers::update_customer));

    let channel_accounts_routes = Router::new()
        .route(
            "/",
            get(channels::list_channel_accounts).post(channels::create_channel_account),
        )
        .route("/:id", axum::routing::put(channels::update_channel_account))
        .route(
            "/:id/category_suggestion",
            get(channels::category_suggestion),
        );

    let content_routes = Router::new()
        .route(
            "/",
            get(content::list_content_items).post(content::create_content_item),
        )
        .route(
            "/:id",
            axum::routing::put(content::update_content_item).delete(content::delete_content_item),
        );

    let media_routes = Router::new()
        .route(
            "/",
            get(media::list_media_assets).post(media::create_media_asset),
        )
        .route("/:id", axum::routing::delete(media::delete_media_asset));

    let post_routes = Router::new()
        .route(
            "/",
            get(post_instances::list_post_instances).post(post_instances::create_post_instance),
        )
        .route("/overdue", get(post_instances::list_overdue))
        .route("/due", get(post_instances::list_due))
        .route(
            "/:id",
            get(post_instances::get_post_instance).put(post_instances::update_post_instance),
        )
        .route("/:id/attach_content", post(post_instances::attach_content))
        .route("/:id/submit", post(post_instances::submit))
        .route("/:id/approve", post(post_instances::approve))
        .route("/:id/reject", post(post_instances::reject))
        .route("/:id/schedule", post(post_instances::schedule))
        .route("/:id/publish_ok", post(post_instances::publish_ok))
        .route("/:id/publish_fail", post(post_instances::publish_fail))
        .route("/:id/retry", post(post_instances::retry));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .nest("/builders", builders_routes)
        .nest("/jobs", jobs_routes)
        .nest("/job_tasks", job_tasks_routes)
        .nest("/service_calls", service_calls_routes)
        .nest("/customers", customers_routes)
        .route(
            "/marketing_channels",
            get(channels::list_marketing_channels),
        )
        .nest("/channel_accounts", channel_accounts_routes)
        .nest("/content_items", content_routes)
        .nest("/media_assets", media_routes)
        .nest("/post_instances", post_routes)
        .route("/audit", get(audit::list_audit))
        .route("/import/jobs", post(import::import_jobs))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let api_routes = Router::new()
        .route("/login", post(auth::login))
        .merge(protected_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
