use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{error, routes::health, AppState};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::health_detailed,
    ),
    components(
        schemas(
            health::HealthResponse,
            health::DetailedHealthResponse,
            health::RateLimitingInfo,
            health::PolicyInfo,
            error::ErrorEnvelope,
            error::ErrorBody,
            error::RetryDetails,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
    ),
    info(
        title = "Mosque Gateway API",
        version = "0.1.0",
        description = "Rate-limiting gateway in front of the community content API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT",
        ),
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server"),
    ),
)]
pub struct ApiDoc;

pub fn create_swagger_router() -> Router<AppState> {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
