//! OpenAPI document of the ao-coverage server.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health_check,
        crate::routes::openapi_json,
        crate::routes::upload_report,
        crate::routes::commit_artifact,
        crate::routes::branch_artifact
    ),
    tags(
        (name = "reports", description = "Coverage report upload and badges"),
        (name = "system", description = "System endpoints")
    )
)]
/// OpenAPI specification for the ao-coverage server.
pub struct ApiDoc;
