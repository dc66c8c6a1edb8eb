//! Service index.

use axum::response::{IntoResponse, Json};
use serde_json::json;

// axum handler for the service index
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Insight CRM Web API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth",
            "users": "/api/users",
            "customers": "/api/customers"
        },
        "documentation": "/swagger-ui"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn root_is_ok() {
        let response = root().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
