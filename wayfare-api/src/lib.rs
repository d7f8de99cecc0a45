use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(routes::TRAVELER_HEADER),
        ]);

    Router::new()
        .merge(routes::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use wayfare_core::{ItemType, PriceBasis, SystemClock, UnitDescriptor};
    use wayfare_store::wire::ErrorBody;
    use wayfare_store::{MemoryBookingService, MemoryConfig};

    fn test_app() -> Router {
        let backend = Arc::new(MemoryBookingService::new(Arc::new(SystemClock), MemoryConfig::default()));
        backend.add_unit(UnitDescriptor {
            unit_id: "R".to_string(),
            item_type: ItemType::Room,
            name: "Deluxe Double".to_string(),
            price: PriceBasis::PerNight(250_000),
        }).unwrap();
        app(AppState::new(backend))
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inverted_range_is_bad_request() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/units?item_type=ROOM&start=2024-06-03&end=2024-06-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert!(body.error.contains("Validation"));
        assert!(body.conflicts.is_none());
    }

    #[tokio::test]
    async fn test_hold_requires_traveler() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/holds")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"unit_id":"R","start":"2024-06-01","end":"2024-06-03"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let response = test_app()
            .oneshot(Request::builder().uri("/v1/payments/pay_missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
