use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{health_check, members, salon, tokens};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let admin = Router::new()
        .route("/tokens", post(tokens::issue_token))
        .route("/tokens/:id", get(tokens::token_status))
        .route("/members", post(members::register_member))
        .route("/members/:id/points", post(members::adjust_points));

    let me = Router::new()
        .route("/", get(members::me))
        .route("/ledger", get(members::ledger))
        .route("/review-slots", get(members::review_slots))
        .route("/reviews", post(members::submit_review));

    let api = Router::new()
        .nest("/admin", admin)
        .nest("/me", me)
        .route("/tokens/redeem", post(tokens::redeem_token))
        .route("/staff/:id/availability", get(salon::availability))
        .route("/reservations", post(salon::book_reservation));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config))
        .layer(create_cors_layer(config))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::{AdminIdentity, FixedIdentityProvider, MemberIdentity};
    use crate::models::{AdminRole, Member, Service, StaffSchedule};
    use crate::services::StoreContext;
    use crate::store::MemoryStore;
    use crate::utils::clock::ManualClock;

    const OWNER: &str = "owner-credential";
    const STAFF: &str = "staff-credential";
    const MEMBER: &str = "member-credential";

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        member_id: Uuid,
    }

    fn setup_test() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let ctx = StoreContext::new(store.clone(), clock, Duration::from_secs(1));

        let member_id = Uuid::new_v4();
        store.add_member(Member {
            id: member_id,
            external_id: "U-line-1".into(),
            display_name: "Aiko".into(),
            points_balance: 0,
            created_at: now,
        });

        let identity = FixedIdentityProvider::new()
            .with_admin(
                OWNER,
                AdminIdentity {
                    admin_id: Uuid::new_v4(),
                    role: AdminRole::Owner,
                },
            )
            .with_admin(
                STAFF,
                AdminIdentity {
                    admin_id: Uuid::new_v4(),
                    role: AdminRole::Staff,
                },
            )
            .with_member(MEMBER, MemberIdentity { member_id });

        let config = Config::from_lookup(|name| {
            (name == "STORE_BACKEND").then(|| "memory".to_string())
        })
        .unwrap();
        let state = AppState::with_identity(ctx, 30, Arc::new(identity));

        TestApp {
            router: create_routes(state, &config),
            store,
            member_id,
        }
    }

    fn request(
        method: &str,
        uri: &str,
        credential: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(credential) = credential {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {credential}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_check_sets_security_headers() {
        let app = setup_test();
        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["cache-control"], "no-store");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_credentials_are_checked() {
        let app = setup_test();

        let (status, body) = send(&app, request("GET", "/api/me", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTH_ERROR");

        let (status, _) = send(&app, request("GET", "/api/me", Some("bogus"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let issue = json!({ "kind": "review_ticket" });
        let (status, body) =
            send(&app, request("POST", "/api/admin/tokens", Some(MEMBER), Some(issue))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_issue_then_redeem_over_http() {
        let app = setup_test();

        let issue = json!({ "kind": "earn_points", "amount": 100, "reason": "cut and color" });
        let (status, body) =
            send(&app, request("POST", "/api/admin/tokens", Some(STAFF), Some(issue))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["token"]["status"], "pending");
        assert!(body["data"]["token"].get("token_hash").is_none());
        let token_id = body["data"]["token"]["id"].as_str().unwrap().to_string();
        let payload = body["data"]["qr_payload"].as_str().unwrap().to_string();

        let redeem = json!({ "token": payload });
        let (status, body) = send(
            &app,
            request("POST", "/api/tokens/redeem", Some(MEMBER), Some(redeem.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["balance"], 100);

        let (status, body) =
            send(&app, request("POST", "/api/tokens/redeem", Some(MEMBER), Some(redeem))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "TOKEN_ALREADY_USED");

        let uri = format!("/api/admin/tokens/{token_id}");
        let (status, body) = send(&app, request("GET", &uri, Some(STAFF), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");

        let (status, body) = send(&app, request("GET", "/api/me", Some(MEMBER), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["points_balance"], 100);

        let (status, body) =
            send(&app, request("GET", "/api/me/ledger?per_page=5", Some(MEMBER), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
    }

    #[tokio::test]
    async fn test_malformed_requests_use_validation_error() {
        let app = setup_test();

        let unknown_kind = json!({ "kind": "burn_points", "amount": 5 });
        let (status, body) = send(
            &app,
            request("POST", "/api/admin/tokens", Some(STAFF), Some(unknown_kind)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let missing_field = json!({ "value": "x" });
        let (status, body) = send(
            &app,
            request("POST", "/api/tokens/redeem", Some(MEMBER), Some(missing_field)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let uri = format!("/api/staff/{}/availability?date=2026-03-02", Uuid::new_v4());
        let (status, body) = send(&app, request("GET", &uri, None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) =
            send(&app, request("GET", "/api/admin/tokens/not-a-uuid", Some(STAFF), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/tokens/redeem")
                .header(header::AUTHORIZATION, format!("Bearer {MEMBER}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_adjustment_requires_owner_and_reports_balance() {
        let app = setup_test();
        let uri = format!("/api/admin/members/{}/points", app.member_id);
        let debit = json!({ "direction": "debit", "amount": 50, "reason": "correction" });

        let (status, _) =
            send(&app, request("POST", &uri, Some(STAFF), Some(debit.clone()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, request("POST", &uri, Some(OWNER), Some(debit))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
        assert_eq!(body["error"]["details"]["balance"], 0);
        assert_eq!(body["error"]["details"]["requested"], 50);
    }

    #[tokio::test]
    async fn test_availability_and_booking() {
        let app = setup_test();
        let staff_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        app.store.add_service(Service {
            id: service_id,
            name: "Cut".into(),
            duration_minutes: 60,
        });
        // 2026-03-02 is a Monday.
        app.store.add_schedule(StaffSchedule {
            id: Uuid::new_v4(),
            staff_id,
            weekday: 0,
            start_time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        });

        let uri = format!(
            "/api/staff/{staff_id}/availability?service_id={service_id}&date=2026-03-02"
        );
        let (status, body) = send(&app, request("GET", &uri, None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);

        let booking = json!({
            "staff_id": staff_id,
            "service_id": service_id,
            "date": "2026-03-02",
            "start_time": "10:00:00",
        });
        let (status, _) = send(
            &app,
            request("POST", "/api/reservations", Some(MEMBER), Some(booking.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(&app, request("POST", "/api/reservations", Some(MEMBER), Some(booking))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SLOT_UNAVAILABLE");

        let (_, body) = send(&app, request("GET", &uri, None, None)).await;
        assert_eq!(body["data"][0]["start"], "11:00:00");
    }
}
