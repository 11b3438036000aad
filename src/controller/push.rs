use actix_web::{get, post, web, HttpResponse, Result};

use crate::{
    configuration::{AppState, State},
    error::Error,
    handler::subscription_api,
    types::{
        SendRequest, StatusQuery, StatusResponse, SubscribeRequest,
        SuccessResponse, UnsubscribeRequest, VapidKeyResponse,
    },
};

#[get("/vapid-key")]
pub async fn vapid_key(
    state: web::Data<AppState<State>>,
) -> Result<HttpResponse, Error> {
    let public_key = subscription_api::get_vapid_public_key(&state)?;
    Ok(HttpResponse::Ok().json(VapidKeyResponse { public_key }))
}

#[post("/subscribe")]
pub async fn subscribe(
    state: web::Data<AppState<State>>,
    data: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, Error> {
    subscription_api::subscribe(&state, data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse { success: true }))
}

#[post("/unsubscribe")]
pub async fn unsubscribe(
    state: web::Data<AppState<State>>,
    data: web::Json<UnsubscribeRequest>,
) -> Result<HttpResponse, Error> {
    subscription_api::unsubscribe(&state, data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse { success: true }))
}

#[post("/send")]
pub async fn send(
    state: web::Data<AppState<State>>,
    data: web::Json<SendRequest>,
) -> Result<HttpResponse, Error> {
    let result = subscription_api::send_test(&state, data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[get("/status")]
pub async fn status(
    state: web::Data<AppState<State>>,
    data: web::Query<StatusQuery>,
) -> Result<HttpResponse, Error> {
    let subscribed =
        subscription_api::is_subscribed(&state, data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(StatusResponse { subscribed }))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    use crate::{
        configuration::{AppState, State},
        server::{api_scope, json_config, query_config},
        test_support::{state_with, subscription_json, ScriptedTransport},
    };

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(actix_web::web::Data::new($state.clone()))
                    .app_data(json_config())
                    .app_data(query_config())
                    .service(api_scope()),
            )
            .await
        };
    }

    async fn body_json(resp: actix_web::dev::ServiceResponse) -> Value {
        let bytes = test::read_body(resp).await;
        serde_json::from_slice(&bytes).unwrap()
    }

    fn keyed_state() -> (tempfile::TempDir, AppState<State>) {
        state_with(Some(Arc::new(ScriptedTransport::default())))
    }

    #[actix_web::test]
    async fn test_vapid_key_missing_is_structured_500() {
        let (_dir, state) = state_with(None);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/push/vapid-key").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "ConfigMissing");
        assert!(body["message"].is_string());
    }

    #[actix_web::test]
    async fn test_vapid_key_returned() {
        let (_dir, state) = keyed_state();
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/push/vapid-key").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "publicKey": "BPublicKey" }));
    }

    #[actix_web::test]
    async fn test_subscribe_then_status_then_unsubscribe() {
        let (_dir, state) = keyed_state();
        let app = app!(state);
        let endpoint = "https://push.example/abc";

        let req = test::TestRequest::post()
            .uri("/api/push/subscribe")
            .set_json(json!({
                "user": "gleb",
                "subscription": subscription_json(endpoint),
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "success": true }));

        let req = test::TestRequest::get()
            .uri("/api/push/status?user=gleb&endpoint=https%3A%2F%2Fpush.example%2Fabc")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(body_json(resp).await, json!({ "subscribed": true }));

        let req = test::TestRequest::post()
            .uri("/api/push/unsubscribe")
            .set_json(json!({ "user": "gleb", "endpoint": endpoint }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        assert!(state.store.get("gleb").await.is_empty());
    }

    #[actix_web::test]
    async fn test_bad_payloads_are_400() {
        let (_dir, state) = keyed_state();
        let app = app!(state);

        let missing_keys = test::TestRequest::post()
            .uri("/api/push/subscribe")
            .set_json(json!({
                "user": "gleb",
                "subscription": { "endpoint": "https://push.example/abc" },
            }))
            .to_request();
        let not_json = test::TestRequest::post()
            .uri("/api/push/unsubscribe")
            .insert_header(("content-type", "application/json"))
            .set_payload("{ nope")
            .to_request();
        let no_endpoint = test::TestRequest::get()
            .uri("/api/push/status?user=gleb")
            .to_request();

        for req in [missing_keys, not_json, no_endpoint] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(resp).await["error"], "ValidationError");
        }
    }

    #[actix_web::test]
    async fn test_send_without_subscriptions_is_404() {
        let (_dir, state) = keyed_state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/push/send")
            .set_json(json!({ "user": "ghost", "message": "hi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "NotFound");
    }

    #[actix_web::test]
    async fn test_send_reports_counts() {
        let (_dir, state) = keyed_state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/push/subscribe")
            .set_json(json!({
                "user": "dasha",
                "subscription": subscription_json("https://push.example/d1"),
            }))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/api/push/send")
            .set_json(json!({ "user": "dasha", "message": "hi" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "sent": 1, "failed": 0 }));
    }
}
