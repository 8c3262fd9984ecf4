//! Twilio webhook for inbound WhatsApp messages.
//!
//! - `POST /whatsapp` answers every turn with a TwiML document.
//! - `GET  /`         liveness probe used by the hosting platform.

use std::sync::Arc;

use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use casedesk_agent::ConversationService;
use casedesk_core::errors::InterfaceError;
use casedesk_messaging::{twiml_reply, InboundMessage};
use tracing::{info, warn};
use uuid::Uuid;

const TWIML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Clone)]
pub struct InboundState {
    conversation: Arc<ConversationService>,
}

pub fn router(conversation: Arc<ConversationService>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/whatsapp", post(whatsapp_webhook))
        .with_state(InboundState { conversation })
}

async fn liveness() -> &'static str {
    "OK"
}

fn twiml(status: StatusCode, body: &str) -> impl IntoResponse {
    (status, [(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)], twiml_reply(body))
}

async fn whatsapp_webhook(
    State(state): State<InboundState>,
    Form(message): Form<InboundMessage>,
) -> impl IntoResponse {
    if !message.has_sender() {
        warn!(event_name = "http.inbound.missing_sender", "inbound message without a sender");
        let error = InterfaceError::BadRequest {
            message: "missing From".to_string(),
            correlation_id: Uuid::new_v4().to_string(),
        };
        return twiml(StatusCode::BAD_REQUEST, error.user_message());
    }

    match state.conversation.handle_inbound(&message.from, &message.body).await {
        Ok(reply) => {
            info!(
                event_name = "http.inbound.replied",
                lead_id = %reply.lead_id.0,
                step_id = %reply.step.as_str(),
                kind = ?reply.kind,
                "inbound turn answered"
            );
            twiml(StatusCode::OK, &reply.reply)
        }
        Err(error) => {
            let interface = error.into_interface(Uuid::new_v4().to_string());
            warn!(
                event_name = "http.inbound.failed",
                correlation_id = %interface.correlation_id(),
                error = %interface,
                "inbound turn failed"
            );
            // Twilio only relays TwiML from 2xx responses.
            let status = match interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::OK,
            };
            twiml(status, interface.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use casedesk_agent::llm::DisabledGenerator;
    use casedesk_agent::AgentRuntime;
    use casedesk_core::audit::InMemoryAuditSink;
    use casedesk_core::config::AppConfig;
    use casedesk_db::{InMemoryRecordStore, RecordStore, SeedDataset};
    use casedesk_messaging::NoopSender;
    use tower::ServiceExt;

    use super::router;

    async fn app(seeded: bool) -> Router {
        let config = AppConfig::default();
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        if seeded {
            SeedDataset::load(store.clone(), &config.store, None).await.expect("seed");
        }
        let runtime = AgentRuntime::new(
            &config,
            store,
            Arc::new(NoopSender),
            Arc::new(DisabledGenerator),
            Arc::new(InMemoryAuditSink::default()),
        );
        router(runtime.conversation())
    }

    fn form(body: &'static str) -> Request<Body> {
        Request::post("/whatsapp")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn first_message_is_answered_with_the_greeting_in_twiml() {
        let response = app(true)
            .await
            .oneshot(form("From=whatsapp%3A%2B5215512345678&Body=hola&ProfileName=Ana"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            "text/xml; charset=utf-8"
        );
        let body = body_text(response).await;
        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<Message>"));
    }

    #[tokio::test]
    async fn missing_sender_is_a_bad_request() {
        let response = app(true).await.oneshot(form("Body=hola")).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("No pudimos procesar tu solicitud"));
    }

    #[tokio::test]
    async fn store_failures_still_answer_with_an_apology() {
        let response = app(false)
            .await
            .oneshot(form("From=whatsapp%3A%2B5215512345678&Body=hola"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("<Message>"));
    }

    #[tokio::test]
    async fn root_is_a_plain_liveness_probe() {
        let response = app(false)
            .await
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }
}
