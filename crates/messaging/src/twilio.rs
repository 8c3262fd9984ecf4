use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use casedesk_core::config::MessagingConfig;

use crate::retry::RetryPolicy;
use crate::sender::{DeliveryError, DeliveryReceipt, MessageSender};
use crate::webhook::{strip_channel_prefix, whatsapp_address};

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Sends WhatsApp messages through the Twilio Messages API.
pub struct TwilioSender {
    client: Client,
    api_base_url: String,
    account_sid: String,
    auth_token: SecretString,
    from: String,
    policy: RetryPolicy,
}

impl std::fmt::Debug for TwilioSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSender")
            .field("api_base_url", &self.api_base_url)
            .field("account_sid", &self.account_sid)
            .field("from", &self.from)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TwilioSender {
    pub fn from_config(config: &MessagingConfig) -> Result<Self, DeliveryError> {
        let account_sid = required(config.account_sid.as_deref(), "messaging.account_sid")?;
        let from = required(config.from_number.as_deref(), "messaging.from_number")?;
        let auth_token = config
            .auth_token
            .clone()
            .filter(|token| !token.expose_secret().trim().is_empty())
            .ok_or_else(|| DeliveryError::NotConfigured("messaging.auth_token".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| DeliveryError::NotConfigured(format!("http client: {error}")))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from: whatsapp_address(&from),
            policy: RetryPolicy::with_max_retries(config.max_retries),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base_url, self.account_sid)
    }

    async fn send_once(&self, to: &str, body: &str) -> Result<MessageResource, DeliveryError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[("From", self.from.as_str()), ("To", to), ("Body", body)])
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(ApiErrorBody { code: Some(code), message: Some(message) }) => {
                    format!("{code}: {message}")
                }
                Ok(ApiErrorBody { message: Some(message), .. }) => message,
                _ => text,
            };
            return Err(DeliveryError::Rejected { status: status.as_u16(), message });
        }

        response
            .json::<MessageResource>()
            .await
            .map_err(|error| DeliveryError::Ambiguous(format!("decode message resource: {error}")))
    }
}

/// Only a failed connect proves the request never left; anything later may have been accepted.
fn classify_send_error(error: reqwest::Error) -> DeliveryError {
    if error.is_connect() {
        DeliveryError::Transport(error.to_string())
    } else {
        DeliveryError::Ambiguous(error.to_string())
    }
}

#[async_trait]
impl MessageSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        if strip_channel_prefix(to).trim_start_matches('+').is_empty() {
            return Err(DeliveryError::InvalidRecipient(to.to_string()));
        }
        let to = whatsapp_address(to);

        let attempts = self.policy.total_attempts();
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.send_once(&to, body).await {
                Ok(resource) => {
                    info!(
                        event_name = "messaging.twilio.sent",
                        message_sid = %resource.sid,
                        attempt = attempt + 1,
                        "outbound message accepted"
                    );
                    return Ok(DeliveryReceipt {
                        message_id: resource.sid,
                        status: resource.status.unwrap_or_else(|| "queued".to_string()),
                        attempts: attempt + 1,
                    });
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        event_name = "messaging.twilio.retry",
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %error,
                        "outbound message failed"
                    );
                    last_error = Some(error);
                    if attempt + 1 < attempts {
                        let delay = self.policy.backoff(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(error @ DeliveryError::Ambiguous(_)) => {
                    warn!(
                        event_name = "messaging.twilio.ambiguous",
                        attempt = attempt + 1,
                        error = %error,
                        "outbound message may have been accepted; not retrying"
                    );
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        event_name = "messaging.twilio.rejected",
                        error = %error,
                        "outbound message rejected"
                    );
                    return Err(error);
                }
            }
        }

        Err(DeliveryError::Exhausted {
            attempts,
            last: last_error.map(|error| error.to_string()).unwrap_or_default(),
        })
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String, DeliveryError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| DeliveryError::NotConfigured(key.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use casedesk_core::config::MessagingConfig;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    use super::TwilioSender;
    use crate::retry::RetryPolicy;
    use crate::sender::{DeliveryError, MessageSender};

    #[derive(Clone, Default)]
    struct FakeApi {
        calls: Arc<AtomicUsize>,
        failures_before_success: usize,
        status_on_failure: u16,
        stall_ms: u64,
        last_form: Arc<tokio::sync::Mutex<HashMap<String, String>>>,
    }

    async fn create_message(
        State(api): State<FakeApi>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let call = api.calls.fetch_add(1, Ordering::SeqCst);
        *api.last_form.lock().await = form;
        if api.stall_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(api.stall_ms)).await;
        }
        if call < api.failures_before_success {
            let status = StatusCode::from_u16(api.status_on_failure)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(json!({"code": 20500, "message": "unavailable"})));
        }
        (StatusCode::CREATED, Json(json!({"sid": "SM0001", "status": "queued"})))
    }

    async fn spawn_api(api: FakeApi) -> String {
        let app = Router::new()
            .route("/2010-04-01/Accounts/AC123/Messages.json", post(create_message))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    fn config(api_base_url: String) -> MessagingConfig {
        MessagingConfig {
            enabled: true,
            account_sid: Some("AC123".to_string()),
            auth_token: Some(SecretString::from("token".to_string())),
            from_number: Some("+14155238886".to_string()),
            api_base_url,
            timeout_secs: 5,
            max_retries: 2,
        }
    }

    #[test]
    fn missing_credentials_are_reported_by_key() {
        let mut incomplete = config("http://localhost".to_string());
        incomplete.account_sid = None;
        assert_eq!(
            TwilioSender::from_config(&incomplete).err(),
            Some(DeliveryError::NotConfigured("messaging.account_sid".to_string()))
        );

        let mut blank_token = config("http://localhost".to_string());
        blank_token.auth_token = Some(SecretString::from("  ".to_string()));
        assert!(matches!(
            TwilioSender::from_config(&blank_token),
            Err(DeliveryError::NotConfigured(key)) if key == "messaging.auth_token"
        ));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let sender = TwilioSender::from_config(&config("http://localhost/".to_string()))
            .expect("sender");
        assert!(!format!("{sender:?}").contains("auth_token"));
        assert_eq!(sender.messages_url(), "http://localhost/2010-04-01/Accounts/AC123/Messages.json");
    }

    #[tokio::test]
    async fn posts_prefixed_addresses_and_returns_the_sid() {
        let api = FakeApi::default();
        let base = spawn_api(api.clone()).await;
        let sender = TwilioSender::from_config(&config(base)).expect("sender");

        let receipt = sender.send("5215512345678", "Tu estimación").await.expect("send");
        assert_eq!(receipt.message_id, "SM0001");
        assert_eq!(receipt.attempts, 1);

        let form = api.last_form.lock().await.clone();
        assert_eq!(form.get("To").map(String::as_str), Some("whatsapp:+5215512345678"));
        assert_eq!(form.get("From").map(String::as_str), Some("whatsapp:+14155238886"));
        assert_eq!(form.get("Body").map(String::as_str), Some("Tu estimación"));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let api = FakeApi { failures_before_success: 2, status_on_failure: 503, ..FakeApi::default() };
        let base = spawn_api(api.clone()).await;
        let sender = TwilioSender::from_config(&config(base))
            .expect("sender")
            .with_policy(RetryPolicy::immediate(2));

        let receipt = sender.send("+5215512345678", "hola").await.expect("send");
        assert_eq!(receipt.attempts, 3);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let api = FakeApi { failures_before_success: 5, status_on_failure: 400, ..FakeApi::default() };
        let base = spawn_api(api.clone()).await;
        let sender = TwilioSender::from_config(&config(base))
            .expect("sender")
            .with_policy(RetryPolicy::immediate(3));

        let error = sender.send("+5215512345678", "hola").await.expect_err("rejected");
        assert_eq!(
            error,
            DeliveryError::Rejected { status: 400, message: "20500: unavailable".to_string() }
        );
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn internal_server_errors_are_not_retried() {
        let api = FakeApi { failures_before_success: 5, status_on_failure: 500, ..FakeApi::default() };
        let base = spawn_api(api.clone()).await;
        let sender = TwilioSender::from_config(&config(base))
            .expect("sender")
            .with_policy(RetryPolicy::immediate(3));

        let error = sender.send("+5215512345678", "hola").await.expect_err("rejected");
        assert!(matches!(error, DeliveryError::Rejected { status: 500, .. }));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_requests_are_sent_only_once() {
        let api = FakeApi { stall_ms: 1_500, ..FakeApi::default() };
        let base = spawn_api(api.clone()).await;
        let mut settings = config(base);
        settings.timeout_secs = 1;
        let sender = TwilioSender::from_config(&settings)
            .expect("sender")
            .with_policy(RetryPolicy::immediate(2));

        let error = sender.send("+5215512345678", "hola").await.expect_err("timed out");
        assert!(matches!(error, DeliveryError::Ambiguous(_)), "got {error:?}");
        assert!(!error.is_retryable());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_provider_is_retried_then_exhausted() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        drop(listener);
        let sender = TwilioSender::from_config(&config(format!("http://{address}")))
            .expect("sender")
            .with_policy(RetryPolicy::immediate(1));

        match sender.send("+5215512345678", "hola").await {
            Err(DeliveryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.starts_with("transport error"));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_error() {
        let api = FakeApi { failures_before_success: 9, status_on_failure: 503, ..FakeApi::default() };
        let base = spawn_api(api.clone()).await;
        let sender = TwilioSender::from_config(&config(base))
            .expect("sender")
            .with_policy(RetryPolicy::immediate(1));

        match sender.send("+5215512345678", "hola").await {
            Err(DeliveryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.contains("503"));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }
}
