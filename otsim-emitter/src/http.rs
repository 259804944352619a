//! HTTP control surface.
//!
//! A thin adapter over [`Dispatcher::run_pass`]: a page to toggle transports
//! and an endpoint that runs one pass per request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::rngs::SmallRng;
use serde::Deserialize;
use tokio::sync::{Mutex, watch};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::config::EmitterConfig;
use crate::dispatch::Dispatcher;
use crate::transport::TransportKind;

/// Dispatcher shared by concurrent requests; passes run one at a time.
pub type SharedDispatcher = Arc<Mutex<Dispatcher<SmallRng>>>;

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub services: Vec<String>,
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    dispatcher: SharedDispatcher,
    config: Arc<EmitterConfig>,
    preselected: Arc<[TransportKind]>,
}

/// Create the HTTP router.
fn create_router(
    dispatcher: SharedDispatcher,
    config: Arc<EmitterConfig>,
    preselected: &[TransportKind],
) -> Router {
    let state = AppState {
        dispatcher,
        config,
        preselected: preselected.into(),
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/generate", post(generate_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the / page.
async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.preselected))
}

/// Handler for the /generate endpoint.
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    debug!(services = ?request.services, "Generate requested");

    let report = {
        let mut dispatcher = state.dispatcher.lock().await;
        dispatcher.run_pass(&state.config, &request.services).await
    };

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        report.to_string(),
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>OT telemetry emitter</title></head>
<body>
<h1>OT telemetry emitter</h1>
<form id="services">
"#;

const PAGE_TAIL: &str = r#"</form>
<pre id="report"></pre>
<script>
function selected() {
  return Array.from(document.querySelectorAll('input[name=service]:checked')).map(e => e.value);
}
setInterval(async () => {
  const services = selected();
  if (services.length === 0) return;
  const res = await fetch('/generate', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify({ services }),
  });
  document.getElementById('report').textContent = await res.text();
}, 1000);
</script>
</body>
</html>
"#;

fn render_index(preselected: &[TransportKind]) -> String {
    let mut page = String::from(PAGE_HEAD);
    for kind in TransportKind::ALL {
        let checked = if preselected.contains(&kind) {
            " checked"
        } else {
            ""
        };
        page.push_str(&format!(
            "<label><input type=\"checkbox\" name=\"service\" value=\"{}\"{}> {}</label><br>\n",
            kind.as_str(),
            checked,
            kind.display_name()
        ));
    }
    page.push_str(PAGE_TAIL);
    page
}

/// HTTP control server.
pub struct ControlServer {
    dispatcher: SharedDispatcher,
    config: Arc<EmitterConfig>,
    preselected: Vec<TransportKind>,
}

impl ControlServer {
    pub fn new(
        dispatcher: SharedDispatcher,
        config: Arc<EmitterConfig>,
        preselected: Vec<TransportKind>,
    ) -> Self {
        Self {
            dispatcher,
            config,
            preselected,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let address = self.config.web.address.clone();
        let port = self.config.web.port;
        let router = create_router(self.dispatcher, self.config, &self.preselected);

        let listener = tokio::net::TcpListener::bind((address.as_str(), port))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}:{}: {}", address, port, e))?;

        info!(addr = %listener.local_addr()?, "Control surface listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("Control surface shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("Control surface stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pacing::PacingPolicy;
    use crate::transport::{
        FieldbusConnection, FieldbusConnector, ObserveConnection, ObserveConnector,
        PubSubConnection, PubSubConnector, Transports,
    };
    use crate::config::{CoapConfig, ModbusConfig, MqttConfig};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use rand::SeedableRng;
    use tower::ServiceExt;

    struct Refusing;

    #[async_trait]
    impl PubSubConnector for Refusing {
        async fn connect(
            &self,
            _config: &MqttConfig,
        ) -> Result<Box<dyn PubSubConnection>, TransportError> {
            Err(TransportError::Connect("refused".to_string()))
        }
    }

    #[async_trait]
    impl FieldbusConnector for Refusing {
        async fn connect(
            &self,
            _config: &ModbusConfig,
        ) -> Result<Box<dyn FieldbusConnection>, TransportError> {
            Err(TransportError::Connect("refused".to_string()))
        }
    }

    #[async_trait]
    impl ObserveConnector for Refusing {
        async fn dial(
            &self,
            _config: &CoapConfig,
        ) -> Result<Box<dyn ObserveConnection>, TransportError> {
            Err(TransportError::Connect("refused".to_string()))
        }
    }

    fn make_router(preselected: &[TransportKind]) -> Router {
        let config = EmitterConfig::parse(
            r#"{
                mqtt: { address: "127.0.0.1", port: 1883 },
                modbus: { address: "127.0.0.1", port: 502 },
                coap: { address: "127.0.0.1", port: 5683 },
                web: { address: "127.0.0.1", port: 8080 },
            }"#,
        )
        .unwrap();
        let refusing = Arc::new(Refusing);
        let transports = Transports {
            mqtt: refusing.clone(),
            modbus: refusing.clone(),
            coap: refusing,
        };
        let dispatcher = Dispatcher::new(
            transports,
            PacingPolicy::none(),
            SmallRng::seed_from_u64(7),
        );

        create_router(
            Arc::new(Mutex::new(dispatcher)),
            Arc::new(config),
            preselected,
        )
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn generate(body: &str) -> Request<Body> {
        Request::post("/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = make_router(&[])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "healthy\n");
    }

    #[tokio::test]
    async fn test_index_prechecks_selected() {
        let response = make_router(&[TransportKind::Modbus])
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains(r#"value="modbus" checked>"#));
        assert!(page.contains(r#"value="mqtt">"#));
        assert!(page.contains(r#"value="coap">"#));
    }

    #[tokio::test]
    async fn test_generate_reports_outcomes() {
        let response = make_router(&[])
            .oneshot(generate(r#"{"services": ["mqtt", "bogus"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));

        let report = body_text(response).await;
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Failed to connect to MQTT broker on 127.0.0.1:1883"));
        assert_eq!(lines[1], "unknown service: bogus");
    }

    #[tokio::test]
    async fn test_generate_empty_selection() {
        let response = make_router(&[])
            .oneshot(generate(r#"{"services": []}"#))
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "No services selected\n");
    }

    #[tokio::test]
    async fn test_generate_malformed_body() {
        let response = make_router(&[])
            .oneshot(generate("not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
