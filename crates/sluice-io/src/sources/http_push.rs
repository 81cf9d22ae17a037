//! Self-driven HTTP-push source, grounded on
//! `integrations/sources/source_http_server.go`: starts an HTTP listener
//! that writes each posted body onto the pipeline's source channel,
//! annotating each event with a receipt timestamp and the caller's remote
//! address.

use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use sluice_core::traits::CapsuleTx;
use sluice_core::{Capsule, EventBatch, Operator, Source, SourceKind};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::sources::util::event_break_json_array;

#[derive(Clone)]
struct HandlerState {
    tx: CapsuleTx,
}

pub struct HttpPushSource {
    name: String,
    endpoint: String,
    port: u16,
    shutdown: Arc<Notify>,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl HttpPushSource {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            port,
            shutdown: Arc::new(Notify::new()),
            server_task: None,
        }
    }
}

impl Operator for HttpPushSource {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Source for HttpPushSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Push
    }

    /// Starts the HTTP listener in a background task and returns
    /// immediately, matching `HTTPServerSource.Read`'s "starts a goroutine,
    /// returns `[]string{}`" shape: the capsule carrying each batch is sent
    /// directly from inside the request handler, not from this function's
    /// return value.
    async fn read(&mut self, tx: &CapsuleTx) -> anyhow::Result<EventBatch> {
        let state = HandlerState { tx: tx.clone() };
        let app = Router::new()
            .route(&self.endpoint, post(handle_push))
            .with_state(state);

        let addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let shutdown = self.shutdown.clone();

        self.server_task = Some(tokio::spawn(async move {
            let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move { shutdown.notified().await });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "http push source server exited with error");
            }
        }));

        Ok(EventBatch::new())
    }

    async fn clean_up(&mut self) -> anyhow::Result<()> {
        tracing::info!("shutting down http push source");
        self.shutdown.notify_one();
        if let Some(task) = self.server_task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

async fn handle_push(
    State(state): State<HandlerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: String,
) {
    let now = Utc::now().to_rfc3339();
    let events: EventBatch = event_break_json_array(&body)
        .into_iter()
        .map(|raw| {
            sluice_core::Event::new(raw)
                .set("timestamp", serde_json::Value::String(now.clone()))
                .set("remoteaddr", serde_json::Value::String(remote.to_string()))
        })
        .collect();

    if events.is_empty() {
        return;
    }
    let capsule = Capsule { sink_id: None, prefix: None, events };
    if let Err(e) = state.tx.send(capsule).await {
        tracing::error!(error = %e, "dropping http-pushed batch, pipeline channel closed");
    }
}
