use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, patch, post},
    Json, Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{select, sync::broadcast::error::RecvError};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    aggregate::AggregateResult,
    error::ValidationError,
    fetch::DocumentFetcher,
    portfolio::{Holding, Portfolio, PortfolioEvent},
    state::Tracker,
    AppEvent,
};

type SharedTracker<F> = Arc<Tracker<F>>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PortfolioView {
    pub holdings: Vec<Holding>,
    pub total_weight: Decimal,
}

impl From<&Portfolio> for PortfolioView {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            holdings: portfolio.holdings().cloned().collect(),
            total_weight: portfolio.total_weight(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AddHoldingRequest {
    pub symbol: String,
    pub url: String,
    pub weight: Decimal,
}

#[derive(Deserialize, Debug)]
pub struct UpdateHoldingRequest {
    pub url: Option<String>,
    pub weight: Option<Decimal>,
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let status = match self {
            ValidationError::DuplicateSymbol(_) => StatusCode::CONFLICT,
            ValidationError::UnknownSymbol(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router<F: DocumentFetcher + 'static>(tracker: SharedTracker<F>) -> Router {
    Router::new()
        .route("/portfolio", get(get_portfolio::<F>))
        .route("/portfolio/holdings", post(add_holding::<F>))
        .route(
            "/portfolio/holdings/{symbol}",
            patch(update_holding::<F>).delete(delete_holding::<F>),
        )
        .route("/aggregate", get(get_aggregate::<F>))
        .route("/refresh", post(refresh::<F>))
        .route("/ws", any(ws_handler::<F>))
        .layer(TraceLayer::new_for_http())
        .with_state(tracker)
}

pub async fn start<F: DocumentFetcher + 'static>(
    address: String,
    tracker: SharedTracker<F>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(tracker).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn get_portfolio<F: DocumentFetcher + 'static>(
    State(tracker): State<SharedTracker<F>>,
) -> Json<PortfolioView> {
    Json(PortfolioView::from(&tracker.portfolio().await))
}

async fn add_holding<F: DocumentFetcher + 'static>(
    State(tracker): State<SharedTracker<F>>,
    Json(request): Json<AddHoldingRequest>,
) -> Result<(StatusCode, Json<Holding>), ValidationError> {
    let holding = tracker
        .add_holding(&request.symbol, &request.url, request.weight)
        .await?;
    Ok((StatusCode::CREATED, Json(holding)))
}

async fn update_holding<F: DocumentFetcher + 'static>(
    State(tracker): State<SharedTracker<F>>,
    Path(symbol): Path<String>,
    Json(request): Json<UpdateHoldingRequest>,
) -> Result<Json<Holding>, ValidationError> {
    let holding = tracker
        .update_holding(&symbol, request.url.as_deref(), request.weight)
        .await?;
    Ok(Json(holding))
}

async fn delete_holding<F: DocumentFetcher + 'static>(
    State(tracker): State<SharedTracker<F>>,
    Path(symbol): Path<String>,
) -> Result<Json<Holding>, ValidationError> {
    Ok(Json(tracker.delete_holding(&symbol).await?))
}

async fn get_aggregate<F: DocumentFetcher + 'static>(
    State(tracker): State<SharedTracker<F>>,
) -> Json<AggregateResult> {
    Json(tracker.get_current_aggregate().await)
}

async fn refresh<F: DocumentFetcher + 'static>(
    State(tracker): State<SharedTracker<F>>,
) -> Json<AggregateResult> {
    Json(tracker.trigger_refresh().await)
}

async fn ws_handler<F: DocumentFetcher + 'static>(
    ws: WebSocketUpgrade,
    State(tracker): State<SharedTracker<F>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tracker))
}

fn to_message(event: &AppEvent) -> Option<Message> {
    match serde_json::ser::to_string(event) {
        Ok(msg) => Some(Message::Text(msg.into())),
        Err(err) => {
            error!("Failed to serialize event : {}", err);
            None
        }
    }
}

async fn handle_socket<F: DocumentFetcher + 'static>(socket: WebSocket, tracker: SharedTracker<F>) {
    let mut app_rx = tracker.subscribe();
    let (mut sender, mut receiver) = socket.split();

    // send the current portfolio so clients can render before the next edit
    let event = AppEvent::Portfolio(PortfolioEvent::Updated(tracker.portfolio().await));
    if let Some(msg) = to_message(&event) {
        if sender.send(msg).await.is_err() {
            return;
        }
    }

    let mut send_task = tokio::task::spawn(async move {
        loop {
            match app_rx.recv().await {
                Ok(event) => {
                    let Some(msg) = to_message(&event) else {
                        continue;
                    };
                    if sender.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Websocket client lagging, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }
    });

    let mut recv_task = tokio::task::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(frame) = msg {
                info!("Websocket closed : {:?}", frame);
                break;
            }
        }
    });

    select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }
}
