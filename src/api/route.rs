use crate::{
    api::{
        error::ApiError,
        response::{ApiResponse, with_total_count},
    },
    models::{DateRange, Filters},
    state::AppState,
    validation::{
        validate_amount, validate_date, validate_max_results, validate_page, validate_safe_address,
        validate_status,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

// GET /safes/{address}/transactions query parameters
#[derive(Deserialize, Default)]
pub struct HistoryQuery {
    page: Option<String>,
    status: Option<String>,
    from: Option<String>,
    to: Option<String>,
    min_value: Option<String>,
    max_value: Option<String>,
    token_address: Option<String>,
}

// GET /safes/{address}/search query parameters
#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    max_results: Option<String>,
}

// Create router with all routes
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/safes/{address}/transactions", get(get_transactions))
        .route("/safes/{address}/invalidate", post(invalidate))
        .route("/safes/{address}/search", get(search))
        .route("/cache/stats", get(cache_stats))
        .with_state(app_state)
}

impl HistoryQuery {
    fn filters(&self) -> Result<Filters, ApiError> {
        let status = self.status.as_deref().map(validate_status).transpose()?;
        let from = self.from.as_deref().map(|v| validate_date("from", v)).transpose()?;
        let to = self.to.as_deref().map(|v| validate_date("to", v)).transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ApiError::InvalidParameter("from must not be after to".to_string()));
            }
        }
        let min_value = self
            .min_value
            .as_deref()
            .map(|v| validate_amount("min_value", v))
            .transpose()?;
        let max_value = self
            .max_value
            .as_deref()
            .map(|v| validate_amount("max_value", v))
            .transpose()?;
        let token_address = self
            .token_address
            .as_deref()
            .map(validate_safe_address)
            .transpose()?;

        Ok(Filters {
            status,
            date_range: (from.is_some() || to.is_some()).then_some(DateRange { from, to }),
            min_value,
            max_value,
            token_address,
        })
    }
}

// GET /safes/{address}/transactions handler
async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let address = validate_safe_address(&address)?;
    let page = validate_page(params.page.as_deref())?;
    let filters = params.filters()?;

    info!("Fetching page {} of transaction history for {}", page, address);

    // Cancelled when the client disconnects and this handler is dropped
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let result = state.service.get_page(&address, page, &filters, &cancel).await?;
    let total_count = result.total_count;
    Ok(with_total_count(result, total_count))
}

// POST /safes/{address}/invalidate handler
async fn invalidate(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let address = validate_safe_address(&address)?;
    let removed = state.service.invalidate(&address).await?;
    info!("Invalidated {} cached pages for {}", removed, address);
    Ok(StatusCode::NO_CONTENT.into_response())
}

// GET /safes/{address}/search handler
async fn search(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let address = validate_safe_address(&address)?;
    let max_results = validate_max_results(params.max_results.as_deref())?;

    let results = state.service.search(&address, &params.q, max_results).await?;
    info!("Search '{}' on {} matched {} cached records", params.q, address, results.len());
    Ok(ApiResponse { data: results }.into_response())
}

// GET /cache/stats handler
async fn cache_stats(State(state): State<Arc<AppState>>) -> Response {
    ApiResponse { data: state.service.stats().await }.into_response()
}
