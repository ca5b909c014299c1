use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use basket_core::domain::contract::{validate_batch, InstrumentRecord};
use basket_core::domain::instrument::Instrument;
use basket_core::pipeline::{recommend, Recommendation, RecommendationRequest, SelectionOptions};
use basket_core::scoring::composite::{score_candidates, ScoredInstrument, SubScores};
use basket_core::scoring::trend::{estimate_trend, TrendError, TrendEstimate};
use basket_core::scoring::weights::WeightVector;
use basket_core::selection::candidates::{RankedCandidate, TrendSignal};
use basket_core::selection::selector::{select_portfolio, PortfolioEntry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = basket_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let state = AppState {
        options: SelectionOptions::from_env(),
    };

    if let Err(err) = serve(router(state)).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "api stopped with an error");
        return Err(err);
    }

    Ok(())
}

async fn serve(app: Router) -> anyhow::Result<()> {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/scores", post(post_scores))
        .route("/v1/trend", post(post_trend))
        .route("/v1/portfolio", post(post_portfolio))
        .route("/v1/recommendations", post(post_recommendations))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    options: SelectionOptions,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn bad_request(err: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": err.to_string() }),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::debug!(error = %format!("{err:#}"), "rejected request");
        Self::bad_request(format!("{err:#}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn check_risk_tolerance(risk_tolerance: f64) -> Result<(), ApiError> {
    if risk_tolerance.is_finite() && (0.0..=100.0).contains(&risk_tolerance) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "risk_tolerance must be between 0 and 100 (got {risk_tolerance})"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct ScoresRequest {
    instruments: Vec<InstrumentRecord>,
    risk_tolerance: f64,
}

#[derive(Debug, Serialize)]
struct ScoresResponse {
    weights: WeightVector,
    items: Vec<ScoredInstrument>,
}

async fn post_scores(
    payload: Result<Json<ScoresRequest>, JsonRejection>,
) -> Result<Json<ScoresResponse>, ApiError> {
    let Json(req) = payload?;
    check_risk_tolerance(req.risk_tolerance)?;

    let instruments = validate_batch(req.instruments)?;
    let (weights, items) = score_candidates(&instruments, req.risk_tolerance);
    Ok(Json(ScoresResponse { weights, items }))
}

#[derive(Debug, Deserialize)]
struct TrendRequest {
    prices: Vec<f64>,
}

async fn post_trend(
    payload: Result<Json<TrendRequest>, JsonRejection>,
) -> Result<Json<TrendEstimate>, ApiError> {
    let Json(req) = payload?;
    match estimate_trend(&req.prices) {
        Ok(estimate) => Ok(Json(estimate)),
        Err(TrendError::InsufficientHistory { observations }) => Err(ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: json!({ "error": "insufficient_history", "observations": observations }),
        }),
    }
}

/// A scored instrument as returned by `/v1/scores`, plus its trend. Derived
/// ranking fields sent alongside are ignored and recomputed.
#[derive(Debug, Deserialize)]
struct PortfolioCandidate {
    instrument: Instrument,
    sub_scores: SubScores,
    composite_score: f64,
    #[serde(default = "unavailable_trend")]
    trend: TrendSignal,
}

fn unavailable_trend() -> TrendSignal {
    TrendSignal::Unavailable
}

#[derive(Debug, Deserialize)]
struct PortfolioRequest {
    candidates: Vec<PortfolioCandidate>,
    budget: f64,
    #[serde(default)]
    target_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PortfolioResponse {
    entries: Vec<PortfolioEntry>,
    no_affordable_instruments: bool,
}

/// Re-validate echoed instruments (unique tickers included) and rebuild each
/// candidate's trend-derived scores.
fn rebuild_candidates(candidates: Vec<PortfolioCandidate>) -> anyhow::Result<Vec<RankedCandidate>> {
    let mut scores = Vec::with_capacity(candidates.len());
    let mut records = Vec::with_capacity(candidates.len());
    for c in candidates {
        anyhow::ensure!(
            c.composite_score.is_finite() && c.sub_scores.stability.is_finite(),
            "scores must be finite ({})",
            c.instrument.ticker
        );
        scores.push((c.sub_scores, c.composite_score, c.trend));
        records.push(InstrumentRecord::from(c.instrument));
    }

    let instruments = validate_batch(records)?;
    Ok(instruments
        .into_iter()
        .zip(scores)
        .map(|(instrument, (sub_scores, composite_score, trend))| {
            RankedCandidate::from_scored(
                ScoredInstrument {
                    instrument,
                    sub_scores,
                    composite_score,
                },
                trend,
            )
        })
        .collect())
}

async fn post_portfolio(
    State(state): State<AppState>,
    payload: Result<Json<PortfolioRequest>, JsonRejection>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let Json(req) = payload?;
    if !req.budget.is_finite() || req.budget <= 0.0 {
        return Err(ApiError::bad_request(format!(
            "budget must be positive (got {})",
            req.budget
        )));
    }
    let target_count = req.target_count.unwrap_or(state.options.target_count);
    if target_count == 0 {
        return Err(ApiError::bad_request("target_count must be at least 1"));
    }

    let candidates = rebuild_candidates(req.candidates)?;
    let entries = select_portfolio(&candidates, req.budget, target_count);
    Ok(Json(PortfolioResponse {
        no_affordable_instruments: entries.is_empty(),
        entries,
    }))
}

#[derive(Debug, Deserialize)]
struct RecommendationPayload {
    #[serde(flatten)]
    request: RecommendationRequest,
    #[serde(default)]
    histories: BTreeMap<String, Vec<f64>>,
}

async fn post_recommendations(
    State(state): State<AppState>,
    payload: Result<Json<RecommendationPayload>, JsonRejection>,
) -> Result<Json<Recommendation>, ApiError> {
    let Json(RecommendationPayload {
        mut request,
        histories,
    }) = payload?;
    request.target_count = request.target_count.or(Some(state.options.target_count));

    let recommendation = recommend(request, &histories)?;
    Ok(Json(recommendation))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &basket_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State<AppState> {
        State(AppState {
            options: SelectionOptions::default(),
        })
    }

    fn record(ticker: &str, sector: &str, price: f64) -> InstrumentRecord {
        serde_json::from_value(json!({
            "ticker": ticker,
            "name": format!("Name {ticker}"),
            "country": "한국",
            "sector": sector,
            "price": price,
            "recent_return_pct": 3.0,
            "volatility": "낮음",
            "pe_ratio": 9.5,
            "dividend_yield_pct": 2.5,
            "market_cap": "대형",
            "liquidity": "높음",
            "growth_rate_pct": 6.0,
            "rsi": 48,
            "news_sentiment": 3.9,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await, "ok");
    }

    #[tokio::test]
    async fn scores_are_returned_sorted() {
        let mut weak = record("B", "금융", 10_000.0);
        weak.pe_ratio = 40.0;
        let req = ScoresRequest {
            instruments: vec![weak, record("A", "반도체", 10_000.0)],
            risk_tolerance: 30.0,
        };

        let Json(res) = post_scores(Ok(Json(req))).await.unwrap();
        assert_eq!(res.items.len(), 2);
        assert_eq!(res.items[0].instrument.ticker, "A");
        assert!((res.weights.total() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalid_scores_request_is_bad_request() {
        let req = ScoresRequest {
            instruments: vec![record("A", "반도체", 0.0)],
            risk_tolerance: 30.0,
        };
        let err = post_scores(Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.body["error"].as_str().unwrap().contains("price"));

        let req = ScoresRequest {
            instruments: vec![record("A", "반도체", 10_000.0)],
            risk_tolerance: 101.0,
        };
        let err = post_scores(Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn short_trend_history_is_unprocessable() {
        let req = TrendRequest {
            prices: vec![100.0; 12],
        };
        let err = post_trend(Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.body,
            json!({ "error": "insufficient_history", "observations": 12 })
        );
    }

    #[tokio::test]
    async fn flat_trend_history_projects_no_change() {
        let req = TrendRequest {
            prices: vec![100.0; 30],
        };
        let Json(estimate) = post_trend(Ok(Json(req))).await.unwrap();
        assert_eq!(estimate.percent_change, 0.0);
        assert_eq!(estimate.path.len(), 30);
    }

    /// Ranked candidates as a client would echo them back from `/v1/scores`.
    fn ranked_json(records: Vec<InstrumentRecord>, percent_change: f64) -> Vec<serde_json::Value> {
        let instruments = validate_batch(records).unwrap();
        let (_, scored) = score_candidates(&instruments, 50.0);
        scored
            .into_iter()
            .map(|s| {
                let c = RankedCandidate::from_scored(s, TrendSignal::Estimated { percent_change });
                serde_json::to_value(c).unwrap()
            })
            .collect()
    }

    fn portfolio_request(candidates: Vec<serde_json::Value>, budget: f64) -> PortfolioRequest {
        serde_json::from_value(json!({ "candidates": candidates, "budget": budget })).unwrap()
    }

    #[tokio::test]
    async fn portfolio_reports_no_affordable_instruments() {
        let candidates = ranked_json(vec![record("DEAR", "바이오", 5_000_000.0)], 8.0);
        let req = portfolio_request(candidates, 1_000_000.0);
        let Json(res) = post_portfolio(state(), Ok(Json(req))).await.unwrap();
        assert!(res.entries.is_empty());
        assert!(res.no_affordable_instruments);
    }

    #[tokio::test]
    async fn portfolio_recomputes_client_supplied_ranking_fields() {
        let mut candidates = ranked_json(vec![record("NEG", "금융", 10_000.0)], 5.0);
        candidates[0]["trend_score"] = json!(1.0);
        candidates[0]["profitability_score"] = json!(-10.0);
        candidates[0]["final_score"] = json!(99.0);

        let req = portfolio_request(candidates, 1_000_000.0);
        let Json(res) = post_portfolio(state(), Ok(Json(req))).await.unwrap();
        assert_eq!(res.entries.len(), 1);
        assert_eq!(res.entries[0].profitability_score, 2.0);
        assert!(res.entries[0].final_score < 99.0);
    }

    #[tokio::test]
    async fn portfolio_rejects_duplicate_tickers() {
        let candidates = ranked_json(vec![record("DUP", "금융", 10_000.0)], 5.0);
        let req = portfolio_request(vec![candidates[0].clone(), candidates[0].clone()], 1_000_000.0);
        let err = post_portfolio(state(), Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.body["error"].as_str().unwrap().contains("duplicate"));
    }

    #[tokio::test]
    async fn portfolio_rejects_invalid_echoed_instrument() {
        let mut candidates = ranked_json(vec![record("BAD", "금융", 10_000.0)], 5.0);
        candidates[0]["instrument"]["price"] = json!(-1.0);
        let req = portfolio_request(candidates, 1_000_000.0);
        let err = post_portfolio(state(), Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.body["error"].as_str().unwrap().contains("price"));
    }

    #[tokio::test]
    async fn portfolio_rejects_non_positive_budget() {
        let req = PortfolioRequest {
            candidates: Vec::new(),
            budget: 0.0,
            target_count: Some(5),
        };
        let err = post_portfolio(state(), Ok(Json(req))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recommendations_parse_flattened_payload() {
        let instruments: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|t| record(t, "반도체", 50_000.0))
            .collect();
        let rising: Vec<f64> = (0..40).map(|i| 1_000.0 + 10.0 * i as f64).collect();
        let payload: RecommendationPayload = serde_json::from_value(json!({
            "instruments": instruments,
            "risk_tolerance": 60,
            "budget": 1_000_000,
            "histories": { "A": rising }
        }))
        .unwrap();

        let Json(rec) = post_recommendations(state(), Ok(Json(payload)))
            .await
            .unwrap();
        assert!(!rec.entries.is_empty());
        assert_eq!(rec.metadata.trend_estimates, 1);
        assert_eq!(rec.metadata.candidates_scored, 3);
        assert!(!rec.metadata.no_affordable_instruments);
    }
}
