use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{Dispatch, File, SizeTally};
use crate::error::Error;
use crate::index::{ListingRow, Navigator, RatioBreakdown};
use crate::stats::ScanReport;

#[derive(Deserialize)]
pub struct PathParams {
    /// 缺省为导航器的当前目录
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct OpenParams {
    pub name: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub current: String,
    pub workers: usize,
    pub dispatch: Dispatch,
    pub cached_entries: usize,
}

#[derive(Serialize)]
pub struct NavResponse {
    pub current: String,
    pub rows: Vec<ListingRow>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP 层错误：引擎错误按类别映射状态码
pub enum ApiError {
    Engine(Error),
    Join(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Engine(e) => {
                let status = match &e {
                    Error::PathResolution { .. }
                    | Error::InvalidOperation { .. }
                    | Error::NotADirectory(_) => StatusCode::BAD_REQUEST,
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    Error::Cancelled => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::Join(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// 引擎调用是阻塞的：放到 blocking 线程池
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Join(e.to_string()))?
        .map(Json)
        .map_err(ApiError::Engine)
}

fn resolve(nav: &Navigator, path: Option<String>) -> crate::error::Result<File> {
    let current = nav.current();
    match path {
        Some(raw) => File::with_fs(current.fs().clone(), &raw),
        None => Ok(current),
    }
}

pub struct QueryServer {
    pub navigator: Arc<Navigator>,
}

impl QueryServer {
    pub fn new(navigator: Arc<Navigator>) -> Self {
        Self { navigator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/size", get(size_handler))
            .route("/tally", get(tally_handler))
            .route("/children", get(children_handler))
            .route("/ratio", get(ratio_handler))
            .route("/status", get(status_handler))
            .route("/nav", get(nav_handler))
            .route("/nav/open", post(nav_open_handler))
            .route("/nav/parent", post(nav_parent_handler))
            .route("/nav/browse", post(nav_browse_handler))
            .route("/nav/refresh", post(nav_refresh_handler))
            .with_state(self.navigator.clone())
    }

    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        tracing::info!("HTTP Query Server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn size_handler(
    Query(params): Query<PathParams>,
    State(nav): State<Arc<Navigator>>,
) -> ApiResult<ScanReport> {
    blocking(move || {
        let target = resolve(&nav, params.path)?;
        nav.aggregator().scan(&target)
    })
    .await
}

async fn tally_handler(
    Query(params): Query<PathParams>,
    State(nav): State<Arc<Navigator>>,
) -> ApiResult<SizeTally> {
    blocking(move || {
        let target = resolve(&nav, params.path)?;
        nav.aggregator().tally(&target)
    })
    .await
}

async fn children_handler(
    Query(params): Query<PathParams>,
    State(nav): State<Arc<Navigator>>,
) -> ApiResult<Vec<ListingRow>> {
    blocking(move || {
        let target = resolve(&nav, params.path)?;
        if !target.is_directory() {
            return Err(Error::NotADirectory(target.path().to_string()));
        }
        Ok(nav.listing_of(&target))
    })
    .await
}

async fn ratio_handler(
    Query(params): Query<PathParams>,
    State(nav): State<Arc<Navigator>>,
) -> ApiResult<RatioBreakdown> {
    blocking(move || {
        let target = resolve(&nav, params.path)?;
        RatioBreakdown::compute(&target)
    })
    .await
}

async fn status_handler(State(nav): State<Arc<Navigator>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        current: nav.current().absolute_path(),
        workers: nav.aggregator().workers(),
        dispatch: nav.aggregator().dispatch_mode(),
        cached_entries: nav.cache().len(),
    })
}

fn nav_snapshot(nav: &Navigator) -> NavResponse {
    NavResponse {
        current: nav.current().absolute_path(),
        rows: nav.listing(),
    }
}

async fn nav_handler(State(nav): State<Arc<Navigator>>) -> ApiResult<NavResponse> {
    blocking(move || Ok(nav_snapshot(&nav))).await
}

async fn nav_open_handler(
    Query(params): Query<OpenParams>,
    State(nav): State<Arc<Navigator>>,
) -> ApiResult<NavResponse> {
    blocking(move || {
        nav.open(&params.name)?;
        Ok(nav_snapshot(&nav))
    })
    .await
}

async fn nav_parent_handler(State(nav): State<Arc<Navigator>>) -> ApiResult<NavResponse> {
    blocking(move || {
        nav.show_parent();
        Ok(nav_snapshot(&nav))
    })
    .await
}

async fn nav_browse_handler(
    Query(params): Query<PathParams>,
    State(nav): State<Arc<Navigator>>,
) -> ApiResult<NavResponse> {
    blocking(move || {
        if let Some(raw) = params.path.as_deref() {
            nav.browse(raw)?;
        }
        Ok(nav_snapshot(&nav))
    })
    .await
}

async fn nav_refresh_handler(State(nav): State<Arc<Navigator>>) -> ApiResult<NavResponse> {
    blocking(move || {
        nav.refresh();
        Ok(nav_snapshot(&nav))
    })
    .await
}
