// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! HTTP surface: archive downloads for storage providers plus read-only deal
//! and catalog queries.

use crate::car::CarStore;
use crate::catalog::{CidBase, CidCatalog, CidConversion, CidDetails, CidInfo, convert_cid};
use crate::deal::DealLifecycleTracker;
use crate::error::Error;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CAR_CONTENT_TYPE: &str = "application/vnd.ipld.car";

pub struct ServerState {
    pub store: CarStore,
    pub tracker: DealLifecycleTracker,
    pub catalog: Arc<dyn CidCatalog>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    let mount = state.store.mount();
    let download = if mount.is_empty() {
        "/{file}".to_string()
    } else {
        format!("/{mount}/{{file}}")
    };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/deals/{id}", get(deal_status))
        .route("/cids/{cid}", get(lookup_cid))
        .route("/stats", get(statistics))
        .route(&download, get(download_archive))
        .with_state(state)
}

/// Serves until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    info!("serving archives on {}", listener.local_addr()?);
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn download_archive(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.store.read_file(&file).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CAR_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn deal_status(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    Ok(Json(state.tracker.status(&id).await?).into_response())
}

/// Optional re-encoding of the looked up CID.
#[derive(Debug, Deserialize)]
struct ConvertParams {
    base: Option<CidBase>,
    version: Option<u64>,
}

#[derive(Serialize)]
struct CidLookup {
    #[serde(flatten)]
    info: CidInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    converted: Option<CidConversion>,
}

async fn lookup_cid(
    State(state): State<Arc<ServerState>>,
    Path(text): Path<String>,
    Query(params): Query<ConvertParams>,
) -> Result<Response, AppError> {
    let (cid, _) = CidDetails::parse(&text)?;
    let converted = match params {
        ConvertParams {
            base: None,
            version: None,
        } => None,
        ConvertParams { base, version } => Some(convert_cid(&text, version, base)?),
    };
    let info = state.catalog.lookup(&cid).await?;
    Ok(Json(CidLookup { info, converted }).into_response())
}

async fn statistics(State(state): State<Arc<ServerState>>) -> Result<Response, AppError> {
    Ok(Json(state.catalog.statistics().await?).into_response())
}

struct AppError(Error);

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::ChainUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::{ArchiveRecord, CarStream, DagPacker, Packer as _};
    use crate::catalog::MemoryCidCatalog;
    use crate::deal::tests::new_deal;
    use crate::deal::{DealRegistry, DealStatus, MemoryDealRegistry, SimulatedObserver};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use futures::TryStreamExt as _;
    use tempfile::TempDir;
    use tower::ServiceExt as _;

    struct Fixture {
        _dir: TempDir,
        state: Arc<ServerState>,
        archive: ArchiveRecord,
        registry: Arc<MemoryDealRegistry>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = CarStore::new(
            dir.path().join("car"),
            "http://localhost:3001".parse().unwrap(),
            "/car/",
        )
        .unwrap();
        let source = dir.path().join("album");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.txt"), b"aaa").unwrap();
        let packed = DagPacker::default().pack(&source, false).unwrap();
        let stored = store.persist(&packed.root, &packed.bytes).await.unwrap();
        let archive = ArchiveRecord::new(&packed, stored, "album");

        let catalog = Arc::new(MemoryCidCatalog::new());
        catalog.index_archive(&archive).await.unwrap();
        let registry = Arc::new(MemoryDealRegistry::new());
        let tracker = DealLifecycleTracker::new(
            registry.clone(),
            Arc::new(SimulatedObserver::default()),
        );
        Fixture {
            _dir: dir,
            state: Arc::new(ServerState {
                store,
                tracker,
                catalog,
            }),
            archive,
            registry,
        }
    }

    async fn get(state: &Arc<ServerState>, uri: &str) -> (StatusCode, Response) {
        let response = router(state.clone())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), response)
    }

    #[tokio::test]
    async fn download_url_serves_the_archive() {
        let f = fixture().await;
        let (status, response) = get(&f.state, f.archive.download_url.path()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            CAR_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stream = CarStream::new(std::io::Cursor::new(body.to_vec()))
            .await
            .unwrap();
        assert_eq!(stream.header.roots.first(), &f.archive.root_cid);
        let blocks: Vec<_> = stream.try_collect().await.unwrap();
        assert!(!blocks.is_empty());
    }

    #[tokio::test]
    async fn unknown_or_malformed_archive_is_404() {
        let f = fixture().await;
        let missing = format!("/car/{}.car", f.archive.piece_cid);
        assert_eq!(get(&f.state, &missing).await.0, StatusCode::NOT_FOUND);
        assert_eq!(get(&f.state, "/car/..%2Fsecret").await.0, StatusCode::NOT_FOUND);
        assert_eq!(get(&f.state, "/car/notes.txt").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deal_status_as_json() {
        let f = fixture().await;
        let deal = f
            .registry
            .create(new_deal("t1client", "t01000"))
            .await
            .unwrap();
        let (status, response) = get(&f.state, &format!("/deals/{}", deal.deal_id)).await;
        assert_eq!(status, StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: DealStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.deal_id, deal.deal_id);
        assert_eq!(parsed.progress_percent, 25);

        assert_eq!(get(&f.state, "/deals/nope").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cid_lookup_and_stats() {
        let f = fixture().await;
        let (status, _) = get(&f.state, &format!("/cids/{}", f.archive.root_cid)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(get(&f.state, "/cids/garbage").await.0, StatusCode::BAD_REQUEST);

        let (status, response) = get(&f.state, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["totalArchives"], 1);
        assert_eq!(stats["totalCids"], 1);
        assert_eq!(get(&f.state, "/healthz").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn cid_lookup_can_re_encode() {
        let f = fixture().await;
        let root = f.archive.root_cid;
        let json = |response: Response| async move {
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            serde_json::from_slice::<serde_json::Value>(&body).unwrap()
        };

        let (status, response) = get(&f.state, &format!("/cids/{root}")).await;
        assert_eq!(status, StatusCode::OK);
        let plain = json(response).await;
        assert_eq!(plain["entry"]["cid"], root.to_string());
        assert!(plain.get("converted").is_none());

        let (status, response) = get(&f.state, &format!("/cids/{root}?base=base58btc")).await;
        assert_eq!(status, StatusCode::OK);
        let converted = json(response).await;
        assert_eq!(
            converted["converted"]["converted"],
            root.to_string_of_base(cid::multibase::Base::Base58Btc).unwrap()
        );
        assert_eq!(converted["converted"]["convertedVersion"], 1);
        assert_eq!(converted["details"], plain["details"]);

        // dag-cbor roots have no v0 form
        let (status, _) = get(&f.state, &format!("/cids/{root}?version=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(&f.state, &format!("/cids/{root}?base=base2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
