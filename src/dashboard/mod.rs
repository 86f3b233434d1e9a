//! Dashboard HTTP API
//!
//! JSON API consumed by the admin dashboard frontend. Every response is
//! wrapped in a `{success, data, ...}` envelope; list endpoints add a
//! `pagination` object. CORS is wide open because the frontend is served
//! from a different origin.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::invoice::{AssetResolver, InvoiceService};
use crate::storage::{AttendanceRecord, AttendanceRepo, PhotoRef};

/// Shared state for the dashboard server.
#[derive(Clone)]
pub struct DashState {
    pub repo: AttendanceRepo,
    pub invoices: Arc<InvoiceService>,
    pub resolver: AssetResolver,
}

/// Start the dashboard API server.
pub async fn start_dashboard(port: u16, state: DashState) -> AppResult<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    log::info!("Starting dashboard API on http://{}", addr);
    log::info!("  GET    /api/attendances");
    log::info!("  GET    /api/statistics");
    log::info!("  GET    /api/students");
    log::info!("  POST   /api/invoice/generate");
    log::info!("  GET    /api/export/attendances");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: DashState) -> Router {
    Router::new()
        .route("/api/attendances", get(list_attendances))
        .route("/api/attendances/student/{nama}", get(student_attendances))
        .route("/api/attendances/{id}", delete(delete_attendance))
        .route("/api/statistics", get(statistics))
        .route("/api/students", get(students))
        .route("/api/invoice/generate", post(generate_invoice))
        .route("/api/invoice/{filename}", get(serve_invoice))
        .route("/api/export/attendances", get(export_attendances))
        .route("/api/image/{*path}", get(image_proxy))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API error wrapper so handlers can use `?` on [`AppError`].
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Dashboard request failed: {}", self.0);
        }
        (
            status,
            Json(json!({"success": false, "message": self.0.user_message()})),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    nama: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// Parse a `YYYY-MM-DD` query date; `end_of_day` picks which edge of the
/// day the filter should use.
fn parse_query_date(s: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(Utc.from_utc_datetime(&time))
}

/// Serialize a record the way the frontend expects it, wire names intact.
fn record_json(record: &AttendanceRecord, foto_display: Option<String>) -> Value {
    json!({
        "_id": record.id.map(|id| id.to_hex()),
        "nama": record.nama,
        "harga": record.harga,
        "tanggal": record.tanggal.to_rfc3339(),
        "deskripsi": record.deskripsi,
        "foto_path": record.foto_path,
        "isInvoiced": record.is_invoiced,
        "createdAt": record.created_at.to_rfc3339(),
        "fotoDisplay": foto_display,
    })
}

async fn enrich_records(resolver: &AssetResolver, records: &[AttendanceRecord]) -> Vec<Value> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let display = resolver.display_source(&record.photo_ref()).await;
        out.push(record_json(record, display));
    }
    out
}

/// GET /api/attendances: paginated, filterable listing.
async fn list_attendances(
    State(state): State<DashState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(config::pagination::DEFAULT_PAGE_SIZE)
        .clamp(1, config::pagination::MAX_PAGE_SIZE);
    let date_from = query
        .start_date
        .as_deref()
        .and_then(|s| parse_query_date(s, false));
    let date_to = query
        .end_date
        .as_deref()
        .and_then(|s| parse_query_date(s, true));

    let (records, total) = state
        .repo
        .find_page(query.nama.as_deref(), date_from, date_to, page, limit)
        .await?;
    let data = enrich_records(&state.resolver, &records).await;

    Ok(Json(json!({
        "success": true,
        "data": data,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": (total as i64 + limit - 1) / limit,
        },
    })))
}

/// GET /api/attendances/student/{nama}
async fn student_attendances(
    State(state): State<DashState>,
    Path(nama): Path<String>,
) -> ApiResult<Json<Value>> {
    let records = state.repo.find_for_student_newest_first(&nama).await?;
    let data = enrich_records(&state.resolver, &records).await;
    Ok(Json(json!({"success": true, "data": data})))
}

/// DELETE /api/attendances/{id}: removes the record and, best effort,
/// its photo.
async fn delete_attendance(
    State(state): State<DashState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let oid = ObjectId::parse_str(&id)
        .map_err(|_| AppError::Validation(format!("invalid attendance id: {}", id)))?;
    let record = state
        .repo
        .delete_by_id(&oid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("attendance {} not found", id)))?;

    if let Some(store) = state.resolver.store() {
        store.delete(&record.photo_ref()).await;
    }
    if let Some(path) = record.photo_ref().local_path() {
        let _ = std::fs::remove_file(path);
    }

    Ok(Json(json!({
        "success": true,
        "message": "Absen dihapus",
        "data": record_json(&record, None),
    })))
}

/// GET /api/statistics
async fn statistics(State(state): State<DashState>) -> ApiResult<Json<Value>> {
    let stats = state.repo.statistics(Utc::now()).await?;
    Ok(Json(json!({"success": true, "data": stats})))
}

/// GET /api/students: per-student rollups.
async fn students(State(state): State<DashState>) -> ApiResult<Json<Value>> {
    let rollups = state.repo.student_rollups().await?;
    Ok(Json(json!({"success": true, "data": rollups})))
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    nama: Option<String>,
    #[serde(rename = "attendanceIds")]
    attendance_ids: Option<Vec<String>>,
}

/// POST /api/invoice/generate: by student name or by explicit record ids.
async fn generate_invoice(
    State(state): State<DashState>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Json<Value>> {
    let generated = if let Some(ids) = body.attendance_ids.filter(|ids| !ids.is_empty()) {
        let oids = ids
            .iter()
            .map(|id| {
                ObjectId::parse_str(id)
                    .map_err(|_| AppError::Validation(format!("invalid attendance id: {}", id)))
            })
            .collect::<AppResult<Vec<_>>>()?;
        state.invoices.generate_for_ids(&oids).await?
    } else if let Some(nama) = body.nama.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        state.invoices.generate_for_student(nama).await?
    } else {
        return Err(AppError::Validation(
            "either nama or attendanceIds is required".to_string(),
        )
        .into());
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "nama": generated.nama,
            "filename": generated.filename,
            "recordCount": generated.record_count,
            "total": generated.total,
            "invoiceUrl": format!("/api/invoice/{}", generated.filename),
        },
    })))
}

/// GET /api/invoice/{filename}: serves a previously generated invoice PNG.
async fn serve_invoice(Path(filename): Path<String>) -> ApiResult<Response> {
    // generated filenames never contain separators
    if filename.contains('/') || filename.contains("..") {
        return Err(AppError::Validation("invalid invoice filename".to_string()).into());
    }
    let path = std::path::Path::new(config::INVOICE_DIR.as_str()).join(&filename);
    let bytes = std::fs::read(&path)
        .map_err(|_| AppError::NotFound(format!("invoice {} not found", filename)))?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

/// GET /api/export/attendances?format=csv|json
async fn export_attendances(
    State(state): State<DashState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let records = state.repo.export_all().await?;
    match query.format.as_deref().unwrap_or("json") {
        "csv" => {
            let csv = export_csv(&records)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"attendances.csv\"".to_string(),
                    ),
                ],
                csv,
            )
                .into_response())
        }
        "json" => {
            let data: Vec<Value> = records.iter().map(|r| record_json(r, None)).collect();
            Ok(Json(json!({"success": true, "data": data})).into_response())
        }
        other => {
            Err(AppError::Validation(format!("unsupported export format: {}", other)).into())
        }
    }
}

fn export_csv(records: &[AttendanceRecord]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "nama",
            "harga",
            "tanggal",
            "deskripsi",
            "isInvoiced",
            "createdAt",
        ])
        .map_err(|e| AppError::Upstream(format!("csv write failed: {}", e)))?;
    for record in records {
        writer
            .write_record([
                record.id.map(|id| id.to_hex()).unwrap_or_default(),
                record.nama.clone(),
                record.harga.to_string(),
                record.tanggal.to_rfc3339(),
                record.deskripsi.clone(),
                record.is_invoiced.to_string(),
                record.created_at.to_rfc3339(),
            ])
            .map_err(|e| AppError::Upstream(format!("csv write failed: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Upstream(format!("csv flush failed: {}", e)))
}

/// Resolve a proxy path into a fetchable ref. With a CDN configured every
/// request goes upstream; without one only storage-key shaped paths are
/// allowed, so the proxy can never be steered at arbitrary local files.
fn proxy_ref(cdn_base: Option<&str>, path: &str) -> AppResult<PhotoRef> {
    if path.contains("..") {
        return Err(AppError::Validation("invalid image path".to_string()));
    }
    match cdn_base {
        Some(cdn) => Ok(PhotoRef::Url(format!(
            "{}/{}",
            cdn,
            path.trim_start_matches('/')
        ))),
        None => match PhotoRef::classify(path) {
            key @ PhotoRef::StorageKey(_) => Ok(key),
            _ => Err(AppError::Validation("invalid image path".to_string())),
        },
    }
}

/// GET /api/image/{*path}: proxies CDN/storage photos so the browser
/// never fights the CDN's CORS policy.
async fn image_proxy(
    State(state): State<DashState>,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    let photo_ref = proxy_ref(config::CDN_BASE_URL.as_deref(), &path)?;
    let bytes = state.resolver.fetch(&photo_ref).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_dates_pick_day_edges() {
        let from = parse_query_date("2025-11-02", false).unwrap();
        let to = parse_query_date("2025-11-02", true).unwrap();
        assert_eq!(from.to_rfc3339(), "2025-11-02T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2025-11-02T23:59:59+00:00");
        assert!(parse_query_date("02/11/2025", false).is_none());
    }

    #[test]
    fn record_json_uses_wire_field_names() {
        let record = AttendanceRecord {
            id: Some(ObjectId::new()),
            nama: "Andi".into(),
            harga: 100_000,
            tanggal: Utc::now(),
            deskripsi: "Kelas Gitar".into(),
            foto_path: "absen/andi.jpg".into(),
            is_invoiced: false,
            created_at: Utc::now(),
        };
        let value = record_json(&record, Some("/api/image/absen/andi.jpg".into()));
        assert_eq!(value["nama"], "Andi");
        assert_eq!(value["isInvoiced"], false);
        assert_eq!(value["fotoDisplay"], "/api/image/absen/andi.jpg");
        assert!(value["_id"].as_str().unwrap().len() == 24);
    }

    #[test]
    fn image_proxy_without_cdn_only_serves_storage_keys() {
        assert_eq!(
            proxy_ref(None, "absen/andi.jpg").unwrap(),
            PhotoRef::StorageKey("absen/andi.jpg".into())
        );
        assert!(proxy_ref(None, "/etc/passwd").is_err());
        assert!(proxy_ref(None, "etc/passwd").is_err());
        assert!(proxy_ref(None, "absen/../../etc/passwd").is_err());
        assert!(proxy_ref(None, "../absen/x.jpg").is_err());
    }

    #[test]
    fn image_proxy_with_cdn_always_goes_upstream() {
        assert_eq!(
            proxy_ref(Some("https://cdn.example"), "absen/andi.jpg").unwrap(),
            PhotoRef::Url("https://cdn.example/absen/andi.jpg".into())
        );
        // traversal is rejected before the URL is ever built
        assert!(proxy_ref(Some("https://cdn.example"), "a/../b.jpg").is_err());
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let record = AttendanceRecord {
            id: Some(ObjectId::new()),
            nama: "Budi".into(),
            harga: 150_000,
            tanggal: Utc::now(),
            deskripsi: "Vokal".into(),
            foto_path: "absen/budi.jpg".into(),
            is_invoiced: true,
            created_at: Utc::now(),
        };
        let csv = export_csv(&[record]).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,nama,harga,tanggal,deskripsi,isInvoiced,createdAt"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("Budi"));
        assert!(row.contains("150000"));
        assert!(row.contains("true"));
    }
}
