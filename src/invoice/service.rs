//! Invoice generation orchestration
//!
//! Serializes generation per student and claims records before any pixels
//! are rendered, so two concurrent triggers (bot auto-invoice racing a
//! dashboard click) can never both invoice the same records. The claim is a
//! conditional update on `isInvoiced: false`; whoever loses the race sees
//! zero modified documents and backs off.

use std::path::Path;
use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::utils::invoice_filename;
use crate::invoice::assets::AssetResolver;
use crate::invoice::compose::{compose_invoice, ComposeInput};
use crate::storage::{AttendanceRecord, AttendanceRepo};

/// A finished invoice plus the numbers the bot and dashboard report.
pub struct GeneratedInvoice {
    pub nama: String,
    pub filename: String,
    pub png: Vec<u8>,
    pub record_count: usize,
    pub total: i64,
}

pub struct InvoiceService {
    repo: AttendanceRepo,
    resolver: AssetResolver,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InvoiceService {
    pub fn new(repo: AttendanceRepo, resolver: AssetResolver) -> Self {
        Self {
            repo,
            resolver,
            locks: DashMap::new(),
        }
    }

    /// Per-student generation lock, keyed case-insensitively like every
    /// other student lookup.
    fn lock_for(&self, nama: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(nama.trim().to_lowercase())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Generate an invoice over every uninvoiced record of one student,
    /// oldest first.
    pub async fn generate_for_student(&self, nama: &str) -> AppResult<GeneratedInvoice> {
        let lock = self.lock_for(nama);
        let _guard = lock.lock().await;

        let records = self.repo.find_uninvoiced_for_student(nama).await?;
        if records.is_empty() {
            return Err(AppError::NotFound(format!(
                "no uninvoiced attendance for {}",
                nama
            )));
        }
        self.claim_and_render(records).await
    }

    /// Generate an invoice over an explicit record selection (dashboard
    /// flow). All records must belong to the same student.
    pub async fn generate_for_ids(&self, ids: &[ObjectId]) -> AppResult<GeneratedInvoice> {
        if ids.is_empty() {
            return Err(AppError::Validation("no attendance ids given".to_string()));
        }
        let records = self.repo.find_by_ids(ids).await?;
        if records.is_empty() {
            return Err(AppError::NotFound("attendance records not found".to_string()));
        }
        let nama = records[0].nama.clone();
        if records
            .iter()
            .any(|r| !r.nama.eq_ignore_ascii_case(&nama))
        {
            return Err(AppError::Validation(
                "selected records span multiple students".to_string(),
            ));
        }

        let lock = self.lock_for(&nama);
        let _guard = lock.lock().await;
        self.claim_and_render(records).await
    }

    /// Claim the records, render the invoice, persist it locally and push
    /// a copy to object storage.
    async fn claim_and_render(&self, records: Vec<AttendanceRecord>) -> AppResult<GeneratedInvoice> {
        let ids: Vec<ObjectId> = records.iter().filter_map(|r| r.id).collect();
        let claimed = self.repo.claim_invoiced(&ids).await?;
        if claimed == 0 {
            return Err(AppError::Validation(
                "records were already invoiced".to_string(),
            ));
        }
        if claimed < ids.len() as u64 {
            log::warn!(
                "Claimed {}/{} records; another generator got there first for part of the set",
                claimed,
                ids.len()
            );
        }

        let nama = records[0].nama.clone();
        let total: i64 = records.iter().map(|r| r.harga).sum();
        let generated_at = Utc::now();

        let template = self.resolver.fetch_template().await;
        let mut photos = Vec::with_capacity(records.len().min(config::rules::MAX_PHOTOS_PER_INVOICE));
        for record in records.iter().take(config::rules::MAX_PHOTOS_PER_INVOICE) {
            match self.resolver.fetch(&record.photo_ref()).await {
                Ok(data) => photos.push(Some(data)),
                Err(e) => {
                    log::warn!("Photo {} unavailable: {}", record.foto_path, e);
                    photos.push(None);
                }
            }
        }

        let png = compose_invoice(
            template.as_deref(),
            &ComposeInput {
                student_name: &nama,
                generated_at,
                records: &records,
                photos: &photos,
                total,
            },
        )?;

        let filename = invoice_filename(&nama, &generated_at);
        self.save_local(&filename, &png)?;
        self.upload_copy(&filename, &png).await;

        log::info!(
            "Invoice generated for {}: {} records, total {}",
            nama,
            records.len(),
            total
        );
        Ok(GeneratedInvoice {
            nama,
            filename,
            png,
            record_count: records.len(),
            total,
        })
    }

    fn save_local(&self, filename: &str, png: &[u8]) -> AppResult<()> {
        let dir = Path::new(config::INVOICE_DIR.as_str());
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(filename), png)?;
        Ok(())
    }

    /// Best effort; a failed upload only costs the off-site copy.
    async fn upload_copy(&self, filename: &str, png: &[u8]) {
        if let Some(store) = self.resolver.store() {
            let key = format!("invoice/{}", filename);
            if let Err(e) = store.upload(png.to_vec(), &key, "image/png").await {
                log::warn!("Invoice upload to R2 failed: {}", e);
            }
        }
    }

    pub fn repo(&self) -> &AttendanceRepo {
        &self.repo
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }
}
