//! MongoDB access layer for the attendance collection
//!
//! All student-name lookups are case-insensitive (anchored `^...$` regex
//! with the `i` option). Ordering contracts matter here: invoice selection
//! is always "oldest uninvoiced first" by `createdAt`, dashboard listings
//! are newest-first by `tanggal`.

use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use futures::stream::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::storage::model::{
    is_overdue, AttendanceRecord, MonthRevenue, OverdueStudent, Statistics, StudentRollup,
    TopStudent,
};

const COLLECTION: &str = "attendances";

/// Repository over the `attendances` collection
#[derive(Clone)]
pub struct AttendanceRepo {
    records: Collection<AttendanceRecord>,
    raw: Collection<Document>,
}

/// Connect to MongoDB and return a repository handle.
///
/// # Errors
/// Returns `AppError::Config` when the URI is empty and `AppError::Database`
/// when the connection cannot be established. Both are fatal at startup.
pub async fn connect(uri: &str, database: &str) -> AppResult<AttendanceRepo> {
    if uri.is_empty() {
        return Err(AppError::Config(
            "MONGODB_URI is not set; set it in the environment or .env".to_string(),
        ));
    }
    let client = Client::with_uri_str(uri).await?;
    // Force a round-trip so a bad URI fails here, not on the first query
    client
        .database(database)
        .run_command(doc! {"ping": 1}, None)
        .await?;
    log::info!("Connected to MongoDB database '{}'", database);
    Ok(AttendanceRepo::new(client.database(database)))
}

/// Case-insensitive exact-name filter
fn name_filter(nama: &str) -> Document {
    doc! {
        "nama": { "$regex": format!("^{}$", regex::escape(nama)), "$options": "i" }
    }
}

/// Claim filter: only records not yet invoiced are eligible, which is what
/// makes a repeated claim over the same ids a no-op
fn claim_filter(ids: &[ObjectId]) -> Document {
    doc! {"_id": {"$in": ids.to_vec()}, "isInvoiced": false}
}

/// First day of the month `months_back` calendar months before `now`.
/// Proper month arithmetic, not a day-count approximation, so the revenue
/// chart always covers exactly the trailing N month buckets.
fn month_window_start(now: DateTime<Utc>, months_back: u32) -> DateTime<Utc> {
    let total = now.year() * 12 + now.month() as i32 - 1 - months_back as i32;
    let (year, month) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Read a numeric aggregation result that Mongo may return as int32,
/// int64 or double
fn doc_i64(doc: &Document, key: &str) -> i64 {
    match doc.get(key) {
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

impl AttendanceRepo {
    pub fn new(db: Database) -> Self {
        Self {
            records: db.collection::<AttendanceRecord>(COLLECTION),
            raw: db.collection::<Document>(COLLECTION),
        }
    }

    async fn collect(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> AppResult<Vec<AttendanceRecord>> {
        let mut cursor = self.records.find(filter, options).await?;
        let mut out = Vec::new();
        while let Some(rec) = cursor.try_next().await? {
            out.push(rec);
        }
        Ok(out)
    }

    /// Insert a new attendance entry, returning its id.
    pub async fn insert(&self, record: &AttendanceRecord) -> AppResult<ObjectId> {
        let result = self.records.insert_one(record, None).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::Upstream("insert did not return an ObjectId".to_string()))
    }

    pub async fn find_by_id(&self, id: &ObjectId) -> AppResult<Option<AttendanceRecord>> {
        Ok(self.records.find_one(doc! {"_id": id}, None).await?)
    }

    /// Delete one record by id, returning the deleted document so the
    /// caller can cascade the photo deletion.
    pub async fn delete_by_id(&self, id: &ObjectId) -> AppResult<Option<AttendanceRecord>> {
        let existing = self.find_by_id(id).await?;
        if existing.is_some() {
            self.records.delete_one(doc! {"_id": id}, None).await?;
        }
        Ok(existing)
    }

    /// Paginated, filtered listing for the dashboard, newest lessons first.
    pub async fn find_page(
        &self,
        nama: Option<&str>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
        page: i64,
        limit: i64,
    ) -> AppResult<(Vec<AttendanceRecord>, u64)> {
        let mut filter = Document::new();
        if let Some(nama) = nama.filter(|n| !n.is_empty()) {
            // substring match, not anchored: the dashboard search box filters
            filter.insert(
                "nama",
                doc! { "$regex": regex::escape(nama), "$options": "i" },
            );
        }
        let mut range = Document::new();
        if let Some(from) = date_from {
            range.insert("$gte", bson::DateTime::from_chrono(from));
        }
        if let Some(to) = date_to {
            range.insert("$lte", bson::DateTime::from_chrono(to));
        }
        if !range.is_empty() {
            filter.insert("tanggal", range);
        }

        let limit = limit.clamp(1, config::pagination::MAX_PAGE_SIZE);
        let page = page.max(1);
        let options = FindOptions::builder()
            .sort(doc! {"tanggal": -1, "createdAt": -1})
            .skip(Some(((page - 1) * limit) as u64))
            .limit(Some(limit))
            .build();

        let total = self.records.count_documents(filter.clone(), None).await?;
        let rows = self.collect(filter, Some(options)).await?;
        Ok((rows, total))
    }

    /// All records for a student, newest lesson first (dashboard ordering).
    pub async fn find_for_student_newest_first(
        &self,
        nama: &str,
    ) -> AppResult<Vec<AttendanceRecord>> {
        let mut filter = Document::new();
        filter.insert(
            "nama",
            doc! { "$regex": regex::escape(nama), "$options": "i" },
        );
        let options = FindOptions::builder().sort(doc! {"tanggal": -1}).build();
        self.collect(filter, Some(options)).await
    }

    /// Uninvoiced records for a student, oldest first. This ordering feeds
    /// invoice selection directly: records[0..4] become photo slots 0..4.
    pub async fn find_uninvoiced_for_student(
        &self,
        nama: &str,
    ) -> AppResult<Vec<AttendanceRecord>> {
        let mut filter = name_filter(nama);
        filter.insert("isInvoiced", false);
        let options = FindOptions::builder().sort(doc! {"createdAt": 1}).build();
        self.collect(filter, Some(options)).await
    }

    /// Records by explicit id list, sorted by lesson date ascending.
    pub async fn find_by_ids(&self, ids: &[ObjectId]) -> AppResult<Vec<AttendanceRecord>> {
        let filter = doc! {"_id": {"$in": ids.to_vec()}};
        let options = FindOptions::builder().sort(doc! {"tanggal": 1}).build();
        self.collect(filter, Some(options)).await
    }

    /// Conditionally mark a set of records invoiced.
    ///
    /// The filter includes `isInvoiced: false`, so records already claimed
    /// by a concurrent generation are skipped: calling this twice for the
    /// same ids is a no-op the second time. Returns the number of records
    /// actually claimed.
    pub async fn claim_invoiced(&self, ids: &[ObjectId]) -> AppResult<u64> {
        let result = self
            .records
            .update_many(claim_filter(ids), doc! {"$set": {"isInvoiced": true}}, None)
            .await?;
        Ok(result.modified_count)
    }

    /// Distinct student names over the whole collection.
    pub async fn distinct_names(&self) -> AppResult<Vec<String>> {
        let names = self.records.distinct("nama", None, None).await?;
        Ok(names
            .into_iter()
            .filter_map(|b| b.as_str().map(|s| s.to_string()))
            .collect())
    }

    /// Distinct names of students that still have uninvoiced entries.
    pub async fn distinct_uninvoiced_names(&self) -> AppResult<Vec<String>> {
        let names = self
            .records
            .distinct("nama", doc! {"isInvoiced": false}, None)
            .await?;
        Ok(names
            .into_iter()
            .filter_map(|b| b.as_str().map(|s| s.to_string()))
            .collect())
    }

    /// All records, newest lesson first, for export.
    pub async fn export_all(&self) -> AppResult<Vec<AttendanceRecord>> {
        let options = FindOptions::builder().sort(doc! {"tanggal": -1}).build();
        self.collect(Document::new(), Some(options)).await
    }

    /// Students overdue for invoicing: 1-3 uninvoiced entries with the most
    /// recent one at least five weeks old, sorted longest-idle first.
    pub async fn overdue_students(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueStudent>> {
        let mut overdue = Vec::new();
        for nama in self.distinct_uninvoiced_names().await? {
            let records = self.find_uninvoiced_for_student(&nama).await?;
            let Some(last) = records.iter().map(|r| r.tanggal).max() else {
                continue;
            };
            if is_overdue(records.len(), &last, &now) {
                overdue.push(OverdueStudent {
                    nama,
                    uninvoiced_count: records.len(),
                    last_attendance: last,
                    total_unpaid: records.iter().map(|r| r.harga).sum(),
                    days_idle: (now - last).num_days(),
                });
            }
        }
        overdue.sort_by(|a, b| b.days_idle.cmp(&a.days_idle));
        Ok(overdue)
    }

    /// Per-student rollups for the dashboard student list.
    pub async fn student_rollups(&self) -> AppResult<Vec<StudentRollup>> {
        let pipeline = vec![
            doc! {"$group": {
                "_id": "$nama",
                "totalAttendances": {"$sum": 1},
                "totalHarga": {"$sum": "$harga"},
                "invoicedCount": {"$sum": {"$cond": [{"$eq": ["$isInvoiced", true]}, 1, 0]}},
                "uninvoicedCount": {"$sum": {"$cond": [{"$eq": ["$isInvoiced", false]}, 1, 0]}},
                "lastAttendance": {"$max": "$tanggal"},
                "firstAttendance": {"$min": "$tanggal"},
            }},
            doc! {"$sort": {"_id": 1}},
        ];
        let mut cursor = self.raw.aggregate(pipeline, None).await?;
        let mut out = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            out.push(StudentRollup {
                nama: doc.get_str("_id").unwrap_or_default().to_string(),
                total_attendances: doc_i64(&doc, "totalAttendances"),
                total_harga: doc_i64(&doc, "totalHarga"),
                invoiced_count: doc_i64(&doc, "invoicedCount"),
                uninvoiced_count: doc_i64(&doc, "uninvoicedCount"),
                last_attendance: doc.get_datetime("lastAttendance").ok().map(|d| d.to_chrono()),
                first_attendance: doc
                    .get_datetime("firstAttendance")
                    .ok()
                    .map(|d| d.to_chrono()),
            });
        }
        Ok(out)
    }

    /// Dashboard statistics: totals, invoiced/uninvoiced split, revenue by
    /// month for the trailing six months and the top-10 students.
    pub async fn statistics(&self, now: DateTime<Utc>) -> AppResult<Statistics> {
        let total_attendances = self.records.count_documents(None, None).await? as i64;
        let total_students = self.distinct_names().await?.len() as i64;
        let invoiced_count = self
            .records
            .count_documents(doc! {"isInvoiced": true}, None)
            .await? as i64;
        let uninvoiced_count = self
            .records
            .count_documents(doc! {"isInvoiced": false}, None)
            .await? as i64;

        let total_revenue = {
            let pipeline = vec![doc! {"$group": {"_id": null, "total": {"$sum": "$harga"}}}];
            let mut cursor = self.raw.aggregate(pipeline, None).await?;
            match cursor.try_next().await? {
                Some(doc) => doc_i64(&doc, "total"),
                None => 0,
            }
        };

        let six_months_ago = month_window_start(now, 6);

        let revenue_by_month = {
            let pipeline = vec![
                doc! {"$match": {"tanggal": {"$gte": bson::DateTime::from_chrono(six_months_ago)}}},
                doc! {"$group": {
                    "_id": {"year": {"$year": "$tanggal"}, "month": {"$month": "$tanggal"}},
                    "total": {"$sum": "$harga"},
                    "count": {"$sum": 1},
                }},
                doc! {"$sort": {"_id.year": 1, "_id.month": 1}},
            ];
            let mut cursor = self.raw.aggregate(pipeline, None).await?;
            let mut out = Vec::new();
            while let Some(doc) = cursor.try_next().await? {
                let id = doc.get_document("_id").cloned().unwrap_or_default();
                out.push(MonthRevenue {
                    month: format!("{}-{:02}", doc_i64(&id, "year"), doc_i64(&id, "month")),
                    total: doc_i64(&doc, "total"),
                    count: doc_i64(&doc, "count"),
                });
            }
            out
        };

        let top_students = {
            let pipeline = vec![
                doc! {"$group": {
                    "_id": "$nama",
                    "count": {"$sum": 1},
                    "totalHarga": {"$sum": "$harga"},
                }},
                doc! {"$sort": {"count": -1}},
                doc! {"$limit": 10},
            ];
            let mut cursor = self.raw.aggregate(pipeline, None).await?;
            let mut out = Vec::new();
            while let Some(doc) = cursor.try_next().await? {
                out.push(TopStudent {
                    nama: doc.get_str("_id").unwrap_or_default().to_string(),
                    count: doc_i64(&doc, "count"),
                    total_harga: doc_i64(&doc, "totalHarga"),
                });
            }
            out
        };

        Ok(Statistics {
            total_attendances,
            total_students,
            total_revenue,
            invoiced_count,
            uninvoiced_count,
            revenue_by_month,
            top_students,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_filter_is_anchored_and_case_insensitive() {
        let filter = name_filter("Budi (junior)");
        let inner = filter.get_document("nama").unwrap();
        assert_eq!(
            inner.get_str("$regex").unwrap(),
            r"^Budi \(junior\)$"
        );
        assert_eq!(inner.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn month_window_uses_calendar_months_not_day_counts() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        assert_eq!(
            month_window_start(now, 6),
            Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()
        );

        // early-January windows cross the year boundary cleanly
        let jan = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(
            month_window_start(jan, 6),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            month_window_start(jan, 1),
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn claim_filter_excludes_already_invoiced_records() {
        let ids = vec![ObjectId::new(), ObjectId::new()];
        let filter = claim_filter(&ids);

        // the isInvoiced guard is what makes a second claim over the same
        // ids modify zero documents instead of re-invoicing them
        assert_eq!(filter.get_bool("isInvoiced").unwrap(), false);
        let in_list = filter
            .get_document("_id")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(in_list.len(), 2);
        assert_eq!(in_list[0], Bson::ObjectId(ids[0]));
    }

    #[test]
    fn doc_i64_reads_all_numeric_bson_shapes() {
        let doc = doc! {"a": 7i32, "b": 9i64, "c": 3.0f64};
        assert_eq!(doc_i64(&doc, "a"), 7);
        assert_eq!(doc_i64(&doc, "b"), 9);
        assert_eq!(doc_i64(&doc, "c"), 3);
        assert_eq!(doc_i64(&doc, "missing"), 0);
    }
}
