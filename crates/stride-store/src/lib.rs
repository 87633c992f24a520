//! Operational document store access for the sync pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use stride_core::{
    InterviewSessionDoc, ResourceEventDoc, ResumeDoc, RoadmapProgressDoc, ScholarshipApplicationDoc,
    ScholarshipDoc, UserProfileDoc,
};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "stride-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("decoding document from {collection}: {source}")]
    Decode {
        collection: &'static str,
        source: serde_json::Error,
    },
}

/// Whether an upsert created a new document or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Read surface over the operational store, plus the scholarship-catalog
/// write path used by the one-shot merge tool. Every fetch is capped and
/// optionally bounded by a recency timestamp; the recency field is the
/// document's update/creation time, whichever the live application
/// maintains for that collection.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn fetch_profiles(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<UserProfileDoc>, StoreError>;

    async fn fetch_resumes(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResumeDoc>, StoreError>;

    async fn fetch_roadmap_progress(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<RoadmapProgressDoc>, StoreError>;

    async fn fetch_interview_sessions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<InterviewSessionDoc>, StoreError>;

    async fn fetch_scholarship_applications(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ScholarshipApplicationDoc>, StoreError>;

    async fn fetch_resource_events(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResourceEventDoc>, StoreError>;

    /// All records of one logical scholarship-catalog collection.
    async fn list_scholarships(&self, collection: &str) -> Result<Vec<ScholarshipDoc>, StoreError>;

    /// Insert-or-overwrite a catalog record under the caller's natural key.
    async fn upsert_scholarship(
        &self,
        collection: &str,
        natural_key: &str,
        doc: &ScholarshipDoc,
    ) -> Result<UpsertOutcome, StoreError>;
}

const PROFILES: &str = "user_profiles";
const RESUMES: &str = "resumes";
const ROADMAP_PROGRESS: &str = "roadmap_progress";
const INTERVIEW_SESSIONS: &str = "interview_sessions";
const SCHOLARSHIP_APPLICATIONS: &str = "scholarship_applications";
const RESOURCE_EVENTS: &str = "resource_events";

/// Postgres-backed store. Documents live in per-collection tables shaped
/// `(data JSONB NOT NULL, updated_at TIMESTAMPTZ NOT NULL)`; the JSONB
/// payload is decoded into the typed document shapes. Queries are plain
/// runtime `sqlx::query`, so no live database is needed at build time.
#[derive(Debug, Clone)]
pub struct PgSourceStore {
    pool: PgPool,
}

impl PgSourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    async fn fetch_docs<T: serde::de::DeserializeOwned>(
        &self,
        collection: &'static str,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<T>, StoreError> {
        let sql = format!(
            "SELECT data FROM {collection} \
             WHERE ($1::timestamptz IS NULL OR updated_at >= $1) \
             ORDER BY updated_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(since)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        debug!(collection, rows = rows.len(), "fetched operational documents");

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let data: JsonValue = row.try_get("data")?;
            let doc = serde_json::from_value(data)
                .map_err(|source| StoreError::Decode { collection, source })?;
            docs.push(doc);
        }
        Ok(docs)
    }
}

#[async_trait]
impl SourceStore for PgSourceStore {
    async fn fetch_profiles(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<UserProfileDoc>, StoreError> {
        self.fetch_docs(PROFILES, since, limit).await
    }

    async fn fetch_resumes(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResumeDoc>, StoreError> {
        self.fetch_docs(RESUMES, since, limit).await
    }

    async fn fetch_roadmap_progress(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<RoadmapProgressDoc>, StoreError> {
        self.fetch_docs(ROADMAP_PROGRESS, since, limit).await
    }

    async fn fetch_interview_sessions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<InterviewSessionDoc>, StoreError> {
        self.fetch_docs(INTERVIEW_SESSIONS, since, limit).await
    }

    async fn fetch_scholarship_applications(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ScholarshipApplicationDoc>, StoreError> {
        self.fetch_docs(SCHOLARSHIP_APPLICATIONS, since, limit).await
    }

    async fn fetch_resource_events(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResourceEventDoc>, StoreError> {
        self.fetch_docs(RESOURCE_EVENTS, since, limit).await
    }

    async fn list_scholarships(&self, collection: &str) -> Result<Vec<ScholarshipDoc>, StoreError> {
        let rows = sqlx::query(
            "SELECT data FROM scholarship_catalog WHERE collection = $1 ORDER BY natural_key",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let data: JsonValue = row.try_get("data")?;
            let doc = serde_json::from_value(data).map_err(|source| StoreError::Decode {
                collection: "scholarship_catalog",
                source,
            })?;
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn upsert_scholarship(
        &self,
        collection: &str,
        natural_key: &str,
        doc: &ScholarshipDoc,
    ) -> Result<UpsertOutcome, StoreError> {
        let data = serde_json::to_value(doc).map_err(|source| StoreError::Decode {
            collection: "scholarship_catalog",
            source,
        })?;
        // xmax = 0 distinguishes a fresh insert from a conflict-update.
        let row = sqlx::query(
            "INSERT INTO scholarship_catalog (collection, natural_key, data, updated_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (collection, natural_key) \
             DO UPDATE SET data = EXCLUDED.data, updated_at = NOW() \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(collection)
        .bind(natural_key)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }
}

#[derive(Debug, Default)]
struct MemoryCollections {
    profiles: Vec<UserProfileDoc>,
    resumes: Vec<ResumeDoc>,
    roadmaps: Vec<RoadmapProgressDoc>,
    interviews: Vec<InterviewSessionDoc>,
    scholarship_applications: Vec<ScholarshipApplicationDoc>,
    resource_events: Vec<ResourceEventDoc>,
    catalogs: HashMap<String, BTreeMap<String, ScholarshipDoc>>,
}

/// Fixture-backed in-memory store with the same filter semantics as the
/// Postgres implementation. Used by tests and local dry runs.
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    inner: Mutex<MemoryCollections>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryCollections> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn seed_profiles(&self, docs: Vec<UserProfileDoc>) {
        self.lock().profiles.extend(docs);
    }

    pub fn seed_resumes(&self, docs: Vec<ResumeDoc>) {
        self.lock().resumes.extend(docs);
    }

    pub fn seed_roadmap_progress(&self, docs: Vec<RoadmapProgressDoc>) {
        self.lock().roadmaps.extend(docs);
    }

    pub fn seed_interview_sessions(&self, docs: Vec<InterviewSessionDoc>) {
        self.lock().interviews.extend(docs);
    }

    pub fn seed_scholarship_applications(&self, docs: Vec<ScholarshipApplicationDoc>) {
        self.lock().scholarship_applications.extend(docs);
    }

    pub fn seed_resource_events(&self, docs: Vec<ResourceEventDoc>) {
        self.lock().resource_events.extend(docs);
    }

    pub fn seed_scholarships(&self, collection: &str, docs: Vec<(String, ScholarshipDoc)>) {
        let mut inner = self.lock();
        let catalog = inner.catalogs.entry(collection.to_string()).or_default();
        for (key, doc) in docs {
            catalog.insert(key, doc);
        }
    }

    pub fn scholarship_count(&self, collection: &str) -> usize {
        self.lock()
            .catalogs
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

fn filter_by_recency<T: Clone>(
    docs: &[T],
    recency: impl Fn(&T) -> Option<DateTime<Utc>>,
    since: Option<DateTime<Utc>>,
    limit: u32,
) -> Vec<T> {
    let mut kept: Vec<(Option<DateTime<Utc>>, T)> = docs
        .iter()
        .filter(|doc| match (since, recency(doc)) {
            (None, _) => true,
            (Some(cutoff), Some(ts)) => ts >= cutoff,
            // Documents with no recency field only appear in unbounded runs.
            (Some(_), None) => false,
        })
        .map(|doc| (recency(doc), doc.clone()))
        .collect();
    kept.sort_by(|a, b| b.0.cmp(&a.0));
    kept.into_iter()
        .take(limit as usize)
        .map(|(_, doc)| doc)
        .collect()
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn fetch_profiles(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<UserProfileDoc>, StoreError> {
        let inner = self.lock();
        Ok(filter_by_recency(
            &inner.profiles,
            |d| d.updated_at.or(d.created_at),
            since,
            limit,
        ))
    }

    async fn fetch_resumes(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResumeDoc>, StoreError> {
        let inner = self.lock();
        Ok(filter_by_recency(
            &inner.resumes,
            |d| d.updated_at.or(d.created_at),
            since,
            limit,
        ))
    }

    async fn fetch_roadmap_progress(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<RoadmapProgressDoc>, StoreError> {
        let inner = self.lock();
        Ok(filter_by_recency(&inner.roadmaps, |d| d.updated_at, since, limit))
    }

    async fn fetch_interview_sessions(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<InterviewSessionDoc>, StoreError> {
        let inner = self.lock();
        Ok(filter_by_recency(
            &inner.interviews,
            |d| d.completed_at,
            since,
            limit,
        ))
    }

    async fn fetch_scholarship_applications(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ScholarshipApplicationDoc>, StoreError> {
        let inner = self.lock();
        Ok(filter_by_recency(
            &inner.scholarship_applications,
            |d| d.submitted_at,
            since,
            limit,
        ))
    }

    async fn fetch_resource_events(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResourceEventDoc>, StoreError> {
        let inner = self.lock();
        Ok(filter_by_recency(
            &inner.resource_events,
            |d| d.created_at,
            since,
            limit,
        ))
    }

    async fn list_scholarships(&self, collection: &str) -> Result<Vec<ScholarshipDoc>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .catalogs
            .get(collection)
            .map(|catalog| catalog.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_scholarship(
        &self,
        collection: &str,
        natural_key: &str,
        doc: &ScholarshipDoc,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.lock();
        let catalog = inner.catalogs.entry(collection.to_string()).or_default();
        match catalog.insert(natural_key.to_string(), doc.clone()) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Inserted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn mk_profile(user_id: &str, updated_at: Option<DateTime<Utc>>) -> UserProfileDoc {
        UserProfileDoc {
            user_id: user_id.to_string(),
            full_name: None,
            career_goal: None,
            location: None,
            skills: vec![],
            created_at: None,
            updated_at,
        }
    }

    fn mk_scholarship(title: &str, provider: &str, amount: Option<f64>) -> ScholarshipDoc {
        ScholarshipDoc {
            title: title.to_string(),
            provider: provider.to_string(),
            amount,
            deadline: None,
            url: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn recency_filter_keeps_only_fresh_documents() {
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).single().unwrap();
        let store = MemorySourceStore::new();
        store.seed_profiles(vec![
            mk_profile("stale", Some(t - Duration::hours(2))),
            mk_profile("half-hour", Some(t - Duration::minutes(30))),
            mk_profile("five-min", Some(t - Duration::minutes(5))),
        ]);

        let fresh = store
            .fetch_profiles(Some(t - Duration::minutes(60)), 100)
            .await
            .expect("fetch");
        let ids: Vec<_> = fresh.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["five-min", "half-hour"]);
    }

    #[tokio::test]
    async fn unbounded_fetch_includes_undated_documents() {
        let store = MemorySourceStore::new();
        store.seed_profiles(vec![mk_profile("undated", None)]);

        let all = store.fetch_profiles(None, 100).await.expect("fetch");
        assert_eq!(all.len(), 1);

        let since = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).single().unwrap();
        let fresh = store.fetch_profiles(Some(since), 100).await.expect("fetch");
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn fetch_respects_row_cap() {
        let t = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).single().unwrap();
        let store = MemorySourceStore::new();
        store.seed_profiles(
            (0..10)
                .map(|i| mk_profile(&format!("u-{i}"), Some(t - Duration::minutes(i))))
                .collect(),
        );

        let capped = store.fetch_profiles(None, 3).await.expect("fetch");
        assert_eq!(capped.len(), 3);
        // Most recently updated first, as in the Postgres implementation.
        assert_eq!(capped[0].user_id, "u-0");
    }

    #[tokio::test]
    async fn upsert_reports_insert_then_update() {
        let store = MemorySourceStore::new();
        let doc = mk_scholarship("STEM Grant", "Acme Foundation", Some(5000.0));

        let first = store
            .upsert_scholarship("scholarships", "stem grant::acme foundation", &doc)
            .await
            .expect("upsert");
        assert_eq!(first, UpsertOutcome::Inserted);

        let revised = mk_scholarship("STEM Grant", "Acme Foundation", Some(7500.0));
        let second = store
            .upsert_scholarship("scholarships", "stem grant::acme foundation", &revised)
            .await
            .expect("upsert");
        assert_eq!(second, UpsertOutcome::Updated);

        let listed = store.list_scholarships("scholarships").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount, Some(7500.0));
    }
}
