//! Analytical warehouse surface: declared table schemas, schema
//! provisioning, and batched row writes with partial-failure reporting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use stride_core::EntityType;
use thiserror::Error;
use tracing::{info, info_span, warn};

pub const CRATE_NAME: &str = "stride-warehouse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "field")]
pub enum Partitioning {
    None,
    ByDay(&'static str),
    ByMonth(&'static str),
}

/// Declared shape of one warehouse table. Created once by `ensure_schema`;
/// the pipeline never drops or alters an existing table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: Vec<Column>,
    pub partitioning: Partitioning,
    pub clustering: Vec<&'static str>,
}

/// The declared schema for one entity type's table. Column lists stay in
/// lockstep with the serialized row structs in `stride-core`; a test
/// asserts the correspondence.
pub fn table_for(entity: EntityType) -> TableSpec {
    use ColumnType::*;
    match entity {
        EntityType::UserActivity => TableSpec {
            name: "user_activity",
            columns: vec![
                Column::required("user_id", String),
                Column::nullable("career_goal", String),
                Column::nullable("state_code", String),
                Column::required("skill_count", Integer),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByDay("event_date"),
            clustering: vec!["user_id"],
        },
        EntityType::AtsScore => TableSpec {
            name: "ats_scores",
            columns: vec![
                Column::required("user_id", String),
                Column::required("resume_id", String),
                Column::nullable("target_role", String),
                Column::nullable("ats_score", Float),
                Column::nullable("keyword_matches", Integer),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByDay("event_date"),
            clustering: vec!["user_id"],
        },
        EntityType::SkillTrend => TableSpec {
            name: "skill_trends",
            columns: vec![
                Column::required("skill", String),
                Column::required("category", String),
                Column::required("user_count", Integer),
                Column::required("demand_score", Integer),
                Column::required("avg_level", Float),
                Column::required("proficiency", String),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByMonth("event_date"),
            clustering: vec!["category"],
        },
        EntityType::RoiMetric => TableSpec {
            name: "roi_metrics",
            columns: vec![
                Column::required("career_domain", String),
                Column::required("users_tracked", Integer),
                Column::required("completion_rate", Float),
                Column::nullable("avg_resume_score", Float),
                Column::nullable("avg_interview_score", Float),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByMonth("event_date"),
            clustering: vec!["career_domain"],
        },
        EntityType::ScholarshipApplication => TableSpec {
            name: "scholarship_applications",
            columns: vec![
                Column::required("user_id", String),
                Column::required("title", String),
                Column::required("provider", String),
                Column::required("status", String),
                Column::nullable("amount", Float),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByDay("event_date"),
            clustering: vec!["provider"],
        },
        EntityType::ResourceEngagement => TableSpec {
            name: "resource_engagement",
            columns: vec![
                Column::required("user_id", String),
                Column::required("resource_id", String),
                Column::required("resource_type", String),
                Column::required("action", String),
                Column::nullable("duration_minutes", Integer),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByDay("event_date"),
            clustering: vec!["resource_type"],
        },
        EntityType::RoadmapProgress => TableSpec {
            name: "roadmap_progress",
            columns: vec![
                Column::required("user_id", String),
                Column::required("career_domain", String),
                Column::required("completed_steps", Integer),
                Column::required("total_steps", Integer),
                Column::required("completion_pct", Float),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByDay("event_date"),
            clustering: vec!["career_domain", "user_id"],
        },
        EntityType::MockInterviewPerformance => TableSpec {
            name: "mock_interview_performance",
            columns: vec![
                Column::required("user_id", String),
                Column::required("career_domain", String),
                Column::nullable("score", Float),
                Column::required("questions_answered", Integer),
                Column::required("timestamp", Timestamp),
                Column::required("event_date", Date),
            ],
            partitioning: Partitioning::ByDay("event_date"),
            clustering: vec!["career_domain"],
        },
    }
}

pub fn warehouse_tables() -> Vec<TableSpec> {
    EntityType::ALL.iter().copied().map(table_for).collect()
}

/// Stable per-row rejection record, independent of any vendor driver's
/// error shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub index: usize,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("warehouse status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("{} of {attempted} rows rejected for table {table}", rejected.len())]
    PartialFailure {
        table: String,
        attempted: usize,
        rejected: Vec<RowError>,
    },
    #[error("unknown table {0}; run schema provisioning first")]
    UnknownTable(String),
    #[error("encoding warehouse payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Batched, append-mostly analytical store. Implementations must make an
/// empty `insert_rows` a local no-op and must surface partial failures as
/// `WarehouseError::PartialFailure` rather than silently reporting full
/// success.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError>;
    async fn create_dataset(&self, dataset: &str) -> Result<(), WarehouseError>;
    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, WarehouseError>;
    async fn create_table(&self, dataset: &str, spec: &TableSpec) -> Result<(), WarehouseError>;
    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: Vec<JsonValue>,
    ) -> Result<u64, WarehouseError>;
}

/// What a provisioning pass actually created. A second pass over an
/// already-provisioned dataset reports nothing created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaReport {
    pub created_dataset: bool,
    pub created_tables: Vec<&'static str>,
}

/// Idempotent schema provisioning: create the dataset if absent, then
/// each declared table if absent. Existing tables are never touched.
pub async fn ensure_schema(
    warehouse: &dyn Warehouse,
    dataset: &str,
) -> Result<SchemaReport, WarehouseError> {
    let mut report = SchemaReport::default();

    if !warehouse.dataset_exists(dataset).await? {
        warehouse.create_dataset(dataset).await?;
        info!(dataset, "created warehouse dataset");
        report.created_dataset = true;
    }

    for spec in warehouse_tables() {
        if !warehouse.table_exists(dataset, spec.name).await? {
            warehouse.create_table(dataset, &spec).await?;
            info!(dataset, table = spec.name, "created warehouse table");
            report.created_tables.push(spec.name);
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpWarehouseConfig {
    pub base_url: String,
    pub project: String,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for HttpWarehouseConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9050".to_string(),
            project: "stride".to_string(),
            timeout: Duration::from_secs(20),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    inserted: u64,
    #[serde(default)]
    row_errors: Vec<RowError>,
}

/// JSON-over-HTTP warehouse client. Transient failures (5xx, 429,
/// connect/timeout) are retried with exponential capped backoff; partial
/// insert failures are terminal for the batch — the conservative
/// accounting happens at the orchestrator, not here.
#[derive(Debug)]
pub struct HttpWarehouse {
    client: reqwest::Client,
    base_url: String,
    project: String,
    backoff: BackoffPolicy,
}

impl HttpWarehouse {
    pub fn new(config: HttpWarehouseConfig) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project,
            backoff: config.backoff,
        })
    }

    fn dataset_url(&self, dataset: &str) -> String {
        format!(
            "{}/v1/projects/{}/datasets/{}",
            self.base_url, self.project, dataset
        )
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, WarehouseError> {
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(WarehouseError::Transport(err));
                }
            }
        }

        Err(match last_request_error {
            Some(err) => WarehouseError::Transport(err),
            None => WarehouseError::HttpStatus {
                status: 0,
                url: self.base_url.clone(),
            },
        })
    }

    async fn exists(&self, url: String) -> Result<bool, WarehouseError> {
        let resp = self.send_with_retry(|| self.client.get(&url)).await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(WarehouseError::HttpStatus {
                status: status.as_u16(),
                url,
            }),
        }
    }

    fn check_ok(resp: &reqwest::Response, url: &str) -> Result<(), WarehouseError> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WarehouseError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }
}

#[async_trait]
impl Warehouse for HttpWarehouse {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError> {
        self.exists(self.dataset_url(dataset)).await
    }

    async fn create_dataset(&self, dataset: &str) -> Result<(), WarehouseError> {
        let url = format!("{}/v1/projects/{}/datasets", self.base_url, self.project);
        let body = serde_json::json!({ "dataset": dataset });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Self::check_ok(&resp, &url)
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, WarehouseError> {
        self.exists(format!("{}/tables/{}", self.dataset_url(dataset), table))
            .await
    }

    async fn create_table(&self, dataset: &str, spec: &TableSpec) -> Result<(), WarehouseError> {
        let url = format!("{}/tables", self.dataset_url(dataset));
        let body = serde_json::to_value(spec)?;
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Self::check_ok(&resp, &url)
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: Vec<JsonValue>,
    ) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/tables/{}/rows", self.dataset_url(dataset), table);
        let span = info_span!("warehouse_insert", table, rows = rows.len());
        let _guard = span.enter();

        let attempted = rows.len();
        let body = serde_json::json!({ "rows": rows });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Self::check_ok(&resp, &url)?;

        let parsed: InsertResponse = resp.json().await?;
        if parsed.row_errors.is_empty() {
            return Ok(parsed.inserted);
        }

        for row_error in &parsed.row_errors {
            warn!(
                table,
                index = row_error.index,
                reason = %row_error.reason,
                message = %row_error.message,
                "warehouse rejected row"
            );
        }
        Err(WarehouseError::PartialFailure {
            table: table.to_string(),
            attempted,
            rejected: parsed.row_errors,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryDataset {
    tables: HashMap<String, TableSpec>,
    rows: HashMap<String, Vec<JsonValue>>,
}

/// In-process warehouse that validates rows against the declared table
/// schema, used by tests and local dry runs. Rejections carry the same
/// `RowError` shape the HTTP client reports, so partial-failure handling
/// is exercised end to end without a network.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    datasets: Mutex<HashMap<String, MemoryDataset>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryDataset>> {
        self.datasets.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn table_names(&self, dataset: &str) -> Vec<String> {
        let datasets = self.lock();
        let mut names: Vec<String> = datasets
            .get(dataset)
            .map(|d| d.tables.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn rows_in(&self, dataset: &str, table: &str) -> Vec<JsonValue> {
        let datasets = self.lock();
        datasets
            .get(dataset)
            .and_then(|d| d.rows.get(table))
            .cloned()
            .unwrap_or_default()
    }

    fn validate(spec: &TableSpec, index: usize, row: &JsonValue) -> Option<RowError> {
        let Some(object) = row.as_object() else {
            return Some(RowError {
                index,
                reason: "not_an_object".to_string(),
                message: "row payload must be a JSON object".to_string(),
            });
        };

        for column in &spec.columns {
            let value = object.get(column.name);
            match value {
                None | Some(JsonValue::Null) => {
                    if !column.nullable {
                        return Some(RowError {
                            index,
                            reason: "missing_required".to_string(),
                            message: format!("column {} is required", column.name),
                        });
                    }
                }
                Some(value) => {
                    let ok = match column.ty {
                        ColumnType::String | ColumnType::Timestamp | ColumnType::Date => {
                            value.is_string()
                        }
                        ColumnType::Integer => value.is_i64() || value.is_u64(),
                        ColumnType::Float => value.is_number(),
                        ColumnType::Boolean => value.is_boolean(),
                    };
                    if !ok {
                        return Some(RowError {
                            index,
                            reason: "type_mismatch".to_string(),
                            message: format!("column {} expects {:?}", column.name, column.ty),
                        });
                    }
                }
            }
        }

        for key in object.keys() {
            if !spec.columns.iter().any(|c| c.name == key) {
                return Some(RowError {
                    index,
                    reason: "unknown_column".to_string(),
                    message: format!("column {key} is not declared"),
                });
            }
        }

        None
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError> {
        Ok(self.lock().contains_key(dataset))
    }

    async fn create_dataset(&self, dataset: &str) -> Result<(), WarehouseError> {
        self.lock().entry(dataset.to_string()).or_default();
        Ok(())
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, WarehouseError> {
        Ok(self
            .lock()
            .get(dataset)
            .map(|d| d.tables.contains_key(table))
            .unwrap_or(false))
    }

    async fn create_table(&self, dataset: &str, spec: &TableSpec) -> Result<(), WarehouseError> {
        let mut datasets = self.lock();
        let dataset = datasets.entry(dataset.to_string()).or_default();
        dataset
            .tables
            .entry(spec.name.to_string())
            .or_insert_with(|| spec.clone());
        Ok(())
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: Vec<JsonValue>,
    ) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut datasets = self.lock();
        let dataset = datasets
            .get_mut(dataset)
            .ok_or_else(|| WarehouseError::UnknownTable(table.to_string()))?;
        let spec = dataset
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| WarehouseError::UnknownTable(table.to_string()))?;

        let attempted = rows.len();
        let mut rejected = Vec::new();
        let mut accepted = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            match Self::validate(&spec, index, &row) {
                Some(err) => rejected.push(err),
                None => accepted.push(row),
            }
        }

        let inserted = accepted.len() as u64;
        dataset
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(accepted);

        if rejected.is_empty() {
            Ok(inserted)
        } else {
            for row_error in &rejected {
                warn!(
                    table,
                    index = row_error.index,
                    reason = %row_error.reason,
                    "rejected row"
                );
            }
            Err(WarehouseError::PartialFailure {
                table: table.to_string(),
                attempted,
                rejected,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use stride_core::*;

    fn sample_row(entity: EntityType) -> WarehouseRow {
        let timestamp = Utc.with_ymd_and_hms(2026, 4, 10, 8, 30, 0).single().unwrap();
        let event_date = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        match entity {
            EntityType::UserActivity => WarehouseRow::UserActivity(UserActivityRow {
                user_id: "u-1".into(),
                career_goal: Some("cloud architect".into()),
                state_code: Some("CA".into()),
                skill_count: 3,
                timestamp,
                event_date,
            }),
            EntityType::AtsScore => WarehouseRow::AtsScore(AtsScoreRow {
                user_id: "u-1".into(),
                resume_id: "r-1".into(),
                target_role: None,
                ats_score: Some(82.5),
                keyword_matches: Some(12),
                timestamp,
                event_date,
            }),
            EntityType::SkillTrend => WarehouseRow::SkillTrend(SkillTrendRow {
                skill: "rust".into(),
                category: "programming".into(),
                user_count: 14,
                demand_score: 70,
                avg_level: 2.4,
                proficiency: "intermediate".into(),
                timestamp,
                event_date,
            }),
            EntityType::RoiMetric => WarehouseRow::RoiMetric(RoiMetricRow {
                career_domain: "data engineering".into(),
                users_tracked: 40,
                completion_rate: 0.62,
                avg_resume_score: Some(74.0),
                avg_interview_score: None,
                timestamp,
                event_date,
            }),
            EntityType::ScholarshipApplication => {
                WarehouseRow::ScholarshipApplication(ScholarshipApplicationRow {
                    user_id: "u-1".into(),
                    title: "STEM Grant".into(),
                    provider: "Acme Foundation".into(),
                    status: "submitted".into(),
                    amount: Some(5000.0),
                    timestamp,
                    event_date,
                })
            }
            EntityType::ResourceEngagement => {
                WarehouseRow::ResourceEngagement(ResourceEngagementRow {
                    user_id: "u-1".into(),
                    resource_id: "course-9".into(),
                    resource_type: "course".into(),
                    action: "completed".into(),
                    duration_minutes: Some(45),
                    timestamp,
                    event_date,
                })
            }
            EntityType::RoadmapProgress => WarehouseRow::RoadmapProgress(RoadmapProgressRow {
                user_id: "u-1".into(),
                career_domain: "backend".into(),
                completed_steps: 5,
                total_steps: 12,
                completion_pct: 41.7,
                timestamp,
                event_date,
            }),
            EntityType::MockInterviewPerformance => {
                WarehouseRow::MockInterview(MockInterviewRow {
                    user_id: "u-1".into(),
                    career_domain: "backend".into(),
                    score: Some(7.5),
                    questions_answered: 10,
                    timestamp,
                    event_date,
                })
            }
        }
    }

    #[test]
    fn table_specs_match_row_serialization() {
        for entity in EntityType::ALL {
            let spec = table_for(entity);
            assert_eq!(spec.name, entity.table_name());

            let value = serde_json::to_value(sample_row(entity)).expect("serialize row");
            let object = value.as_object().expect("row object");

            let spec_columns: std::collections::HashSet<_> =
                spec.columns.iter().map(|c| c.name).collect();
            let row_fields: std::collections::HashSet<_> =
                object.keys().map(|k| k.as_str()).collect();
            assert_eq!(spec_columns, row_fields, "columns drifted for {entity}");
        }
    }

    #[test]
    fn every_partitioned_table_partitions_on_event_date() {
        for spec in warehouse_tables() {
            match spec.partitioning {
                Partitioning::ByDay(field) | Partitioning::ByMonth(field) => {
                    assert_eq!(field, "event_date", "table {}", spec.name);
                }
                Partitioning::None => {}
            }
        }
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let warehouse = MemoryWarehouse::new();

        let first = ensure_schema(&warehouse, "analytics").await.expect("first");
        assert!(first.created_dataset);
        assert_eq!(first.created_tables.len(), EntityType::ALL.len());

        let tables_after_first = warehouse.table_names("analytics");

        let second = ensure_schema(&warehouse, "analytics").await.expect("second");
        assert!(!second.created_dataset);
        assert!(second.created_tables.is_empty());
        assert_eq!(warehouse.table_names("analytics"), tables_after_first);
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let warehouse = MemoryWarehouse::new();
        // No dataset provisioned; an empty batch must not even look it up.
        let inserted = warehouse
            .insert_rows("analytics", "user_activity", vec![])
            .await
            .expect("empty insert");
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn empty_insert_over_http_makes_no_network_call() {
        // Unroutable endpoint: any request would surface a transport error.
        let warehouse = HttpWarehouse::new(HttpWarehouseConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .expect("client");
        let inserted = warehouse
            .insert_rows("analytics", "user_activity", vec![])
            .await
            .expect("empty insert");
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn partial_failure_keeps_good_rows_and_reports_bad_ones() {
        let warehouse = MemoryWarehouse::new();
        ensure_schema(&warehouse, "analytics").await.expect("schema");

        let good = serde_json::to_value(sample_row(EntityType::UserActivity)).unwrap();
        let bad = serde_json::json!({ "user_id": "u-2" });

        let err = warehouse
            .insert_rows("analytics", "user_activity", vec![good, bad])
            .await
            .expect_err("partial failure");

        match err {
            WarehouseError::PartialFailure {
                table,
                attempted,
                rejected,
            } => {
                assert_eq!(table, "user_activity");
                assert_eq!(attempted, 2);
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].index, 1);
                assert_eq!(rejected[0].reason, "missing_required");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }

        assert_eq!(warehouse.rows_in("analytics", "user_activity").len(), 1);
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn transient_statuses_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }
}
