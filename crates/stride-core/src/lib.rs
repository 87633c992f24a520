//! Core domain model for the Stride analytics sync pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "stride-core";

/// Closed set of analytical entity types. Declaration order is the fixed
/// processing order within a sync run, which keeps run-history entries
/// reproducible for a given dataset snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    UserActivity,
    AtsScore,
    SkillTrend,
    RoiMetric,
    ScholarshipApplication,
    ResourceEngagement,
    RoadmapProgress,
    MockInterviewPerformance,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::UserActivity,
        EntityType::AtsScore,
        EntityType::SkillTrend,
        EntityType::RoiMetric,
        EntityType::ScholarshipApplication,
        EntityType::ResourceEngagement,
        EntityType::RoadmapProgress,
        EntityType::MockInterviewPerformance,
    ];

    /// Entity types a full sync extracts from the operational store.
    /// `RoiMetric` rows are computed by the weekly aggregate recompute,
    /// not extracted, so they are absent here.
    pub const FULL_SYNC: [EntityType; 7] = [
        EntityType::UserActivity,
        EntityType::AtsScore,
        EntityType::SkillTrend,
        EntityType::ScholarshipApplication,
        EntityType::ResourceEngagement,
        EntityType::RoadmapProgress,
        EntityType::MockInterviewPerformance,
    ];

    /// Entity types for which incremental propagation is meaningful:
    /// per-user activity and score updates, not cross-user aggregates.
    pub const INCREMENTAL: [EntityType; 6] = [
        EntityType::UserActivity,
        EntityType::AtsScore,
        EntityType::ScholarshipApplication,
        EntityType::ResourceEngagement,
        EntityType::RoadmapProgress,
        EntityType::MockInterviewPerformance,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            EntityType::UserActivity => "user_activity",
            EntityType::AtsScore => "ats_scores",
            EntityType::SkillTrend => "skill_trends",
            EntityType::RoiMetric => "roi_metrics",
            EntityType::ScholarshipApplication => "scholarship_applications",
            EntityType::ResourceEngagement => "resource_engagement",
            EntityType::RoadmapProgress => "roadmap_progress",
            EntityType::MockInterviewPerformance => "mock_interview_performance",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Self-reported skill level on a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    /// Numeric encoding used when averaging levels across users.
    pub fn weight(self) -> f64 {
        match self {
            SkillLevel::Beginner => 1.0,
            SkillLevel::Intermediate => 2.0,
            SkillLevel::Advanced => 3.0,
            SkillLevel::Expert => 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub level: SkillLevel,
}

// Operational-store document shapes, one per consumed collection. These
// mirror what the live application writes; the pipeline reads them as-is.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfileDoc {
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub career_goal: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<SkillEntry>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeDoc {
    pub user_id: String,
    pub resume_id: String,
    #[serde(default)]
    pub target_role: Option<String>,
    #[serde(default)]
    pub ats_score: Option<f64>,
    #[serde(default)]
    pub keyword_matches: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapProgressDoc {
    pub user_id: String,
    pub career_domain: String,
    pub completed_steps: u32,
    pub total_steps: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSessionDoc {
    pub user_id: String,
    pub career_domain: String,
    #[serde(default)]
    pub score: Option<f64>,
    pub questions_answered: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScholarshipApplicationDoc {
    pub user_id: String,
    pub title: String,
    pub provider: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEventDoc {
    pub user_id: String,
    pub resource_id: String,
    pub resource_type: String,
    pub action: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Scholarship catalog record consolidated by the merge tool. Identity is
/// the normalized `(title, provider)` natural key, not a surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScholarshipDoc {
    pub title: String,
    pub provider: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Resolve a source timestamp into the warehouse `(timestamp, event_date)`
/// pair. A missing source timestamp normalizes to `now` — a policy for
/// late-arriving documents, not an error fallback.
pub fn normalize_event_time(source: Option<DateTime<Utc>>) -> (DateTime<Utc>, NaiveDate) {
    let ts = source.unwrap_or_else(Utc::now);
    (ts, ts.date_naive())
}

// Warehouse row shapes, one per entity type. Field names are the warehouse
// column names; downstream dashboards depend on them staying put.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivityRow {
    pub user_id: String,
    pub career_goal: Option<String>,
    pub state_code: Option<String>,
    pub skill_count: i64,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsScoreRow {
    pub user_id: String,
    pub resume_id: String,
    pub target_role: Option<String>,
    pub ats_score: Option<f64>,
    pub keyword_matches: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTrendRow {
    pub skill: String,
    pub category: String,
    pub user_count: i64,
    pub demand_score: i64,
    pub avg_level: f64,
    pub proficiency: String,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiMetricRow {
    pub career_domain: String,
    pub users_tracked: i64,
    pub completion_rate: f64,
    pub avg_resume_score: Option<f64>,
    pub avg_interview_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScholarshipApplicationRow {
    pub user_id: String,
    pub title: String,
    pub provider: String,
    pub status: String,
    pub amount: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEngagementRow {
    pub user_id: String,
    pub resource_id: String,
    pub resource_type: String,
    pub action: String,
    pub duration_minutes: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapProgressRow {
    pub user_id: String,
    pub career_domain: String,
    pub completed_steps: i64,
    pub total_steps: i64,
    pub completion_pct: f64,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockInterviewRow {
    pub user_id: String,
    pub career_domain: String,
    pub score: Option<f64>,
    pub questions_answered: i64,
    pub timestamp: DateTime<Utc>,
    pub event_date: NaiveDate,
}

/// Tagged union of warehouse rows, keyed by entity type. Serializes
/// untagged so a variant's JSON is exactly the row object the warehouse
/// table expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WarehouseRow {
    UserActivity(UserActivityRow),
    AtsScore(AtsScoreRow),
    SkillTrend(SkillTrendRow),
    RoiMetric(RoiMetricRow),
    ScholarshipApplication(ScholarshipApplicationRow),
    ResourceEngagement(ResourceEngagementRow),
    RoadmapProgress(RoadmapProgressRow),
    MockInterview(MockInterviewRow),
}

impl WarehouseRow {
    pub fn entity_type(&self) -> EntityType {
        match self {
            WarehouseRow::UserActivity(_) => EntityType::UserActivity,
            WarehouseRow::AtsScore(_) => EntityType::AtsScore,
            WarehouseRow::SkillTrend(_) => EntityType::SkillTrend,
            WarehouseRow::RoiMetric(_) => EntityType::RoiMetric,
            WarehouseRow::ScholarshipApplication(_) => EntityType::ScholarshipApplication,
            WarehouseRow::ResourceEngagement(_) => EntityType::ResourceEngagement,
            WarehouseRow::RoadmapProgress(_) => EntityType::RoadmapProgress,
            WarehouseRow::MockInterview(_) => EntityType::MockInterviewPerformance,
        }
    }

    /// The user a row belongs to, when it belongs to one. Cross-user
    /// aggregate rows (skill trends, ROI metrics) have no single owner.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            WarehouseRow::UserActivity(r) => Some(&r.user_id),
            WarehouseRow::AtsScore(r) => Some(&r.user_id),
            WarehouseRow::ScholarshipApplication(r) => Some(&r.user_id),
            WarehouseRow::ResourceEngagement(r) => Some(&r.user_id),
            WarehouseRow::RoadmapProgress(r) => Some(&r.user_id),
            WarehouseRow::MockInterview(r) => Some(&r.user_id),
            WarehouseRow::SkillTrend(_) | WarehouseRow::RoiMetric(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunKind {
    Full,
    Incremental,
    WeeklyAggregate,
}

/// Finalized record of one orchestrator invocation. Immutable once built;
/// the orchestrator appends it to a bounded run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub run_id: Uuid,
    pub kind: SyncRunKind,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub inserted: std::collections::BTreeMap<EntityType, u64>,
    pub succeeded: bool,
}

impl SyncRun {
    pub fn total_inserted(&self) -> u64 {
        self.inserted.values().sum()
    }
}
