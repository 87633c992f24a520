//! Per-entity change extraction and pure row transformation.
//!
//! Transformers are pure and total: every fetched document yields exactly
//! one warehouse row. Filtering happens in extraction, enrichment happens
//! here, and the enrichment rules are fixed tables — crude, deterministic
//! approximations that feed dashboards, not decisions with compliance
//! weight.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stride_core::{
    normalize_event_time, AtsScoreRow, EntityType, InterviewSessionDoc, MockInterviewRow,
    ResourceEngagementRow, ResourceEventDoc, ResumeDoc, RoadmapProgressDoc, RoadmapProgressRow,
    ScholarshipApplicationDoc, ScholarshipApplicationRow, SkillTrendRow, UserActivityRow,
    UserProfileDoc, WarehouseRow,
};
use stride_store::SourceStore;

pub const CRATE_NAME: &str = "stride-transform";

/// Category buckets checked in order; the first bucket with a matching
/// keyword wins. Matching is a lowercase substring test.
const SKILL_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "cloud",
        &[
            "aws",
            "amazon web services",
            "azure",
            "gcp",
            "google cloud",
            "cloud",
        ],
    ),
    (
        "devops",
        &["docker", "kubernetes", "terraform", "jenkins", "ci/cd", "ansible"],
    ),
    (
        "data",
        &[
            "sql",
            "pandas",
            "spark",
            "machine learning",
            "tensorflow",
            "pytorch",
            "data",
            "analytics",
        ],
    ),
    (
        "web",
        &["react", "angular", "vue", "node", "django", "html", "css", "frontend"],
    ),
    (
        "programming",
        &[
            "python",
            "java",
            "javascript",
            "typescript",
            "c++",
            "c#",
            "rust",
            "golang",
            "ruby",
            "kotlin",
            "swift",
        ],
    ),
    (
        "design",
        &["figma", "photoshop", "illustrator", "ui", "ux", "sketch"],
    ),
    (
        "soft skills",
        &["communication", "leadership", "teamwork", "management", "presentation"],
    ),
];

/// State codes matched as case-sensitive substrings of the free-text
/// location ("San Francisco, CA" matches; "Chicago" alone does not).
const STATE_CODES: &[&str] = &[
    "CA", "NY", "TX", "FL", "WA", "IL", "MA", "GA", "NC", "CO", "PA", "AZ",
];

pub fn categorize_skill(name: &str) -> &'static str {
    let lowered = name.to_lowercase();
    for (category, keywords) in SKILL_CATEGORIES {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            return category;
        }
    }
    "other"
}

/// Bounded linear demand score: `min(100, user_count * 5)`.
pub fn demand_score(user_count: u64) -> i64 {
    user_count.saturating_mul(5).min(100) as i64
}

pub fn state_code(location: &str) -> Option<&'static str> {
    STATE_CODES
        .iter()
        .find(|code| location.contains(*code))
        .copied()
}

/// Proficiency label over the averaged numeric skill-level encoding
/// (beginner=1 .. expert=4).
pub fn proficiency_label(avg_level: f64) -> &'static str {
    if avg_level < 1.5 {
        "beginner"
    } else if avg_level < 2.5 {
        "intermediate"
    } else if avg_level < 3.5 {
        "advanced"
    } else {
        "expert"
    }
}

pub fn transform_profile(doc: &UserProfileDoc) -> UserActivityRow {
    let (timestamp, event_date) = normalize_event_time(doc.updated_at.or(doc.created_at));
    UserActivityRow {
        user_id: doc.user_id.clone(),
        career_goal: doc.career_goal.clone(),
        state_code: doc.location.as_deref().and_then(state_code).map(String::from),
        skill_count: doc.skills.len() as i64,
        timestamp,
        event_date,
    }
}

pub fn transform_resume(doc: &ResumeDoc) -> AtsScoreRow {
    let (timestamp, event_date) = normalize_event_time(doc.updated_at.or(doc.created_at));
    AtsScoreRow {
        user_id: doc.user_id.clone(),
        resume_id: doc.resume_id.clone(),
        target_role: doc.target_role.clone(),
        ats_score: doc.ats_score,
        keyword_matches: doc.keyword_matches,
        timestamp,
        event_date,
    }
}

pub fn transform_roadmap(doc: &RoadmapProgressDoc) -> RoadmapProgressRow {
    let (timestamp, event_date) = normalize_event_time(doc.updated_at);
    let completion_pct = if doc.total_steps == 0 {
        0.0
    } else {
        f64::from(doc.completed_steps) / f64::from(doc.total_steps) * 100.0
    };
    RoadmapProgressRow {
        user_id: doc.user_id.clone(),
        career_domain: doc.career_domain.clone(),
        completed_steps: i64::from(doc.completed_steps),
        total_steps: i64::from(doc.total_steps),
        completion_pct,
        timestamp,
        event_date,
    }
}

pub fn transform_interview(doc: &InterviewSessionDoc) -> MockInterviewRow {
    let (timestamp, event_date) = normalize_event_time(doc.completed_at);
    MockInterviewRow {
        user_id: doc.user_id.clone(),
        career_domain: doc.career_domain.clone(),
        score: doc.score,
        questions_answered: i64::from(doc.questions_answered),
        timestamp,
        event_date,
    }
}

pub fn transform_scholarship_application(
    doc: &ScholarshipApplicationDoc,
) -> ScholarshipApplicationRow {
    let (timestamp, event_date) = normalize_event_time(doc.submitted_at);
    ScholarshipApplicationRow {
        user_id: doc.user_id.clone(),
        title: doc.title.clone(),
        provider: doc.provider.clone(),
        status: doc.status.clone(),
        amount: doc.amount,
        timestamp,
        event_date,
    }
}

pub fn transform_resource_event(doc: &ResourceEventDoc) -> ResourceEngagementRow {
    let (timestamp, event_date) = normalize_event_time(doc.created_at);
    ResourceEngagementRow {
        user_id: doc.user_id.clone(),
        resource_id: doc.resource_id.clone(),
        resource_type: doc.resource_type.clone(),
        action: doc.action.clone(),
        duration_minutes: doc.duration_minutes,
        timestamp,
        event_date,
    }
}

/// Aggregate profile skills across users into one trend row per distinct
/// skill. Skill names are normalized to lowercase so "Rust" and "rust"
/// count as one skill.
pub fn skill_trend_rows(
    profiles: &[UserProfileDoc],
    observed_at: DateTime<Utc>,
) -> Vec<SkillTrendRow> {
    let mut by_skill: BTreeMap<String, (u64, f64)> = BTreeMap::new();
    for profile in profiles {
        for skill in &profile.skills {
            let key = skill.name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let entry = by_skill.entry(key).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += skill.level.weight();
        }
    }

    by_skill
        .into_iter()
        .map(|(skill, (user_count, weight_sum))| {
            let avg_level = weight_sum / user_count as f64;
            SkillTrendRow {
                category: categorize_skill(&skill).to_string(),
                proficiency: proficiency_label(avg_level).to_string(),
                user_count: user_count as i64,
                demand_score: demand_score(user_count),
                avg_level,
                skill,
                timestamp: observed_at,
                event_date: observed_at.date_naive(),
            }
        })
        .collect()
}

/// One extraction strategy per entity type: fetch a capped, optionally
/// recency-bounded slice of the operational store and map it through the
/// matching transformer.
#[async_trait]
pub trait ChangeExtractor: Send + Sync {
    fn entity_type(&self) -> EntityType;

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>>;
}

struct UserActivityExtractor;
struct AtsScoreExtractor;
struct SkillTrendExtractor;
struct ScholarshipApplicationExtractor;
struct ResourceEngagementExtractor;
struct RoadmapProgressExtractor;
struct MockInterviewExtractor;

#[async_trait]
impl ChangeExtractor for UserActivityExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::UserActivity
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let docs = store
            .fetch_profiles(since, limit)
            .await
            .context("fetching user profiles")?;
        Ok(docs
            .iter()
            .map(|doc| WarehouseRow::UserActivity(transform_profile(doc)))
            .collect())
    }
}

#[async_trait]
impl ChangeExtractor for AtsScoreExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::AtsScore
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let docs = store
            .fetch_resumes(since, limit)
            .await
            .context("fetching resumes")?;
        Ok(docs
            .iter()
            .map(|doc| WarehouseRow::AtsScore(transform_resume(doc)))
            .collect())
    }
}

#[async_trait]
impl ChangeExtractor for SkillTrendExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::SkillTrend
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let profiles = store
            .fetch_profiles(since, limit)
            .await
            .context("fetching user profiles for skill trends")?;
        Ok(skill_trend_rows(&profiles, Utc::now())
            .into_iter()
            .map(WarehouseRow::SkillTrend)
            .collect())
    }
}

#[async_trait]
impl ChangeExtractor for ScholarshipApplicationExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::ScholarshipApplication
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let docs = store
            .fetch_scholarship_applications(since, limit)
            .await
            .context("fetching scholarship applications")?;
        Ok(docs
            .iter()
            .map(|doc| WarehouseRow::ScholarshipApplication(transform_scholarship_application(doc)))
            .collect())
    }
}

#[async_trait]
impl ChangeExtractor for ResourceEngagementExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::ResourceEngagement
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let docs = store
            .fetch_resource_events(since, limit)
            .await
            .context("fetching resource events")?;
        Ok(docs
            .iter()
            .map(|doc| WarehouseRow::ResourceEngagement(transform_resource_event(doc)))
            .collect())
    }
}

#[async_trait]
impl ChangeExtractor for RoadmapProgressExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::RoadmapProgress
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let docs = store
            .fetch_roadmap_progress(since, limit)
            .await
            .context("fetching roadmap progress")?;
        Ok(docs
            .iter()
            .map(|doc| WarehouseRow::RoadmapProgress(transform_roadmap(doc)))
            .collect())
    }
}

#[async_trait]
impl ChangeExtractor for MockInterviewExtractor {
    fn entity_type(&self) -> EntityType {
        EntityType::MockInterviewPerformance
    }

    async fn extract(
        &self,
        store: &dyn SourceStore,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>> {
        let docs = store
            .fetch_interview_sessions(since, limit)
            .await
            .context("fetching interview sessions")?;
        Ok(docs
            .iter()
            .map(|doc| WarehouseRow::MockInterview(transform_interview(doc)))
            .collect())
    }
}

/// Registry lookup. `RoiMetric` has no extractor: its rows are computed
/// by the weekly aggregate recompute, not pulled from a collection.
pub fn extractor_for(entity: EntityType) -> Option<Box<dyn ChangeExtractor>> {
    match entity {
        EntityType::UserActivity => Some(Box::new(UserActivityExtractor)),
        EntityType::AtsScore => Some(Box::new(AtsScoreExtractor)),
        EntityType::SkillTrend => Some(Box::new(SkillTrendExtractor)),
        EntityType::RoiMetric => None,
        EntityType::ScholarshipApplication => Some(Box::new(ScholarshipApplicationExtractor)),
        EntityType::ResourceEngagement => Some(Box::new(ResourceEngagementExtractor)),
        EntityType::RoadmapProgress => Some(Box::new(RoadmapProgressExtractor)),
        EntityType::MockInterviewPerformance => Some(Box::new(MockInterviewExtractor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stride_core::{SkillEntry, SkillLevel};
    use stride_store::MemorySourceStore;

    fn mk_profile(user_id: &str, skills: Vec<(&str, SkillLevel)>) -> UserProfileDoc {
        UserProfileDoc {
            user_id: user_id.to_string(),
            full_name: None,
            career_goal: Some("cloud architect".to_string()),
            location: Some("Austin, TX".to_string()),
            skills: skills
                .into_iter()
                .map(|(name, level)| SkillEntry {
                    name: name.to_string(),
                    level,
                })
                .collect(),
            created_at: None,
            updated_at: Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).single(),
        }
    }

    #[test]
    fn skill_categories_are_deterministic() {
        assert_eq!(categorize_skill("Amazon Web Services"), "cloud");
        assert_eq!(categorize_skill("AWS Lambda"), "cloud");
        assert_eq!(categorize_skill("Rust"), "programming");
        assert_eq!(categorize_skill("React"), "web");
        assert_eq!(categorize_skill("Leadership"), "soft skills");
        assert_eq!(categorize_skill("Beekeeping"), "other");
    }

    #[test]
    fn demand_score_is_linear_and_capped() {
        assert_eq!(demand_score(30), 100);
        assert_eq!(demand_score(10), 50);
        assert_eq!(demand_score(20), 100);
        assert_eq!(demand_score(0), 0);
    }

    #[test]
    fn state_codes_match_case_sensitively() {
        assert_eq!(state_code("San Francisco, CA"), Some("CA"));
        assert_eq!(state_code("Austin, TX 78701"), Some("TX"));
        assert_eq!(state_code("Berlin"), None);
        // Lowercase "ca" in a city name is not a state reference.
        assert_eq!(state_code("Lancaster"), None);
    }

    #[test]
    fn proficiency_thresholds_are_exact() {
        assert_eq!(proficiency_label(1.0), "beginner");
        assert_eq!(proficiency_label(1.49), "beginner");
        assert_eq!(proficiency_label(1.5), "intermediate");
        assert_eq!(proficiency_label(2.5), "advanced");
        assert_eq!(proficiency_label(3.5), "expert");
        assert_eq!(proficiency_label(4.0), "expert");
    }

    #[test]
    fn profile_transform_is_total() {
        let doc = mk_profile("u-1", vec![("Rust", SkillLevel::Advanced)]);
        let row = transform_profile(&doc);
        assert_eq!(row.user_id, "u-1");
        assert_eq!(row.state_code.as_deref(), Some("TX"));
        assert_eq!(row.skill_count, 1);
        assert_eq!(row.event_date, row.timestamp.date_naive());
    }

    #[test]
    fn roadmap_transform_guards_zero_steps() {
        let doc = RoadmapProgressDoc {
            user_id: "u-1".to_string(),
            career_domain: "backend".to_string(),
            completed_steps: 0,
            total_steps: 0,
            updated_at: None,
        };
        assert_eq!(transform_roadmap(&doc).completion_pct, 0.0);

        let doc = RoadmapProgressDoc {
            completed_steps: 3,
            total_steps: 12,
            ..doc
        };
        assert_eq!(transform_roadmap(&doc).completion_pct, 25.0);
    }

    #[test]
    fn skill_trends_aggregate_across_users() {
        let observed = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().unwrap();
        let profiles = vec![
            mk_profile("u-1", vec![("Rust", SkillLevel::Advanced)]),
            mk_profile("u-2", vec![("rust", SkillLevel::Beginner)]),
            mk_profile("u-3", vec![("Figma", SkillLevel::Expert)]),
        ];

        let rows = skill_trend_rows(&profiles, observed);
        assert_eq!(rows.len(), 2);

        let rust = rows.iter().find(|r| r.skill == "rust").expect("rust row");
        assert_eq!(rust.user_count, 2);
        assert_eq!(rust.demand_score, 10);
        assert_eq!(rust.avg_level, 2.0);
        assert_eq!(rust.proficiency, "intermediate");
        assert_eq!(rust.category, "programming");

        let figma = rows.iter().find(|r| r.skill == "figma").expect("figma row");
        assert_eq!(figma.category, "design");
        assert_eq!(figma.proficiency, "expert");
    }

    #[test]
    fn extractors_cover_every_extractable_entity() {
        for entity in EntityType::ALL {
            let extractor = extractor_for(entity);
            if entity == EntityType::RoiMetric {
                assert!(extractor.is_none());
            } else {
                assert_eq!(extractor.expect("extractor").entity_type(), entity);
            }
        }
    }

    #[tokio::test]
    async fn extraction_maps_every_fetched_document() {
        let store = MemorySourceStore::new();
        store.seed_profiles(vec![
            mk_profile("u-1", vec![("Rust", SkillLevel::Advanced)]),
            mk_profile("u-2", vec![]),
        ]);

        let extractor = extractor_for(EntityType::UserActivity).expect("extractor");
        let rows = extractor.extract(&store, None, 100).await.expect("extract");
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|row| row.entity_type() == EntityType::UserActivity));
    }
}
