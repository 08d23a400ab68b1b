//! In-memory catalog behind the dashboard: processed threads, team members
//! and analytics.  Seeded at startup, mutated in memory, never persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod handlers;

const SEED: &str = include_str!("seed.json");

pub const DEFAULT_LIMIT: usize = 50;
pub const DEFAULT_PERIOD: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSource {
    Slack,
    Discord,
    Teams,
}

impl ThreadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadSource::Slack => "slack",
            ThreadSource::Discord => "discord",
            ThreadSource::Teams => "teams",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl ThreadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Pending => "pending",
            ThreadStatus::Processing => "processing",
            ThreadStatus::Processed => "processed",
            ThreadStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_meeting_summary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub id: String,
    pub source: ThreadSource,
    pub title: String,
    pub summary: String,
    pub status: ThreadStatus,
    pub created_at: String,
    pub message_count: u32,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ThreadOutputs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Online,
    Offline,
    Away,
}

impl MemberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Online => "online",
            MemberStatus::Offline => "offline",
            MemberStatus::Away => "away",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department: String,
    pub status: MemberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub join_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub last_active: String,
    pub threads_participated: u32,
    pub tasks_completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyThroughput {
    pub date: String,
    pub threads: u32,
    pub tasks: u32,
    pub errors: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingTimeStat {
    pub date: String,
    pub avg_time: f64,
    pub max_time: f64,
    pub min_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceShare {
    pub source: ThreadSource,
    pub count: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_threads: u32,
    pub total_tasks: u32,
    pub total_errors: u32,
    pub avg_processing_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub threads_processed: Vec<DailyThroughput>,
    pub processing_time: Vec<ProcessingTimeStat>,
    pub source_distribution: Vec<SourceShare>,
    pub summary: AnalyticsSummary,
}

#[derive(Debug, Deserialize)]
struct Seed {
    threads: Vec<ThreadRecord>,
    members: Vec<TeamMember>,
    analytics: AnalyticsData,
}

/// Fields accepted by `POST /api/threads`; everything else is defaulted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThread {
    pub source: Option<ThreadSource>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub message_count: Option<u32>,
    pub participants: Option<Vec<String>>,
    pub channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub avatar: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ThreadFilter<'a> {
    pub status: Option<&'a str>,
    pub source: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct MemberFilter<'a> {
    pub department: Option<&'a str>,
    pub status: Option<&'a str>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Name and email are required")]
    MissingNameOrEmail,
    #[error("Team member with this email already exists")]
    DuplicateEmail,
    #[error("invalid field value: {0}")]
    Invalid(String),
    #[error("seed data is invalid: {0}")]
    Seed(String),
}

pub struct Catalog {
    threads: RwLock<Vec<ThreadRecord>>,
    members: RwLock<Vec<TeamMember>>,
    analytics: AnalyticsData,
    next_id: AtomicU64,
}

impl Catalog {
    /// Catalog populated from the embedded seed data.
    pub fn seeded() -> Result<Self, CatalogError> {
        let seed: Seed =
            serde_json::from_str(SEED).map_err(|e| CatalogError::Seed(e.to_string()))?;
        Ok(Self::from_parts(seed.threads, seed.members, seed.analytics))
    }

    pub fn from_parts(
        threads: Vec<ThreadRecord>,
        members: Vec<TeamMember>,
        analytics: AnalyticsData,
    ) -> Self {
        let max_id = threads
            .iter()
            .map(|t| t.id.as_str())
            .chain(members.iter().map(|m| m.id.as_str()))
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            threads: RwLock::new(threads),
            members: RwLock::new(members),
            analytics,
            next_id: AtomicU64::new(max_id + 1),
        }
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn threads(&self) -> RwLockReadGuard<'_, Vec<ThreadRecord>> {
        self.threads.read().unwrap_or_else(|e| e.into_inner())
    }

    fn threads_mut(&self) -> RwLockWriteGuard<'_, Vec<ThreadRecord>> {
        self.threads.write().unwrap_or_else(|e| e.into_inner())
    }

    fn members(&self) -> RwLockReadGuard<'_, Vec<TeamMember>> {
        self.members.read().unwrap_or_else(|e| e.into_inner())
    }

    fn members_mut(&self) -> RwLockWriteGuard<'_, Vec<TeamMember>> {
        self.members.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Filtered page plus the filtered total.
    pub fn list_threads(&self, filter: &ThreadFilter<'_>, page: Page) -> (Vec<ThreadRecord>, usize) {
        let threads = self.threads();
        let matched: Vec<ThreadRecord> = threads
            .iter()
            .filter(|t| filter.status.map_or(true, |s| t.status.as_str() == s))
            .filter(|t| filter.source.map_or(true, |s| t.source.as_str() == s))
            .cloned()
            .collect();
        (page.apply(&matched), matched.len())
    }

    pub fn get_thread(&self, id: &str) -> Result<ThreadRecord, CatalogError> {
        self.threads()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(CatalogError::NotFound("Thread"))
    }

    /// New threads start `pending` and go to the front of the list.
    pub fn create_thread(&self, new: NewThread) -> ThreadRecord {
        let record = ThreadRecord {
            id: self.next_id(),
            source: new.source.unwrap_or(ThreadSource::Slack),
            title: new
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled Thread".to_string()),
            summary: new.summary.unwrap_or_default(),
            status: ThreadStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
            message_count: new.message_count.unwrap_or(0),
            participants: new.participants.unwrap_or_default(),
            channel: new.channel,
            outputs: None,
        };
        self.threads_mut().insert(0, record.clone());
        record
    }

    pub fn list_members(&self, filter: &MemberFilter<'_>, page: Page) -> (Vec<TeamMember>, usize) {
        let members = self.members();
        let matched: Vec<TeamMember> = members
            .iter()
            .filter(|m| {
                filter
                    .department
                    .map_or(true, |d| m.department.eq_ignore_ascii_case(d))
            })
            .filter(|m| filter.status.map_or(true, |s| m.status.as_str() == s))
            .cloned()
            .collect();
        (page.apply(&matched), matched.len())
    }

    pub fn get_member(&self, id: &str) -> Result<TeamMember, CatalogError> {
        self.members()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(CatalogError::NotFound("Team member"))
    }

    pub fn create_member(&self, new: NewMember) -> Result<TeamMember, CatalogError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let (Some(name), Some(email)) = (non_empty(new.name), non_empty(new.email)) else {
            return Err(CatalogError::MissingNameOrEmail);
        };
        let mut members = self.members_mut();
        if members.iter().any(|m| m.email == email) {
            return Err(CatalogError::DuplicateEmail);
        }
        let now = chrono::Utc::now();
        let member = TeamMember {
            id: self.next_id(),
            name,
            email,
            role: non_empty(new.role).unwrap_or_else(|| "Team Member".to_string()),
            department: non_empty(new.department).unwrap_or_else(|| "General".to_string()),
            status: MemberStatus::Offline,
            avatar: new.avatar,
            join_date: now.format("%Y-%m-%d").to_string(),
            location: new.location,
            phone: new.phone,
            last_active: now.to_rfc3339(),
            threads_participated: 0,
            tasks_completed: 0,
        };
        members.push(member.clone());
        Ok(member)
    }

    /// Shallow merge of `patch` over the stored member.  Unknown keys are
    /// ignored and the id never changes.
    pub fn update_member(&self, id: &str, patch: &Map<String, Value>) -> Result<TeamMember, CatalogError> {
        let mut members = self.members_mut();
        let idx = members
            .iter()
            .position(|m| m.id == id)
            .ok_or(CatalogError::NotFound("Team member"))?;

        let mut merged = match serde_json::to_value(&members[idx]) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(CatalogError::Invalid("member is not an object".into())),
            Err(e) => return Err(CatalogError::Invalid(e.to_string())),
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        merged.insert("id".into(), Value::String(id.to_string()));
        let updated: TeamMember = serde_json::from_value(Value::Object(merged))
            .map_err(|e| CatalogError::Invalid(e.to_string()))?;

        if members
            .iter()
            .enumerate()
            .any(|(i, m)| i != idx && m.email == updated.email)
        {
            return Err(CatalogError::DuplicateEmail);
        }
        members[idx] = updated.clone();
        Ok(updated)
    }

    pub fn analytics(&self) -> &AnalyticsData {
        &self.analytics
    }

    /// The last `period` days of throughput; a zero period returns every day.
    pub fn threads_processed(&self, period: usize) -> &[DailyThroughput] {
        let all = &self.analytics.threads_processed;
        if period == 0 || period >= all.len() {
            all
        } else {
            &all[all.len() - period..]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::seeded().unwrap()
    }

    #[test]
    fn seed_parses_and_ids_continue_past_max() {
        let c = catalog();
        let (threads, total) = c.list_threads(&ThreadFilter::default(), Page::default());
        assert_eq!(total, 4);
        assert_eq!(threads.len(), 4);
        let created = c.create_thread(NewThread::default());
        assert_eq!(created.id, "6");
        assert_eq!(created.title, "Untitled Thread");
        assert_eq!(created.source, ThreadSource::Slack);
        assert_eq!(created.status, ThreadStatus::Pending);
        let (threads, _) = c.list_threads(&ThreadFilter::default(), Page::default());
        assert_eq!(threads[0].id, "6");
    }

    #[test]
    fn thread_filters_and_pagination() {
        let c = catalog();
        let filter = ThreadFilter {
            source: Some("slack"),
            ..ThreadFilter::default()
        };
        let (page, total) = c.list_threads(&filter, Page { limit: 1, offset: 1 });
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "3");
        let filter = ThreadFilter {
            status: Some("archived"),
            ..ThreadFilter::default()
        };
        assert_eq!(c.list_threads(&filter, Page::default()).1, 0);
        assert_eq!(c.get_thread("99"), Err(CatalogError::NotFound("Thread")));
    }

    #[test]
    fn member_department_filter_is_case_insensitive() {
        let c = catalog();
        let filter = MemberFilter {
            department: Some("engineering"),
            status: Some("online"),
        };
        let (members, total) = c.list_members(&filter, Page::default());
        assert_eq!(total, 2);
        assert!(members.iter().all(|m| m.department == "Engineering"));
    }

    #[test]
    fn create_member_validates_and_rejects_duplicates() {
        let c = catalog();
        assert_eq!(
            c.create_member(NewMember {
                name: Some("Nina".into()),
                ..NewMember::default()
            }),
            Err(CatalogError::MissingNameOrEmail)
        );
        assert_eq!(
            c.create_member(NewMember {
                name: Some("Johnny".into()),
                email: Some("john.doe@company.com".into()),
                ..NewMember::default()
            }),
            Err(CatalogError::DuplicateEmail)
        );
        let m = c
            .create_member(NewMember {
                name: Some("Nina".into()),
                email: Some("nina@company.com".into()),
                ..NewMember::default()
            })
            .unwrap();
        assert_eq!(m.role, "Team Member");
        assert_eq!(m.department, "General");
        assert_eq!(m.status, MemberStatus::Offline);
        assert_eq!(m.threads_participated, 0);
        assert_eq!(m.join_date.len(), 10);
    }

    #[test]
    fn update_member_merges_and_keeps_id() {
        let c = catalog();
        let patch = json!({ "id": "999", "role": "Staff Engineer", "status": "away", "shoeSize": 44 });
        let updated = c
            .update_member("2", patch.as_object().unwrap())
            .unwrap();
        assert_eq!(updated.id, "2");
        assert_eq!(updated.role, "Staff Engineer");
        assert_eq!(updated.status, MemberStatus::Away);
        assert_eq!(updated.name, "Sarah Smith");
        assert_eq!(c.get_member("2").unwrap().role, "Staff Engineer");

        let bad = json!({ "status": "sleeping" });
        assert!(matches!(
            c.update_member("2", bad.as_object().unwrap()),
            Err(CatalogError::Invalid(_))
        ));
        let dup = json!({ "email": "john.doe@company.com" });
        assert_eq!(
            c.update_member("2", dup.as_object().unwrap()),
            Err(CatalogError::DuplicateEmail)
        );
        assert_eq!(
            c.update_member("42", &Map::new()),
            Err(CatalogError::NotFound("Team member"))
        );
    }

    #[test]
    fn threads_processed_takes_trailing_days() {
        let c = catalog();
        let last3 = c.threads_processed(3);
        assert_eq!(last3.len(), 3);
        assert_eq!(last3[2].date, "Jan 15");
        assert_eq!(c.threads_processed(DEFAULT_PERIOD).len(), 15);
        assert_eq!(c.threads_processed(100).len(), 15);
    }
}
