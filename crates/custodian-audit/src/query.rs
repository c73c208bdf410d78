//! Filters for [`AuditChain::get`](crate::AuditChain::get).

use chrono::{DateTime, Utc};

use crate::entry::{AuditEntry, EventType};

/// Entry filter. All set conditions must hold.
///
/// `since` is inclusive and `until` exclusive, so consecutive windows never
/// return the same entry twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub event_type: Option<EventType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub actor_id: Option<String>,
    /// Maximum number of entries returned (oldest first). `None` returns
    /// everything that matches.
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// A query matching every entry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.event_type.is_some_and(|t| t != entry.event_type) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp >= until) {
            return false;
        }
        if let Some(actor) = &self.actor_id
            && entry.actor_id.as_deref() != Some(actor.as_str())
        {
            return false;
        }
        true
    }

    /// Whether `count` results already satisfy the limit.
    pub(crate) fn is_full(&self, count: usize) -> bool {
        self.limit.is_some_and(|limit| count >= limit)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;

    use super::*;
    use crate::entry::Severity;

    fn entry_at(timestamp: DateTime<Utc>, event_type: EventType, actor: Option<&str>) -> AuditEntry {
        AuditEntry {
            event_id: "e".into(),
            timestamp,
            event_type,
            owner_id: "acme".into(),
            actor_id: actor.map(str::to_string),
            severity: Severity::Info,
            description: String::new(),
            metadata: BTreeMap::new(),
            previous_hash: String::new(),
            hash: String::new(),
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        let entry = entry_at(Utc::now(), EventType::SystemEvent, None);
        assert!(AuditQuery::new().matches(&entry));
    }

    #[test]
    fn time_window_is_half_open() {
        let t = Utc::now();
        let query = AuditQuery::new().since(t).until(t + Duration::seconds(10));

        assert!(query.matches(&entry_at(t, EventType::DataAccess, None)));
        assert!(!query.matches(&entry_at(t - Duration::seconds(1), EventType::DataAccess, None)));
        assert!(!query.matches(&entry_at(t + Duration::seconds(10), EventType::DataAccess, None)));
    }

    #[test]
    fn type_and_actor_filters() {
        let t = Utc::now();
        let query = AuditQuery::new().event_type(EventType::AuthFailure).actor("bob");

        assert!(query.matches(&entry_at(t, EventType::AuthFailure, Some("bob"))));
        assert!(!query.matches(&entry_at(t, EventType::AuthFailure, Some("eve"))));
        assert!(!query.matches(&entry_at(t, EventType::AuthFailure, None)));
        assert!(!query.matches(&entry_at(t, EventType::AuthSuccess, Some("bob"))));
    }

    #[test]
    fn limit_reports_fullness() {
        let query = AuditQuery::new().limit(2);
        assert!(!query.is_full(1));
        assert!(query.is_full(2));
        assert!(!AuditQuery::new().is_full(usize::MAX));
    }
}
