// Append-only conversation log for one session

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{AppError, AppResult};

const TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Answered(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: usize,
    pub query: String,
    pub title: String,
    pub status: EntryStatus,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Record a new pending query. Refused while another entry is pending.
    pub fn begin(&mut self, query: &str) -> AppResult<usize> {
        if self.has_pending() {
            return Err(AppError::InvalidRequest(
                "another query is still being processed".to_string(),
            ));
        }
        let id = self.entries.len() + 1;
        self.entries.push(HistoryEntry {
            id,
            query: query.to_string(),
            title: title_for(query),
            status: EntryStatus::Pending,
            submitted_at: Utc::now(),
            resolved_at: None,
        });
        Ok(id)
    }

    /// Resolve a pending entry exactly once.
    pub fn resolve(&mut self, id: usize, outcome: Result<String, String>) -> AppResult<HistoryEntry> {
        let entry = id
            .checked_sub(1)
            .and_then(|idx| self.entries.get_mut(idx))
            .ok_or_else(|| AppError::NotFound(format!("history entry {}", id)))?;
        if entry.status != EntryStatus::Pending {
            return Err(AppError::Internal(format!("history entry {} already resolved", id)));
        }
        entry.status = match outcome {
            Ok(text) => EntryStatus::Answered(text),
            Err(error) => EntryStatus::Failed(error),
        };
        entry.resolved_at = Some(Utc::now());
        Ok(entry.clone())
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|e| e.status == EntryStatus::Pending)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn title_for(query: &str) -> String {
    let first_line = query.lines().next().unwrap_or_default();
    if query.chars().count() > TITLE_CHARS || first_line.len() < query.len() {
        let cut: String = first_line.chars().take(TITLE_CHARS).collect();
        format!("{}...", cut)
    } else {
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_resolve_in_order() {
        let mut history = History::default();
        let first = history.begin("What is the shape?").unwrap();
        history.resolve(first, Ok("(10, 3)".to_string())).unwrap();
        let second = history.begin("Plot it").unwrap();
        history.resolve(second, Err("unsupported".to_string())).unwrap();

        let entries = history.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[0].status, EntryStatus::Answered("(10, 3)".to_string()));
        assert_eq!(entries[1].status, EntryStatus::Failed("unsupported".to_string()));
        assert!(entries[1].resolved_at.is_some());
    }

    #[test]
    fn test_begin_refused_while_pending() {
        let mut history = History::default();
        history.begin("one").unwrap();
        assert!(history.begin("two").is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_resolve_only_once() {
        let mut history = History::default();
        let id = history.begin("q").unwrap();
        history.resolve(id, Ok("a".to_string())).unwrap();
        assert!(history.resolve(id, Ok("b".to_string())).is_err());
        assert!(history.resolve(99, Ok("c".to_string())).is_err());
    }

    #[test]
    fn test_titles_are_truncated() {
        let long = "x".repeat(80);
        assert_eq!(title_for(&long), format!("{}...", "x".repeat(50)));
        assert_eq!(title_for("short"), "short");
        assert_eq!(title_for("line one\nline two"), "line one...");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(EntryStatus::Answered("ok".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "answered", "text": "ok"}));
        let json = serde_json::to_value(EntryStatus::Pending).unwrap();
        assert_eq!(json, serde_json::json!({"state": "pending"}));
    }
}
