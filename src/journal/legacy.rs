//! Canonicalizes day-analysis JSON from any era of the cache or from raw
//! model output. Everything downstream only sees the canonical shape.

use crate::journal::model::{Action, ActionType, DayAnalysis, normalize_entry_time};
use serde_json::Value;

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_action(raw: &Value) -> Option<Action> {
    let name = non_empty_str(raw.get("name"))?;
    let detail = non_empty_str(raw.get("detail")).or_else(|| non_empty_str(raw.get("dose")));
    let time = non_empty_str(raw.get("time")).and_then(|t| normalize_entry_time(&t));
    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .map(ActionType::from_label)
        .unwrap_or_default();
    Some(Action {
        name,
        detail,
        time,
        kind,
    })
}

/// `insight` falls back to `insights[0]`; `actions` falls back to the
/// older `substances` list. Unreadable input yields the unavailable record.
pub fn normalize_day_analysis(raw: &Value) -> DayAnalysis {
    if !raw.is_object() {
        return DayAnalysis::unavailable();
    }

    let summary = non_empty_str(raw.get("summary")).unwrap_or_default();
    let insight = non_empty_str(raw.get("insight")).or_else(|| {
        raw.get("insights")
            .and_then(Value::as_array)
            .and_then(|items| items.iter().find_map(|item| non_empty_str(Some(item))))
    });
    let actions = raw
        .get("actions")
        .and_then(Value::as_array)
        .or_else(|| raw.get("substances").and_then(Value::as_array))
        .map(|items| items.iter().filter_map(normalize_action).collect())
        .unwrap_or_default();
    let entries_hash =
        non_empty_str(raw.get("entriesHash")).or_else(|| non_empty_str(raw.get("entries_hash")));

    DayAnalysis {
        summary,
        insight,
        actions,
        entries_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_records_pass_through() {
        let raw = json!({
            "summary": "Good focus day",
            "insight": "Walks help",
            "actions": [{"name": "Elvanse", "detail": "30mg", "time": "9:00", "type": "medication"}],
            "entriesHash": "abc"
        });
        let day = normalize_day_analysis(&raw);
        assert_eq!(day.summary, "Good focus day");
        assert_eq!(day.insight.as_deref(), Some("Walks help"));
        assert_eq!(day.actions.len(), 1);
        assert_eq!(day.actions[0].time.as_deref(), Some("09:00"));
        assert_eq!(day.actions[0].kind, ActionType::Medication);
        assert_eq!(day.entries_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let raw = json!({
            "summary": "ok",
            "insights": ["", "first real insight", "second"],
            "substances": [
                {"name": "Coffee", "dose": "2 cups", "type": "caffeine"},
                {"name": "  ", "type": "other"},
                {"name": "Sauna", "type": "spa"}
            ]
        });
        let day = normalize_day_analysis(&raw);
        assert_eq!(day.insight.as_deref(), Some("first real insight"));
        assert_eq!(day.actions.len(), 2);
        assert_eq!(day.actions[0].detail.as_deref(), Some("2 cups"));
        assert_eq!(day.actions[1].kind, ActionType::Other);
        assert_eq!(day.entries_hash, None);
    }

    #[test]
    fn missing_fields_default_instead_of_failing() {
        let day = normalize_day_analysis(&json!({"insight": "x"}));
        assert!(!day.is_available());
        assert!(day.actions.is_empty());

        assert_eq!(normalize_day_analysis(&json!("text")), DayAnalysis::unavailable());
    }
}
