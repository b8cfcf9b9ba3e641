use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::fields::{
    compute_iteration_end, parse_date_value, parse_duration, DUE_DATE_ALIASES, END_DATE_ALIASES,
    EPIC_FIELD_ALIASES, START_DATE_ALIASES,
};

/// Role-specific attributes derived from one item's raw field values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDetails {
    pub iteration_title: Option<String>,
    pub iteration_id: Option<String>,
    pub iteration_start: Option<DateTime<Utc>>,
    pub iteration_end: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub epic_option_id: Option<String>,
    pub epic_name: Option<String>,
}

/// Converts one item's raw field-value list into a flat name→value map plus
/// the derived role attributes.
///
/// Date fields route to start/end/due by alias, first match wins. After all
/// fields are processed the fallback chain fills gaps: iteration start backs
/// the start date, iteration end (else due date) backs the end date, and a
/// lone due date synthesizes start = due − 1 day. Timeline placement for
/// partially scheduled items depends on this exact order.
pub fn parse_field_values(nodes: &[Value]) -> (BTreeMap<String, Value>, ParsedDetails) {
    let mut values = BTreeMap::new();
    let mut details = ParsedDetails::default();

    for node in nodes {
        let Some(name) = field_name(node) else {
            continue;
        };
        let lower_name = name.to_lowercase();
        let typename = node.get("__typename").and_then(Value::as_str);

        match typename {
            Some("ProjectV2ItemFieldNumberValue") => {
                values.insert(name, node.get("number").cloned().unwrap_or(Value::Null));
            }
            Some("ProjectV2ItemFieldSingleSelectValue") => {
                let selected = node.get("name").cloned().unwrap_or(Value::Null);
                if EPIC_FIELD_ALIASES.contains(&lower_name.as_str()) {
                    details.epic_name = selected.as_str().map(str::to_string);
                    details.epic_option_id = single_option_id(node);
                }
                values.insert(name, selected);
            }
            Some("ProjectV2ItemFieldIterationValue") => {
                let title = node.get("title").cloned().unwrap_or(Value::Null);
                details.iteration_title = title.as_str().map(str::to_string);
                details.iteration_id = node
                    .get("iterationId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                details.iteration_start = node
                    .get("startDate")
                    .and_then(Value::as_str)
                    .and_then(parse_date_value);
                details.iteration_end = compute_iteration_end(
                    details.iteration_start,
                    node.get("duration").and_then(parse_duration),
                );
                values.insert(name, title);
            }
            Some("ProjectV2ItemFieldDateValue") => {
                let raw = node.get("date").cloned().unwrap_or(Value::Null);
                let parsed = raw.as_str().and_then(parse_date_value);
                values.insert(name, raw);
                let Some(date_value) = parsed else {
                    continue;
                };
                if START_DATE_ALIASES.contains(&lower_name.as_str()) {
                    details.start_date.get_or_insert(date_value);
                } else if END_DATE_ALIASES.contains(&lower_name.as_str()) {
                    details.end_date.get_or_insert(date_value);
                } else if DUE_DATE_ALIASES.contains(&lower_name.as_str()) {
                    details.due_date.get_or_insert(date_value);
                }
            }
            _ => {
                values.insert(name, node.get("text").cloned().unwrap_or(Value::Null));
            }
        }
    }

    if details.start_date.is_none() {
        details.start_date = details.iteration_start;
    }
    if details.end_date.is_none() {
        details.end_date = details.iteration_end.or(details.due_date);
    }
    if details.start_date.is_none() {
        details.start_date = details.due_date.map(|due| due - Duration::days(1));
    }

    (values, details)
}

fn field_name(node: &Value) -> Option<String> {
    node.get("field")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// The option id arrives as either a string or a list; a list collapses to
/// its first element.
fn single_option_id(node: &Value) -> Option<String> {
    let raw = node.get("optionId").or_else(|| node.get("optionIds"))?;
    match raw {
        Value::String(id) => Some(id.clone()),
        Value::Array(ids) => ids.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date_node(field: &str, date: &str) -> Value {
        json!({
            "__typename": "ProjectV2ItemFieldDateValue",
            "field": {"name": field},
            "date": date
        })
    }

    #[test]
    fn lone_due_date_synthesizes_the_timeline() {
        let nodes = vec![date_node("Due date", "2025-04-10")];
        let (_, details) = parse_field_values(&nodes);
        assert_eq!(details.due_date.unwrap().to_rfc3339(), "2025-04-10T00:00:00+00:00");
        assert_eq!(details.end_date, details.due_date);
        assert_eq!(details.start_date.unwrap().to_rfc3339(), "2025-04-09T00:00:00+00:00");
    }

    #[test]
    fn explicit_dates_win_over_fallbacks() {
        let nodes = vec![
            date_node("Start date", "2025-04-01"),
            date_node("End date", "2025-04-05"),
            date_node("Due date", "2025-04-10"),
        ];
        let (_, details) = parse_field_values(&nodes);
        assert_eq!(details.start_date.unwrap().to_rfc3339(), "2025-04-01T00:00:00+00:00");
        assert_eq!(details.end_date.unwrap().to_rfc3339(), "2025-04-05T00:00:00+00:00");
    }

    #[test]
    fn first_matching_date_field_wins() {
        let nodes = vec![
            date_node("Start date", "2025-04-01"),
            date_node("Kickoff", "2025-05-01"),
        ];
        let (values, details) = parse_field_values(&nodes);
        assert_eq!(details.start_date.unwrap().to_rfc3339(), "2025-04-01T00:00:00+00:00");
        // Both still land in the flat map.
        assert_eq!(values["Kickoff"], json!("2025-05-01"));
    }

    #[test]
    fn iteration_value_sets_range_and_backs_missing_dates() {
        let nodes = vec![json!({
            "__typename": "ProjectV2ItemFieldIterationValue",
            "field": {"name": "Iteration"},
            "title": "Sprint 1",
            "iterationId": "it-1",
            "startDate": "2025-01-01",
            "duration": 14
        })];
        let (values, details) = parse_field_values(&nodes);
        assert_eq!(details.iteration_title.as_deref(), Some("Sprint 1"));
        assert_eq!(details.iteration_id.as_deref(), Some("it-1"));
        assert_eq!(details.iteration_end.unwrap().to_rfc3339(), "2025-01-15T00:00:00+00:00");
        assert_eq!(details.start_date, details.iteration_start);
        assert_eq!(details.end_date, details.iteration_end);
        assert_eq!(values["Iteration"], json!("Sprint 1"));
    }

    #[test]
    fn non_numeric_iteration_duration_yields_no_end() {
        let nodes = vec![json!({
            "__typename": "ProjectV2ItemFieldIterationValue",
            "field": {"name": "Iteration"},
            "title": "Sprint 2",
            "iterationId": "it-2",
            "startDate": "2025-02-01",
            "duration": "a fortnight"
        })];
        let (_, details) = parse_field_values(&nodes);
        assert!(details.iteration_end.is_none());
        assert_eq!(details.start_date, details.iteration_start);
        assert!(details.end_date.is_none());
    }

    #[test]
    fn epic_single_select_captures_name_and_option_id() {
        let nodes = vec![json!({
            "__typename": "ProjectV2ItemFieldSingleSelectValue",
            "field": {"name": "Epic"},
            "name": "Payments",
            "optionId": "opt-9"
        })];
        let (values, details) = parse_field_values(&nodes);
        assert_eq!(details.epic_name.as_deref(), Some("Payments"));
        assert_eq!(details.epic_option_id.as_deref(), Some("opt-9"));
        assert_eq!(values["Epic"], json!("Payments"));
    }

    #[test]
    fn epic_option_id_list_collapses_to_first() {
        let nodes = vec![json!({
            "__typename": "ProjectV2ItemFieldSingleSelectValue",
            "field": {"name": "Parent issue"},
            "name": "Platform",
            "optionId": ["opt-1", "opt-2"]
        })];
        let (_, details) = parse_field_values(&nodes);
        assert_eq!(details.epic_option_id.as_deref(), Some("opt-1"));
    }

    #[test]
    fn non_epic_single_select_only_fills_the_flat_map() {
        let nodes = vec![json!({
            "__typename": "ProjectV2ItemFieldSingleSelectValue",
            "field": {"name": "Priority"},
            "name": "High",
            "optionId": "opt-3"
        })];
        let (values, details) = parse_field_values(&nodes);
        assert!(details.epic_name.is_none());
        assert!(details.epic_option_id.is_none());
        assert_eq!(values["Priority"], json!("High"));
    }

    #[test]
    fn unparsable_dates_are_dropped_not_errored() {
        let nodes = vec![date_node("Due date", "someday")];
        let (values, details) = parse_field_values(&nodes);
        assert!(details.due_date.is_none());
        assert!(details.start_date.is_none());
        // Raw value is still mirrored into the flat map.
        assert_eq!(values["Due date"], json!("someday"));
    }

    #[test]
    fn nodes_without_a_field_name_are_skipped() {
        let nodes = vec![json!({}), json!({"field": {}})];
        let (values, details) = parse_field_values(&nodes);
        assert!(values.is_empty());
        assert_eq!(details, ParsedDetails::default());
    }

    #[test]
    fn text_and_number_values_fill_the_flat_map() {
        let nodes = vec![
            json!({
                "__typename": "ProjectV2ItemFieldTextValue",
                "field": {"name": "Notes"},
                "text": "needs design review"
            }),
            json!({
                "__typename": "ProjectV2ItemFieldNumberValue",
                "field": {"name": "Estimate"},
                "number": 5.0
            }),
        ];
        let (values, _) = parse_field_values(&nodes);
        assert_eq!(values["Notes"], json!("needs design review"));
        assert_eq!(values["Estimate"], json!(5.0));
    }
}
