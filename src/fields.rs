use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alias sets for mapping user-named fields onto semantic roles. These are
/// heuristics over user-assigned names; nothing guarantees a board actually
/// has an "Epic" single-select or a "Start date" date field.
pub const START_DATE_ALIASES: &[&str] = &["start date", "start", "kickoff", "início", "inicio"];
pub const END_DATE_ALIASES: &[&str] = &["end date", "finish", "fim", "conclusão", "conclusao"];
pub const DUE_DATE_ALIASES: &[&str] = &["due date", "target date", "deadline", "entrega"];
pub const EPIC_FIELD_ALIASES: &[&str] =
    &["epic", "épico", "epico", "parent issue", "parent", "epic link"];
pub const ESTIMATE_FIELD_ALIASES: &[&str] = &["estimate", "story points", "points"];

/// The remote platform's fixed palette for single-select options.
pub const SINGLE_SELECT_COLORS: &[&str] = &[
    "GRAY", "BLUE", "GREEN", "YELLOW", "ORANGE", "RED", "PURPLE", "PINK", "BROWN", "BLACK",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationEntry {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// A resolved iteration option with its computed date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationOption {
    pub id: String,
    pub title: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// One custom field definition, as a tagged variant rather than a raw JSON
/// blob. `Unknown` keeps fields the engine has no use for without erroring.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    SingleSelect { options: Vec<SelectOption> },
    Iteration { iterations: Vec<IterationEntry> },
    Unknown,
}

impl FieldKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::SingleSelect { .. } => "single_select",
            FieldKind::Iteration { .. } => "iteration",
            FieldKind::Unknown => "unknown",
        }
    }

    /// The type-specific options payload, serialized for the field cache.
    pub fn options_json(&self) -> Option<String> {
        match self {
            FieldKind::SingleSelect { options } => serde_json::to_string(options).ok(),
            FieldKind::Iteration { iterations } => serde_json::to_string(iterations).ok(),
            _ => None,
        }
    }

    pub fn from_cache(type_tag: &str, options_json: Option<&str>) -> FieldKind {
        match type_tag {
            "text" => FieldKind::Text,
            "number" => FieldKind::Number,
            "date" => FieldKind::Date,
            "single_select" => {
                let options = options_json
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_default();
                FieldKind::SingleSelect { options }
            }
            "iteration" => {
                let iterations = options_json
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_default();
                FieldKind::Iteration { iterations }
            }
            _ => FieldKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectField {
    pub field_id: String,
    pub name: String,
    pub kind: FieldKind,
}

impl ProjectField {
    /// Builds a field from one raw catalog node. Nodes without an id or name
    /// are skipped, matching how the remote API pads the union with empty
    /// objects for unsupported typenames.
    pub fn from_node(node: &Value) -> Option<ProjectField> {
        let field_id = node.get("id")?.as_str()?.to_string();
        let name = node.get("name")?.as_str()?.to_string();

        let typename = node.get("__typename").and_then(Value::as_str);
        let kind = match typename {
            Some("ProjectV2SingleSelectField") => {
                let options = node
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|raw| raw.iter().filter_map(select_option_from_node).collect())
                    .unwrap_or_default();
                FieldKind::SingleSelect { options }
            }
            Some("ProjectV2IterationField") => {
                let iterations = node
                    .get("configuration")
                    .and_then(|c| c.get("iterations"))
                    .and_then(Value::as_array)
                    .map(|raw| raw.iter().filter_map(iteration_entry_from_node).collect())
                    .unwrap_or_default();
                FieldKind::Iteration { iterations }
            }
            _ => match node.get("dataType").and_then(Value::as_str) {
                Some("TEXT") | Some("TITLE") => FieldKind::Text,
                Some("NUMBER") => FieldKind::Number,
                Some("DATE") => FieldKind::Date,
                Some("SINGLE_SELECT") => FieldKind::SingleSelect { options: vec![] },
                Some("ITERATION") => FieldKind::Iteration { iterations: vec![] },
                _ => FieldKind::Unknown,
            },
        };

        Some(ProjectField {
            field_id,
            name,
            kind,
        })
    }
}

fn select_option_from_node(node: &Value) -> Option<SelectOption> {
    Some(SelectOption {
        id: node.get("id")?.as_str()?.to_string(),
        name: node
            .get("name")
            .or_else(|| node.get("title"))?
            .as_str()?
            .to_string(),
        color: node
            .get("color")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn iteration_entry_from_node(node: &Value) -> Option<IterationEntry> {
    Some(IterationEntry {
        id: node.get("id")?.as_str()?.to_string(),
        title: node
            .get("title")
            .or_else(|| node.get("name"))?
            .as_str()?
            .to_string(),
        start_date: node
            .get("startDate")
            .and_then(Value::as_str)
            .map(str::to_string),
        duration: node.get("duration").and_then(parse_duration),
    })
}

/// Accepts integer durations and numeric strings; anything else is treated
/// as missing so the iteration has no computable end date.
pub fn parse_duration(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a remote date or datetime string, normalizing to UTC. A trailing
/// "Z" is UTC; unparsable values are dropped rather than errored.
pub fn parse_date_value(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

pub fn compute_iteration_end(
    start: Option<DateTime<Utc>>,
    duration_days: Option<i64>,
) -> Option<DateTime<Utc>> {
    Some(start? + Duration::days(duration_days?))
}

/// Role: iteration. Matches on type, or on a field literally named
/// "iteration" whatever its type.
pub fn iteration_field(fields: &[ProjectField]) -> Option<&ProjectField> {
    fields.iter().find(|field| {
        matches!(field.kind, FieldKind::Iteration { .. })
            || field.name.eq_ignore_ascii_case("iteration")
    })
}

/// Role: epic. Only single-select fields qualify; the name must contain one
/// of the epic aliases. A text field named "Epic" is ignored on purpose.
pub fn epic_field(fields: &[ProjectField]) -> Option<&ProjectField> {
    fields.iter().find(|field| {
        if !matches!(field.kind, FieldKind::SingleSelect { .. }) {
            return false;
        }
        let name = field.name.to_lowercase();
        EPIC_FIELD_ALIASES.iter().any(|alias| name.contains(alias))
    })
}

/// Role: status. Name-only match, no type constraint.
pub fn status_field(fields: &[ProjectField]) -> Option<&ProjectField> {
    fields
        .iter()
        .find(|field| field.name.eq_ignore_ascii_case("status"))
}

/// Role: estimate / story points. Name-only match.
pub fn estimate_field(fields: &[ProjectField]) -> Option<&ProjectField> {
    fields.iter().find(|field| {
        let name = field.name.to_lowercase();
        ESTIMATE_FIELD_ALIASES.contains(&name.as_str())
    })
}

/// Derives the ordered status-column list from the status field's options.
/// The list always ends with a terminal "Done" column.
pub fn extract_status_columns(fields: &[ProjectField]) -> Option<Vec<String>> {
    let field = status_field(fields)?;
    let options = match &field.kind {
        FieldKind::SingleSelect { options } if !options.is_empty() => options,
        _ => return None,
    };
    let mut columns: Vec<String> = Vec::new();
    for option in options {
        if !columns.contains(&option.name) {
            columns.push(option.name.clone());
        }
    }
    if !columns.iter().any(|c| c == "Done") {
        columns.push("Done".to_string());
    }
    Some(columns)
}

pub fn iteration_options(field: &ProjectField) -> Vec<IterationOption> {
    let entries = match &field.kind {
        FieldKind::Iteration { iterations } => iterations,
        _ => return vec![],
    };
    entries
        .iter()
        .map(|entry| {
            let start = entry.start_date.as_deref().and_then(parse_date_value);
            IterationOption {
                id: entry.id.clone(),
                title: entry.title.clone(),
                start_date: start,
                end_date: compute_iteration_end(start, entry.duration),
            }
        })
        .collect()
}

pub fn epic_options(field: &ProjectField) -> Vec<SelectOption> {
    match &field.kind {
        FieldKind::SingleSelect { options } => options.clone(),
        _ => vec![],
    }
}

/// Looks up one iteration option by id, with its computed date range.
pub fn resolve_iteration_option(field: &ProjectField, iteration_id: &str) -> Option<IterationOption> {
    iteration_options(field)
        .into_iter()
        .find(|option| option.id == iteration_id)
}

pub fn resolve_epic_option(field: &ProjectField, option_id: &str) -> Option<SelectOption> {
    epic_options(field)
        .into_iter()
        .find(|option| option.id == option_id)
}

/// Case-insensitive match of a status name against the field's option list,
/// returning the remote option id.
pub fn match_status_option(field: &ProjectField, status_name: &str) -> Option<String> {
    let normalized = status_name.trim().to_lowercase();
    let options = match &field.kind {
        FieldKind::SingleSelect { options } => options,
        _ => return None,
    };
    options
        .iter()
        .find(|option| option.name.trim().to_lowercase() == normalized)
        .map(|option| option.id.clone())
}
