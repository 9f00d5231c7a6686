//! User settings and their lenient normalization.
//!
//! Settings arrive from a hand-edited file, so every field tolerates missing or
//! malformed input and falls back to its default. Integers are read the way a
//! browser's `parseInt` reads them (leading digits of the textual form) and then
//! clamped into range.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const MAX_TIMEOUT_MS: i64 = 30_000;
pub const DEFAULT_TICKET_COUNT: u32 = 1;
pub const DEFAULT_WAIT_MS: u64 = 300;
pub const MAX_WAIT_MS: i64 = 30_000;
pub const DEFAULT_STEP_DELAY_MS: u64 = 150;
pub const MAX_STEP_DELAY_MS: i64 = 5_000;

static LEGACY_DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\s+(\d{1,2}:\d{2}(?::\d{2})?)$").expect("valid regex")
});
static LEGACY_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}:\d{2}(?::\d{2})?)$").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonSettings {
    pub timeout_ms: u64,
    pub debug: bool,
    pub start_date: String,
    pub start_time: String,
}

/// Options for the ticket selection flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSettings {
    pub ticket_count: u32,
    /// Press the confirmation control after applying the quantity.
    pub auto_click: bool,
    pub wait_ms: u64,
    /// Manual favored option; wins over automatic resolution.
    pub favorite_group: String,
    pub favorite_group_auto: bool,
}

/// Options for the application form flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSettings {
    pub last_name: String,
    pub first_name: String,
    pub phone_number: String,
    pub step_delay_ms: u64,
    pub auto_submit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub common: CommonSettings,
    #[serde(rename = "event")]
    pub selection: SelectionSettings,
    #[serde(rename = "apply")]
    pub application: ApplicationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::normalize(&Value::Null)
    }
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(Settings::normalize(&raw))
    }
}

impl Settings {
    /// Build settings from an arbitrary JSON value, defaulting anything unusable.
    pub fn normalize(raw: &Value) -> Self {
        let common = section(raw, &["common"]);
        let selection = section(raw, &["event", "selection"]);
        let application = section(raw, &["apply", "application"]);

        let (start_date, start_time) = normalize_start(common);

        Settings {
            common: CommonSettings {
                timeout_ms: to_int(
                    common.get("timeoutMs"),
                    DEFAULT_TIMEOUT_MS as i64,
                    0,
                    MAX_TIMEOUT_MS,
                ) as u64,
                debug: to_bool(common.get("debug"), true),
                start_date,
                start_time,
            },
            selection: SelectionSettings {
                ticket_count: to_int(
                    selection.get("ticketCount"),
                    DEFAULT_TICKET_COUNT as i64,
                    1,
                    10,
                ) as u32,
                auto_click: to_bool(selection.get("autoClick"), true),
                wait_ms: to_int(
                    selection.get("waitMs"),
                    DEFAULT_WAIT_MS as i64,
                    0,
                    MAX_WAIT_MS,
                ) as u64,
                favorite_group: to_text(selection.get("favoriteGroup")).trim().to_string(),
                favorite_group_auto: to_bool(selection.get("favoriteGroupAuto"), true),
            },
            application: ApplicationSettings {
                last_name: to_text(application.get("lastName")).trim().to_string(),
                first_name: to_text(application.get("firstName")).trim().to_string(),
                phone_number: to_text(application.get("phoneNumber")),
                step_delay_ms: to_int(
                    application.get("stepDelayMs"),
                    DEFAULT_STEP_DELAY_MS as i64,
                    0,
                    MAX_STEP_DELAY_MS,
                ) as u64,
                auto_submit: to_bool(application.get("autoSubmit"), false),
            },
        }
    }

    /// JSON form suitable for writing back to the settings file.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

static EMPTY: Lazy<Value> = Lazy::new(|| Value::Object(Default::default()));

fn section<'a>(raw: &'a Value, names: &[&str]) -> &'a Value {
    names
        .iter()
        .find_map(|name| raw.get(*name).filter(|value| value.is_object()))
        .unwrap_or(&EMPTY)
}

/// Split the legacy combined `startAt` field when the split fields are blank.
fn normalize_start(common: &Value) -> (String, String) {
    let raw_date = to_text(common.get("startDate")).trim().to_string();
    let raw_time = to_text(common.get("startTime")).trim().to_string();
    let legacy = to_text(common.get("startAt")).trim().to_string();

    if legacy.is_empty() || !raw_date.is_empty() || !raw_time.is_empty() {
        return (raw_date, raw_time);
    }

    let normalized = legacy.replacen('T', " ", 1).replace('/', "-");
    if let Some(caps) = LEGACY_DATE_TIME.captures(&normalized) {
        return (caps[1].to_string(), caps[2].to_string());
    }
    if let Some(caps) = LEGACY_TIME.captures(&normalized) {
        return (String::new(), caps[1].to_string());
    }
    (raw_date, raw_time)
}

fn to_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

fn to_bool(value: Option<&Value>, fallback: bool) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) if text == "true" => true,
        Some(Value::String(text)) if text == "false" => false,
        _ => fallback,
    }
}

fn to_int(value: Option<&Value>, fallback: i64, min: i64, max: i64) -> i64 {
    let parsed = match value {
        Some(Value::String(text)) => parse_leading_int(text),
        Some(Value::Number(number)) => parse_leading_int(&number.to_string()),
        _ => None,
    };
    match parsed {
        None => fallback,
        Some(n) => n.clamp(min, max),
    }
}

/// Reads an optional sign followed by decimal digits, ignoring leading whitespace
/// and anything after the digits.
fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_yields_documented_defaults() {
        let settings = Settings::normalize(&json!({}));
        assert_eq!(settings.common.timeout_ms, 15_000);
        assert!(settings.common.debug);
        assert_eq!(settings.selection.ticket_count, 1);
        assert!(settings.selection.auto_click);
        assert_eq!(settings.selection.wait_ms, 300);
        assert!(settings.selection.favorite_group_auto);
        assert_eq!(settings.application.step_delay_ms, 150);
        assert!(!settings.application.auto_submit);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn integers_are_parsed_leniently_and_clamped() {
        let settings = Settings::normalize(&json!({
            "event": { "ticketCount": "3 tickets", "waitMs": 99_999 },
            "apply": { "stepDelayMs": -20 }
        }));
        assert_eq!(settings.selection.ticket_count, 3);
        assert_eq!(settings.selection.wait_ms, 30_000);
        assert_eq!(settings.application.step_delay_ms, 0);

        let settings = Settings::normalize(&json!({
            "event": { "ticketCount": 42, "waitMs": "soon" },
        }));
        assert_eq!(settings.selection.ticket_count, 10);
        assert_eq!(settings.selection.wait_ms, 300);

        let settings = Settings::normalize(&json!({ "event": { "ticketCount": 2.7 } }));
        assert_eq!(settings.selection.ticket_count, 2);
    }

    #[test]
    fn element_timeout_is_capped_at_thirty_seconds() {
        let settings = Settings::normalize(&json!({ "common": { "timeoutMs": 45_000 } }));
        assert_eq!(settings.common.timeout_ms, 30_000);

        let settings = Settings::normalize(&json!({ "common": { "timeoutMs": "-5" } }));
        assert_eq!(settings.common.timeout_ms, 0);
    }

    #[test]
    fn booleans_accept_only_bools_and_their_spelling() {
        let settings = Settings::normalize(&json!({
            "event": { "autoClick": "false", "favoriteGroupAuto": "nope" },
            "apply": { "autoSubmit": "true" }
        }));
        assert!(!settings.selection.auto_click);
        assert!(settings.selection.favorite_group_auto);
        assert!(settings.application.auto_submit);

        let settings = Settings::normalize(&json!({ "event": { "autoClick": 0 } }));
        assert!(settings.selection.auto_click);
    }

    #[test]
    fn text_fields_are_trimmed_except_phone_number() {
        let settings = Settings::normalize(&json!({
            "event": { "favoriteGroup": "  Alice  " },
            "apply": { "lastName": " Yamada ", "firstName": 7, "phoneNumber": " 0900 " }
        }));
        assert_eq!(settings.selection.favorite_group, "Alice");
        assert_eq!(settings.application.last_name, "Yamada");
        assert_eq!(settings.application.first_name, "7");
        assert_eq!(settings.application.phone_number, " 0900 ");
    }

    #[test]
    fn legacy_start_at_is_split_into_date_and_time() {
        let settings = Settings::normalize(&json!({
            "common": { "startAt": "2025/03/01T10:00:30" }
        }));
        assert_eq!(settings.common.start_date, "2025-03-01");
        assert_eq!(settings.common.start_time, "10:00:30");

        let settings = Settings::normalize(&json!({ "common": { "startAt": "9:05" } }));
        assert_eq!(settings.common.start_date, "");
        assert_eq!(settings.common.start_time, "9:05");

        let settings = Settings::normalize(&json!({
            "common": { "startAt": "2025-03-01 10:00", "startTime": "11:00" }
        }));
        assert_eq!(settings.common.start_date, "");
        assert_eq!(settings.common.start_time, "11:00");

        let settings = Settings::normalize(&json!({ "common": { "startAt": "tomorrow" } }));
        assert_eq!(settings.common.start_time, "");
    }

    #[test]
    fn section_aliases_and_non_object_sections_are_tolerated() {
        let settings = Settings::normalize(&json!({
            "selection": { "ticketCount": 4 },
            "apply": "garbage"
        }));
        assert_eq!(settings.selection.ticket_count, 4);
        assert_eq!(settings.application.step_delay_ms, 150);
    }

    #[test]
    fn serialized_form_reads_back_identically() {
        let mut settings = Settings::default();
        settings.selection.ticket_count = 2;
        settings.application.last_name = "Sato".into();
        settings.common.start_time = "12:00".into();

        let text = serde_json::to_string(&settings).unwrap();
        assert!(text.contains("\"event\""));
        assert!(text.contains("\"ticketCount\":2"));
        let back: Settings = serde_json::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}
