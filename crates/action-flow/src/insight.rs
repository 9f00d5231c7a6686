//! Descriptive metadata pulled from the page's hydration data
//!
//! Everything here is read-only and best effort: missing or oddly shaped data
//! yields empty collections, never an error.

use std::collections::HashSet;

use action_primitives::{AnchorDescriptor, Page};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

const LABEL_KEYS: [&str; 4] = ["label", "title", "question", "name"];
const TYPE_KEYS: [&str; 4] = ["type", "inputType", "format", "answerType"];
const OPTION_KEYS: [&str; 4] = ["options", "choices", "items", "values"];
const REQUIRED_KEYS: [&str; 3] = ["required", "isRequired", "mandatory"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInsight {
    pub ticket_info: Vec<TicketInfo>,
    pub input_candidates: Vec<InputCandidate>,
    pub form_schema: FormSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketInfo {
    pub id: String,
    pub name: String,
    pub ticket_types: Vec<TicketType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: String,
    pub name: String,
    pub price: String,
    pub fee: String,
    pub max_num: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Object in the hydration data that looks like a form input description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputCandidate {
    pub path: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: Option<bool>,
    pub options: Option<usize>,
    pub preview: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    pub captured_at: String,
    pub path: String,
    pub form_dictionary: Vec<DictionaryEntry>,
    pub customize_fields: Vec<CustomizeField>,
    pub dom_fields: Vec<DomField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DictionaryEntry {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizeField {
    pub ticket_info_id: String,
    pub ticket_info_name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub placeholder: String,
    pub options_count: usize,
    pub options_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomField {
    pub index: usize,
    pub tag: String,
    pub name: String,
    pub value_preview: String,
    pub options_count: Option<usize>,
    pub options_preview: String,
}

impl PageInsight {
    pub fn collect(page: &dyn Page) -> Self {
        let data = page.page_data();
        let props = data.as_ref().and_then(page_props);
        Self {
            ticket_info: props.map(ticket_info).unwrap_or_default(),
            input_candidates: props.map(input_candidates).unwrap_or_default(),
            form_schema: FormSchema::collect(page),
        }
    }
}

impl FormSchema {
    pub fn collect(page: &dyn Page) -> Self {
        let data = page.page_data();
        let props = data.as_ref().and_then(page_props);

        let form_dictionary = props
            .and_then(|props| props.pointer("/messages/form"))
            .and_then(Value::as_object)
            .map(|form| {
                form.iter()
                    .filter_map(|(key, label)| {
                        label.as_str().map(|label| DictionaryEntry {
                            key: key.clone(),
                            label: label.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            captured_at: Utc::now().to_rfc3339(),
            path: page.location().path(),
            form_dictionary,
            customize_fields: props.map(customize_fields).unwrap_or_default(),
            dom_fields: dom_fields(page),
        }
    }
}

/// `props.pageProps` of the hydration payload; a bare page-props object is accepted too.
pub fn page_props(data: &Value) -> Option<&Value> {
    match data.pointer("/props/pageProps") {
        Some(props) if props.is_object() => Some(props),
        _ if data.is_object() => Some(data),
        _ => None,
    }
}

/// First eligible favorite option, searching ticket customize fields before
/// stage favorites.
pub fn pick_favorite_group(props: &Value) -> Option<String> {
    favorite_option_lists(props)
        .into_iter()
        .find_map(|options| option_texts(options).into_iter().next())
}

fn favorite_option_lists(props: &Value) -> Vec<&Value> {
    let mut lists: Vec<&Value> = ticket_info_list(props)
        .flat_map(customize_entries)
        .filter_map(|field| field.get("selectOptions"))
        .collect();
    lists.extend(
        array_at(props, "/eventDetail/stages")
            .filter_map(|stage| stage.pointer("/favoriteSelections/selectOptions")),
    );
    lists
}

/// Option texts of a `selectOptions` array: hidden entries and blanks are
/// skipped, objects contribute `value` then `label`.
fn option_texts(options: &Value) -> Vec<String> {
    let Some(options) = options.as_array() else {
        return Vec::new();
    };
    options
        .iter()
        .filter_map(|option| match option {
            Value::Object(map) => {
                if map.get("hidden").and_then(Value::as_bool) == Some(true) {
                    return None;
                }
                first_scalar(map, &["value", "label"])
            }
            other => scalar_text(other),
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn ticket_info(props: &Value) -> Vec<TicketInfo> {
    ticket_info_list(props)
        .map(|info| TicketInfo {
            id: text_at(info, "id"),
            name: text_at(info, "name"),
            ticket_types: info
                .get("ticketTypes")
                .and_then(Value::as_array)
                .map(|types| {
                    types
                        .iter()
                        .map(|t| TicketType {
                            id: text_at(t, "id"),
                            name: text_at(t, "name"),
                            price: format!("¥{}", text_at(t, "price")),
                            fee: format!("¥{}", text_at(t, "fee")),
                            max_num: text_at(t, "maxNumPerApply"),
                            status: text_at(t, "status"),
                            kind: text_at(t, "type"),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// Depth-first walk of the page props collecting objects shaped like input
/// descriptions. Keys starting with `_` are not descended into.
fn input_candidates(props: &Value) -> Vec<InputCandidate> {
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![("pageProps".to_string(), props)];

    while let Some((path, value)) = stack.pop() {
        match value {
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    stack.push((format!("{}[{}]", path, idx), item));
                }
            }
            Value::Object(map) => {
                let has = |keys: &[&str]| keys.iter().any(|key| map.contains_key(*key));
                let (label, kind, options, required) = (
                    has(&LABEL_KEYS[..]),
                    has(&TYPE_KEYS[..]),
                    has(&OPTION_KEYS[..]),
                    has(&REQUIRED_KEYS[..]),
                );
                if (label && kind) || (label && options) || (kind && options) || (label && required)
                {
                    if let Some(candidate) = input_candidate(&path, map) {
                        if seen.insert(format!("{}|{}|{}", path, candidate.label, candidate.kind)) {
                            candidates.push(candidate);
                        }
                    }
                }
                for (key, child) in map {
                    if !key.starts_with('_') {
                        stack.push((format!("{}.{}", path, key), child));
                    }
                }
            }
            _ => {}
        }
    }

    candidates
}

fn input_candidate(path: &str, map: &Map<String, Value>) -> Option<InputCandidate> {
    let label = first_scalar(map, &LABEL_KEYS).unwrap_or_default();
    let kind = first_scalar(map, &TYPE_KEYS).unwrap_or_default();
    let options = OPTION_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_array));
    if label.is_empty() && kind.is_empty() && options.is_none() {
        return None;
    }

    let required = REQUIRED_KEYS
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
        .and_then(Value::as_bool);
    let preview = options
        .map(|items| {
            items
                .iter()
                .take(5)
                .filter_map(|item| match item {
                    Value::Object(inner) => {
                        first_scalar(inner, &["label", "title", "name", "value", "id"])
                    }
                    other => scalar_text(other),
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    Some(InputCandidate {
        path: path.to_string(),
        label,
        kind,
        required,
        options: options.map(Vec::len),
        preview,
    })
}

fn customize_fields(props: &Value) -> Vec<CustomizeField> {
    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for info in ticket_info_list(props) {
        let info_id = text_at(info, "id");
        let info_name = text_at(info, "name");
        for field in customize_entries(info) {
            let Some(map) = field.as_object() else {
                continue;
            };
            let label = first_scalar(map, &["label", "title", "name"])
                .unwrap_or_default()
                .trim()
                .to_string();
            let select_options = map.get("selectOptions").and_then(Value::as_array);
            let mut kind = first_scalar(map, &["type", "inputType"])
                .unwrap_or_default()
                .trim()
                .to_string();
            if kind.is_empty() && select_options.is_some() {
                kind = "select".to_string();
            }
            let options: Vec<String> = select_options
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Value::Object(inner) => first_scalar(inner, &["value", "label"]),
                            other => scalar_text(other),
                        })
                        .filter(|text| !text.is_empty())
                        .collect()
                })
                .unwrap_or_default();

            let key = format!("{}|{}|{}|{}", info_id, label, kind, options.join("|"));
            if label.is_empty() || !seen.insert(key) {
                continue;
            }

            fields.push(CustomizeField {
                ticket_info_id: info_id.clone(),
                ticket_info_name: info_name.clone(),
                label,
                kind,
                required: map.get("required").and_then(Value::as_bool) == Some(true),
                placeholder: text_at(field, "placeholder"),
                options_count: options.len(),
                options_preview: options.iter().take(6).cloned().collect::<Vec<_>>().join(", "),
            });
        }
    }

    fields
}

fn dom_fields(page: &dyn Page) -> Vec<DomField> {
    let mut elements: Vec<_> = ["input", "select", "textarea"]
        .iter()
        .flat_map(|tag| page.query_all(&AnchorDescriptor::Tag(tag.to_string())))
        .collect();
    elements.sort_by_key(|element| element.id);

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            let is_select = element.tag == "select";
            let option_texts: Vec<String> = element
                .options
                .iter()
                .map(|option| {
                    let text = option.text.trim();
                    if text.is_empty() {
                        option.value.clone()
                    } else {
                        text.to_string()
                    }
                })
                .filter(|text| !text.is_empty())
                .collect();
            DomField {
                index,
                tag: element.tag.clone(),
                name: element.name.clone().unwrap_or_default(),
                value_preview: element.value.chars().take(40).collect(),
                options_count: is_select.then_some(option_texts.len()),
                options_preview: if is_select {
                    option_texts.iter().take(6).cloned().collect::<Vec<_>>().join(", ")
                } else {
                    String::new()
                },
            }
        })
        .collect()
}

fn ticket_info_list(props: &Value) -> impl Iterator<Item = &Value> {
    array_at(props, "/eventDetail/ticketInfoList")
}

/// `customizeList` entries followed by `customize` entries.
fn customize_entries(info: &Value) -> impl Iterator<Item = &Value> {
    array_at(info, "/customizeList").chain(array_at(info, "/customize"))
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> std::slice::Iter<'a, Value> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .unwrap_or_default()
}

fn first_scalar(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
        .and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn text_at(value: &Value, key: &str) -> String {
    value.get(key).and_then(scalar_text).unwrap_or_default()
}
