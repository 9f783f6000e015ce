use crate::db;
use crate::fees::PAYMENT_METHODS;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{req_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SettingsSection {
    School,
    Billing,
}

impl SettingsSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "billing" => Some(Self::Billing),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::School => "settings.school",
            Self::Billing => "settings.billing",
        }
    }
}

fn default_section(section: SettingsSection) -> Value {
    match section {
        SettingsSection::School => json!({
            "schoolName": "",
            "currencyLabel": "FCFA",
            "defaultAcademicYear": "",
            "receiptFooter": ""
        }),
        SettingsSection::Billing => json!({
            "defaultDiscountPercent": 0.0,
            "defaultPaymentMethod": "cash",
            "receiptCopies": 1
        }),
    }
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, HandlerErr> {
    let s = v
        .as_str()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key)))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(HandlerErr::bad_params(format!(
            "{} length must be <= {}",
            key, max_len
        )));
    }
    Ok(s.to_string())
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, HandlerErr> {
    let n = v
        .as_f64()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
    if !n.is_finite() || !(min..=max).contains(&n) {
        return Err(HandlerErr::bad_params(format!(
            "{} must be in {}..={}",
            key, min, max
        )));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, HandlerErr> {
    let n = v
        .as_i64()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key)))?;
    if !(min..=max).contains(&n) {
        return Err(HandlerErr::bad_params(format!(
            "{} must be in {}..={}",
            key, min, max
        )));
    }
    Ok(n)
}

fn apply_patch(
    section: SettingsSection,
    current: &mut Map<String, Value>,
    patch: &Map<String, Value>,
) -> Result<(), HandlerErr> {
    for (key, value) in patch {
        let validated = match (section, key.as_str()) {
            (SettingsSection::School, "schoolName") => {
                Value::String(parse_string_max(value, key, 120)?)
            }
            (SettingsSection::School, "currencyLabel") => {
                Value::String(parse_string_max(value, key, 12)?)
            }
            (SettingsSection::School, "defaultAcademicYear") => {
                Value::String(parse_string_max(value, key, 20)?)
            }
            (SettingsSection::School, "receiptFooter") => {
                Value::String(parse_string_max(value, key, 300)?)
            }
            (SettingsSection::Billing, "defaultDiscountPercent") => {
                json!(parse_f64_range(value, key, 0.0, 100.0)?)
            }
            (SettingsSection::Billing, "defaultPaymentMethod") => {
                let method = parse_string_max(value, key, 20)?;
                if !PAYMENT_METHODS.contains(&method.as_str()) {
                    return Err(HandlerErr::bad_params(format!(
                        "{} must be one of {}",
                        key,
                        PAYMENT_METHODS.join(", ")
                    )));
                }
                Value::String(method)
            }
            (SettingsSection::Billing, "receiptCopies") => {
                json!(parse_i64_range(value, key, 1, 3)?)
            }
            _ => {
                return Err(HandlerErr::bad_params(format!("unknown key: {}", key)));
            }
        };
        current.insert(key.clone(), validated);
    }
    Ok(())
}

fn load_section(
    state: &AppState,
    section: SettingsSection,
) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let stored = db::settings_get_json(conn, section.key())
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(stored.unwrap_or_else(|| default_section(section)))
}

fn settings_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let section_name = req_str(params, "section")?;
    let Some(section) = SettingsSection::parse(&section_name) else {
        return Err(HandlerErr::bad_params(format!(
            "unknown section: {}",
            section_name
        )));
    };
    let values = load_section(state, section)?;
    Ok(json!({ "section": section_name, "values": values }))
}

fn settings_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let section_name = req_str(params, "section")?;
    let Some(section) = SettingsSection::parse(&section_name) else {
        return Err(HandlerErr::bad_params(format!(
            "unknown section: {}",
            section_name
        )));
    };
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let mut values = load_section(state, section)?;
    let current = values
        .as_object_mut()
        .ok_or_else(|| HandlerErr::new("internal", "settings section must be a JSON object"))?;
    apply_patch(section, current, patch)?;

    db::settings_set_json(conn, section.key(), &values)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({ "section": section_name, "values": values }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "settings.get" => Some(run(settings_get(state, &req.params))),
        "settings.update" => Some(run(settings_update(state, &req.params))),
        _ => None,
    }
}
