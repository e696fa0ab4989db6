use crate::calendar::DEFAULT_WEEK_RANGE_PREFIX;
use crate::db;
use crate::filter_cache::DEFAULT_TTL_SECONDS;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

pub const DEFAULT_WEEKS_BACK: i64 = 8;
pub const MAX_WEEKS_BACK: i64 = 104;

#[derive(Clone, Copy)]
enum SetupSection {
    Calendar,
    Cache,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(Self::Calendar),
            "cache" => Some(Self::Cache),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Calendar => "setup.calendar",
            Self::Cache => "setup.cache",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Calendar => json!({
            "defaultWeeksBack": DEFAULT_WEEKS_BACK,
            "weekRangePrefix": DEFAULT_WEEK_RANGE_PREFIX
        }),
        SetupSection::Cache => json!({
            "ttlSeconds": DEFAULT_TTL_SECONDS
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_chars: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    // Vietnamese labels are multi-byte, so count chars rather than bytes.
    if s.chars().count() > max_chars {
        return Err(format!("{} length must be <= {}", key, max_chars));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Calendar => match k.as_str() {
                "defaultWeeksBack" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, MAX_WEEKS_BACK)?));
                }
                "weekRangePrefix" => {
                    let s = parse_string_max(v, k, 40)?;
                    if s.is_empty() {
                        return Err(format!("{} must not be empty", k));
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown calendar field: {}", k)),
            },
            SetupSection::Cache => match k.as_str() {
                "ttlSeconds" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 604_800)?));
                }
                _ => return Err(format!("unknown cache field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults instead of blocking startup.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                log::warn!("ignoring saved {} settings: {}", section.key(), msg);
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub struct CalendarSettings {
    pub default_weeks_back: u32,
    pub week_range_prefix: String,
}

/// Calendar settings of the open workspace, or the defaults without one.
pub fn calendar_settings(state: &AppState) -> anyhow::Result<CalendarSettings> {
    let section = match state.db.as_ref() {
        Some(conn) => load_section(conn, SetupSection::Calendar)?,
        None => default_section(SetupSection::Calendar),
    };
    Ok(CalendarSettings {
        default_weeks_back: section
            .get("defaultWeeksBack")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_WEEKS_BACK as u32),
        week_range_prefix: section
            .get("weekRangePrefix")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_WEEK_RANGE_PREFIX)
            .to_string(),
    })
}

pub fn cache_ttl(conn: &rusqlite::Connection) -> anyhow::Result<chrono::Duration> {
    let section = load_section(conn, SetupSection::Cache)?;
    let secs = section
        .get("ttlSeconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_TTL_SECONDS);
    Ok(chrono::Duration::seconds(secs))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let calendar = match load_section(conn, SetupSection::Calendar) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let cache = match load_section(conn, SetupSection::Cache) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "calendar": calendar,
            "cache": cache
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
