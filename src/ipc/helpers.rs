use crate::calendar::{self, AttendanceCategory, CalendarError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::Request;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn db(code: &'static str, error: anyhow::Error) -> Self {
        Self {
            code,
            message: error.to_string(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CalendarError> for HandlerErr {
    fn from(e: CalendarError) -> Self {
        let field = match &e {
            CalendarError::InvalidWeekToken(v)
            | CalendarError::InvalidCategory(v)
            | CalendarError::InvalidDate(v) => v.clone(),
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details: Some(json!({ "value": field })),
        }
    }
}

pub fn get_required_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<Option<&'a str>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn get_category(params: &serde_json::Value) -> Result<AttendanceCategory, HandlerErr> {
    Ok(get_required_str(params, "category")?.parse()?)
}

pub fn get_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    Ok(calendar::parse_date(get_required_str(params, key)?)?)
}

/// `params.today` pins the clock; otherwise the local date is used.
pub fn get_today(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match get_optional_str(params, "today")? {
        Some(raw) => Ok(calendar::parse_date(raw)?),
        None => Ok(Local::now().date_naive()),
    }
}

/// `params.now` (RFC 3339) pins the cache clock; otherwise the system time is used.
pub fn get_now(params: &serde_json::Value) -> Result<DateTime<Utc>, HandlerErr> {
    match get_optional_str(params, "now")? {
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| HandlerErr::bad_params("now must be an RFC 3339 timestamp")),
        None => Ok(Utc::now()),
    }
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            log::debug!("{} rejected: {}", req.method, error.message);
            error.response(&req.id)
        }
    }
}
