use crate::calendar::{self, WeekToken};
use crate::ipc::handlers::setup::{self, MAX_WEEKS_BACK};
use crate::ipc::helpers::{
    get_category, get_date, get_required_str, get_today, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn get_week(params: &serde_json::Value) -> Result<WeekToken, HandlerErr> {
    Ok(get_required_str(params, "week")?.trim().parse()?)
}

fn category_for_date(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params, "date")?;
    Ok(json!({ "category": calendar::category_for_date(date) }))
}

fn is_valid_attendance_date(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params, "date")?;
    let category = get_category(params)?;
    Ok(json!({ "valid": calendar::is_valid_attendance_date(date, category) }))
}

fn most_recent_attendance_date(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let category = get_category(params)?;
    let today = get_today(params)?;
    let date = calendar::most_recent_attendance_date(category, today);
    Ok(json!({ "date": calendar::iso_date(date) }))
}

fn valid_attendance_dates(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let category = get_category(params)?;
    let today = get_today(params)?;
    let weeks_back = match params.get("weeksBack").filter(|v| !v.is_null()) {
        None => setup::calendar_settings(state)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
            .default_weeks_back,
        Some(v) => v
            .as_i64()
            .filter(|n| (1..=MAX_WEEKS_BACK).contains(n))
            .map(|n| n as u32)
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("weeksBack must be in 1..={}", MAX_WEEKS_BACK))
            })?,
    };
    let dates = calendar::valid_attendance_dates(category, weeks_back, today);
    Ok(json!({ "weeksBack": weeks_back, "dates": dates }))
}

fn week_number(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params, "date")?;
    Ok(json!({ "weekNumber": calendar::week_number(date) }))
}

fn week_token(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params, "date")?;
    Ok(json!({ "week": calendar::week_token(date) }))
}

fn default_week_token(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let today = get_today(params)?;
    Ok(json!({ "week": calendar::default_week_token(today) }))
}

fn week_date_range(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let week = get_week(params)?;
    let range = calendar::week_date_range(&week)?;
    Ok(json!(range))
}

fn format_week_range(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let week = get_week(params)?;
    let settings =
        setup::calendar_settings(state).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let label = calendar::format_week_range_with_prefix(&week, &settings.week_range_prefix)?;
    Ok(json!({ "week": week, "label": label }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "calendar.categoryForDate" => category_for_date(p),
        "calendar.isValidAttendanceDate" => is_valid_attendance_date(p),
        "calendar.mostRecentAttendanceDate" => most_recent_attendance_date(p),
        "calendar.validAttendanceDates" => valid_attendance_dates(state, p),
        "calendar.weekNumber" => week_number(p),
        "calendar.weekToken" => week_token(p),
        "calendar.defaultWeekToken" => default_week_token(p),
        "calendar.weekDateRange" => week_date_range(p),
        "calendar.formatWeekRange" => format_week_range(state, p),
        _ => return None,
    };
    Some(respond(req, result))
}
