use crate::ipc::helpers::{get_optional_str, get_required_str, get_today, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::week_filter::{self, FilterMode, WeekFilterState};
use serde_json::json;

fn get_state(params: &serde_json::Value) -> Result<WeekFilterState, HandlerErr> {
    match params.get("state").filter(|v| !v.is_null()) {
        None => Ok(WeekFilterState::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid state: {}", e))),
    }
}

fn init(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let today = get_today(params)?;
    let state = week_filter::initial_state(today)?;
    Ok(json!(state))
}

fn week_change(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let state = get_state(params)?;
    let week = get_optional_str(params, "week")?;
    let next = week_filter::on_week_change(week, &state)?;
    Ok(json!(next))
}

fn switch_mode(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let state = get_state(params)?;
    let mode: FilterMode = get_required_str(params, "mode")?
        .parse()
        .map_err(HandlerErr::bad_params)?;
    let today = get_today(params)?;
    let next = week_filter::switch_mode(&state, mode, today)?;
    Ok(json!(next))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "weekFilter.init" => init(p),
        "weekFilter.weekChange" => week_change(p),
        "weekFilter.switchMode" => switch_mode(p),
        _ => return None,
    };
    Some(respond(req, result))
}
