use crate::filter_cache::{CacheKey, CacheLookup, FilterCache};
use crate::ipc::error::err;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{get_now, get_optional_str, get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::SecondsFormat;
use rusqlite::Connection;
use serde_json::json;

fn open_cache(conn: &Connection) -> Result<FilterCache<'_>, HandlerErr> {
    let ttl = setup::cache_ttl(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(FilterCache::new(conn, ttl))
}

fn get_key(params: &serde_json::Value) -> Result<CacheKey, HandlerErr> {
    let user_id = get_required_str(params, "userId")?.trim();
    let scope = get_required_str(params, "scope")?.trim();
    if user_id.is_empty() || scope.is_empty() {
        return Err(HandlerErr::bad_params("userId and scope must not be empty"));
    }
    let filter = params.get("filter").cloned().unwrap_or_else(|| json!({}));
    CacheKey::new(user_id, scope, &filter).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

fn cache_put(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_key(params)?;
    let Some(payload) = params.get("payload") else {
        return Err(HandlerErr::bad_params("missing payload"));
    };
    let now = get_now(params)?;
    open_cache(conn)?
        .put(&key, payload, now)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "filterHash": key.filter_hash }))
}

fn cache_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = get_key(params)?;
    let now = get_now(params)?;
    let lookup = open_cache(conn)?
        .get(&key, now)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(match lookup {
        CacheLookup::Hit { payload, stored_at } => json!({
            "hit": true,
            "expired": false,
            "payload": payload,
            "storedAt": stored_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
        CacheLookup::Miss => json!({ "hit": false, "expired": false }),
        CacheLookup::Expired => json!({ "hit": false, "expired": true }),
    })
}

fn cache_invalidate(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_optional_str(params, "userId")?;
    let scope = get_optional_str(params, "scope")?;
    let removed = open_cache(conn)?
        .invalidate(user_id, scope)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "removed": removed }))
}

fn cache_switch_user(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(params, "userId")?.trim();
    if user_id.is_empty() {
        return Err(HandlerErr::bad_params("userId must not be empty"));
    }
    let removed = open_cache(conn)?
        .switch_user(user_id)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "removed": removed }))
}

fn cache_purge_expired(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = get_now(params)?;
    let removed = open_cache(conn)?
        .purge_expired(now)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "cache.put" => cache_put,
            "cache.get" => cache_get,
            "cache.invalidate" => cache_invalidate,
            "cache.switchUser" => cache_switch_user,
            "cache.purgeExpired" => cache_purge_expired,
            _ => return None,
        };
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(respond(req, op(conn, &req.params)))
}
