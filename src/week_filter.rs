use crate::calendar::{self, CalendarError, WeekToken};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Week,
    Custom,
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "week" => Ok(Self::Week),
            "custom" => Ok(Self::Custom),
            other => Err(format!("mode must be week or custom, got {:?}", other)),
        }
    }
}

/// Filter pair driven by a week picker or by manual date entry.
///
/// `week_date` mirrors the week's Monday for consumers that predate
/// `start_date`/`end_date`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekFilterState {
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub week_value: Option<WeekToken>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub week_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub end_date: Option<NaiveDate>,
}

// UI clients clear fields with "" as often as with null.
fn empty_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn apply_week(state: &WeekFilterState, week: WeekToken) -> Result<WeekFilterState, CalendarError> {
    let range = calendar::week_date_range(&week)?;
    Ok(WeekFilterState {
        mode: state.mode,
        week_value: Some(week),
        week_date: Some(range.start),
        start_date: Some(range.start),
        end_date: Some(range.end),
    })
}

pub fn initial_state(today: NaiveDate) -> Result<WeekFilterState, CalendarError> {
    apply_week(&WeekFilterState::default(), calendar::default_week_token(today))
}

/// A missing or blank token clears the filter. A malformed one is an error and
/// the caller keeps its previous state.
pub fn on_week_change(
    token: Option<&str>,
    state: &WeekFilterState,
) -> Result<WeekFilterState, CalendarError> {
    let token = token.map(str::trim).unwrap_or("");
    if token.is_empty() {
        return Ok(WeekFilterState {
            mode: state.mode,
            ..WeekFilterState::default()
        });
    }
    apply_week(state, token.parse()?)
}

pub fn switch_mode(
    state: &WeekFilterState,
    mode: FilterMode,
    today: NaiveDate,
) -> Result<WeekFilterState, CalendarError> {
    if state.mode == mode {
        return Ok(state.clone());
    }
    match mode {
        FilterMode::Custom => Ok(WeekFilterState {
            mode,
            week_value: None,
            week_date: None,
            ..state.clone()
        }),
        FilterMode::Week => {
            let cleared = WeekFilterState {
                mode,
                start_date: None,
                end_date: None,
                ..state.clone()
            };
            let week = state
                .week_value
                .unwrap_or_else(|| calendar::default_week_token(today));
            apply_week(&cleared, week)
        }
    }
}
