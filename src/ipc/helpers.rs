use crate::calc::ComponentScores;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use chrono::{Datelike, SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::json;

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn actor(req: &Request) -> Result<Role, HandlerErr> {
    Ok(Role::from_json(req.params.get("actor"))?)
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn current_year() -> i64 {
    i64::from(Utc::now().year())
}

/// Trimmed, non-empty string param.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
            };
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    optional_str(req, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be an integer", key))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    optional_i64(req, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_bool(req: &Request, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match req.params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// A component score param has three states: absent (keep what is stored),
/// `null` (clear it), or a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentParam {
    Keep,
    Clear,
    Set(f64),
}

impl ComponentParam {
    fn resolve(self, stored: Option<f64>) -> Option<f64> {
        match self {
            ComponentParam::Keep => stored,
            ComponentParam::Clear => None,
            ComponentParam::Set(v) => Some(v),
        }
    }
}

fn component_param(req: &Request, key: &str) -> Result<ComponentParam, HandlerErr> {
    match req.params.get(key) {
        None => Ok(ComponentParam::Keep),
        Some(v) if v.is_null() => Ok(ComponentParam::Clear),
        Some(v) => v.as_f64().map(ComponentParam::Set).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be a number or null", key))
                .with_details(json!({ key: v }))
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentParams {
    pub opening: ComponentParam,
    pub midterm: ComponentParam,
    pub final_exam: ComponentParam,
}

impl ComponentParams {
    pub fn parse(req: &Request) -> Result<Self, HandlerErr> {
        Ok(Self {
            opening: component_param(req, "opening")?,
            midterm: component_param(req, "midterm")?,
            final_exam: component_param(req, "final")?,
        })
    }

    pub fn submits_nothing(&self) -> bool {
        [self.opening, self.midterm, self.final_exam]
            .iter()
            .all(|p| *p == ComponentParam::Keep)
    }

    /// Overlays the submitted components on the stored ones.
    pub fn merge_over(&self, stored: ComponentScores) -> ComponentScores {
        ComponentScores {
            opening: self.opening.resolve(stored.opening),
            midterm: self.midterm.resolve(stored.midterm),
            final_exam: self.final_exam.resolve(stored.final_exam),
        }
    }
}
