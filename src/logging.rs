//! Structured JSON-lines event logging.
//!
//! Every noteworthy event is a single JSON object on stderr with a level,
//! a component, a monotonic sequence number and free-form data fields.
//! `LOG_LEVEL` (debug|info|warn|error) filters what gets emitted.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("debug") => Level::Debug,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

/// RFC3339 timestamp with milliseconds.
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Emit a structured log entry on stderr.
pub fn log(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() {
        return;
    }
    let mut entry = Map::new();
    entry.insert("ts".to_string(), Value::String(ts_now()));
    entry.insert("seq".to_string(), Value::from(LOG_SEQ.fetch_add(1, Ordering::SeqCst)));
    entry.insert("lvl".to_string(), Value::String(level.as_str().to_string()));
    entry.insert("component".to_string(), Value::String(component.to_string()));
    entry.insert("event".to_string(), Value::String(event.to_string()));
    entry.insert("data".to_string(), Value::Object(fields));
    eprintln!("{}", Value::Object(entry));
}

pub fn info(component: &str, event: &str, fields: Map<String, Value>) {
    log(Level::Info, component, event, fields);
}

pub fn warn(component: &str, event: &str, fields: Map<String, Value>) {
    log(Level::Warn, component, event, fields);
}

pub fn error(component: &str, event: &str, fields: Map<String, Value>) {
    log(Level::Error, component, event, fields);
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: u64) -> Value {
    Value::from(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn obj_builds_map() {
        let m = obj(&[("a", v_str("x")), ("n", v_num(3))]);
        assert_eq!(m.get("a").unwrap(), "x");
        assert_eq!(m.get("n").unwrap(), 3);
    }
}
