//! Access log records.
//!
//! Framework-neutral: the web layer fills a [`RequestSummary`] once the
//! response is done and [`AccessLog`] turns it into a [`LogEvent`], either as
//! structured JSON attributes or as an NCSA common/combined log line. The
//! level follows the status: below 400 is `INFO`, below 500 `WARNING`,
//! anything else `ERROR`.

use crate::context::ContextFilter;
use crate::env::{env_opt, ENVIRONMENT_ENV};
use crate::error::ConfigError;
use crate::record::{Level, LogEvent, SourceLocation};
use crate::value::{AttrValue, Attributes};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Logger name of access events.
pub const ACCESS_LOGGER: &str = "access";

/// Header carrying the caller's correlation id.
pub const CORRELATION_HEADER: &str = "Correlation-ID";

/// Value used for an unknown correlation id, user or size.
pub const MISSING: &str = "-";

/// What the web layer knows about a finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub method: String,
    /// Path plus query string, as requested.
    pub uri: String,
    pub path: String,
    /// e.g. `HTTP/1.1`
    pub version: String,
    /// e.g. `http` or `https`
    pub protocol: String,
    pub remote_ip: Option<String>,
    pub headers: Vec<(String, String)>,
    pub query_args: Vec<(String, Vec<String>)>,
    /// Seconds since the Unix epoch at which the request started.
    pub start_time: f64,
    pub duration: Duration,
    pub status: u16,
    pub current_user: Option<String>,
    pub response_bytes: Option<u64>,
    /// Set by the handler; otherwise read from the `Correlation-ID` header.
    pub correlation_id: Option<String>,
}

impl RequestSummary {
    pub fn new(method: impl Into<String>, uri: impl Into<String>, status: u16) -> Self {
        let uri = uri.into();
        let path = uri.split('?').next().unwrap_or_default().to_string();
        Self {
            method: method.into(),
            uri,
            path,
            version: "HTTP/1.1".to_string(),
            protocol: "http".to_string(),
            remote_ip: None,
            headers: Vec::new(),
            query_args: Vec::new(),
            start_time: 0.0,
            duration: Duration::ZERO,
            status,
            current_user: None,
            response_bytes: None,
            correlation_id: None,
        }
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn correlation(&self) -> Option<&str> {
        self.correlation_id.as_deref().or_else(|| self.header(CORRELATION_HEADER))
    }
}

/// Level for an HTTP status code.
pub fn level_for_status(status: u16) -> Level {
    match status {
        0..=399 => Level::Info,
        400..=499 => Level::Warning,
        _ => Level::Error,
    }
}

/// Builds access-log events.
#[derive(Debug)]
pub struct AccessLog {
    filter: ContextFilter,
    environment: Option<String>,
}

impl AccessLog {
    /// `environment` is reported as-is in JSON access records.
    pub fn new(environment: Option<String>) -> Result<Self, ConfigError> {
        let filter = ContextFilter::builder().default_value("correlation_id", MISSING).build()?;
        Ok(Self { filter, environment })
    }

    /// Read the environment name from `ENVIRONMENT` once, up front.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(env_opt(ENVIRONMENT_ENV))
    }

    /// JSON-oriented event: empty message, request details as attributes.
    ///
    /// `correlation_id` is the handler's id, else the `Correlation-ID`
    /// header, else `"-"` through the filter's default.
    pub fn json_event(&self, req: &RequestSummary) -> LogEvent {
        let mut event = self.base_event(req, String::new());
        if let Some(id) = req.correlation() {
            event.extra.insert("correlation_id", id);
        }
        self.filter.apply(&mut event);

        let headers: Attributes = req.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let query_args: Attributes = req
            .query_args
            .iter()
            .map(|(k, vs)| (k.as_str(), AttrValue::from(vs.clone())))
            .collect();

        event.extra.insert("duration", req.duration.as_secs_f64() * 1000.0);
        event.extra.insert("headers", headers);
        event.extra.insert("method", req.method.as_str());
        event.extra.insert("path", req.path.as_str());
        event.extra.insert("protocol", req.protocol.as_str());
        event.extra.insert("query_args", query_args);
        event.extra.insert("remote_ip", req.remote_ip.clone());
        event.extra.insert("status_code", req.status);
        event.extra.insert("environment", self.environment.clone());
        event
    }

    /// Event whose message is the NCSA common log line.
    pub fn common_event(&self, req: &RequestSummary) -> LogEvent {
        self.line_event(req, common_log_line(req))
    }

    /// Event whose message is the Apache combined log line.
    pub fn combined_event(&self, req: &RequestSummary) -> LogEvent {
        self.line_event(req, combined_log_line(req))
    }

    fn line_event(&self, req: &RequestSummary, line: String) -> LogEvent {
        let mut event = self.base_event(req, line);
        if let Some(id) = req.correlation() {
            event.extra.insert("correlation_id", id);
        }
        self.filter.apply(&mut event);
        event
    }

    fn base_event(&self, req: &RequestSummary, message: String) -> LogEvent {
        LogEvent::new(
            level_for_status(req.status),
            ACCESS_LOGGER,
            message,
            SourceLocation::caller("access_log"),
        )
    }
}

/// `[day/Mon/year:HH:MM:SS +0000]` body for `start_time`, in UTC.
fn clf_time(start_time: f64) -> String {
    DateTime::<Utc>::from_timestamp(start_time.floor() as i64, 0)
        .unwrap_or_default()
        .format("%d/%b/%Y:%H:%M:%S %z")
        .to_string()
}

/// NCSA common log format:
/// `remote - user [date] "METHOD URI VERSION" status bytes`.
pub fn common_log_line(req: &RequestSummary) -> String {
    let bytes = req.response_bytes.map_or_else(|| MISSING.to_string(), |b| b.to_string());
    format!(
        "{} - {} [{}] \"{} {} {}\" {} {}",
        req.remote_ip.as_deref().unwrap_or(MISSING),
        req.current_user.as_deref().unwrap_or(MISSING),
        clf_time(req.start_time),
        req.method,
        req.uri,
        req.version,
        req.status,
        bytes,
    )
}

/// Common log format followed by the quoted `Referer` and `User-Agent`.
pub fn combined_log_line(req: &RequestSummary) -> String {
    format!(
        "{} \"{}\" \"{}\"",
        common_log_line(req),
        req.header("Referer").unwrap_or(MISSING),
        req.header("User-Agent").unwrap_or(MISSING),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestSummary {
        RequestSummary {
            remote_ip: Some("127.0.0.1".into()),
            start_time: 971_211_336.0,
            duration: Duration::from_millis(3),
            headers: vec![
                ("Host".into(), "127.0.0.1".into()),
                ("user-agent".into(), "Mozilla/4.08".into()),
            ],
            query_args: vec![("runtime_error".into(), vec!["something bad happened".into()])],
            ..RequestSummary::new("GET", "/apache_pb.gif?runtime_error=x", 200)
        }
    }

    #[test]
    fn status_maps_to_level() {
        assert_eq!(level_for_status(303), Level::Info);
        assert_eq!(level_for_status(400), Level::Warning);
        assert_eq!(level_for_status(500), Level::Error);
    }

    #[test]
    fn common_line_uses_dashes_for_unknowns() {
        let line = common_log_line(&request());
        assert_eq!(
            line,
            "127.0.0.1 - - [10/Oct/2000:20:55:36 +0000] \"GET /apache_pb.gif?runtime_error=x HTTP/1.1\" 200 -"
        );
    }

    #[test]
    fn combined_line_appends_referer_and_agent() {
        let req = RequestSummary {
            current_user: Some("frank".into()),
            response_bytes: Some(2326),
            ..request()
        };
        let line = combined_log_line(&req);
        assert!(line.starts_with("127.0.0.1 - frank ["));
        assert!(line.ends_with("\" 200 2326 \"-\" \"Mozilla/4.08\""));
        assert_eq!(line.split_whitespace().count(), 12);
    }

    #[test]
    fn json_event_falls_back_to_dash_correlation_id() {
        let log = AccessLog::new(Some("development".into())).unwrap();
        let event = log.json_event(&request());
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.name, ACCESS_LOGGER);
        assert_eq!(event.extra.get("correlation_id"), Some(&AttrValue::from("-")));
        assert_eq!(event.extra.get("method"), Some(&AttrValue::from("GET")));
        assert_eq!(event.extra.get("path"), Some(&AttrValue::from("/apache_pb.gif")));
        assert_eq!(event.extra.get("status_code"), Some(&AttrValue::UInt(200)));
        assert_eq!(event.extra.get("environment"), Some(&AttrValue::from("development")));
        assert_eq!(
            event.extra.get("query_args"),
            Some(&AttrValue::Map(
                Attributes::new().with("runtime_error", vec!["something bad happened"])
            ))
        );
    }

    #[test]
    fn correlation_id_from_handler_or_header() {
        let log = AccessLog::new(None).unwrap();
        let mut req = request();
        req.headers.push(("correlation-id".into(), "from-header".into()));
        assert_eq!(
            log.json_event(&req).extra.get("correlation_id"),
            Some(&AttrValue::from("from-header"))
        );
        req.correlation_id = Some("from-handler".into());
        assert_eq!(
            log.common_event(&req).extra.get("correlation_id"),
            Some(&AttrValue::from("from-handler"))
        );
        assert_eq!(log.json_event(&req).extra.get("environment"), Some(&AttrValue::Null));
    }

    #[test]
    fn error_status_logs_at_error() {
        let log = AccessLog::new(None).unwrap();
        let req = RequestSummary::new("GET", "/", 500);
        let event = log.combined_event(&req);
        assert_eq!(event.level, Level::Error);
        assert!(event.message.resolve().contains("\"GET / HTTP/1.1\" 500 -"));
    }
}
