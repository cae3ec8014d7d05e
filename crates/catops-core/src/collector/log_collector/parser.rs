//! Log line parser dispatch chain (spec.md §4.4 "Log Parser (C4)").
//!
//! [`parse_line`] strips an optional Docker-Compose prefix, then tries each
//! format handler in a fixed order and stops at the first one that yields a
//! level or a message. The order matters: later handlers are strictly
//! weaker, ending in a fallback that always succeeds so the chain is total.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::model::log::{LogLevel, ParsedLogEntry};

/// Strips a Docker-Compose prefix (`service_name_1  | `) if present.
fn strip_compose_prefix(line: &str) -> &str {
    static COMPOSE_PREFIX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+(?:-\d+)?\s*\|\s?").unwrap());
    match COMPOSE_PREFIX.find(line) {
        Some(m) if m.end() < line.len() => &line[m.end()..],
        _ => line,
    }
}

/// Parses one log line through the full dispatch chain (spec.md §4.4).
///
/// Total by construction (spec.md §8 "Parser total-ness"): the chain always
/// terminates in [`fallback`], and any handler that matched without
/// recognizing a level still gets one here, defaulting to `INFO` the way an
/// unparsed-but-plausible application line conventionally would.
pub fn parse_line(raw_line: &str) -> ParsedLogEntry {
    let line = strip_compose_prefix(raw_line);

    let mut entry = try_json(line)
        .or_else(|| try_logfmt_quoted(line))
        .or_else(|| try_syslog(line))
        .or_else(|| try_gunicorn(line))
        .or_else(|| try_logfmt(line))
        .or_else(|| try_uvicorn_access(line))
        .or_else(|| try_common_log(line))
        .or_else(|| try_glog(line))
        .or_else(|| try_java(line))
        .or_else(|| try_django_access(line))
        .or_else(|| try_python_logging(line))
        .or_else(|| try_postgres(line))
        .or_else(|| try_python_traceback_start(line))
        .unwrap_or_else(|| fallback(line));

    entry.level.get_or_insert(LogLevel::Info);
    ParsedLogEntry { raw: raw_line.to_string(), ..entry }
}

/// Parses a batch of already-tailed lines and folds stack-trace
/// continuation lines (indented frames, `Caused by:`, `\tat ...`) into the
/// preceding entry's `stack_trace` (spec.md §4.4 "Error extraction").
pub fn parse_lines(lines: &[String]) -> Vec<ParsedLogEntry> {
    static CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^(?:\s+at \S|\s*Caused by:|\s+\.\.\. \d+ more|\s+File "|\s+\S|[\w.]+(?:Error|Exception):\s)"#)
            .unwrap()
    });

    let mut entries: Vec<ParsedLogEntry> = Vec::new();
    for line in lines {
        if let Some(last) = entries.last_mut()
            && last.error_type.is_some()
            && CONTINUATION.is_match(line)
        {
            let trace = last.stack_trace.get_or_insert_with(String::new);
            if !trace.is_empty() {
                trace.push('\n');
            }
            trace.push_str(line);
            continue;
        }
        entries.push(parse_line(line));
    }

    for entry in &mut entries {
        if entry.error_type.as_deref() == Some("Traceback")
            && let Some(trace) = &entry.stack_trace
            && let Some(last_line) = trace.lines().last()
            && let Some((exc_type, msg)) = last_line.trim().split_once(": ")
            && !exc_type.contains(' ')
        {
            entry.error_type = Some(exc_type.to_string());
            entry.message = Some(msg.to_string());
        }
    }

    entries
}

fn fallback(line: &str) -> ParsedLogEntry {
    static LEVEL_WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b(TRACE|DEBUG|INFO|WARN(?:ING)?|ERROR|FATAL|CRITICAL|PANIC)\b").unwrap());

    let level = LEVEL_WORD.captures(line).and_then(|c| LogLevel::from_alias(&c[1]));
    ParsedLogEntry { message: Some(line.to_string()), level, ..Default::default() }
}

/// Structured JSON: the strongest signal, tried first.
fn try_json(line: &str) -> Option<ParsedLogEntry> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let obj = value.as_object()?;

    let get_str = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str)).map(str::to_string)
    };

    let level = obj
        .get("level")
        .or_else(|| obj.get("severity"))
        .or_else(|| obj.get("lvl"))
        .and_then(|v| match v {
            Value::String(s) => LogLevel::from_alias(s),
            Value::Number(n) => n.as_i64().map(LogLevel::from_pino_level),
            _ => None,
        });

    let mut entry = ParsedLogEntry {
        level,
        message: get_str(&["message", "msg"]),
        timestamp: obj
            .get("time")
            .or_else(|| obj.get("ts"))
            .or_else(|| obj.get("timestamp"))
            .or_else(|| obj.get("@timestamp"))
            .and_then(parse_timestamp_value),
        trace_id: get_str(&["trace_id", "traceId"]),
        span_id: get_str(&["span_id", "spanId"]),
        request_id: get_str(&["request_id", "requestId"]),
        user_id: get_str(&["user_id", "userId"]),
        session_id: get_str(&["session_id", "sessionId"]),
        http_method: get_str(&["method", "http_method"]),
        http_path: get_str(&["path", "url", "http_path"]),
        http_status: obj
            .get("status")
            .or_else(|| obj.get("status_code"))
            .and_then(Value::as_u64)
            .map(|s| s as u16),
        http_duration_ms: obj.get("duration_ms").and_then(Value::as_f64),
        error_type: get_str(&["error_type", "exception"]),
        ..Default::default()
    };

    if let Some(status) = entry.http_status
        && entry.level.is_none()
    {
        entry.level = Some(LogLevel::from_http_status(status));
    }
    if entry.level.is_none() && entry.message.is_none() {
        return None;
    }
    Some(entry)
}

fn parse_timestamp_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp()),
        _ => None,
    }
}

/// Docker/logrus `key=value` with at least one quoted-string value, e.g.
/// `time="2024-01-01T00:00:00Z" level=info msg="started server"`.
fn try_logfmt_quoted(line: &str) -> Option<ParsedLogEntry> {
    static QUOTED_PAIR: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());
    if !QUOTED_PAIR.is_match(line) {
        return None;
    }
    logfmt_entry(line)
}

/// General logfmt: bareword `key=value` pairs with no quoting required.
fn try_logfmt(line: &str) -> Option<ParsedLogEntry> {
    static BARE_PAIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\w+)=(\S+)").unwrap());
    if !BARE_PAIR.is_match(line) {
        return None;
    }
    logfmt_entry(line)
}

fn logfmt_entry(line: &str) -> Option<ParsedLogEntry> {
    static PAIR: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(\w+)=(?:"([^"]*)"|(\S+))"#).unwrap());

    let mut level = None;
    let mut message = None;
    let mut fields = std::collections::HashMap::new();

    for caps in PAIR.captures_iter(line) {
        let key = caps[1].to_ascii_lowercase();
        let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or_default();
        match key.as_str() {
            "level" | "lvl" | "severity" => level = level.or_else(|| LogLevel::from_alias(value)),
            "msg" | "message" => message = message.or_else(|| Some(value.to_string())),
            _ => {
                fields.insert(key, value.to_string());
            }
        }
    }

    if level.is_none() && message.is_none() {
        return None;
    }

    Some(ParsedLogEntry {
        level,
        message,
        trace_id: fields.remove("trace_id"),
        span_id: fields.remove("span_id"),
        request_id: fields.remove("request_id"),
        http_method: fields.remove("method"),
        http_path: fields.remove("path"),
        attributes: fields,
        ..Default::default()
    })
}

/// Syslog RFC 5424: `<pri>version timestamp hostname app-name procid msgid [sd] msg`.
/// The structured-data block's `key="value"` pairs (skipping the leading
/// SD-ID token) are lifted into `attributes` (spec.md §8 scenario 5).
fn try_syslog(line: &str) -> Option<ParsedLogEntry> {
    // SD-DATA is either the nil value `-` or one or more `[...]` blocks;
    // only the bracketed form is captured since `-` carries no attributes.
    static SYSLOG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^<(\d{1,3})>(\d+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+(?:-|(\[[^\]]*\]))\s+(.*)$",
        )
        .unwrap()
    });
    static SD_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());

    let caps = SYSLOG.captures(line)?;
    let pri: u32 = caps[1].parse().ok()?;

    let attributes = caps
        .get(8)
        .map(|sd| SD_PARAM.captures_iter(sd.as_str()).map(|c| (c[1].to_string(), c[2].to_string())).collect())
        .unwrap_or_default();

    Some(ParsedLogEntry {
        level: Some(LogLevel::from_syslog_pri(pri)),
        message: Some(caps[9].to_string()),
        attributes,
        ..Default::default()
    })
}

/// Gunicorn: `[2024-01-01 00:00:00 +0000] [1234] [INFO] message`.
fn try_gunicorn(line: &str) -> Option<ParsedLogEntry> {
    static GUNICORN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\s*\[(\d+)\]\s*\[(\w+)\]\s*(.*)$").unwrap());
    let caps = GUNICORN.captures(line)?;
    Some(ParsedLogEntry {
        level: LogLevel::from_alias(&caps[3]),
        message: Some(caps[4].to_string()),
        ..Default::default()
    })
}

/// Uvicorn access log: `127.0.0.1:54321 - "GET /health HTTP/1.1" 200`.
fn try_uvicorn_access(line: &str) -> Option<ParsedLogEntry> {
    static UVICORN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^(\S+):(\d+)\s+-\s+"(\S+)\s+(\S+)\s+HTTP/[\d.]+"\s+(\d{3})"#).unwrap()
    });
    let caps = UVICORN.captures(line)?;
    let status: u16 = caps[5].parse().ok()?;
    Some(ParsedLogEntry {
        level: Some(LogLevel::from_http_status(status)),
        http_method: Some(caps[3].to_string()),
        http_path: Some(caps[4].to_string()),
        http_status: Some(status),
        source_ip: Some(caps[1].to_string()),
        ..Default::default()
    })
}

/// Apache/Nginx common log format:
/// `127.0.0.1 - - [01/Jan/2024:00:00:00 +0000] "GET /path HTTP/1.1" 200 1234`.
fn try_common_log(line: &str) -> Option<ParsedLogEntry> {
    static COMMON_LOG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^(\S+)\s+\S+\s+\S+\s+\[([^\]]+)\]\s+"(\S+)\s+(\S+)\s+HTTP/[\d.]+"\s+(\d{3})\s+(\S+)"#)
            .unwrap()
    });
    let caps = COMMON_LOG.captures(line)?;
    let status: u16 = caps[5].parse().ok()?;
    Some(ParsedLogEntry {
        level: Some(LogLevel::from_http_status(status)),
        http_method: Some(caps[3].to_string()),
        http_path: Some(caps[4].to_string()),
        http_status: Some(status),
        source_ip: Some(caps[1].to_string()),
        ..Default::default()
    })
}

/// Django's dev-server access line (same shape as common log, minus the
/// identity/user fields): `[01/Jan/2024 00:00:00] "GET /path HTTP/1.1" 200 1234`.
fn try_django_access(line: &str) -> Option<ParsedLogEntry> {
    static DJANGO: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^\[([^\]]+)\]\s+"(\S+)\s+(\S+)\s+HTTP/[\d.]+"\s+(\d{3})"#).unwrap()
    });
    let caps = DJANGO.captures(line)?;
    let status: u16 = caps[4].parse().ok()?;
    Some(ParsedLogEntry {
        level: Some(LogLevel::from_http_status(status)),
        http_method: Some(caps[2].to_string()),
        http_path: Some(caps[3].to_string()),
        http_status: Some(status),
        ..Default::default()
    })
}

/// Kubernetes glog: `I0115 12:34:56.789012       1 controller.go:123] message`.
fn try_glog(line: &str) -> Option<ParsedLogEntry> {
    static GLOG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([IWEF])\d{4}\s+\d{2}:\d{2}:\d{2}\.\d+\s+\d+\s+\S+\]\s*(.*)$").unwrap());
    let caps = GLOG.captures(line)?;
    Some(ParsedLogEntry {
        level: LogLevel::from_alias(&caps[1]),
        message: Some(caps[2].to_string()),
        ..Default::default()
    })
}

/// Java/Log4j/Logback/Spring Boot. Handles both the typical formatted line
/// (`2024-01-01 00:00:00.000 ERROR 1 --- [main] c.e.Foo : msg`) and a raw
/// exception line (`java.lang.NullPointerException: msg`), folding
/// following `\tat ...` frames is the job of [`parse_lines`], not this
/// function (spec.md §4.4 "Error extraction").
fn try_java(line: &str) -> Option<ParsedLogEntry> {
    static FORMATTED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^\S+\s+\S+\s+(TRACE|DEBUG|INFO|WARN|ERROR|FATAL)\s+\d+\s+---\s+\[[^\]]*\]\s+\S+\s*:\s*(.*)$",
        )
        .unwrap()
    });
    if let Some(caps) = FORMATTED.captures(line) {
        return Some(ParsedLogEntry {
            level: LogLevel::from_alias(&caps[1]),
            message: Some(caps[2].to_string()),
            ..Default::default()
        });
    }

    static EXCEPTION: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^((?:[a-z][a-z0-9]*\.)+[A-Z]\w*(?:Exception|Error)):\s*(.*)$").unwrap());
    let caps = EXCEPTION.captures(line)?;
    Some(ParsedLogEntry {
        level: Some(LogLevel::Error),
        error_type: Some(caps[1].to_string()),
        message: Some(caps[2].to_string()),
        ..Default::default()
    })
}

/// Python standard logging: `2024-01-01 00:00:00,000 - name - LEVEL - msg`
/// or the bare `LEVEL:logger.name:msg` form.
fn try_python_logging(line: &str) -> Option<ParsedLogEntry> {
    static TIMESTAMPED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}[,.]\d+\s*-\s*\S+\s*-\s*(\w+)\s*-\s*(.*)$")
            .unwrap()
    });
    if let Some(caps) = TIMESTAMPED.captures(line) {
        return Some(ParsedLogEntry {
            level: LogLevel::from_alias(&caps[1]),
            message: Some(caps[2].to_string()),
            ..Default::default()
        });
    }

    static BARE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\w+):([\w.]+):(.*)$").unwrap());
    let caps = BARE.captures(line)?;
    let level = LogLevel::from_alias(&caps[1])?;
    Some(ParsedLogEntry { level: Some(level), message: Some(caps[3].to_string()), ..Default::default() })
}

/// PostgreSQL stderr log line: `2024-01-01 00:00:00.000 UTC [1234] LOG:  message`.
fn try_postgres(line: &str) -> Option<ParsedLogEntry> {
    static POSTGRES: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\S+\s+\S+\s+\S+\s+\[(\d+)\]\s+(\w+):\s*(.*)$").unwrap()
    });
    let caps = POSTGRES.captures(line)?;
    let level = match caps[2].to_ascii_uppercase().as_str() {
        "PANIC" | "FATAL" => LogLevel::Fatal,
        "ERROR" => LogLevel::Error,
        "WARNING" => LogLevel::Warn,
        "DEBUG1" | "DEBUG2" | "DEBUG3" | "DEBUG4" | "DEBUG5" => LogLevel::Debug,
        _ => LogLevel::Info,
    };
    Some(ParsedLogEntry { level: Some(level), message: Some(caps[3].to_string()), ..Default::default() })
}

/// Detects the start of a Python traceback block. The frames and the
/// final `ExceptionType: msg` line are folded in by [`parse_lines`].
fn try_python_traceback_start(line: &str) -> Option<ParsedLogEntry> {
    if line.trim_start() != "Traceback (most recent call last):" {
        return None;
    }
    Some(ParsedLogEntry {
        level: Some(LogLevel::Error),
        error_type: Some("Traceback".to_string()),
        stack_trace: Some(line.to_string()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_compose_prefix() {
        assert_eq!(strip_compose_prefix("web_1  | hello"), "hello");
        assert_eq!(strip_compose_prefix("no prefix here"), "no prefix here");
    }

    #[test]
    fn parses_structured_json() {
        let entry = parse_line(r#"{"level":"error","msg":"disk full","trace_id":"abc"}"#);
        assert_eq!(entry.level, Some(LogLevel::Error));
        assert_eq!(entry.message.as_deref(), Some("disk full"));
        assert_eq!(entry.trace_id.as_deref(), Some("abc"));
    }

    #[test]
    fn parses_pino_numeric_level() {
        let entry = parse_line(r#"{"level":50,"msg":"boom"}"#);
        assert_eq!(entry.level, Some(LogLevel::Error));
    }

    #[test]
    fn parses_logrus_quoted_kv() {
        let entry = parse_line(r#"time="2024-01-01T00:00:00Z" level=warning msg="disk nearly full""#);
        assert_eq!(entry.level, Some(LogLevel::Warn));
        assert_eq!(entry.message.as_deref(), Some("disk nearly full"));
    }

    #[test]
    fn parses_syslog_rfc5424() {
        let entry = parse_line("<34>1 2024-01-01T00:00:00Z host app 1234 ID47 - failover occurred");
        assert_eq!(entry.level, Some(LogLevel::Fatal));
        assert_eq!(entry.message.as_deref(), Some("failover occurred"));
    }

    /// spec.md §8 scenario 5.
    #[test]
    fn parses_syslog_structured_data_into_attributes() {
        let entry = parse_line(
            r#"<132>1 2025-01-15T10:30:00.123456Z myserver myapp 1234 ID47 [exampleSDID@32473 iut="3"] User authentication failed"#,
        );
        assert_eq!(entry.level, Some(LogLevel::Warn));
        assert_eq!(entry.message.as_deref(), Some("User authentication failed"));
        assert_eq!(entry.attributes.get("iut").map(String::as_str), Some("3"));
    }

    #[test]
    fn parses_gunicorn() {
        let entry = parse_line("[2024-01-01 00:00:00 +0000] [1234] [INFO] Booting worker");
        assert_eq!(entry.level, Some(LogLevel::Info));
        assert_eq!(entry.message.as_deref(), Some("Booting worker"));
    }

    /// spec.md §8 scenario 4.
    #[test]
    fn parses_uvicorn_access_with_query_string() {
        let entry = parse_line(
            r#"172.19.0.1:35730 - "GET /rates/?currency_from=RUB&currency_to=USDT HTTP/1.0" 200"#,
        );
        assert_eq!(entry.source_ip.as_deref(), Some("172.19.0.1"));
        assert_eq!(entry.http_method.as_deref(), Some("GET"));
        assert_eq!(entry.http_path.as_deref(), Some("/rates/?currency_from=RUB&currency_to=USDT"));
        assert_eq!(entry.http_status, Some(200));
        assert_eq!(entry.level, Some(LogLevel::Info));
    }

    #[test]
    fn parses_uvicorn_access_error_status() {
        let entry = parse_line(r#"127.0.0.1:54321 - "GET /health HTTP/1.1" 503"#);
        assert_eq!(entry.level, Some(LogLevel::Error));
        assert_eq!(entry.http_status, Some(503));
        assert_eq!(entry.http_method.as_deref(), Some("GET"));
    }

    #[test]
    fn parses_apache_common_log() {
        let entry = parse_line(r#"10.0.0.1 - - [01/Jan/2024:00:00:00 +0000] "GET /index.html HTTP/1.1" 404 512"#);
        assert_eq!(entry.level, Some(LogLevel::Warn));
        assert_eq!(entry.http_status, Some(404));
    }

    #[test]
    fn parses_glog() {
        let entry = parse_line("E0115 12:34:56.789012       1 controller.go:123] sync failed");
        assert_eq!(entry.level, Some(LogLevel::Error));
        assert_eq!(entry.message.as_deref(), Some("sync failed"));
    }

    #[test]
    fn parses_spring_boot_line() {
        let entry = parse_line("2024-01-01 00:00:00.000 ERROR 1 --- [main] c.e.Foo : something broke");
        assert_eq!(entry.level, Some(LogLevel::Error));
        assert_eq!(entry.message.as_deref(), Some("something broke"));
    }

    #[test]
    fn parses_java_exception_line() {
        let entry = parse_line("java.lang.NullPointerException: value was null");
        assert_eq!(entry.level, Some(LogLevel::Error));
        assert_eq!(entry.error_type.as_deref(), Some("java.lang.NullPointerException"));
    }

    #[test]
    fn parses_python_logging_timestamped() {
        let entry = parse_line("2024-01-01 00:00:00,123 - myapp - WARNING - low disk space");
        assert_eq!(entry.level, Some(LogLevel::Warn));
        assert_eq!(entry.message.as_deref(), Some("low disk space"));
    }

    #[test]
    fn parses_postgres_log_line() {
        let entry = parse_line("2024-01-01 00:00:00.000 UTC [1234] ERROR:  deadlock detected");
        assert_eq!(entry.level, Some(LogLevel::Error));
        assert_eq!(entry.message.as_deref(), Some("deadlock detected"));
    }

    #[test]
    fn fallback_detects_level_keyword() {
        let entry = parse_line("something went wrong: WARN low memory");
        assert_eq!(entry.level, Some(LogLevel::Warn));
    }

    #[test]
    fn fallback_with_no_keyword_defaults_to_info() {
        let entry = parse_line("just a plain line of text");
        assert_eq!(entry.level, Some(LogLevel::Info));
        assert_eq!(entry.message.as_deref(), Some("just a plain line of text"));
    }

    #[test]
    fn every_output_level_is_non_empty() {
        for line in ["", "{}", "plain text", "gibberish !@#$%"] {
            assert!(parse_line(line).level.is_some());
        }
    }

    #[test]
    fn parser_is_total_never_panics_on_garbage() {
        for line in ["", "{", "\t\t\t", "日本語のログ行", "key=\"unterminated"] {
            let _ = parse_line(line);
        }
    }

    #[test]
    fn folds_python_traceback_and_extracts_final_exception() {
        let lines = vec![
            "Traceback (most recent call last):".to_string(),
            "  File \"app.py\", line 10, in <module>".to_string(),
            "    raise ValueError(\"bad input\")".to_string(),
            "ValueError: bad input".to_string(),
        ];
        let entries = parse_lines(&lines);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, Some(LogLevel::Error));
        assert_eq!(entries[0].error_type.as_deref(), Some("ValueError"));
        assert_eq!(entries[0].message.as_deref(), Some("bad input"));
    }

    #[test]
    fn folds_java_stack_trace_into_preceding_entry() {
        let lines = vec![
            "java.lang.RuntimeException: boom".to_string(),
            "\tat com.example.Foo.bar(Foo.java:10)".to_string(),
            "\tat com.example.Foo.baz(Foo.java:20)".to_string(),
        ];
        let entries = parse_lines(&lines);
        assert_eq!(entries.len(), 1);
        let trace = entries[0].stack_trace.as_deref().unwrap();
        assert!(trace.contains("Foo.bar"));
        assert!(trace.contains("Foo.baz"));
    }
}
