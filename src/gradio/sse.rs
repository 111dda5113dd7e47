//! Reader for the server-sent-event stream returned by
//! `GET {api}/call/{endpoint}/{event_id}`.
//!
//! The stream is read to its end, then scanned for the first terminal event:
//! `complete` carries the output array, `error` carries an optional message.
//! `generating` and `heartbeat` events are skipped.

use serde_json::Value;

use super::GradioError;

#[derive(Debug, PartialEq, Eq)]
struct Event {
    name: String,
    data: String,
}

fn parse_events(body: &str) -> Vec<Event> {
    let mut events = Vec::new();
    let mut name = String::new();
    let mut data: Vec<&str> = Vec::new();

    for line in body.lines().map(|l| l.strip_suffix('\r').unwrap_or(l)) {
        if line.is_empty() {
            if !name.is_empty() || !data.is_empty() {
                events.push(Event { name: std::mem::take(&mut name), data: data.join("\n") });
                data.clear();
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => name = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }
    if !name.is_empty() || !data.is_empty() {
        events.push(Event { name, data: data.join("\n") });
    }
    events
}

/// Extract the output array of a finished call.
pub(super) fn take_result(body: &str) -> Result<Vec<Value>, GradioError> {
    for event in parse_events(body) {
        match event.name.as_str() {
            "complete" => {
                return match serde_json::from_str::<Value>(&event.data) {
                    Ok(Value::Array(items)) => Ok(items),
                    Ok(other) => Err(GradioError::Protocol(format!(
                        "complete event carried {other} instead of an array"
                    ))),
                    Err(e) => Err(GradioError::Protocol(format!("complete event is not JSON: {e}"))),
                };
            }
            "error" => {
                let message = match serde_json::from_str::<Value>(&event.data) {
                    Ok(Value::String(s)) => s,
                    Ok(Value::Null) | Err(_) if event.data.trim().is_empty() || event.data.trim() == "null" => {
                        "no details".to_string()
                    }
                    _ => event.data,
                };
                return Err(GradioError::Remote(message));
            }
            _ => {}
        }
    }
    Err(GradioError::Protocol("event stream ended without a result".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_event_yields_array() {
        let body = "event: generating\ndata: null\n\nevent: complete\ndata: [\"\", [{\"role\": \"assistant\", \"content\": \"hi\"}]]\n\n";
        let out = take_result(body).unwrap();
        assert_eq!(out, vec![json!(""), json!([{"role": "assistant", "content": "hi"}])]);
    }

    #[test]
    fn crlf_and_comments_are_tolerated() {
        let body = ": keep-alive\r\nevent: heartbeat\r\ndata: null\r\n\r\nevent: complete\r\ndata: [1]\r\n\r\n";
        assert_eq!(take_result(body).unwrap(), vec![json!(1)]);
    }

    #[test]
    fn final_event_without_trailing_blank_line() {
        assert_eq!(take_result("event: complete\ndata: [true]").unwrap(), vec![json!(true)]);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let events = parse_events("event: complete\ndata: [1,\ndata: 2]\n\n");
        assert_eq!(events, vec![Event { name: "complete".into(), data: "[1,\n2]".into() }]);
        assert_eq!(take_result("event: complete\ndata: [1,\ndata: 2]\n\n").unwrap().len(), 2);
    }

    #[test]
    fn error_event_with_message() {
        let err = take_result("event: error\ndata: \"bot not found\"\n\n").unwrap_err();
        assert!(matches!(err, GradioError::Remote(ref m) if m == "bot not found"));
    }

    #[test]
    fn error_event_without_details() {
        let err = take_result("event: error\ndata: null\n\n").unwrap_err();
        assert!(matches!(err, GradioError::Remote(ref m) if m == "no details"));
    }

    #[test]
    fn non_array_result_is_protocol_error() {
        let err = take_result("event: complete\ndata: {\"a\": 1}\n\n").unwrap_err();
        assert!(matches!(err, GradioError::Protocol(_)));
    }

    #[test]
    fn empty_stream_is_protocol_error() {
        assert!(matches!(take_result(""), Err(GradioError::Protocol(_))));
        assert!(matches!(
            take_result("event: generating\ndata: null\n\n"),
            Err(GradioError::Protocol(_))
        ));
    }
}
