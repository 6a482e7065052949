//! Response handling and rendering

use chrono::{DateTime, SecondsFormat};
use tracing::{debug, error, info};

use crate::dispatcher::CallId;
use crate::error::GnmiError;
use crate::gnmi::{self, GetResponse, Notification};
use crate::path::path_to_string;

/// Receives the outcome of dispatched calls.
///
/// A call ends with either `on_value*` followed by `on_complete`, or a single
/// `on_error`. Callbacks run on the call's task and may run concurrently for
/// different calls, so implementations must not block.
pub trait ResponseHandler: Send + Sync + 'static {
    fn on_value(&self, call: CallId, response: &GetResponse);

    fn on_error(&self, call: CallId, error: &GnmiError);

    fn on_complete(&self, call: CallId);
}

/// Renders every outcome through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ResponseHandler for LoggingHandler {
    fn on_value(&self, call: CallId, response: &GetResponse) {
        info!(
            call = %call,
            notifications = response.notification.len(),
            "Received gNMI Get response"
        );

        for notification in &response.notification {
            for line in render_notification(notification) {
                info!(call = %call, "{}", line);
            }
        }

        debug!(call = %call, json = %merge_json_updates(response), "Merged JSON updates");
    }

    fn on_error(&self, call: CallId, error: &GnmiError) {
        match error {
            GnmiError::Call(status) => error!(
                call = %call,
                code = ?status.code(),
                details = ?status,
                "gNMI Get failed: {}",
                status.message()
            ),
            other => error!(call = %call, error = ?other, "gNMI Get failed: {}", other),
        }
    }

    fn on_complete(&self, call: CallId) {
        debug!(call = %call, "gNMI Get completed");
    }
}

/// Render one notification as `path = value` lines.
///
/// Update paths are joined onto the notification prefix.
pub fn render_notification(notification: &Notification) -> Vec<String> {
    let prefix = notification
        .prefix
        .as_ref()
        .map(path_to_string)
        .unwrap_or_default();
    let timestamp = render_timestamp(notification.timestamp);

    let mut lines = Vec::with_capacity(notification.update.len() + notification.delete.len());

    for update in &notification.update {
        let path = update
            .path
            .as_ref()
            .map(path_to_string)
            .unwrap_or_default();
        let value = update
            .val
            .as_ref()
            .map(render_typed_value)
            .unwrap_or_default();
        lines.push(format!("[{}] {} = {}", timestamp, join_paths(&prefix, &path), value));
    }

    for deleted in &notification.delete {
        let path = path_to_string(deleted);
        lines.push(format!("[{}] {} deleted", timestamp, join_paths(&prefix, &path)));
    }

    lines
}

fn join_paths(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix.trim_end_matches('/'), path),
    }
}

/// Render a nanosecond notification timestamp as RFC 3339.
///
/// Zero means the device did not set one.
pub fn render_timestamp(nanos: i64) -> String {
    if nanos == 0 {
        return "-".to_string();
    }
    DateTime::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Render a typed value for display.
///
/// JSON payloads are pretty-printed when they parse.
pub fn render_typed_value(val: &gnmi::TypedValue) -> String {
    use gnmi::typed_value::Value;

    match &val.value {
        Some(Value::StringVal(s)) => s.clone(),
        Some(Value::IntVal(i)) => i.to_string(),
        Some(Value::UintVal(u)) => u.to_string(),
        Some(Value::BoolVal(b)) => b.to_string(),
        Some(Value::BytesVal(b)) => render_bytes(b),
        Some(Value::FloatVal(f)) => f.to_string(),
        Some(Value::DoubleVal(d)) => d.to_string(),
        Some(Value::DecimalVal(d)) => render_decimal(d),
        Some(Value::LeaflistVal(ll)) => {
            let values: Vec<String> = ll.element.iter().map(render_typed_value).collect();
            format!("[{}]", values.join(","))
        }
        Some(Value::AnyVal(any)) => format!("{} {}", any.type_url, render_bytes(&any.value)),
        Some(Value::JsonVal(j)) | Some(Value::JsonIetfVal(j)) => render_json(j),
        Some(Value::AsciiVal(a)) => a.clone(),
        Some(Value::ProtoBytes(p)) => render_bytes(p),
        None => String::new(),
    }
}

fn render_json(raw: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(raw).to_string()),
        Err(_) => String::from_utf8_lossy(raw).to_string(),
    }
}

fn render_bytes(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("0x{}", hex)
}

/// Largest precision rendered positionally; an `i64` has at most 19 digits.
const MAX_DECIMAL_PRECISION: u32 = 19;

fn render_decimal(d: &gnmi::Decimal64) -> String {
    if d.precision == 0 {
        return d.digits.to_string();
    }
    if d.precision > MAX_DECIMAL_PRECISION {
        return format!("{}e-{}", d.digits, d.precision);
    }

    let negative = d.digits < 0;
    let digits = d.digits.unsigned_abs().to_string();
    let precision = d.precision as usize;
    let padded = format!("{:0>width$}", digits, width = precision + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - precision);

    format!("{}{}.{}", if negative { "-" } else { "" }, int_part, frac_part)
}

/// Merge every JSON and JSON_IETF update payload of a response into one object.
///
/// Later keys overwrite earlier ones. Non-JSON values and payloads that are
/// not JSON objects are skipped.
pub fn merge_json_updates(response: &GetResponse) -> serde_json::Value {
    use gnmi::typed_value::Value;

    let mut merged = serde_json::Map::new();

    let payloads = response
        .notification
        .iter()
        .flat_map(|n| n.update.iter())
        .filter_map(|u| u.val.as_ref())
        .filter_map(|val| match &val.value {
            Some(Value::JsonVal(j)) | Some(Value::JsonIetfVal(j)) => Some(j),
            _ => None,
        });

    for raw in payloads {
        match serde_json::from_slice::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(object)) => merged.extend(object),
            Ok(_) => debug!("Skipping non-object JSON update"),
            Err(e) => debug!(error = %e, "Skipping malformed JSON update"),
        }
    }

    serde_json::Value::Object(merged)
}
