//! Construction of gNMI notifications from datastore records.

use tracing::warn;

use gnmi_gateway_common::current_timestamp_nanos;

use crate::gnmi::{Notification, Path, TypedValue, Update, typed_value};
use crate::path;
use crate::value::ValueRecord;

/// Build a notification stamped with the current time.
///
/// Each record becomes one update carrying its protocol-dialect path and its
/// value rendered as a string. Records whose path cannot be parsed are
/// logged and left out.
pub fn build_notification(prefix: Option<Path>, records: &[ValueRecord]) -> Notification {
    let update = records.iter().filter_map(record_to_update).collect();

    Notification {
        timestamp: current_timestamp_nanos(),
        prefix,
        update,
        ..Default::default()
    }
}

/// Convert one datastore record into a gNMI update.
pub fn record_to_update(record: &ValueRecord) -> Option<Update> {
    match path::protocol_path(record.path()) {
        Ok(path) => Some(Update {
            path: Some(path),
            val: Some(TypedValue {
                value: Some(typed_value::Value::StringVal(record.get_str())),
            }),
            ..Default::default()
        }),
        Err(e) => {
            warn!(path = %record.path(), error = %e, "Skipping record with unparsable path");
            None
        }
    }
}
