//! Set: delete, replace and update batches applied in one transaction.

use tracing::{debug, warn};

use gnmi_gateway_common::current_timestamp_nanos;

use super::CancelFlag;
use crate::datastore::{Datastore, DatastoreSession, SessionGuard, SessionKind, WriteOp};
use crate::error::{GatewayError, Result};
use crate::flatten::flatten;
use crate::gnmi::{Path, SetRequest, SetResponse, Update, UpdateResult, typed_value, update_result};
use crate::path;
use crate::value::{RecordValue, ValueRecord};

pub(super) fn set(
    datastore: &dyn Datastore,
    request: &SetRequest,
    cancel: &CancelFlag,
) -> Result<SetResponse> {
    let mut session = SessionGuard::open(datastore, SessionKind::ReadWrite)?;
    let prefix = request.prefix.as_ref();
    let mut results = Vec::new();

    let deletes: Vec<ValueRecord> = request
        .delete
        .iter()
        .filter_map(|p| item_path(prefix, Some(p)))
        .map(ValueRecord::new)
        .collect();
    cancel.check("delete batch")?;
    apply_batch(&mut *session, WriteOp::Delete, &deletes, &mut results)?;

    let replaces = value_records(prefix, &request.replace);
    cancel.check("replace batch")?;
    apply_batch(&mut *session, WriteOp::Replace, &replaces, &mut results)?;

    let updates = value_records(prefix, &request.update);
    cancel.check("update batch")?;
    apply_batch(&mut *session, WriteOp::Update, &updates, &mut results)?;

    cancel.check("commit")?;
    session.commit()?;
    session.release()?;

    debug!(
        deletes = deletes.len(),
        replaces = replaces.len(),
        updates = updates.len(),
        "Set committed"
    );

    Ok(SetResponse {
        prefix: request.prefix.clone(),
        response: results,
        timestamp: current_timestamp_nanos(),
        ..Default::default()
    })
}

/// Write one batch and record a result per written path.
fn apply_batch(
    session: &mut dyn DatastoreSession,
    op: WriteOp,
    records: &[ValueRecord],
    results: &mut Vec<UpdateResult>,
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let written = session.write_batch(op, records)?;
    for store_path in written {
        match path::protocol_path(&store_path) {
            Ok(path) => results.push(UpdateResult {
                path: Some(path),
                op: operation(op) as i32,
                ..Default::default()
            }),
            Err(e) => {
                warn!(path = %store_path, %op, error = %e, "Written path has no protocol form");
            }
        }
    }
    Ok(())
}

fn operation(op: WriteOp) -> update_result::Operation {
    match op {
        WriteOp::Delete => update_result::Operation::Delete,
        WriteOp::Replace => update_result::Operation::Replace,
        WriteOp::Update => update_result::Operation::Update,
    }
}

/// Store path of one Set item, or `None` (logged) if it cannot be rendered.
fn item_path(prefix: Option<&Path>, item: Option<&Path>) -> Option<String> {
    match path::store_path(prefix, item) {
        Ok(store_path) => Some(store_path),
        Err(e) => {
            warn!(error = %e, "Skipping Set item with invalid path");
            None
        }
    }
}

/// Records for replace or update items.
///
/// Structured JSON payloads become a path-only record for the item followed
/// by one record per leaf. Items with unsupported value kinds are skipped.
fn value_records(prefix: Option<&Path>, items: &[Update]) -> Vec<ValueRecord> {
    let mut records = Vec::new();

    for item in items {
        let Some(store_path) = item_path(prefix, item.path.as_ref()) else {
            continue;
        };
        let Some(value) = item.val.as_ref().and_then(|v| v.value.as_ref()) else {
            warn!(path = %store_path, "Skipping Set item without a value");
            continue;
        };

        match payload(value) {
            Ok(Payload::Scalar(value)) => records.push(ValueRecord::with_value(store_path, value)),
            Ok(Payload::Tree(tree)) => {
                if tree.is_object() || tree.is_array() {
                    records.push(ValueRecord::new(store_path.as_str()));
                }
                records.extend(flatten(&tree, &store_path));
            }
            Err(e) => warn!(path = %store_path, error = %e, "Skipping Set item"),
        }
    }

    records
}

/// A Set value ready for the datastore.
enum Payload {
    Scalar(RecordValue),
    Tree(serde_json::Value),
}

fn payload(value: &typed_value::Value) -> Result<Payload> {
    use typed_value::Value;

    let scalar = |v: RecordValue| Ok(Payload::Scalar(v));

    match value {
        Value::StringVal(s) | Value::AsciiVal(s) => scalar(RecordValue::Str(s.clone())),
        Value::IntVal(i) => scalar(RecordValue::Int(*i)),
        Value::UintVal(u) => match i64::try_from(*u) {
            Ok(i) => scalar(RecordValue::Int(i)),
            Err(_) => scalar(RecordValue::Str(u.to_string())),
        },
        Value::BoolVal(b) => scalar(RecordValue::Str(b.to_string())),
        Value::FloatVal(f) => scalar(RecordValue::Str(f.to_string())),
        Value::DoubleVal(d) => scalar(RecordValue::Str(d.to_string())),
        Value::DecimalVal(d) => scalar(RecordValue::Str(format_decimal(d.digits, d.precision))),
        Value::JsonVal(bytes) | Value::JsonIetfVal(bytes) => serde_json::from_slice(bytes)
            .map(Payload::Tree)
            .map_err(|e| GatewayError::decode(format!("invalid JSON payload: {}", e))),
        Value::BytesVal(_) => Err(unsupported("bytes_val")),
        Value::LeaflistVal(_) => Err(unsupported("leaflist_val")),
        Value::AnyVal(_) => Err(unsupported("any_val")),
        Value::ProtoBytes(_) => Err(unsupported("proto_bytes")),
    }
}

fn unsupported(kind: &str) -> GatewayError {
    GatewayError::decode(format!("unsupported value kind {}", kind))
}

/// Render a Decimal64 exactly: `digits * 10^-precision`.
fn format_decimal(digits: i64, precision: u32) -> String {
    if precision == 0 {
        return digits.to_string();
    }

    let magnitude = digits.unsigned_abs().to_string();
    let precision = precision as usize;
    let padded = format!("{:0>width$}", magnitude, width = precision + 1);
    let (whole, fraction) = padded.split_at(padded.len() - precision);
    let sign = if digits < 0 { "-" } else { "" };

    format!("{}{}.{}", sign, whole, fraction)
}
