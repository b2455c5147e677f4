//! Divergence detection and field-level merge.

use serde_json::{Map, Value};

use crate::models::SyncQueueItem;
use crate::util::updated_at_millis;

/// Whether `remote` changed since the local change was made.
///
/// The remote row must carry a newer `updated_at` than the item and differ
/// from the snapshot the local change was based on.
pub fn has_diverged(item: &SyncQueueItem, remote: &Value) -> bool {
    let Some(remote_updated_at) = updated_at_millis(remote) else {
        return false;
    };
    if remote_updated_at <= item.timestamp {
        return false;
    }
    item.base
        .as_ref()
        .map_or(true, |base| differs_from_base(base, remote))
}

fn differs_from_base(base: &Value, remote: &Value) -> bool {
    match (base, remote) {
        (Value::Object(base), Value::Object(remote)) => remote
            .iter()
            .any(|(key, value)| base.get(key) != Some(value)),
        _ => base != remote,
    }
}

/// Field-level three-way merge.
///
/// Fields changed only locally keep the local value, fields changed only
/// remotely keep the remote value, and fields changed on both sides take the
/// side with the newer timestamp (remote on ties). Without a base, every
/// field present in `local` counts as locally changed.
pub fn merge_records(
    base: Option<&Value>,
    local: &Value,
    remote: &Value,
    local_updated_at: i64,
    remote_updated_at: Option<i64>,
) -> Value {
    let local_is_newer = remote_updated_at.map_or(true, |remote_ts| local_updated_at > remote_ts);

    let (Value::Object(local_fields), Value::Object(remote_fields)) = (local, remote) else {
        return if local_is_newer {
            local.clone()
        } else {
            remote.clone()
        };
    };
    let base_fields = base.and_then(Value::as_object);

    let mut merged: Map<String, Value> = remote_fields.clone();
    for (key, local_value) in local_fields {
        let base_value = base_fields.and_then(|fields| fields.get(key));
        let local_touched = base_fields.map_or(true, |_| base_value != Some(local_value));
        if !local_touched {
            continue;
        }

        let remote_value = remote_fields.get(key);
        let remote_touched = match base_fields {
            Some(_) => remote_value != base_value,
            None => remote_value.is_some_and(|value| value != local_value),
        };

        if !remote_touched || local_is_newer {
            merged.insert(key.clone(), local_value.clone());
        }
    }

    Value::Object(merged)
}
