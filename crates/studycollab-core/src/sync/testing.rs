//! In-memory remote store for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use super::engine::CancelToken;
use super::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::models::NetworkStatus;
use crate::util::{record_id, updated_at_millis};

/// Remote store backed by a map, with scriptable failures and a call log
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    rows: Mutex<BTreeMap<(String, String), Value>>,
    failures: Mutex<VecDeque<RemoteError>>,
    always_fail: Mutex<Option<RemoteError>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    offline: Mutex<bool>,
    cancel_on_write: Mutex<Option<CancelToken>>,
}

impl ScriptedRemote {
    pub fn insert_row(&self, table: &str, row: Value) {
        let id = record_id(&row).unwrap_or_default();
        self.rows
            .lock()
            .unwrap()
            .insert((table.to_string(), id), row);
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(&(table.to_string(), id.to_string()))
            .cloned()
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Fail every call with `error` until cleared.
    pub fn fail_always(&self, error: Option<RemoteError>) {
        *self.always_fail.lock().unwrap() = error;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    /// Cancel `token` once the next write has been accepted.
    pub fn cancel_on_first_write(&self, token: CancelToken) {
        *self.cancel_on_write.lock().unwrap() = Some(token);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn begin(&self, call: String) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.always_fail.lock().unwrap().clone() {
            return Err(error);
        }
        let is_write = ["create ", "update ", "delete "]
            .iter()
            .any(|prefix| call.starts_with(prefix));
        if is_write {
            if let Some(token) = self.cancel_on_write.lock().unwrap().take() {
                token.cancel();
            }
        }
        Ok(())
    }
}

impl RemoteStore for ScriptedRemote {
    async fn create(&self, table: &str, data: &Value) -> RemoteResult<Value> {
        let id = record_id(data).unwrap_or_default();
        self.begin(format!("create {table}/{id}")).await?;
        let mut rows = self.rows.lock().unwrap();
        let key = (table.to_string(), id);
        if let Some(existing) = rows.get(&key) {
            return Err(RemoteError::Conflict {
                remote: Some(existing.clone()),
                message: "duplicate key".to_string(),
            });
        }
        rows.insert(key, data.clone());
        Ok(data.clone())
    }

    async fn update(&self, table: &str, id: &str, data: &Value) -> RemoteResult<Value> {
        self.begin(format!("update {table}/{id}")).await?;
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&(table.to_string(), id.to_string())) else {
            return Err(RemoteError::NotFound(format!("{table}/{id}")));
        };
        if let (Value::Object(row), Value::Object(patch)) = (&mut *row, data) {
            for (key, value) in patch {
                row.insert(key.clone(), value.clone());
            }
        } else {
            *row = data.clone();
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        self.begin(format!("delete {table}/{id}")).await?;
        self.rows
            .lock()
            .unwrap()
            .remove(&(table.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(format!("{table}/{id}")))
    }

    async fn fetch(&self, table: &str, id: &str) -> RemoteResult<Option<Value>> {
        self.begin(format!("fetch {table}/{id}")).await?;
        Ok(self.row(table, id))
    }

    async fn fetch_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<i64>,
    ) -> RemoteResult<Vec<Value>> {
        self.begin(format!("fetch_since {table}")).await?;
        let mut rows: Vec<Value> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((row_table, _), _)| row_table == table)
            .map(|(_, row)| row.clone())
            .filter(|row| row.get("user_id").and_then(Value::as_str) == Some(user_id))
            .filter(|row| {
                since.map_or(true, |since| {
                    updated_at_millis(row).is_some_and(|updated_at| updated_at > since)
                })
            })
            .collect();
        rows.sort_by_key(|row| updated_at_millis(row).unwrap_or_default());
        Ok(rows)
    }

    async fn probe(&self) -> RemoteResult<NetworkStatus> {
        if *self.offline.lock().unwrap() {
            Ok(NetworkStatus::offline())
        } else {
            Ok(NetworkStatus::online())
        }
    }
}
