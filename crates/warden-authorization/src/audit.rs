//! Audit trail recording.
//!
//! Appends access decisions, policy violations, entity changes and session
//! events. Writes never fail the caller: errors are reported with
//! `tracing::warn!` and dropped. Statistics are computed on read.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use warden_db::models::{
    AccessLog, AuditQuery, ChangeHistory, NewAccessLog, NewChangeHistory, NewPolicyViolation,
    NewSessionLog, PolicyViolation, SessionLog,
};
use warden_db::{AuditRepository, DbResult};

use crate::error::Result;

/// How appends are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDispatch {
    /// Await the write before returning. Failures are still swallowed.
    Inline,
    /// Spawn the write onto the tokio runtime and return immediately.
    #[default]
    Background,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessStats {
    pub total: u64,
    pub allowed: u64,
    pub denied: u64,
    /// Allowed over total, `0.0` when empty.
    pub success_rate: f64,
    pub unique_users: u64,
    pub unique_paths: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationStats {
    pub total: u64,
    pub by_attribute: BTreeMap<String, u64>,
    pub unique_users: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub by_action: BTreeMap<String, u64>,
}

/// Append-only audit writer plus on-read aggregation.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditRepository>,
    dispatch: AuditDispatch,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditRepository>, dispatch: AuditDispatch) -> Self {
        Self { sink, dispatch }
    }

    #[must_use]
    pub fn dispatch(&self) -> AuditDispatch {
        self.dispatch
    }

    pub async fn log_access(&self, entry: NewAccessLog) {
        let sink = self.sink.clone();
        self.submit(
            "access_log",
            Box::pin(async move { sink.append_access_log(entry).await.map(drop) }),
        )
        .await;
    }

    pub async fn log_policy_violation(&self, entry: NewPolicyViolation) {
        let sink = self.sink.clone();
        self.submit(
            "policy_violation",
            Box::pin(async move { sink.append_policy_violation(entry).await.map(drop) }),
        )
        .await;
    }

    pub async fn log_change_history(&self, entry: NewChangeHistory) {
        let sink = self.sink.clone();
        self.submit(
            "change_history",
            Box::pin(async move { sink.append_change_history(entry).await.map(drop) }),
        )
        .await;
    }

    pub async fn log_session(&self, entry: NewSessionLog) {
        let sink = self.sink.clone();
        self.submit(
            "session_log",
            Box::pin(async move { sink.append_session_log(entry).await.map(drop) }),
        )
        .await;
    }

    async fn submit(&self, kind: &'static str, write: BoxFuture<'static, DbResult<()>>) {
        let handle = match self.dispatch {
            AuditDispatch::Background => Handle::try_current().ok(),
            AuditDispatch::Inline => None,
        };

        match handle {
            Some(handle) => {
                handle.spawn(async move {
                    if let Err(e) = write.await {
                        report_failure(kind, &e);
                    }
                });
            }
            None => {
                if let Err(e) = write.await {
                    report_failure(kind, &e);
                }
            }
        }
    }

    pub async fn access_logs(&self, query: &AuditQuery) -> Result<Vec<AccessLog>> {
        Ok(self.sink.list_access_logs(query).await?)
    }

    pub async fn policy_violations(&self, query: &AuditQuery) -> Result<Vec<PolicyViolation>> {
        Ok(self.sink.list_policy_violations(query).await?)
    }

    pub async fn change_history(&self, query: &AuditQuery) -> Result<Vec<ChangeHistory>> {
        Ok(self.sink.list_change_history(query).await?)
    }

    pub async fn session_logs(&self, query: &AuditQuery) -> Result<Vec<SessionLog>> {
        Ok(self.sink.list_session_logs(query).await?)
    }

    pub async fn access_stats(&self, query: &AuditQuery) -> Result<AccessStats> {
        let summary = self.sink.summarize_access_logs(query).await?;
        Ok(AccessStats {
            total: summary.total,
            allowed: summary.allowed,
            denied: summary.total.saturating_sub(summary.allowed),
            success_rate: ratio(summary.allowed, summary.total),
            unique_users: summary.unique_users,
            unique_paths: summary.unique_paths,
        })
    }

    pub async fn violation_stats(&self, query: &AuditQuery) -> Result<ViolationStats> {
        let summary = self.sink.summarize_policy_violations(query).await?;
        Ok(ViolationStats {
            total: summary.total,
            by_attribute: summary.by_attribute,
            unique_users: summary.unique_users,
        })
    }

    pub async fn session_stats(&self, query: &AuditQuery) -> Result<SessionStats> {
        let summary = self.sink.summarize_session_logs(query).await?;
        Ok(SessionStats {
            total: summary.total,
            successful: summary.successful,
            failed: summary.total.saturating_sub(summary.successful),
            success_rate: ratio(summary.successful, summary.total),
            by_action: summary.by_action,
        })
    }
}

fn report_failure(kind: &'static str, err: &warden_db::DbError) {
    tracing::warn!(
        target: "authorization",
        audit_kind = kind,
        error = %err,
        "Failed to append audit record"
    );
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
