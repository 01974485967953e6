//! Advisory integrity flags and their delivery to the notification sink.
//!
//! Flags never decide anything by themselves; they are the audit trail the
//! decision engine leaves behind. Delivery is fire-and-forget over the
//! broadcast notifier; a failed send is logged and swallowed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use util::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlagKind {
    RapidAttempt,
    ProxyAttempt,
    LocationMismatch,
    LateAttendance,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityFlag {
    pub kind: FlagKind,
    pub subject_id: i64,
    pub schedule_id: Option<i64>,
    pub message: String,
    pub flagged_at: DateTime<Utc>,
}

impl IntegrityFlag {
    pub fn new(
        kind: FlagKind,
        subject_id: i64,
        schedule_id: Option<i64>,
        message: impl Into<String>,
        flagged_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            subject_id,
            schedule_id,
            message: message.into(),
            flagged_at,
        }
    }
}

/// Topic carrying flags for a single subject.
pub fn subject_topic(subject_id: i64) -> String {
    format!("integrity:subject:{subject_id}")
}

/// Firehose topic carrying every flag.
pub const ALL_TOPIC: &str = "integrity:all";

/// Broadcasts a flag to the subject topic and the firehose. Never fails:
/// serialization problems are logged at debug and dropped.
pub async fn emit(notifier: &Notifier, flag: &IntegrityFlag) {
    let payload = match serde_json::to_string(flag) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "failed to serialize integrity flag; dropping");
            return;
        }
    };
    notifier
        .broadcast(&subject_topic(flag.subject_id), payload.clone())
        .await;
    notifier.broadcast(ALL_TOPIC, payload).await;
}

/// Emits every flag in order.
pub async fn emit_all(notifier: &Notifier, flags: &[IntegrityFlag]) {
    for flag in flags {
        emit(notifier, flag).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_flag_reaches_subject_topic_as_json() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe(&subject_topic(42)).await;

        let flag = IntegrityFlag::new(
            FlagKind::RapidAttempt,
            42,
            None,
            "two claims in one minute",
            Utc::now(),
        );
        emit(&notifier, &flag).await;

        let msg = rx.recv().await.expect("flag delivered");
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["kind"], "rapid_attempt");
        assert_eq!(parsed["subject_id"], 42);
    }

    #[tokio::test]
    async fn emit_without_subscribers_never_fails() {
        let notifier = Notifier::new();
        let flag = IntegrityFlag::new(
            FlagKind::LateAttendance,
            7,
            Some(3),
            "9 minutes late",
            Utc::now(),
        );
        emit(&notifier, &flag).await;
        emit_all(&notifier, &[flag]).await;
    }
}
