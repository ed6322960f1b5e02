//! 远端任务状态
//!
//! 服务端返回的状态是一个松散的 JSON 对象，这里先解析为 [`RawJobStatus`]，
//! 再在客户端边界上校验并转换为封闭的 [`JobStatus`]。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 任务状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl JobState {
    /// 终止状态之后不会再有任何状态迁移
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error | JobState::Cancelled)
    }

    /// 任务仍然占用处理器（含排队和暂停）
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Queued | JobState::Processing | JobState::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务端原始状态（线上格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawJobStatus {
    pub status: JobState,
    #[serde(default)]
    pub processed_count: i64,
    #[serde(default)]
    pub failed_count: i64,
    #[serde(default)]
    pub skipped_count: i64,
    #[serde(default)]
    pub total_files: i64,
    #[serde(default)]
    pub current_file_index: i64,
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    #[serde(default)]
    pub average_processing_time: Option<f64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub queue_position: Option<u64>,
    #[serde(default)]
    pub estimated_start_time: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub logs: Vec<Value>,
}

/// 文件计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounters {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

impl JobCounters {
    /// 已经结束（成功、失败、跳过）的文件数
    pub fn done(&self) -> u64 {
        self.processed + self.failed + self.skipped
    }

    /// 对账后的总数：重复处理导致计数超过总数时，总数上调到计数之和
    pub fn reconciled_total(&self) -> u64 {
        reconcile_total(self.done(), self.total)
    }
}

/// 计数对账
///
/// `done` 超过已知总数时返回 `done`，否则保持原总数
pub fn reconcile_total(done: u64, known_total: u64) -> u64 {
    known_total.max(done)
}

/// 处理中 / 暂停时的进度信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub current_file_index: u64,
    pub current_file: Option<String>,
    pub estimated_time_remaining: Option<f64>,
    pub average_processing_time: Option<f64>,
}

/// 按状态区分的可选字段
#[derive(Debug, Clone, PartialEq)]
pub enum JobPhase {
    Queued {
        queue_position: Option<u64>,
        estimated_start_time: Option<String>,
    },
    Processing(Progress),
    Paused(Progress),
    Completed,
    Error {
        message: Option<String>,
    },
    Cancelled,
}

/// 校验后的任务状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub counters: JobCounters,
    pub phase: JobPhase,
    pub start_time: Option<String>,
    pub results: Vec<Value>,
    pub errors: Vec<Value>,
    pub logs: Vec<Value>,
}

impl JobStatus {
    /// 构造一个只有状态和计数的快照（主要用于测试和本地合成）
    pub fn new(state: JobState, counters: JobCounters) -> Self {
        let phase = match state {
            JobState::Queued => JobPhase::Queued {
                queue_position: None,
                estimated_start_time: None,
            },
            JobState::Processing => JobPhase::Processing(Progress::default()),
            JobState::Paused => JobPhase::Paused(Progress::default()),
            JobState::Completed => JobPhase::Completed,
            JobState::Error => JobPhase::Error { message: None },
            JobState::Cancelled => JobPhase::Cancelled,
        };
        Self {
            counters,
            phase,
            start_time: None,
            results: Vec::new(),
            errors: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        match self.phase {
            JobPhase::Queued { .. } => JobState::Queued,
            JobPhase::Processing(_) => JobState::Processing,
            JobPhase::Paused(_) => JobState::Paused,
            JobPhase::Completed => JobState::Completed,
            JobPhase::Error { .. } => JobState::Error,
            JobPhase::Cancelled => JobState::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn progress(&self) -> Option<&Progress> {
        match &self.phase {
            JobPhase::Processing(p) | JobPhase::Paused(p) => Some(p),
            _ => None,
        }
    }

    /// 错误状态下的错误信息
    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            JobPhase::Error { message } => message.as_deref(),
            _ => None,
        }
    }
}

impl TryFrom<RawJobStatus> for JobStatus {
    type Error = String;

    fn try_from(raw: RawJobStatus) -> Result<Self, Self::Error> {
        let counters = JobCounters {
            processed: non_negative("processed_count", raw.processed_count)?,
            failed: non_negative("failed_count", raw.failed_count)?,
            skipped: non_negative("skipped_count", raw.skipped_count)?,
            total: non_negative("total_files", raw.total_files)?,
        };
        // 重复处理时服务端的序号会越过 total_files，按对账后的总数截断
        let current_file_index = non_negative("current_file_index", raw.current_file_index)?
            .min(counters.reconciled_total());

        let progress = || Progress {
            current_file_index,
            current_file: raw.current_file.clone(),
            estimated_time_remaining: raw.estimated_time_remaining,
            average_processing_time: raw.average_processing_time,
        };

        let phase = match raw.status {
            JobState::Queued => JobPhase::Queued {
                queue_position: raw.queue_position,
                estimated_start_time: raw.estimated_start_time.clone(),
            },
            JobState::Processing => JobPhase::Processing(progress()),
            JobState::Paused => JobPhase::Paused(progress()),
            JobState::Completed => JobPhase::Completed,
            JobState::Error => JobPhase::Error {
                message: raw.error.clone().or_else(|| last_error_text(&raw.errors)),
            },
            JobState::Cancelled => JobPhase::Cancelled,
        };

        Ok(Self {
            counters,
            phase,
            start_time: raw.start_time,
            results: raw.results,
            errors: raw.errors,
            logs: raw.logs,
        })
    }
}

fn non_negative(field: &str, value: i64) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("{} 不能为负数: {}", field, value))
}

/// 从 errors 列表中取最后一条可读的错误信息
fn last_error_text(errors: &[Value]) -> Option<String> {
    errors.iter().rev().find_map(|e| match e {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<JobStatus, String> {
        let raw: RawJobStatus = serde_json::from_str(json).map_err(|e| e.to_string())?;
        JobStatus::try_from(raw)
    }

    #[test]
    fn test_processing_status_keeps_progress_fields() {
        let status = parse(
            r#"{"status":"processing","processed_count":4,"failed_count":1,"skipped_count":0,
                "total_files":10,"current_file_index":5,"current_file":"x.pdf",
                "estimated_time_remaining":12.5,"start_time":"2024-05-01T10:00:00"}"#,
        )
        .unwrap();

        assert_eq!(status.state(), JobState::Processing);
        assert_eq!(status.counters.done(), 5);
        let progress = status.progress().unwrap();
        assert_eq!(progress.current_file_index, 5);
        assert_eq!(progress.current_file.as_deref(), Some("x.pdf"));
        assert_eq!(progress.estimated_time_remaining, Some(12.5));
    }

    #[test]
    fn test_queued_status_carries_queue_position() {
        let status = parse(r#"{"status":"queued","total_files":3,"queue_position":2}"#).unwrap();
        assert_eq!(
            status.phase,
            JobPhase::Queued {
                queue_position: Some(2),
                estimated_start_time: None
            }
        );
        assert!(status.progress().is_none());
    }

    #[test]
    fn test_error_message_falls_back_to_errors_list() {
        let status = parse(
            r#"{"status":"error","errors":[{"file":"a.pdf","error":"bad page"},"engine crashed"]}"#,
        )
        .unwrap();
        assert_eq!(status.error_message(), Some("engine crashed"));

        let status = parse(r#"{"status":"error","error":"disk full","errors":["x"]}"#).unwrap();
        assert_eq!(status.error_message(), Some("disk full"));
    }

    #[test]
    fn test_rejects_unknown_status_and_negative_counts() {
        assert!(parse(r#"{"status":"exploded"}"#).is_err());
        assert!(parse(r#"{"status":"processing","processed_count":-1}"#).is_err());
    }

    #[test]
    fn test_drifted_counts_are_accepted_and_reconciled() {
        let status = parse(
            r#"{"status":"completed","processed_count":3,"total_files":2,"current_file_index":3}"#,
        )
        .unwrap();
        assert_eq!(status.state(), JobState::Completed);
        assert_eq!(status.counters.done(), 3);
        assert_eq!(status.counters.reconciled_total(), 3);
        assert_eq!(
            crate::models::pagination::ProgressSnapshot::from_counters(&status.counters).to_string(),
            "已处理 3/3 个文件"
        );

        let status = parse(
            r#"{"status":"processing","processed_count":1,"total_files":2,"current_file_index":7}"#,
        )
        .unwrap();
        assert_eq!(status.progress().unwrap().current_file_index, 2);
    }

    #[test]
    fn test_reconciled_total_raises_to_sum() {
        let counters = JobCounters {
            processed: 3,
            failed: 0,
            skipped: 0,
            total: 2,
        };
        assert_eq!(counters.reconciled_total(), 3);

        let counters = JobCounters {
            processed: 1,
            failed: 1,
            skipped: 0,
            total: 5,
        };
        assert_eq!(counters.reconciled_total(), 5);
    }

    #[test]
    fn test_state_classification() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Paused.is_terminal());
        assert!(JobState::Paused.is_active());
        assert!(JobState::Queued.is_active());
        assert!(!JobState::Error.is_active());
    }
}
