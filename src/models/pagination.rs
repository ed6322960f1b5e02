use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::job_status::{reconcile_total, JobCounters, JobState};

/// 分页处理的本地状态，只由 PaginatedController 修改
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    pub is_active: bool,
    pub current_chunk_index: usize,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub failed_chunks: usize,
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub skipped_files: u64,
    /// 启动时从服务端接管的已有任务
    pub is_existing_batch: bool,
}

impl PaginationState {
    /// 用新的累计计数覆盖聚合值，并执行计数对账
    pub fn apply_counts(&mut self, processed: u64, failed: u64, skipped: u64) {
        self.processed_files = processed;
        self.failed_files = failed;
        self.skipped_files = skipped;
        self.total_files = reconcile_total(processed + failed + skipped, self.total_files);
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(
            self.processed_files,
            self.failed_files,
            self.skipped_files,
            self.total_files,
        )
    }
}

/// 分块提交记录（只追加，完成时原地更新）
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHistoryEntry {
    pub chunk_index: usize,
    pub job_id: String,
    pub file_count: usize,
    pub status: JobState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// 该分块最近一次上报的计数
    pub counters: JobCounters,
}

impl ChunkHistoryEntry {
    pub fn started(chunk_index: usize, job_id: impl Into<String>, file_count: usize) -> Self {
        Self {
            chunk_index,
            job_id: job_id.into(),
            file_count,
            status: JobState::Processing,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            counters: JobCounters::default(),
        }
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).num_seconds())
    }
}

/// 展示用的进度快照，总数已对账
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

impl ProgressSnapshot {
    pub fn new(processed: u64, failed: u64, skipped: u64, total: u64) -> Self {
        Self {
            processed,
            failed,
            skipped,
            total: reconcile_total(processed + failed + skipped, total),
        }
    }

    pub fn from_counters(counters: &JobCounters) -> Self {
        Self::new(counters.processed, counters.failed, counters.skipped, counters.total)
    }

    pub fn done(&self) -> u64 {
        self.processed + self.failed + self.skipped
    }

    /// 完成百分比（0-100）
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.done() as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "已处理 {}/{} 个文件", self.done(), self.total)
    }
}
