//! 客户端生成的任务 ID
//!
//! - 单批次：`{prefix}_{timestamp}_{random}`
//! - 分块：`paginated_{prefix}_{timestamp}_chunk_{index}_{random}`
//!
//! 分块序号只用于排查问题，控制器从不反向解析。

use chrono::Utc;
use uuid::Uuid;

const RANDOM_LEN: usize = 9;

/// 单批次任务 ID
pub fn single_job_id(prefix: &str) -> String {
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), random_suffix())
}

/// 分块任务 ID
pub fn chunk_job_id(prefix: &str, chunk_index: usize) -> String {
    format!(
        "paginated_{}_{}_chunk_{}_{}",
        prefix,
        Utc::now().timestamp_millis(),
        chunk_index,
        random_suffix()
    )
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..RANDOM_LEN].to_string()
}
