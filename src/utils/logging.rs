use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和运行报告的辅助函数
use std::fs;
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::pagination::{ChunkHistoryEntry, PaginationState};

/// 初始化 tracing 日志
///
/// `RUST_LOG` 优先，否则按 `verbose` 选择 debug 或 info 级别
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化运行报告文件
///
/// # 参数
/// - `log_file_path`: 报告文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批处理运行报告 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 向运行报告追加一行
pub fn append_report_line(log_file_path: &str, line: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// 分块记录的报告行
pub fn format_chunk_line(entry: &ChunkHistoryEntry) -> String {
    let duration = entry
        .duration_secs()
        .map(|s| format!("{}s", s))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "分块 #{} | {} | {} 个文件 | 状态: {} | 成功 {} 失败 {} 跳过 {} | 耗时 {}",
        entry.chunk_index + 1,
        entry.job_id,
        entry.file_count,
        entry.status,
        entry.counters.processed,
        entry.counters.failed,
        entry.counters.skipped,
        duration
    );
    if let Some(error) = &entry.error {
        line.push_str(&format!(" | 错误: {}", truncate_text(error, 120)));
    }
    line
}

/// 记录程序启动信息
pub fn log_startup(api_base_url: &str, chunk_size: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 分块批处理模式");
    info!("🌐 批处理服务: {}", api_base_url);
    info!("📦 分块大小: {}", chunk_size);
    info!("{}", "=".repeat(60));
}

/// 记录分块开始信息
///
/// # 参数
/// - `chunk_index`: 分块序号（从 0 开始）
/// - `total_chunks`: 分块总数
/// - `file_count`: 本块文件数
/// - `job_id`: 任务 ID
pub fn log_chunk_start(chunk_index: usize, total_chunks: usize, file_count: usize, job_id: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 块", chunk_index + 1, total_chunks);
    info!("📄 本块文件: {} 个 | 任务: {}", file_count, job_id);
    info!("{}", "=".repeat(60));
}

/// 记录分块完成信息
pub fn log_chunk_complete(entry: &ChunkHistoryEntry) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 块结束 ({}): 成功 {}/{}",
        entry.chunk_index + 1,
        entry.status,
        entry.counters.processed,
        entry.file_count
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(state: &PaginationState, log_file_path: &str) {
    let progress = state.progress();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "📦 分块: 完成 {} / 失败 {} / 共 {}",
        state.processed_chunks, state.failed_chunks, state.total_chunks
    );
    info!("✅ 成功: {}/{}", progress.processed, progress.total);
    info!("❌ 失败: {}", progress.failed);
    info!("⏭️ 跳过: {}", progress.skipped);
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
