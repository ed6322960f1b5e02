//! 分页（分块）控制器 - 编排层
//!
//! ## 职责
//!
//! 1. **分块提交**：展开选择 → 过滤已处理文件 → 切块，逐块提交
//! 2. **进度聚合**：从各分块最近一次上报的计数重新计算总进度（不做累加）
//! 3. **自动推进**：分块完成后异步提交下一块，可选分块间暂停
//! 4. **启动恢复**：接管服务端唯一一个仍在运行的任务，不重新提交
//! 5. **取消与清理**：停止时取消尚未开始的定时器，迟到的提交会被远端停止，终止状态延迟清理
//!
//! ## 状态机
//!
//! ```text
//! NotStarted → Chunk[0] → Chunk[1] → … → Chunk[N-1] → Finalizing → Idle
//!                 └──────── stop / error 在任意分块边界中断 ────────┘
//! ```
//!
//! 所有共享状态都在一把锁之后，锁从不跨越 `.await` 或回调持有。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::clients::{BatchApi, ControlAction};
use crate::config::ControllerConfig;
use crate::error::{AppError, AppResult, ValidationError};
use crate::models::file_ref::{Chunk, SelectionEntry};
use crate::models::job_id::chunk_job_id;
use crate::models::job_status::{JobCounters, JobState, JobStatus};
use crate::models::pagination::{ChunkHistoryEntry, PaginationState, ProgressSnapshot};
use crate::models::settings::{PaginationSettings, ProcessingSettings, SettingsPayload};
use crate::services::status_poller::{initial_interval, interval_for, ErrorCallback, StatusCallback};
use crate::services::{ChunkPlanner, PollerState, StatusPoller, TaskSlot};
use crate::utils::logging::{log_chunk_complete, log_chunk_start};

/// 当前正在跟踪的任务
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentBatch {
    pub job_id: String,
    /// 接管的已有任务没有分块序号
    pub chunk_index: Option<usize>,
    pub status: Option<JobStatus>,
}

/// 启动恢复的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 服务端没有运行中的任务
    Idle,
    /// 接管了唯一的运行中任务
    Adopted(String),
    /// 存在多个运行中任务，无法判断该接管哪一个
    Ambiguous(Vec<String>),
}

#[derive(Default)]
struct PaginatedState {
    selection: Vec<SelectionEntry>,
    settings: ProcessingSettings,
    pagination_settings: PaginationSettings,
    pagination: PaginationState,
    chunks: Vec<Chunk>,
    history: Vec<ChunkHistoryEntry>,
    current: Option<CurrentBatch>,
    /// 接管任务的最近计数
    adopted_counters: Option<JobCounters>,
    /// 任务 ID → 已处理过的终止状态
    handled_terminal: HashMap<String, JobState>,
    error: Option<String>,
    /// 每次启动或停止都会递增，提交返回时据此判断这一轮是否仍然有效
    run: u64,
}

impl PaginatedState {
    fn is_current(&self, job_id: &str) -> bool {
        self.current.as_ref().map_or(false, |c| c.job_id == job_id)
    }

    /// 从分块记录重新计算聚合计数并对账
    fn recompute_aggregates(&mut self) {
        let mut processed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let counters = self
            .history
            .iter()
            .map(|entry| &entry.counters)
            .chain(self.adopted_counters.as_ref());
        for c in counters {
            processed += c.processed;
            failed += c.failed;
            skipped += c.skipped;
        }
        self.pagination.apply_counts(processed, failed, skipped);
    }

    /// 当前仍可能在远端运行的任务，已结束的任务无需再通知停止
    fn active_job_id(&self) -> Option<String> {
        let current = self.current.as_ref()?;
        let finished = current.status.as_ref().map_or(false, JobStatus::is_terminal)
            || self.handled_terminal.contains_key(&current.job_id);
        (!finished).then(|| current.job_id.clone())
    }

    fn history_entry_mut(&mut self, job_id: &str) -> Option<&mut ChunkHistoryEntry> {
        self.history.iter_mut().rev().find(|e| e.job_id == job_id)
    }
}

struct PaginatedInner {
    api: Arc<dyn BatchApi>,
    planner: ChunkPlanner,
    config: ControllerConfig,
    poller: StatusPoller,
    state: Mutex<PaginatedState>,
    /// 推进到下一块（零延迟，跳出同步的状态更新链）
    advance: TaskSlot,
    /// 分块间暂停
    pause: TaskSlot,
    /// 终止状态的延迟清理
    cleanup: TaskSlot,
    alive: AtomicBool,
}

/// 分页控制器
#[derive(Clone)]
pub struct PaginatedController {
    inner: Arc<PaginatedInner>,
}

impl PaginatedController {
    pub fn new(api: Arc<dyn BatchApi>, config: ControllerConfig) -> AppResult<Self> {
        let planner = ChunkPlanner::new(api.clone())?;

        let inner = Arc::new_cyclic(|weak: &Weak<PaginatedInner>| {
            let on_status: StatusCallback = {
                let weak = weak.clone();
                Arc::new(move |job_id: &str, status: JobStatus| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_status(job_id, status);
                    }
                })
            };
            let on_error: ErrorCallback = {
                let weak = weak.clone();
                Arc::new(move |job_id: &str, err: AppError| {
                    if let Some(inner) = weak.upgrade() {
                        inner.record_error(format!("获取任务 {} 状态失败: {}", job_id, err.user_message()));
                    }
                })
            };

            PaginatedInner {
                poller: StatusPoller::new(api.clone(), config.poll.clone(), on_status, on_error),
                api,
                planner,
                config,
                state: Mutex::new(PaginatedState::default()),
                advance: TaskSlot::new("advance"),
                pause: TaskSlot::new("pause-between-chunks"),
                cleanup: TaskSlot::new("cleanup"),
                alive: AtomicBool::new(true),
            }
        });

        Ok(Self { inner })
    }

    /// 设置待处理的选择列表
    pub fn set_selection(&self, selection: Vec<SelectionEntry>) {
        self.inner.state.lock().selection = selection;
    }

    /// 设置处理参数和分页参数
    pub fn set_settings(&self, settings: ProcessingSettings, pagination: PaginationSettings) {
        let mut state = self.inner.state.lock();
        state.settings = settings;
        state.pagination_settings = pagination;
    }

    /// 启动分页处理
    ///
    /// `continue_from_current` 为 true 时保留计数和分块记录，从当前分块继续
    pub async fn start_paginated(&self, continue_from_current: bool) -> AppResult<()> {
        let inner = &self.inner;
        let start_index = match inner.prepare_chunks(continue_from_current).await {
            Ok(index) => index,
            Err(e) => {
                inner.record_error(format!("启动分页处理失败: {}", e.user_message()));
                return Err(e);
            }
        };
        inner.process_chunk(start_index).await.map(|_| ())
    }

    /// 启动时恢复服务端仍在运行的任务
    pub async fn recover(&self) -> AppResult<RecoveryOutcome> {
        self.inner.recover().await
    }

    /// 用户停止：清空定时器、停止轮询、通知远端、重置分页状态
    pub async fn stop_paginated(&self) -> AppResult<()> {
        self.inner.stop_paginated().await
    }

    /// 暂停当前分块的任务
    pub async fn pause_current(&self) -> AppResult<()> {
        self.inner.control_current(ControlAction::Pause).await
    }

    /// 恢复当前分块的任务
    pub async fn resume_current(&self) -> AppResult<()> {
        self.inner.control_current(ControlAction::Resume).await
    }

    /// 处理分块的终止状态，重复投递时只生效一次
    ///
    /// 返回本次调用是否真正处理了该状态
    pub fn handle_chunk_completion(&self, job_id: &str, status: &JobStatus) -> bool {
        self.inner.handle_chunk_completion(job_id, status)
    }

    /// 卸载：清空所有定时器，回调不再生效，并尽力通知远端停止
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.alive.store(false, Ordering::SeqCst);
        inner.cancel_timers();

        let job_id = inner.state.lock().active_job_id();
        if let Some(job_id) = job_id {
            inner.notify_remote_stop(&job_id).await;
        }
    }

    pub fn pagination(&self) -> PaginationState {
        self.inner.state.lock().pagination.clone()
    }

    pub fn chunk_history(&self) -> Vec<ChunkHistoryEntry> {
        self.inner.state.lock().history.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.state.lock().chunks.len()
    }

    pub fn current_batch(&self) -> Option<CurrentBatch> {
        self.inner.state.lock().current.clone()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.state.lock().pagination.progress()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.inner.state.lock().error = None;
    }

    pub fn poller_state(&self) -> PollerState {
        self.inner.poller.state()
    }

    /// 分页处理仍在进行（含等待中的推进或暂停）
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().pagination.is_active
            || self.inner.advance.is_pending()
            || self.inner.pause.is_pending()
    }
}

impl PaginatedInner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// 展开、过滤、切块并写入状态，返回起始分块序号
    ///
    /// 继续处理时沿用已有的分块，已处理登记表的变化不会让分块错位
    async fn prepare_chunks(&self, continue_from_current: bool) -> AppResult<usize> {
        let (selection, skip, chunk_size) = {
            let mut state = self.state.lock();
            if state.pagination.is_active {
                return Err(ValidationError::AlreadyRunning {
                    job_id: state
                        .current
                        .as_ref()
                        .map(|c| c.job_id.clone())
                        .unwrap_or_default(),
                }
                .into());
            }
            state.error = None;
            state.run += 1;

            if continue_from_current && !state.chunks.is_empty() {
                let total_chunks = state.chunks.len();
                let start_index = state.pagination.current_chunk_index.min(total_chunks - 1);
                state.current = None;
                state.pagination.is_active = true;
                state.pagination.is_existing_batch = false;
                state.pagination.total_chunks = total_chunks;
                state.pagination.current_chunk_index = start_index;
                state.recompute_aggregates();
                info!("📋 继续分页处理: 共 {} 块，从第 {} 块开始", total_chunks, start_index + 1);
                return Ok(start_index);
            }

            if !continue_from_current {
                state.pagination = PaginationState::default();
                state.history.clear();
                state.adopted_counters = None;
            }
            (
                state.selection.clone(),
                state.pagination_settings.skip_processed,
                state.pagination_settings.chunk_size,
            )
        };

        let files = self.planner.expand(&selection).await?;
        if files.is_empty() {
            return Err(ValidationError::NoSupportedFiles.into());
        }
        let selected = files.len();

        let files = self.planner.filter_unprocessed(files, skip).await;
        if files.is_empty() {
            return Err(ValidationError::AllFilesProcessed { total: selected }.into());
        }

        let chunks = ChunkPlanner::split(&files, chunk_size)?;
        let total_chunks = chunks.len();

        let mut state = self.state.lock();
        state.chunks = chunks;
        state.current = None;
        state.pagination.is_active = true;
        state.pagination.is_existing_batch = false;
        state.pagination.total_chunks = total_chunks;
        state.pagination.current_chunk_index = 0;
        state.pagination.total_files = if continue_from_current {
            state.pagination.total_files.max(files.len() as u64)
        } else {
            files.len() as u64
        };
        state.recompute_aggregates();

        info!(
            "📋 分页处理: {} 个文件，{} 块，每块最多 {} 个",
            files.len(),
            total_chunks,
            chunk_size
        );
        Ok(0)
    }

    /// 提交单个分块并开始轮询
    async fn process_chunk(self: &Arc<Self>, index: usize) -> AppResult<String> {
        let (chunk, settings, pagination_settings, total_chunks, run) = {
            let state = self.state.lock();
            let chunk = state
                .chunks
                .get(index)
                .cloned()
                .ok_or(ValidationError::NoActiveBatch)?;
            (
                chunk,
                state.settings.clone(),
                state.pagination_settings.clone(),
                state.pagination.total_chunks,
                state.run,
            )
        };

        let job_id = chunk_job_id(&self.config.job_prefix, index);
        log_chunk_start(index, total_chunks, chunk.len(), &job_id);

        let result = self
            .api
            .start(
                &job_id,
                &chunk.files,
                SettingsPayload::chunked(&settings, &pagination_settings),
            )
            .await;

        let still_wanted = self.is_alive() && {
            let state = self.state.lock();
            state.run == run && state.pagination.is_active
        };
        if !still_wanted {
            if result.is_ok() {
                warn!("⚠️ 分块 {} 提交完成时处理已被停止，通知远端停止", index + 1);
                self.notify_remote_stop(&job_id).await;
            }
            return Err(ValidationError::NoActiveBatch.into());
        }

        match result {
            Ok(status) => {
                self.cleanup.cancel();
                let interval = initial_interval(&self.config.poll, status.state());
                {
                    let mut state = self.state.lock();
                    let mut entry = ChunkHistoryEntry::started(index, job_id.clone(), chunk.len());
                    entry.counters = status.counters;
                    state.history.push(entry);
                    state.pagination.current_chunk_index = index;
                    state.current = Some(CurrentBatch {
                        job_id: job_id.clone(),
                        chunk_index: Some(index),
                        status: Some(status),
                    });
                    state.recompute_aggregates();
                }
                self.poller.start(&job_id, interval);
                Ok(job_id)
            }
            Err(e) => {
                let message = format!("分块 {} 提交失败: {}", index + 1, e.user_message());
                error!("❌ {}", message);
                let mut state = self.state.lock();
                let mut entry = ChunkHistoryEntry::started(index, job_id.clone(), chunk.len());
                entry.status = JobState::Error;
                entry.end_time = Some(Utc::now());
                entry.error = Some(message.clone());
                state.history.push(entry);
                state.handled_terminal.insert(job_id, JobState::Error);
                state.pagination.failed_chunks += 1;
                state.pagination.current_chunk_index = index;
                state.pagination.is_active = false;
                state.error = Some(message);
                Err(e)
            }
        }
    }

    /// 轮询回调：合并状态、刷新聚合，终止状态进入完成处理
    fn handle_status(self: &Arc<Self>, job_id: &str, status: JobStatus) {
        if !self.is_alive() {
            return;
        }

        let terminal = status.is_terminal();
        {
            let mut state = self.state.lock();
            if !state.is_current(job_id) || state.handled_terminal.contains_key(job_id) {
                debug!("忽略过期任务 {} 的状态", job_id);
                return;
            }
            let is_adopted = state.pagination.is_existing_batch;
            if let Some(entry) = state.history_entry_mut(job_id) {
                entry.counters = status.counters;
            } else if is_adopted {
                state.adopted_counters = Some(status.counters);
            }
            state.recompute_aggregates();
            if let Some(current) = state.current.as_mut() {
                current.status = Some(status.clone());
            }
        }

        if terminal {
            self.handle_chunk_completion(job_id, &status);
        }
    }

    fn handle_chunk_completion(self: &Arc<Self>, job_id: &str, status: &JobStatus) -> bool {
        if !self.is_alive() {
            return false;
        }
        let job_state = status.state();

        let (advance, finished_entry) = {
            let mut state = self.state.lock();
            if let Some(previous) = state.handled_terminal.get(job_id) {
                if *previous != job_state {
                    warn!("任务 {} 已以 {} 结束，忽略后续的 {}", job_id, previous, job_state);
                } else {
                    debug!("任务 {} 的终止状态重复投递，忽略", job_id);
                }
                return false;
            }
            state.handled_terminal.insert(job_id.to_string(), job_state);

            let finished_entry = state.history_entry_mut(job_id).map(|entry| {
                entry.status = job_state;
                entry.end_time = Some(Utc::now());
                entry.counters = status.counters;
                entry.error = match job_state {
                    JobState::Error => Some(
                        status
                            .error_message()
                            .unwrap_or("处理服务报告错误")
                            .to_string(),
                    ),
                    _ => None,
                };
                entry.clone()
            });
            if finished_entry.is_none() && state.pagination.is_existing_batch {
                state.adopted_counters = Some(status.counters);
            }

            if job_state == JobState::Completed {
                state.pagination.processed_chunks += 1;
            } else {
                state.pagination.failed_chunks += 1;
            }
            state.recompute_aggregates();

            let has_more = state.pagination.current_chunk_index + 1 < state.pagination.total_chunks;
            let advance = job_state == JobState::Completed && has_more && state.pagination.is_active;
            if !advance {
                state.pagination.is_active = false;
            }
            if job_state == JobState::Error {
                state.error = Some(format!(
                    "任务 {} 处理失败: {}",
                    job_id,
                    status.error_message().unwrap_or("未知错误")
                ));
            }
            (advance, finished_entry)
        };

        if let Some(entry) = &finished_entry {
            log_chunk_complete(entry);
        }

        if advance {
            let weak = Arc::downgrade(self);
            self.advance.schedule(Duration::ZERO, async move {
                if let Some(inner) = weak.upgrade() {
                    inner.process_next_chunk().await;
                }
            });
        } else {
            info!("🏁 分页处理结束 (最后任务 {} 状态: {})", job_id, job_state);
            self.schedule_cleanup(job_id.to_string());
        }
        true
    }

    /// 推进到下一块，越过最后一块时结束分页处理
    async fn process_next_chunk(self: &Arc<Self>) {
        let (next, pause) = {
            let mut state = self.state.lock();
            if !self.is_alive() || !state.pagination.is_active {
                return;
            }
            let next = state.pagination.current_chunk_index + 1;
            if next >= state.pagination.total_chunks {
                state.pagination.is_active = false;
                state.current = None;
                return;
            }
            state.pagination.current_chunk_index = next;
            let pause = state
                .pagination_settings
                .pause_between_chunks
                .then(|| Duration::from_secs(state.pagination_settings.pause_duration));
            (next, pause)
        };

        match pause {
            Some(delay) if !delay.is_zero() => {
                info!("⏸️ 分块间暂停 {} 秒", delay.as_secs());
                let weak = Arc::downgrade(self);
                self.pause.schedule(delay, async move {
                    if let Some(inner) = weak.upgrade() {
                        let _ = inner.process_chunk(next).await;
                    }
                });
            }
            _ => {
                let _ = self.process_chunk(next).await;
            }
        }
    }

    async fn recover(self: &Arc<Self>) -> AppResult<RecoveryOutcome> {
        if let Some(current) = self.state.lock().current.as_ref() {
            return Err(ValidationError::AlreadyRunning {
                job_id: current.job_id.clone(),
            }
            .into());
        }

        let jobs = match self.api.list_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                self.record_error(format!("无法获取服务端任务列表: {}", e.user_message()));
                return Err(e);
            }
        };

        let mut active: Vec<(String, JobStatus)> = jobs
            .into_iter()
            .filter(|(_, status)| !status.is_terminal())
            .collect();

        match active.len() {
            0 => {
                debug!("服务端没有运行中的任务");
                Ok(RecoveryOutcome::Idle)
            }
            1 => {
                let (job_id, status) = active.remove(0);
                let interval = interval_for(&self.config.poll, status.state());
                {
                    let mut state = self.state.lock();
                    state.pagination = PaginationState {
                        is_active: true,
                        is_existing_batch: true,
                        total_chunks: 1,
                        current_chunk_index: 0,
                        total_files: status.counters.total,
                        ..Default::default()
                    };
                    state.chunks.clear();
                    state.adopted_counters = Some(status.counters);
                    state.recompute_aggregates();
                    state.current = Some(CurrentBatch {
                        job_id: job_id.clone(),
                        chunk_index: None,
                        status: Some(status),
                    });
                }
                info!("♻️ 接管服务端运行中的任务 {}", job_id);
                self.poller.start(&job_id, interval);
                Ok(RecoveryOutcome::Adopted(job_id))
            }
            n => {
                let ids: Vec<String> = active.into_iter().map(|(id, _)| id).collect();
                warn!("⚠️ 服务端有 {} 个运行中的任务，不自动接管: {:?}", n, ids);
                Ok(RecoveryOutcome::Ambiguous(ids))
            }
        }
    }

    async fn stop_paginated(self: &Arc<Self>) -> AppResult<()> {
        self.cancel_timers();

        let job_id = {
            let mut state = self.state.lock();
            let job_id = state.active_job_id();
            state.current = None;
            state.run += 1;
            state.pagination = PaginationState::default();
            state.chunks.clear();
            state.adopted_counters = None;
            job_id
        };
        info!("🛑 已停止分页处理");

        let Some(job_id) = job_id else {
            return Ok(());
        };

        match self.api.control(&job_id, ControlAction::Stop).await {
            Ok(status) => {
                self.mark_stopped(&job_id, status.state());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("任务 {} 已结束，无需停止", job_id);
                self.mark_stopped(&job_id, JobState::Cancelled);
                Ok(())
            }
            Err(e) => {
                self.record_error(format!("停止任务 {} 失败: {}", job_id, e.user_message()));
                Err(e)
            }
        }
    }

    /// 停止后把对应分块记录标为结束，之后的投递不再生效
    fn mark_stopped(&self, job_id: &str, reported: JobState) {
        let job_state = if reported.is_terminal() {
            reported
        } else {
            JobState::Cancelled
        };
        let mut state = self.state.lock();
        if state.handled_terminal.contains_key(job_id) {
            return;
        }
        state.handled_terminal.insert(job_id.to_string(), job_state);
        if let Some(entry) = state.history_entry_mut(job_id) {
            entry.status = job_state;
            entry.end_time = Some(Utc::now());
        }
    }

    async fn control_current(self: &Arc<Self>, action: ControlAction) -> AppResult<()> {
        let job_id = self
            .state
            .lock()
            .current
            .as_ref()
            .map(|c| c.job_id.clone())
            .ok_or(ValidationError::NoActiveBatch)?;

        match self.api.control(&job_id, action).await {
            Ok(status) => {
                info!("⏯️ 任务 {} 已{}: {}", job_id, action, status.state());
                self.handle_status(&job_id, status);
                Ok(())
            }
            Err(e) => {
                self.record_error(format!("{} 操作失败: {}", action, e.user_message()));
                Err(e)
            }
        }
    }

    /// 终止状态保留展示一段时间，只清理调度时对应的任务
    fn schedule_cleanup(self: &Arc<Self>, job_id: String) {
        let weak = Arc::downgrade(self);
        self.cleanup.schedule(self.config.cleanup_delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.is_current(&job_id) {
                state.current = None;
                state.pagination.is_existing_batch = false;
                debug!("🧹 已清理任务 {}", job_id);
            }
        });
    }

    /// 正在等待提交响应的任务不会被中断，它返回时发现这一轮已失效会自行停止远端任务
    fn cancel_timers(&self) {
        self.advance.cancel_unstarted();
        self.pause.cancel_unstarted();
        self.cleanup.cancel();
        self.poller.stop();
    }

    async fn notify_remote_stop(&self, job_id: &str) {
        match self.api.control(job_id, ControlAction::Stop).await {
            Ok(_) => info!("🛑 已通知远端停止任务 {}", job_id),
            Err(e) if e.is_not_found() => debug!("任务 {} 已结束", job_id),
            Err(e) => warn!("⚠️ 通知远端停止任务 {} 失败: {}", job_id, e),
        }
    }

    fn record_error(&self, message: String) {
        if !self.is_alive() {
            return;
        }
        warn!("⚠️ {}", message);
        self.state.lock().error = Some(message);
    }
}
