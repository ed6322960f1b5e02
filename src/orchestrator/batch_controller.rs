//! 单批次控制器 - 编排层
//!
//! 负责一个不分块的任务从提交到终止状态的完整生命周期：
//! 提交、轮询、暂停/恢复/停止，以及状态合并。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::clients::{BatchApi, ControlAction};
use crate::config::ControllerConfig;
use crate::error::{AppError, AppResult, ValidationError};
use crate::models::file_ref::FileRef;
use crate::models::job_id::single_job_id;
use crate::models::job_status::{JobState, JobStatus};
use crate::models::pagination::ProgressSnapshot;
use crate::models::settings::{ProcessingSettings, SettingsPayload};
use crate::services::status_poller::{initial_interval, ErrorCallback, StatusCallback};
use crate::services::{PollerState, StatusPoller, TaskSlot};

/// 单批次的本地状态
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub job_id: Option<String>,
    pub status: Option<JobStatus>,
    pub is_processing: bool,
    /// 可关闭的错误提示，不会覆盖最后一次状态
    pub error: Option<String>,
}

struct BatchInner {
    api: Arc<dyn BatchApi>,
    config: ControllerConfig,
    poller: StatusPoller,
    state: Mutex<BatchState>,
    cleanup: TaskSlot,
    alive: AtomicBool,
}

/// 单批次控制器
#[derive(Clone)]
pub struct BatchController {
    inner: Arc<BatchInner>,
}

impl BatchController {
    pub fn new(api: Arc<dyn BatchApi>, config: ControllerConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<BatchInner>| {
            let on_status: StatusCallback = {
                let weak = weak.clone();
                Arc::new(move |job_id: &str, status: JobStatus| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_poll(job_id, status);
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

            BatchInner {
                poller: StatusPoller::new(api.clone(), config.poll.clone(), on_status, on_error),
                api,
                config,
                state: Mutex::new(BatchState::default()),
                cleanup: TaskSlot::new("batch-cleanup"),
                alive: AtomicBool::new(true),
            }
        });

        Self { inner }
    }

    /// 提交一个新批次并开始轮询，返回任务 ID
    pub async fn start(&self, files: &[FileRef], settings: &ProcessingSettings) -> AppResult<String> {
        let inner = &self.inner;

        if files.is_empty() {
            let err = AppError::from(ValidationError::EmptySelection);
            inner.record_error(err.user_message());
            return Err(err);
        }
        {
            let mut state = inner.state.lock();
            if state.is_processing {
                if let Some(job_id) = &state.job_id {
                    return Err(ValidationError::AlreadyRunning {
                        job_id: job_id.clone(),
                    }
                    .into());
                }
            }
            state.error = None;
        }

        let job_id = single_job_id(&inner.config.job_prefix);
        info!("🚀 提交批处理 {} ({} 个文件)", job_id, files.len());

        match inner
            .api
            .start(&job_id, files, SettingsPayload::single(settings))
            .await
        {
            Ok(status) => {
                inner.cleanup.cancel();
                let interval = initial_interval(&inner.config.poll, status.state());
                inner.state.lock().job_id = Some(job_id.clone());
                inner.update_status(status);
                inner.poller.start(&job_id, interval);
                Ok(job_id)
            }
            Err(e) => {
                let message = format!("启动批处理失败: {}", e.user_message());
                error!("❌ {}", message);
                let mut state = inner.state.lock();
                state.is_processing = false;
                state.error = Some(message);
                Err(e)
            }
        }
    }

    pub async fn pause(&self, job_id: &str) -> AppResult<()> {
        self.inner.control(job_id, ControlAction::Pause).await
    }

    pub async fn resume(&self, job_id: &str) -> AppResult<()> {
        self.inner.control(job_id, ControlAction::Resume).await
    }

    /// 停止任务；任务已经结束（404）时视为成功
    pub async fn stop(&self, job_id: &str) -> AppResult<()> {
        self.inner.control(job_id, ControlAction::Stop).await
    }

    /// 合并一次状态更新，也是轮询回调的入口
    pub fn update_status(&self, status: JobStatus) {
        self.inner.update_status(status);
    }

    /// 卸载：清空定时器并尽力通知远端停止
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.alive.store(false, Ordering::SeqCst);
        inner.cleanup.cancel();
        inner.poller.stop();

        let job_id = {
            let state = inner.state.lock();
            state.job_id.clone().filter(|_| state.is_processing)
        };
        if let Some(job_id) = job_id {
            match inner.api.control(&job_id, ControlAction::Stop).await {
                Ok(_) => info!("🛑 已通知远端停止任务 {}", job_id),
                Err(e) if e.is_not_found() => debug!("任务 {} 已结束", job_id),
                Err(e) => warn!("⚠️ 通知远端停止任务 {} 失败: {}", job_id, e),
            }
        }
    }

    pub fn state(&self) -> BatchState {
        self.inner.state.lock().clone()
    }

    pub fn job_id(&self) -> Option<String> {
        self.inner.state.lock().job_id.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().is_processing
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.inner.state.lock().error = None;
    }

    /// 对账后的进度
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.inner
            .state
            .lock()
            .status
            .as_ref()
            .map(|s| ProgressSnapshot::from_counters(&s.counters))
    }

    pub fn poller_state(&self) -> PollerState {
        self.inner.poller.state()
    }
}

impl BatchInner {
    fn handle_poll(self: &Arc<Self>, job_id: &str, status: JobStatus) {
        let is_current = self.state.lock().job_id.as_deref() == Some(job_id);
        if !is_current {
            debug!("忽略过期任务 {} 的状态", job_id);
            return;
        }
        self.update_status(status);
    }

    fn update_status(self: &Arc<Self>, status: JobStatus) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }

        let state = status.state();
        let job_id = {
            let mut batch = self.state.lock();
            batch.is_processing = state.is_active();
            batch.status = Some(status);
            batch.job_id.clone()
        };

        if state.is_terminal() {
            info!("🏁 批处理 {:?} 结束: {}", job_id, state);
            if let Some(job_id) = job_id {
                self.schedule_cleanup(job_id);
            }
        }
    }

    /// 终止状态保留展示一段时间后清空
    fn schedule_cleanup(self: &Arc<Self>, job_id: String) {
        let weak = Arc::downgrade(self);
        self.cleanup.schedule(self.config.cleanup_delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            let finished = state
                .status
                .as_ref()
                .map_or(true, |s| s.is_terminal());
            if state.job_id.as_deref() == Some(job_id.as_str()) && finished {
                state.job_id = None;
                state.status = None;
                state.is_processing = false;
                debug!("🧹 已清理批处理 {}", job_id);
            }
        });
    }

    async fn control(self: &Arc<Self>, job_id: &str, action: ControlAction) -> AppResult<()> {
        debug!("发送控制指令 {} -> {}", action, job_id);
        let result = self.api.control(job_id, action).await;
        let is_current = self.state.lock().job_id.as_deref() == Some(job_id);

        match result {
            Ok(status) => {
                if action == ControlAction::Stop {
                    self.poller.stop();
                }
                if is_current {
                    // 停止后不再轮询，非终止状态按已取消处理，保证清理会被调度
                    let status = if action == ControlAction::Stop && !status.is_terminal() {
                        JobStatus::new(JobState::Cancelled, status.counters)
                    } else {
                        status
                    };
                    self.update_status(status);
                }
                if action == ControlAction::Stop {
                    self.state.lock().is_processing = false;
                    info!("🛑 已停止批处理 {}", job_id);
                }
                Ok(())
            }
            Err(e) if action == ControlAction::Stop && e.is_not_found() => {
                warn!("任务 {} 已不存在，视为已停止", job_id);
                self.poller.stop();
                if is_current {
                    let last = self.state.lock().status.clone();
                    if !last.as_ref().map_or(false, JobStatus::is_terminal) {
                        let counters = last.map(|s| s.counters).unwrap_or_default();
                        self.update_status(JobStatus::new(JobState::Cancelled, counters));
                    }
                }
                self.state.lock().is_processing = false;
                Ok(())
            }
            Err(e) => {
                self.record_error(format!("{} 操作失败: {}", action, e.user_message()));
                Err(e)
            }
        }
    }

    fn record_error(&self, message: String) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        warn!("⚠️ {}", message);
        self.state.lock().error = Some(message);
    }
}
