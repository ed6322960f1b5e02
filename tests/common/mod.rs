#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use ocr_batch::clients::{BatchApi, ControlAction};
use ocr_batch::config::{ControllerConfig, PollIntervals};
use ocr_batch::error::{AppError, AppResult};
use ocr_batch::models::{FileRef, JobCounters, JobState, JobStatus, SelectionEntry, SettingsPayload};

/// 一次 start 调用的记录
#[derive(Debug, Clone)]
pub struct StartCall {
    pub job_id: String,
    pub file_ids: Vec<String>,
    pub settings: Value,
}

#[derive(Default)]
struct FakeState {
    /// 按提交顺序分配给新任务的状态脚本
    pending_scripts: VecDeque<Vec<JobStatus>>,
    scripts: HashMap<String, VecDeque<JobStatus>>,
    starts: Vec<StartCall>,
    status_calls: HashMap<String, usize>,
    controls: Vec<(String, ControlAction)>,
    jobs: Vec<(String, JobStatus)>,
    processed: Option<HashSet<String>>,
    folders: HashMap<String, Vec<FileRef>>,
    /// 第 n 次 start（从 0 开始）返回服务端错误
    fail_start_at: Option<usize>,
    /// 第 n 次 start 在返回前等待的时长
    start_delays: HashMap<usize, Duration>,
    /// 前 n 次状态查询返回服务端错误
    failing_status_calls: usize,
    stop_not_found: bool,
    stop_status: Option<JobStatus>,
}

/// 内存中的批处理服务
#[derive(Default)]
pub struct FakeBatchApi {
    state: Mutex<FakeState>,
}

impl FakeBatchApi {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        fake.state.lock().processed = Some(HashSet::new());
        Arc::new(fake)
    }

    /// 下一个提交的任务依次返回这些状态，最后一个状态会一直重复
    pub fn script_next_job(&self, statuses: Vec<JobStatus>) {
        self.state.lock().pending_scripts.push_back(statuses);
    }

    pub fn set_jobs(&self, jobs: Vec<(String, JobStatus)>) {
        self.state.lock().jobs = jobs;
    }

    pub fn script_job(&self, job_id: &str, statuses: Vec<JobStatus>) {
        self.state
            .lock()
            .scripts
            .insert(job_id.to_string(), statuses.into_iter().collect());
    }

    /// `None` 表示登记表接口不可用
    pub fn set_processed(&self, ids: Option<&[&str]>) {
        self.state.lock().processed =
            ids.map(|ids| ids.iter().map(|id| id.to_string()).collect());
    }

    pub fn set_folder(&self, folder_id: &str, files: Vec<FileRef>) {
        self.state.lock().folders.insert(folder_id.to_string(), files);
    }

    pub fn fail_start_at(&self, index: usize) {
        self.state.lock().fail_start_at = Some(index);
    }

    pub fn delay_start_at(&self, index: usize, delay: Duration) {
        self.state.lock().start_delays.insert(index, delay);
    }

    pub fn fail_status_calls(&self, count: usize) {
        self.state.lock().failing_status_calls = count;
    }

    pub fn stop_returns_not_found(&self) {
        self.state.lock().stop_not_found = true;
    }

    /// stop 返回指定状态，而不是默认的 cancelled
    pub fn stop_returns(&self, status: JobStatus) {
        self.state.lock().stop_status = Some(status);
    }

    pub fn starts(&self) -> Vec<StartCall> {
        self.state.lock().starts.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().starts.len()
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.state.lock().status_calls.get(job_id).copied().unwrap_or(0)
    }

    pub fn controls(&self) -> Vec<(String, ControlAction)> {
        self.state.lock().controls.clone()
    }

    fn next_status(state: &mut FakeState, job_id: &str) -> JobStatus {
        match state.scripts.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => status(JobState::Processing, 0, 0, 0, 0),
        }
    }
}

#[async_trait]
impl BatchApi for FakeBatchApi {
    async fn start(
        &self,
        job_id: &str,
        files: &[FileRef],
        settings: SettingsPayload<'_>,
    ) -> AppResult<JobStatus> {
        let delay = {
            let mut state = self.state.lock();
            let index = state.starts.len();
            state.starts.push(StartCall {
                job_id: job_id.to_string(),
                file_ids: files.iter().map(|f| f.id.clone()).collect(),
                settings: serde_json::to_value(&settings).unwrap(),
            });

            if state.fail_start_at == Some(index) {
                return Err(AppError::server("batch/start", 503, "engine offline"));
            }

            if let Some(script) = state.pending_scripts.pop_front() {
                state.scripts.insert(job_id.to_string(), script.into_iter().collect());
            }
            state.start_delays.remove(&index)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(status(JobState::Processing, 0, 0, 0, files.len() as u64))
    }

    async fn status(&self, job_id: &str) -> AppResult<JobStatus> {
        let mut state = self.state.lock();
        *state.status_calls.entry(job_id.to_string()).or_default() += 1;
        if state.failing_status_calls > 0 {
            state.failing_status_calls -= 1;
            return Err(AppError::server(format!("batch/status/{}", job_id), 500, "flaky"));
        }
        Ok(Self::next_status(&mut state, job_id))
    }

    async fn control(&self, job_id: &str, action: ControlAction) -> AppResult<JobStatus> {
        let mut state = self.state.lock();
        state.controls.push((job_id.to_string(), action));
        let endpoint = format!("batch/{}/{}", action, job_id);
        match action {
            ControlAction::Stop if state.stop_not_found => {
                Err(AppError::server(endpoint, 404, "Job not found"))
            }
            ControlAction::Stop => Ok(state
                .stop_status
                .clone()
                .unwrap_or_else(|| status(JobState::Cancelled, 0, 0, 0, 0))),
            ControlAction::Pause => Ok(status(JobState::Paused, 0, 0, 0, 0)),
            ControlAction::Resume => Ok(status(JobState::Processing, 0, 0, 0, 0)),
        }
    }

    async fn list_jobs(&self) -> AppResult<Vec<(String, JobStatus)>> {
        Ok(self.state.lock().jobs.clone())
    }

    async fn processed_file_ids(&self) -> AppResult<HashSet<String>> {
        self.state
            .lock()
            .processed
            .clone()
            .ok_or_else(|| AppError::server("processed-files", 500, "registry unavailable"))
    }

    async fn list_files_recursive(&self, _container_id: &str, folder_id: &str) -> AppResult<Vec<FileRef>> {
        Ok(self
            .state
            .lock()
            .folders
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn status(state: JobState, processed: u64, failed: u64, skipped: u64, total: u64) -> JobStatus {
    JobStatus::new(
        state,
        JobCounters {
            processed,
            failed,
            skipped,
            total,
        },
    )
}

pub fn pdf(id: &str) -> FileRef {
    FileRef::new(id, format!("{}.pdf", id), "docs")
}

pub fn pdf_selection(count: usize) -> Vec<SelectionEntry> {
    (0..count)
        .map(|i| SelectionEntry::File(pdf(&format!("file{}", i))))
        .collect()
}

/// 毫秒级的轮询间隔，让测试在真实时间里很快跑完
pub fn fast_config() -> ControllerConfig {
    let ms = Duration::from_millis;
    ControllerConfig {
        job_prefix: "test".to_string(),
        poll: PollIntervals {
            queued: ms(15),
            processing: ms(10),
            paused: ms(20),
            default: ms(10),
            restart_threshold: ms(2),
            initial_queued: ms(10),
            initial_other: ms(10),
        },
        cleanup_delay: ms(60),
    }
}

/// 轮询条件直到成立，超时返回 false
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
