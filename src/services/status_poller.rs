//! 任务状态轮询
//!
//! 状态机：Idle → Polling → Stopped。
//! 每次响应都会交给回调（即使状态没有变化），回调返回后若为终止状态则自行停止。
//! 轮询失败只上报，不停止轮询。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clients::BatchApi;
use crate::config::PollIntervals;
use crate::error::AppError;
use crate::models::job_status::{JobState, JobStatus};

/// 状态回调：`(job_id, status)`
pub type StatusCallback = Arc<dyn Fn(&str, JobStatus) + Send + Sync>;
/// 轮询错误回调：`(job_id, error)`
pub type ErrorCallback = Arc<dyn Fn(&str, AppError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

struct PollerInner {
    state: PollerState,
    job_id: Option<String>,
    interval: Duration,
    /// 每次 start / stop 递增，旧的轮询任务据此判断自己是否已被替换
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl PollerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state == PollerState::Polling
    }
}

#[derive(Clone)]
struct PollContext {
    api: Arc<dyn BatchApi>,
    intervals: PollIntervals,
    inner: Arc<Mutex<PollerInner>>,
    on_status: StatusCallback,
    on_error: ErrorCallback,
}

/// 绑定单个任务 ID 的自适应轮询器
pub struct StatusPoller {
    ctx: PollContext,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn BatchApi>,
        intervals: PollIntervals,
        on_status: StatusCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            ctx: PollContext {
                api,
                inner: Arc::new(Mutex::new(PollerInner {
                    state: PollerState::Idle,
                    job_id: None,
                    interval: intervals.default,
                    generation: 0,
                    task: None,
                })),
                intervals,
                on_status,
                on_error,
            },
        }
    }

    /// 开始轮询 `job_id`，首次查询在一个间隔之后
    ///
    /// 正在轮询其他任务时先停止旧任务
    pub fn start(&self, job_id: &str, interval: Duration) {
        let mut inner = self.ctx.inner.lock();
        if let Some(previous) = inner.task.take() {
            previous.abort();
        }
        inner.generation += 1;
        inner.state = PollerState::Polling;
        inner.job_id = Some(job_id.to_string());
        inner.interval = interval;

        let generation = inner.generation;
        let ctx = self.ctx.clone();
        let job_id = job_id.to_string();
        inner.task = Some(tokio::spawn(poll_loop(ctx, job_id.clone(), generation, interval)));

        info!("🔄 开始轮询任务 {} (间隔 {}ms)", job_id, interval.as_millis());
    }

    /// 停止轮询，可重复调用
    pub fn stop(&self) {
        let mut inner = self.ctx.inner.lock();
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if inner.state == PollerState::Polling {
            inner.generation += 1;
            inner.state = PollerState::Stopped;
            debug!("⏹️ 停止轮询任务 {:?}", inner.job_id);
        }
    }

    pub fn state(&self) -> PollerState {
        self.ctx.inner.lock().state
    }

    pub fn is_polling(&self) -> bool {
        self.state() == PollerState::Polling
    }

    pub fn job_id(&self) -> Option<String> {
        self.ctx.inner.lock().job_id.clone()
    }

    pub fn current_interval(&self) -> Duration {
        self.ctx.inner.lock().interval
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(task) = self.ctx.inner.lock().task.take() {
            task.abort();
        }
    }
}

/// 按任务状态选择轮询间隔
pub fn interval_for(intervals: &PollIntervals, state: JobState) -> Duration {
    match state {
        JobState::Queued => intervals.queued,
        JobState::Processing => intervals.processing,
        JobState::Paused | JobState::Error => intervals.paused,
        _ => intervals.default,
    }
}

/// 刚提交任务时的首次轮询间隔
pub fn initial_interval(intervals: &PollIntervals, state: JobState) -> Duration {
    if state == JobState::Queued {
        intervals.initial_queued
    } else {
        intervals.initial_other
    }
}

/// 新间隔与当前间隔相差超过阈值时才需要重建定时器
pub fn should_restart(intervals: &PollIntervals, current: Duration, next: Duration) -> bool {
    let diff = if next > current {
        next - current
    } else {
        current - next
    };
    diff > intervals.restart_threshold
}

async fn poll_loop(ctx: PollContext, job_id: String, generation: u64, mut period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !ctx.inner.lock().is_current(generation) {
            return;
        }

        let result = ctx.api.status(&job_id).await;
        if !ctx.inner.lock().is_current(generation) {
            return;
        }

        match result {
            Ok(status) => {
                let state = status.state();
                debug!(
                    "📡 任务 {} 状态: {} ({}/{})",
                    job_id,
                    state,
                    status.counters.done(),
                    status.counters.total
                );

                (ctx.on_status)(&job_id, status);

                if state.is_terminal() {
                    let mut inner = ctx.inner.lock();
                    if inner.generation == generation {
                        inner.state = PollerState::Stopped;
                        inner.task = None;
                        info!("🏁 任务 {} 进入终止状态 {}，停止轮询", job_id, state);
                    }
                    return;
                }

                let next = interval_for(&ctx.intervals, state);
                if should_restart(&ctx.intervals, period, next) {
                    debug!(
                        "⏱️ 任务 {} 轮询间隔调整: {}ms → {}ms",
                        job_id,
                        period.as_millis(),
                        next.as_millis()
                    );
                    period = next;
                    ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    let mut inner = ctx.inner.lock();
                    if inner.generation == generation {
                        inner.interval = period;
                    }
                }
            }
            Err(e) => {
                warn!("⚠️ 轮询任务 {} 失败，继续轮询: {}", job_id, e);
                (ctx.on_error)(&job_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_for_each_state() {
        let intervals = PollIntervals::default();
        assert_eq!(interval_for(&intervals, JobState::Queued), Duration::from_millis(5000));
        assert_eq!(interval_for(&intervals, JobState::Processing), Duration::from_millis(1500));
        assert_eq!(interval_for(&intervals, JobState::Paused), Duration::from_millis(10_000));
        assert_eq!(interval_for(&intervals, JobState::Error), Duration::from_millis(10_000));
        assert_eq!(interval_for(&intervals, JobState::Completed), Duration::from_millis(2000));
    }

    #[test]
    fn test_initial_interval() {
        let intervals = PollIntervals::default();
        assert_eq!(initial_interval(&intervals, JobState::Queued), Duration::from_millis(3000));
        assert_eq!(initial_interval(&intervals, JobState::Processing), Duration::from_millis(2000));
    }

    #[test]
    fn test_restart_only_beyond_threshold() {
        let intervals = PollIntervals::default();
        let ms = Duration::from_millis;
        assert!(!should_restart(&intervals, ms(2000), ms(1500)));
        assert!(!should_restart(&intervals, ms(1500), ms(2000)));
        assert!(should_restart(&intervals, ms(2000), ms(5000)));
        assert!(should_restart(&intervals, ms(10_000), ms(1500)));
    }
}
