//! 可取消的延时任务
//!
//! 每个关注点（轮询、分块间暂停、推进下一块、清理）各持有一个 [`TaskSlot`]，
//! 同一时刻最多一个活动句柄。重新调度会取消旧任务，
//! 卸载时对所有槽调用 [`TaskSlot::cancel`] 即可清空全部定时器。
//!
//! 已经开始执行的任务可能正等待远端响应，[`TaskSlot::cancel_unstarted`]
//! 只取消仍在等待延时的任务，让执行中的任务自己收尾。

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

struct Scheduled {
    handle: JoinHandle<()>,
    /// 延时结束、任务体开始执行后置位
    started: Arc<AtomicBool>,
}

pub struct TaskSlot {
    name: &'static str,
    handle: Mutex<Option<Scheduled>>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// 在 `delay` 之后执行 `task`，替换（并取消）此前调度的任务
    ///
    /// `delay` 为零时任务仍然异步执行，不会在调用方的栈上运行
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let handle = tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            flag.store(true, Ordering::SeqCst);
            task.await;
        });

        let previous = self.handle.lock().replace(Scheduled { handle, started });
        if let Some(previous) = previous {
            if !previous.handle.is_finished() {
                debug!("⏱️ [{}] 取消旧任务并重新调度", self.name);
            }
            previous.handle.abort();
        }
    }

    /// 取消尚未完成的任务，返回是否真的取消了什么
    pub fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(scheduled) => {
                let pending = !scheduled.handle.is_finished();
                scheduled.handle.abort();
                if pending {
                    debug!("⏱️ [{}] 已取消", self.name);
                }
                pending
            }
            None => false,
        }
    }

    /// 只取消还在等待延时的任务，已开始执行的任务保留句柄并继续运行
    pub fn cancel_unstarted(&self) -> bool {
        let mut slot = self.handle.lock();
        let unstarted = slot
            .as_ref()
            .map_or(false, |s| !s.started.load(Ordering::SeqCst));
        if !unstarted {
            return false;
        }
        match slot.take() {
            Some(scheduled) => {
                scheduled.handle.abort();
                debug!("⏱️ [{}] 已取消（尚未开始）", self.name);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(false, |s| !s.handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(scheduled) = self.handle.get_mut().take() {
            scheduled.handle.abort();
        }
    }
}
