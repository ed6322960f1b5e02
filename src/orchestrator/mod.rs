//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务提交和生命周期调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_controller` - 单任务控制器
//! - 一次性提交全部文件，得到一个任务
//! - 暂停 / 恢复 / 停止
//! - 终止状态保留一段时间后清理
//!
//! ### `paginated_controller` - 分页控制器
//! - 把大量文件切成分块，逐块提交
//! - 聚合各分块计数，记录分块历史
//! - 启动时接管服务端仍在运行的任务
//!
//! ## 层次关系
//!
//! ```text
//! paginated_controller / batch_controller
//!     ↓
//! services (ChunkPlanner / StatusPoller / TaskSlot)
//!     ↓
//! clients (BatchApi)
//! ```
//!
//! ## 设计原则
//!
//! 1. **状态独占**：控制器是各自状态的唯一写入者
//! 2. **回调隔离**：轮询器只持有控制器的弱引用，卸载后回调不再生效
//! 3. **向下依赖**：编排层 → services → clients

pub mod batch_controller;
pub mod paginated_controller;

// 重新导出主要类型
pub use batch_controller::{BatchController, BatchState};
pub use paginated_controller::{CurrentBatch, PaginatedController, RecoveryOutcome};
