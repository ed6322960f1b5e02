//! # OCR Batch
//!
//! 批量 OCR 任务的编排核心：提交、轮询、分块推进、恢复
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 与远端批处理服务通信
//! - `BatchApi` - 服务接口，测试中可替换为假实现
//! - `HttpBatchClient` - 基于 reqwest 的实现，在边界处校验状态
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ChunkPlanner` - 展开选择、过滤已处理文件、切块
//! - `StatusPoller` - 按任务状态自适应间隔的轮询
//! - `TaskSlot` - 可取消的延时任务
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/batch_controller` - 单任务生命周期
//! - `orchestrator/paginated_controller` - 分块提交、聚合进度、启动恢复
//!
//! ### ④ 应用入口（App）
//! - `app` - 读取选择文件，运行分页处理并输出报告
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use clients::{BatchApi, ControlAction, HttpBatchClient};
pub use config::{Config, ControllerConfig, PollIntervals};
pub use error::{AppError, AppResult};
pub use models::{FileRef, JobState, JobStatus, SelectionEntry};
pub use orchestrator::{BatchController, PaginatedController, RecoveryOutcome};
