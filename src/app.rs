use crate::clients::{BatchApi, HttpBatchClient};
use crate::config::Config;
use crate::models::loaders::load_selection_file;
use crate::orchestrator::{PaginatedController, RecoveryOutcome};
use crate::utils::logging::{
    append_report_line, format_chunk_line, init_log_file, log_startup, print_final_stats,
};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 等待分页处理结束时的检查间隔
const WAIT_TICK: Duration = Duration::from_millis(500);

/// 应用主结构
pub struct App {
    config: Config,
    controller: PaginatedController,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化报告文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config.api_base_url, config.pagination.chunk_size);

        let api: Arc<dyn BatchApi> = Arc::new(HttpBatchClient::new(&config)?);
        let controller = PaginatedController::new(api, config.controller.clone())?;

        Ok(Self { config, controller })
    }

    /// 运行应用主逻辑
    ///
    /// 服务端有唯一运行中的任务时直接接管，否则按选择文件提交新的分页处理
    pub async fn run(&self) -> Result<()> {
        match self.controller.recover().await? {
            RecoveryOutcome::Adopted(job_id) => {
                info!("♻️ 继续跟踪已有任务 {}，不提交新文件", job_id);
            }
            RecoveryOutcome::Ambiguous(ids) => {
                warn!("⚠️ 服务端有多个运行中的任务 {:?}，请先处理后再提交", ids);
                return Ok(());
            }
            RecoveryOutcome::Idle => {
                if !self.submit_selection().await? {
                    return Ok(());
                }
            }
        }

        self.wait_until_finished().await;

        for entry in self.controller.chunk_history() {
            append_report_line(&self.config.output_log_file, &format_chunk_line(&entry))?;
        }
        append_report_line(
            &self.config.output_log_file,
            &self.controller.progress().to_string(),
        )?;
        print_final_stats(&self.controller.pagination(), &self.config.output_log_file);

        if let Some(message) = self.controller.error() {
            error!("❌ {}", message);
        }

        self.controller.shutdown().await;
        Ok(())
    }

    /// 读取选择文件并启动分页处理，返回是否真正开始
    async fn submit_selection(&self) -> Result<bool> {
        info!("\n📁 正在读取选择文件 {}", self.config.selection_file);
        let selection = load_selection_file(Path::new(&self.config.selection_file)).await?;

        if selection.entries.is_empty() {
            warn!("⚠️ 选择文件中没有任何文件或文件夹，程序结束");
            return Ok(false);
        }

        let pagination = selection
            .pagination
            .unwrap_or_else(|| self.config.pagination.clone());
        self.controller.set_selection(selection.entries);
        self.controller.set_settings(selection.settings, pagination);

        if let Err(e) = self.controller.start_paginated(false).await {
            error!("❌ {}", e.user_message());
            return Ok(false);
        }
        Ok(true)
    }

    /// 等待分页处理结束，Ctrl+C 时停止当前任务
    async fn wait_until_finished(&self) {
        let mut ticker = tokio::time::interval(WAIT_TICK);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.controller.is_running() {
                        break;
                    }
                    info!("{}", self.controller.progress());
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("🛑 收到中断信号，正在停止...");
                    if let Err(e) = self.controller.stop_paginated().await {
                        error!("❌ 停止失败: {}", e.user_message());
                    }
                    break;
                }
            }
        }
    }
}
