use anyhow::Result;
use ocr_batch::utils::logging;
use ocr_batch::{App, Config};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置，日志级别取决于配置，所以解析失败要等日志初始化后再报告
    let loaded = Config::try_from_env();

    // 初始化日志
    logging::init(loaded.as_ref().map_or(false, |c| c.verbose_logging));

    let config = loaded.unwrap_or_else(|e| {
        warn!("⚠️ {}，使用默认配置", e);
        Config::default()
    });

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
