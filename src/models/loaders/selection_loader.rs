use crate::models::file_ref::SelectionEntry;
use crate::models::settings::{PaginationSettings, ProcessingSettings};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 选择文件内容
///
/// ```toml
/// [[entries]]
/// type = "folder"
/// containerId = "docs"
/// folderId = "f-2024"
///
/// [[entries]]
/// type = "file"
/// id = "42"
/// name = "contrato.pdf"
/// containerId = "docs"
///
/// [settings]
/// dpi = 200
///
/// [pagination]
/// chunkSize = 100
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionFile {
    #[serde(default)]
    pub entries: Vec<SelectionEntry>,
    #[serde(default)]
    pub settings: ProcessingSettings,
    /// 未指定时使用配置中的默认分页参数
    #[serde(default)]
    pub pagination: Option<PaginationSettings>,
}

/// 从 TOML 文件加载选择列表
pub async fn load_selection_file(path: &Path) -> Result<SelectionFile> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取选择文件: {}", path.display()))?;

    parse_selection(&content).with_context(|| format!("无法解析选择文件: {}", path.display()))
}

/// 解析选择列表文本
pub fn parse_selection(content: &str) -> Result<SelectionFile> {
    let selection: SelectionFile = toml::from_str(content)?;
    tracing::info!("已加载 {} 个选择项", selection.entries.len());
    Ok(selection)
}
