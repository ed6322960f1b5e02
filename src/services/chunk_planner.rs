//! 分块规划 - 业务能力层
//!
//! 把用户选择展开成文件列表、过滤已处理文件、再切成有界分块。
//! 除了两次网络读取外不修改任何客户端状态。

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::clients::BatchApi;
use crate::error::{AppError, AppResult, ValidationError};
use crate::models::file_ref::{Chunk, FileRef, SelectionEntry};

/// 默认只处理 PDF
pub const DEFAULT_EXTENSION: &str = "pdf";

pub struct ChunkPlanner {
    api: Arc<dyn BatchApi>,
    extension: Regex,
}

impl ChunkPlanner {
    /// 创建只接受 PDF 的规划器
    pub fn new(api: Arc<dyn BatchApi>) -> AppResult<Self> {
        Self::with_extension(api, DEFAULT_EXTENSION)
    }

    /// 使用自定义扩展名（不区分大小写）
    pub fn with_extension(api: Arc<dyn BatchApi>, extension: &str) -> AppResult<Self> {
        let pattern = format!(r"(?i)\.{}$", regex::escape(extension));
        let extension = Regex::new(&pattern)
            .map_err(|e| AppError::Other(format!("无效的扩展名 {}: {}", extension, e)))?;
        Ok(Self { api, extension })
    }

    /// 展开选择列表
    ///
    /// 文件夹通过服务端递归列出，结果按选择顺序拼接；
    /// 只保留扩展名匹配的文件，同一文件重复出现时保留第一次
    pub async fn expand(&self, selection: &[SelectionEntry]) -> AppResult<Vec<FileRef>> {
        if selection.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        let listings = try_join_all(selection.iter().filter_map(|entry| match entry {
            SelectionEntry::Folder {
                container_id,
                folder_id,
                ..
            } => Some(self.api.list_files_recursive(container_id, folder_id)),
            SelectionEntry::File(_) => None,
        }))
        .await?;
        let mut listings = listings.into_iter();

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for entry in selection {
            let candidates = match entry {
                SelectionEntry::File(file) => vec![file.clone()],
                SelectionEntry::Folder { name, .. } => {
                    let listed = listings.next().unwrap_or_default();
                    debug!("📁 文件夹 {} 展开得到 {} 个文件", name, listed.len());
                    listed
                }
            };

            for file in candidates {
                if self.is_supported(&file) && seen.insert(file.id.clone()) {
                    files.push(file);
                }
            }
        }

        info!("📋 选择展开完成: {} 个 PDF 文件", files.len());
        Ok(files)
    }

    /// 过滤掉已处理过的文件
    ///
    /// 登记表获取失败时放行全部文件，不阻塞用户
    pub async fn filter_unprocessed(&self, files: Vec<FileRef>, skip: bool) -> Vec<FileRef> {
        if !skip {
            return files;
        }

        match self.api.processed_file_ids().await {
            Ok(processed) => {
                let before = files.len();
                let remaining: Vec<FileRef> = files
                    .into_iter()
                    .filter(|f| !processed.contains(&f.id))
                    .collect();
                if remaining.len() < before {
                    info!("⏭️ 跳过 {} 个已处理文件", before - remaining.len());
                }
                remaining
            }
            Err(e) => {
                warn!("⚠️ 获取已处理文件列表失败，不做过滤: {}", e);
                files
            }
        }
    }

    /// 按原顺序切分为固定大小的分块，最后一块可以更小
    pub fn split(files: &[FileRef], chunk_size: usize) -> AppResult<Vec<Chunk>> {
        if chunk_size == 0 {
            return Err(ValidationError::InvalidChunkSize.into());
        }

        Ok(files
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, slice)| Chunk {
                index,
                files: slice.to_vec(),
            })
            .collect())
    }

    fn is_supported(&self, file: &FileRef) -> bool {
        self.extension.is_match(&file.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<FileRef> {
        (0..n)
            .map(|i| FileRef::new(i.to_string(), format!("f{}.pdf", i), "c"))
            .collect()
    }

    #[test]
    fn test_split_chunk_count_and_sizes() {
        for (len, size) in [(0, 3), (1, 200), (2, 200), (200, 200), (450, 200), (7, 3), (9, 3)] {
            let input = files(len);
            let chunks = ChunkPlanner::split(&input, size).unwrap();

            assert_eq!(chunks.len(), (len + size - 1) / size, "len={} size={}", len, size);
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i);
                if i + 1 < chunks.len() {
                    assert_eq!(chunk.len(), size);
                } else {
                    let rem = len % size;
                    assert_eq!(chunk.len(), if rem == 0 { size } else { rem });
                }
            }

            let rejoined: Vec<FileRef> = chunks.into_iter().flat_map(|c| c.files).collect();
            assert_eq!(rejoined, input);
        }
    }

    #[test]
    fn test_split_450_into_200_200_50() {
        let sizes: Vec<usize> = ChunkPlanner::split(&files(450), 200)
            .unwrap()
            .iter()
            .map(Chunk::len)
            .collect();
        assert_eq!(sizes, vec![200, 200, 50]);
    }

    #[test]
    fn test_split_rejects_zero_chunk_size() {
        let err = ChunkPlanner::split(&files(3), 0).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidChunkSize)
        ));
    }
}
