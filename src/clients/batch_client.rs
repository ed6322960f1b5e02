/// 批处理服务 API 客户端
///
/// 封装所有与远端批处理服务的 HTTP 交互，本层不做任何重试
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::file_ref::FileRef;
use crate::models::job_status::{JobStatus, RawJobStatus};
use crate::models::settings::SettingsPayload;
use crate::utils::truncate_text;

/// 控制动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Pause,
    Resume,
    Stop,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Stop => "stop",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 批处理服务能力
///
/// 控制器只依赖这个 trait，测试中用内存实现替换
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// 提交新任务
    async fn start(
        &self,
        job_id: &str,
        files: &[FileRef],
        settings: SettingsPayload<'_>,
    ) -> AppResult<JobStatus>;

    /// 查询任务状态
    async fn status(&self, job_id: &str) -> AppResult<JobStatus>;

    /// 暂停 / 恢复 / 停止
    async fn control(&self, job_id: &str, action: ControlAction) -> AppResult<JobStatus>;

    /// 服务端所有任务（用于启动时恢复）
    async fn list_jobs(&self) -> AppResult<Vec<(String, JobStatus)>>;

    /// 已处理文件登记表
    async fn processed_file_ids(&self) -> AppResult<HashSet<String>>;

    /// 递归列出文件夹下的 PDF 文件
    async fn list_files_recursive(&self, container_id: &str, folder_id: &str) -> AppResult<Vec<FileRef>>;
}

#[derive(Serialize)]
struct StartRequest<'a> {
    batch_id: &'a str,
    files: &'a [FileRef],
    settings: SettingsPayload<'a>,
}

#[derive(Deserialize)]
struct JobListResponse {
    #[serde(default)]
    jobs: BTreeMap<String, Value>,
}

impl JobListResponse {
    /// 逐条校验任务，无效的历史任务只记录警告并跳过
    fn into_valid_jobs(self) -> Vec<(String, JobStatus)> {
        self.jobs
            .into_iter()
            .filter_map(|(id, value)| {
                let parsed = serde_json::from_value::<RawJobStatus>(value)
                    .map_err(|e| e.to_string())
                    .and_then(JobStatus::try_from);
                match parsed {
                    Ok(status) => Some((id, status)),
                    Err(reason) => {
                        warn!("⚠️ 跳过无效的任务记录 {}: {}", id, reason);
                        None
                    }
                }
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct ProcessedFile {
    item_id: String,
}

#[derive(Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileRef>,
}

/// 基于 reqwest 的批处理服务客户端
#[derive(Clone)]
pub struct HttpBatchClient {
    http: Client,
    base_url: String,
}

impl HttpBatchClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::transport("client", e))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// 发送请求并解析 JSON 响应
    async fn send_json<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> AppResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::transport(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::transport(endpoint, e))?;

        debug!("{} -> HTTP {}: {}", endpoint, status.as_u16(), truncate_text(&body, 200));

        if !status.is_success() {
            return Err(AppError::server(
                endpoint,
                status.as_u16(),
                extract_error_message(&body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| AppError::invalid_payload(endpoint, e.to_string()))
    }

    async fn send_status(&self, endpoint: &str, request: RequestBuilder) -> AppResult<JobStatus> {
        let raw: RawJobStatus = self.send_json(endpoint, request).await?;
        JobStatus::try_from(raw).map_err(|reason| AppError::invalid_payload(endpoint, reason))
    }
}

#[async_trait]
impl BatchApi for HttpBatchClient {
    async fn start(
        &self,
        job_id: &str,
        files: &[FileRef],
        settings: SettingsPayload<'_>,
    ) -> AppResult<JobStatus> {
        let endpoint = "batch/start";
        let body = StartRequest {
            batch_id: job_id,
            files,
            settings,
        };
        let request = self.http.post(self.url(endpoint)).json(&body);
        self.send_status(endpoint, request).await
    }

    async fn status(&self, job_id: &str) -> AppResult<JobStatus> {
        let endpoint = format!("batch/status/{}", job_id);
        let request = self.http.get(self.url(&endpoint));
        self.send_status(&endpoint, request).await
    }

    async fn control(&self, job_id: &str, action: ControlAction) -> AppResult<JobStatus> {
        let endpoint = format!("batch/{}/{}", action.as_str(), job_id);
        let request = self.http.post(self.url(&endpoint));
        self.send_status(&endpoint, request).await
    }

    async fn list_jobs(&self) -> AppResult<Vec<(String, JobStatus)>> {
        let endpoint = "batch/list";
        let request = self.http.get(self.url(endpoint));
        let response: JobListResponse = self.send_json(endpoint, request).await?;
        Ok(response.into_valid_jobs())
    }

    async fn processed_file_ids(&self) -> AppResult<HashSet<String>> {
        let endpoint = "processed-files";
        let request = self.http.get(self.url(endpoint));
        let files: Vec<ProcessedFile> = self.send_json(endpoint, request).await?;
        Ok(files.into_iter().map(|f| f.item_id).collect())
    }

    async fn list_files_recursive(&self, container_id: &str, folder_id: &str) -> AppResult<Vec<FileRef>> {
        let endpoint = "list_files_recursive";
        let request = self.http.get(self.url(endpoint)).query(&[
            ("containerId", container_id),
            ("folderId", folder_id),
            ("fileType", "pdf"),
        ]);
        let response: FileListResponse = self.send_json(endpoint, request).await?;
        Ok(response.files)
    }
}

/// 从错误响应体中提取可读信息
///
/// 依次尝试 `detail`、`message`、`error` 字段，都没有时返回截断的原文
pub fn extract_error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = map.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "空响应".to_string()
    } else {
        truncate_text(trimmed, 200)
    }
}
