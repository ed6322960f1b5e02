use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 批处理 API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 提交前的校验错误（不会发出任何网络请求）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 批处理 API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络不可达或超时，只由下一次轮询隐式重试
    #[error("网络请求失败 ({endpoint}): {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务端返回非 2xx 响应
    #[error("服务端返回错误 ({endpoint}): HTTP {status}: {message}")]
    Server {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// 响应无法解析或未通过校验
    #[error("响应数据无效 ({endpoint}): {reason}")]
    InvalidPayload { endpoint: String, reason: String },
}

/// 提交前的校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 没有选择任何文件或文件夹
    #[error("未选择任何文件")]
    EmptySelection,
    /// 选择中不包含支持的文件
    #[error("所选内容中没有找到 PDF 文件")]
    NoSupportedFiles,
    /// 所有文件均已处理过
    #[error("所选的 {total} 个文件均已处理过")]
    AllFilesProcessed { total: usize },
    /// 分块大小非法
    #[error("分块大小必须大于 0")]
    InvalidChunkSize,
    /// 当前没有可操作的批处理
    #[error("当前没有正在进行的批处理")]
    NoActiveBatch,
    /// 已有批处理在运行
    #[error("批处理 {job_id} 正在运行")]
    AlreadyRunning { job_id: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建网络请求失败错误
    pub fn transport(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::Transport {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建服务端错误
    pub fn server(endpoint: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        AppError::Api(ApiError::Server {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        })
    }

    /// 创建响应数据无效错误
    pub fn invalid_payload(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Api(ApiError::InvalidPayload {
            endpoint: endpoint.into(),
            reason: reason.into(),
        })
    }

    /// 远端任务不存在（通常意味着已经结束）
    ///
    /// 停止一个已结束的任务时服务端会返回 404，调用方应当忽略它
    pub fn is_not_found(&self) -> bool {
        match self {
            AppError::Api(ApiError::Server {
                status, message, ..
            }) => *status == 404 || message.to_lowercase().contains("not found"),
            _ => false,
        }
    }

    /// 是否为网络层错误
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Api(ApiError::Transport { .. }))
    }

    /// 生成展示给用户的错误信息
    ///
    /// 去掉分类前缀，只保留对用户有意义的部分
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(ApiError::Transport { source, .. }) => {
                format!("无法连接到批处理服务: {}", source)
            }
            AppError::Api(ApiError::Server {
                status, message, ..
            }) => format!("服务端错误 (HTTP {}): {}", status, message),
            AppError::Api(ApiError::InvalidPayload { reason, .. }) => {
                format!("服务端返回了无效数据: {}", reason)
            }
            AppError::Validation(e) => e.to_string(),
            AppError::Config(e) => e.to_string(),
            AppError::File(e) => e.to_string(),
            AppError::Other(msg) => msg.clone(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
