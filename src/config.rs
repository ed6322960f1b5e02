use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppResult, ConfigError};
use crate::models::settings::PaginationSettings;

/// 轮询间隔
///
/// 根据任务状态自适应调整，间隔变化超过 `restart_threshold` 才重建定时器
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollIntervals {
    pub queued: Duration,
    pub processing: Duration,
    pub paused: Duration,
    pub default: Duration,
    pub restart_threshold: Duration,
    /// 刚提交的任务处于排队状态时的首次轮询间隔
    pub initial_queued: Duration,
    /// 刚提交的任务已开始处理时的首次轮询间隔
    pub initial_other: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            queued: Duration::from_millis(5000),
            processing: Duration::from_millis(1500),
            paused: Duration::from_millis(10_000),
            default: Duration::from_millis(2000),
            restart_threshold: Duration::from_millis(500),
            initial_queued: Duration::from_millis(3000),
            initial_other: Duration::from_millis(2000),
        }
    }
}

/// 控制器运行参数
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// 任务 ID 前缀
    pub job_prefix: String,
    pub poll: PollIntervals,
    /// 终止状态后保留展示的时长
    pub cleanup_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            job_prefix: "ocr".to_string(),
            poll: PollIntervals::default(),
            cleanup_delay: Duration::from_secs(2),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 批处理服务地址
    pub api_base_url: String,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    pub controller: ControllerConfig,
    /// 默认分页参数（选择文件未指定时使用）
    pub pagination: PaginationSettings,
    /// 选择文件路径
    pub selection_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 运行报告文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 30,
            controller: ControllerConfig::default(),
            pagination: PaginationSettings::default(),
            selection_file: "selection.toml".to_string(),
            verbose_logging: false,
            output_log_file: "batch_report.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量读取配置，无法解析的值回退为默认值
    pub fn from_env() -> Self {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("⚠️ {}，使用默认配置", e);
                Self::default()
            }
        }
    }

    /// 从环境变量读取配置，无法解析的值返回错误
    pub fn try_from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let poll = &default.controller.poll;

        let controller = ControllerConfig {
            job_prefix: lookup("BATCH_JOB_PREFIX").unwrap_or(default.controller.job_prefix.clone()),
            poll: PollIntervals {
                queued: parse_millis(&lookup, "POLL_QUEUED_MS", poll.queued)?,
                processing: parse_millis(&lookup, "POLL_PROCESSING_MS", poll.processing)?,
                paused: parse_millis(&lookup, "POLL_PAUSED_MS", poll.paused)?,
                default: parse_millis(&lookup, "POLL_DEFAULT_MS", poll.default)?,
                ..poll.clone()
            },
            cleanup_delay: parse_millis(&lookup, "CLEANUP_DELAY_MS", default.controller.cleanup_delay)?,
        };

        let pagination = PaginationSettings {
            chunk_size: parse_var(&lookup, "CHUNK_SIZE", "usize", default.pagination.chunk_size)?,
            skip_processed: parse_var(&lookup, "SKIP_PROCESSED", "bool", default.pagination.skip_processed)?,
            pause_between_chunks: parse_var(
                &lookup,
                "PAUSE_BETWEEN_CHUNKS",
                "bool",
                default.pagination.pause_between_chunks,
            )?,
            pause_duration: parse_var(&lookup, "PAUSE_DURATION_SECS", "u64", default.pagination.pause_duration)?,
        };

        Ok(Self {
            api_base_url: lookup("BATCH_API_BASE_URL").unwrap_or(default.api_base_url),
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS", "u64", default.request_timeout_secs)?,
            controller,
            pagination,
            selection_file: lookup("SELECTION_FILE").unwrap_or(default.selection_file),
            verbose_logging: parse_var(&lookup, "VERBOSE_LOGGING", "bool", default.verbose_logging)?,
            output_log_file: lookup("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        })
    }
}

fn parse_var<F, T>(lookup: &F, var_name: &str, expected_type: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var_name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }
            .into()
        }),
    }
}

fn parse_millis<F>(lookup: &F, var_name: &str, default: Duration) -> AppResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = parse_var(lookup, var_name, "u64", default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
