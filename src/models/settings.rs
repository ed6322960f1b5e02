//! 处理参数
//!
//! 这些字段原样转发给远端处理服务，字段名使用 camelCase

use serde::{Deserialize, Serialize};

/// OCR / PDF 转换参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingSettings {
    pub dpi: u32,
    pub image_format: String,
    pub color_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,
    pub ocr_engine: String,
    pub language: String,
    pub confidence_threshold: f64,
    pub enable_gpu_acceleration: bool,
    pub batch_size: u32,
    pub auto_save: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            image_format: "PNG".to_string(),
            color_mode: "RGB".to_string(),
            page_range: None,
            ocr_engine: "easyocr".to_string(),
            language: "spa".to_string(),
            confidence_threshold: 0.7,
            enable_gpu_acceleration: false,
            batch_size: 10,
            auto_save: true,
        }
    }
}

/// 分页（分块）处理专用参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationSettings {
    /// 每个分块的最大文件数
    pub chunk_size: usize,
    /// 是否跳过已处理过的文件
    pub skip_processed: bool,
    /// 分块之间是否暂停
    pub pause_between_chunks: bool,
    /// 分块间暂停时长（秒）
    pub pause_duration: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            skip_processed: true,
            pause_between_chunks: false,
            pause_duration: 5,
        }
    }
}

/// 提交给 `POST /batch/start` 的 settings 字段
///
/// 分页参数只在分块提交时附带
#[derive(Debug, Clone, Serialize)]
pub struct SettingsPayload<'a> {
    #[serde(flatten)]
    pub processing: &'a ProcessingSettings,
    #[serde(flatten)]
    pub pagination: Option<&'a PaginationSettings>,
}

impl<'a> SettingsPayload<'a> {
    pub fn single(processing: &'a ProcessingSettings) -> Self {
        Self {
            processing,
            pagination: None,
        }
    }

    pub fn chunked(processing: &'a ProcessingSettings, pagination: &'a PaginationSettings) -> Self {
        Self {
            processing,
            pagination: Some(pagination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_serialize_in_camel_case() {
        let processing = ProcessingSettings::default();
        let value = serde_json::to_value(SettingsPayload::single(&processing)).unwrap();

        assert_eq!(value["dpi"], 300);
        assert_eq!(value["imageFormat"], "PNG");
        assert_eq!(value["colorMode"], "RGB");
        assert_eq!(value["ocrEngine"], "easyocr");
        assert_eq!(value["language"], "spa");
        assert_eq!(value["confidenceThreshold"], 0.7);
        assert!(value.get("pageRange").is_none());
        assert!(value.get("chunkSize").is_none());
    }

    #[test]
    fn test_chunked_payload_carries_pagination_fields() {
        let processing = ProcessingSettings::default();
        let pagination = PaginationSettings {
            chunk_size: 50,
            ..Default::default()
        };
        let value =
            serde_json::to_value(SettingsPayload::chunked(&processing, &pagination)).unwrap();

        assert_eq!(value["chunkSize"], 50);
        assert_eq!(value["skipProcessed"], true);
        assert_eq!(value["pauseBetweenChunks"], false);
        assert_eq!(value["pauseDuration"], 5);
        assert_eq!(value["dpi"], 300);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: ProcessingSettings =
            serde_json::from_str(r#"{"dpi": 150, "pageRange": "1-3"}"#).unwrap();
        assert_eq!(settings.dpi, 150);
        assert_eq!(settings.page_range.as_deref(), Some("1-3"));
        assert_eq!(settings.ocr_engine, "easyocr");
    }
}
