use serde::{Deserialize, Serialize};

/// 用户选择的单个文件
///
/// 由调用方的文件浏览器产生，选择后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(alias = "container_id")]
    pub container_id: String,
    #[serde(default, alias = "modified_at", skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl FileRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            container_id: container_id.into(),
            modified_at: None,
        }
    }
}

/// 选择列表中的一项：文件或需要递归展开的文件夹
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SelectionEntry {
    File(FileRef),
    #[serde(rename_all = "camelCase")]
    Folder {
        #[serde(alias = "container_id")]
        container_id: String,
        #[serde(alias = "folder_id")]
        folder_id: String,
        #[serde(default)]
        name: String,
    },
}

/// 一个分块：按原顺序排列、大小受限的文件序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub files: Vec<FileRef>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
