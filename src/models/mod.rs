pub mod file_ref;
pub mod job_id;
pub mod job_status;
pub mod loaders;
pub mod pagination;
pub mod settings;

pub use file_ref::{Chunk, FileRef, SelectionEntry};
pub use job_status::{reconcile_total, JobCounters, JobPhase, JobState, JobStatus, Progress, RawJobStatus};
pub use loaders::{load_selection_file, SelectionFile};
pub use pagination::{ChunkHistoryEntry, PaginationState, ProgressSnapshot};
pub use settings::{PaginationSettings, ProcessingSettings, SettingsPayload};
