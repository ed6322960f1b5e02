pub mod batch_client;

pub use batch_client::{BatchApi, ControlAction, HttpBatchClient};
