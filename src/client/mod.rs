pub mod stage;

pub use stage::{HttpStageClient, StageClient, StageClientError, ERROR_BODY_LIMIT, JSON_CONTENT_TYPE};
