use crate::core::jobs::{JobRecord, JobStatus};
use serde::{Deserialize, Serialize};

/// 轮询返回的任务状态，字段与 JSON 输出一一对应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub results: Vec<String>,
}

impl From<JobRecord> for JobStatusView {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.id.to_string(),
            status: record.status,
            progress: record.progress,
            message: record.message,
            results: record.results,
        }
    }
}

impl JobStatusView {
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 提交成功后返回给客户端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// API 错误类型，序列化友好
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error_type: String,
    pub message: String,
}

impl ApiError {
    pub(crate) fn not_found() -> Self {
        Self {
            error_type: "NotFound".to_string(),
            message: "Invalid job ID".to_string(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            error_type: "Internal".to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn setup(message: impl Into<String>) -> Self {
        Self {
            error_type: "Setup".to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::JobId;

    #[test]
    fn test_view_json_shape() {
        let mut record = JobRecord::new(JobId::from("abc"));
        record.status = JobStatus::Completed;
        record.progress = 100;
        record.results = vec!["Rome".to_string()];

        let view = JobStatusView::from(record);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["job_id"], "abc");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["results"][0], "Rome");
        assert!(view.is_finished());
    }

    #[test]
    fn test_not_found_error() {
        let err = ApiError::not_found();
        assert_eq!(err.to_string(), "[NotFound] Invalid job ID");
    }
}
