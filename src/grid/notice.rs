//! User-facing outcome notices

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Uploaded,
    Recognized,
    Deleted,
    UploadFailed,
    RecognitionFailed,
    DecodeFailed,
    DeleteFailed,
}

/// Outcome of a cell operation, addressed by grid order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub order: u32,
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(order: u32, kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            order,
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.kind,
            NoticeKind::UploadFailed
                | NoticeKind::RecognitionFailed
                | NoticeKind::DecodeFailed
                | NoticeKind::DeleteFailed
        )
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.order, self.message)
    }
}
