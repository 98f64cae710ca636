use thiserror::Error;

/// 失敗の分類（UI側の表示切り替え用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// ネットワーク系。リトライ対象になり得る
    Transient,
    /// 部屋・コンポーネントが解決できない。リトライしない
    NotFound,
    /// ネットワーク呼び出し前に拒否
    Validation,
    Other,
}

#[derive(Error, Debug)]
pub enum InspectionError {
    #[error("config error: {0}")]
    Config(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("document store error: {0}")]
    Store(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("failed to parse analysis response: {0}")]
    Parse(String),

    #[error("CLI execution error: {0}")]
    CliExecution(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectionError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Upload(_) | Self::Analysis(_) | Self::Store(_) | Self::Io(_) => {
                ErrorCategory::Transient
            }
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Config(_) | Self::Parse(_) | Self::CliExecution(_) | Self::Json(_) => {
                ErrorCategory::Other
            }
        }
    }
}

impl From<inspection_common::Error> for InspectionError {
    fn from(err: inspection_common::Error) -> Self {
        use inspection_common::Error as E;
        match err {
            E::Io(e) => Self::Io(e),
            E::Json(e) => Self::Json(e),
            E::Parse(msg) => Self::Parse(msg),
            E::Validation(msg) => Self::Validation(msg),
            E::RoomNotFound(id) => Self::not_found("room", id),
            E::ComponentNotFound(id) => Self::not_found("component", id),
        }
    }
}

pub type Result<T> = std::result::Result<T, InspectionError>;
