use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Expected, user-facing domain rejections. The display strings are part of
/// the API: the frontend matches on them, so they must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("already in a team")]
    AlreadyInTeam,
    #[error("no team")]
    NoTeam,
    #[error("unknown team code")]
    UnknownTeamCode,
    #[error("team is locked")]
    TeamLocked,
    #[error("team is closed")]
    TeamClosed,
    #[error("team too small")]
    TeamTooSmall,
    #[error("team too large")]
    TeamTooLarge,
    #[error("not enough qualified members")]
    NotEnoughQualifiedMembers,
    #[error("registration is closed")]
    RegistrationClosed,
    #[error("round not open")]
    RoundNotOpen,
    #[error("training is not open")]
    TrainingNotOpen,
    #[error("must pass training")]
    MustPassTraining,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("attempt too soon")]
    AttemptTooSoon,
    #[error("no current attempt")]
    NoCurrentAttempt,
    #[error("cannot cancel started attempt")]
    CannotCancelStartedAttempt,
    #[error("timed attempt not completed")]
    TimedAttemptNotCompleted,
    #[error("already have a task")]
    AlreadyHaveTask,
    #[error("no task instance")]
    NoTaskInstance,
    #[error("attempt is closed")]
    AttemptClosed,
    #[error("too many answers")]
    TooManyAnswers,
    #[error("too soon")]
    TooSoon,
    #[error("invalid input")]
    InvalidInput,
    #[error("unknown access code")]
    UnknownAccessCode,
    #[error("attempt has no workspace")]
    NoWorkspace,
    #[error("forbidden")]
    Forbidden,
}

/// Everything a model operation can fail with. `Model` is routine and renders
/// as a failed JSON response; the other variants roll the transaction back
/// and are recorded in the error log.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Model(#[from] ModelError),
    /// A row or relation the schema guarantees was missing or inconsistent.
    #[error("data integrity: {0}")]
    Integrity(String),
    #[error("storage: {0}")]
    Store(#[from] diesel::result::Error),
    #[error("upstream: {0}")]
    Upstream(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn integrity(msg: impl Into<String>) -> Self {
        AppError::Integrity(msg.into())
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            AppError::Store(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ))
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Model(err) => (
                StatusCode::OK,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
                .into_response(),
            AppError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "error": "upstream failure" })),
            )
                .into_response(),
            AppError::Integrity(_) | AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "internal error" })),
            )
                .into_response(),
        }
    }
}
