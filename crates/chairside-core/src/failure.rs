//! Failure taxonomy and the reporting boundary for agent work.
//!
//! One unit of agent processing resolves to a value or an [`AgentFailure`].
//! At the outermost layer of the request cycle, [`report`] classifies the
//! failure, appends exactly one [`ErrorRecord`] and one patient-facing reply
//! to the caller's [`ConversationLog`], and returns the reply. Nothing is
//! re-raised past that point: the cycle always ends with a well-formed
//! response.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::events::now_iso8601;
use crate::retry::RetryError;

/// Result of one unit of agent work.
pub type AgentResult<T> = Result<T, AgentFailure>;

/// The failure kinds surfaced to operators and dashboards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected by the rate limiter before any work ran.
    RateLimit,
    /// Model pipeline failed every retry attempt.
    LlmError,
    /// Anything else.
    Unexpected,
}

impl FailureKind {
    /// Wire spelling of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::LlmError => "llm_error",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure from one unit of agent work.
#[derive(Debug, Error)]
pub enum AgentFailure {
    /// The rate limiter rejected the request.
    #[error("rate limit exceeded, next token in {}s", .retry_after.as_secs_f64().ceil())]
    RateLimited {
        /// Wait hint from the limiter.
        retry_after: Duration,
    },
    /// Every retry attempt against the model failed.
    #[error("model call failed after {attempts} attempts: {message}")]
    LlmExhausted {
        /// Attempts spent before giving up.
        attempts: u32,
        /// Final attempt's failure, rendered.
        message: String,
    },
    /// Uncategorized failure.
    #[error("{message}")]
    Unexpected {
        /// What went wrong.
        message: String,
    },
}

impl AgentFailure {
    /// A rate-limiter rejection with its wait hint.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    /// An uncategorized failure.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Which [`FailureKind`] this failure records as.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimit,
            Self::LlmExhausted { .. } => FailureKind::LlmError,
            Self::Unexpected { .. } => FailureKind::Unexpected,
        }
    }

    /// The apologetic reply shown to the patient for this failure.
    #[must_use]
    pub fn user_reply(&self) -> String {
        match self {
            Self::RateLimited { retry_after } => format!(
                "I'm sorry, I'm receiving messages faster than I can keep up with \
                 right now. Please wait about {}s and send that again.",
                retry_after.as_secs_f64().ceil()
            ),
            Self::LlmExhausted { .. } => "I'm sorry, I'm having trouble processing your \
                 request right now. Please try again in a few moments."
                .into(),
            Self::Unexpected { .. } => "I apologize, something unexpected went wrong on \
                 our end. Please try again, and call the front desk if it keeps happening."
                .into(),
        }
    }
}

impl<E: std::error::Error + 'static> From<RetryError<E>> for AgentFailure {
    fn from(err: RetryError<E>) -> Self {
        Self::LlmExhausted {
            attempts: err.attempts,
            message: err.source.to_string(),
        }
    }
}

/// Structured record of one classified failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Classified kind.
    pub kind: FailureKind,
    /// Rendered failure message.
    pub message: String,
    /// RFC 3339 time of classification.
    pub timestamp: String,
}

/// Caller-owned conversation state the reporter appends to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    /// Classified failures, oldest first.
    pub errors: Vec<ErrorRecord>,
    /// Synthesized replies queued for the patient, oldest first.
    pub replies: Vec<String>,
}

/// Record `failure` on `log` and synthesize the patient-facing reply.
///
/// Appends exactly one [`ErrorRecord`] and one reply per call and returns
/// the reply. Never propagates the failure further.
pub fn report(failure: &AgentFailure, log: &mut ConversationLog) -> String {
    let kind = failure.kind();
    match kind {
        FailureKind::Unexpected => {
            error!(error = %failure, "unexpected failure in agent processing");
        }
        FailureKind::RateLimit | FailureKind::LlmError => {
            warn!(kind = %kind, error = %failure, "agent processing failure");
        }
    }

    log.errors.push(ErrorRecord {
        kind,
        message: failure.to_string(),
        timestamp: now_iso8601(),
    });
    let reply = failure.user_reply();
    log.replies.push(reply.clone());
    reply
}
