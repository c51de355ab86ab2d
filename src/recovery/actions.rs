use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{BoxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryActionType {
    WaitAndRetry,
    ChangeUserAgent,
    FallbackSelector,
    RestartBrowser,
    SkipOperation,
}

impl fmt::Display for RecoveryActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitAndRetry => write!(f, "wait_and_retry"),
            Self::ChangeUserAgent => write!(f, "change_user_agent"),
            Self::FallbackSelector => write!(f, "fallback_selector"),
            Self::RestartBrowser => write!(f, "restart_browser"),
            Self::SkipOperation => write!(f, "skip_operation"),
        }
    }
}

/// What a successful recovery action hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// The caller can go ahead and try again.
    Resumed,
    /// Carry on with what was already collected.
    PartialData(Map<String, Value>),
}

pub type RecoveryFuture = BoxFuture<'static, Result<RecoveryOutcome>>;

/// A named remediation step. Cheap to clone, the work itself lives behind a
/// shared closure and runs each time [`RecoveryAction::execute`] is awaited.
#[derive(Clone)]
pub struct RecoveryAction {
    action_type: RecoveryActionType,
    description: String,
    execute: Arc<dyn Fn() -> RecoveryFuture + Send + Sync>,
}

impl RecoveryAction {
    pub fn new<F, Fut>(action_type: RecoveryActionType, description: impl Into<String>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RecoveryOutcome>> + Send + 'static,
    {
        Self {
            action_type,
            description: description.into(),
            execute: Arc::new(move || -> RecoveryFuture { Box::pin(execute()) }),
        }
    }

    pub fn action_type(&self) -> RecoveryActionType {
        self.action_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub async fn execute(&self) -> Result<RecoveryOutcome> {
        (self.execute)().await
    }
}

impl fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("action_type", &self.action_type)
            .field("description", &self.description)
            .finish()
    }
}

/// Hook for whoever owns the browser. The resilience layer never manages a
/// browser itself, it only asks for a restart.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserRestarter: Send + Sync {
    async fn restart(&self) -> std::result::Result<(), BoxError>;
}

/// A JSON value counts as filled unless it is null or an empty string,
/// array or object.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
