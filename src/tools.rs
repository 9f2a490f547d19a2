//! Runs model-requested function calls and joins their results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use gemini_live_types::tools::{FunctionCall, FunctionDeclaration, FunctionResponse};
use serde_json::Value;

/// Result reported for a call that succeeded without returning anything.
pub const DEFAULT_RESULT: &str = "Function executed successfully.";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown function: {0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("function panicked")]
    Panicked,
}

/// Executes one named function with JSON arguments.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    async fn invoke(&self, name: &str, args: &Value) -> Result<Value, ToolError>;
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// A [`FunctionExecutor`] backed by registered async handlers.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    declarations: Vec<FunctionDeclaration>,
    handlers: HashMap<String, Handler>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under the declaration's name, replacing any
    /// earlier registration.
    pub fn register<F, Fut>(&mut self, declaration: FunctionDeclaration, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let name = declaration.name().to_string();
        self.declarations.retain(|d| d.name() != name);
        self.declarations.push(declaration);
        let handler: Handler =
            Arc::new(move |args| -> BoxFuture<'static, Result<Value, ToolError>> {
                Box::pin(handler(args))
            });
        self.handlers.insert(name, handler);
    }

    /// Declarations to advertise in the session handshake.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.declarations.clone()
    }
}

#[async_trait]
impl FunctionExecutor for FunctionRegistry {
    async fn invoke(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        handler(args.clone()).await
    }
}

/// Fans a tool-call batch out to an executor, one task per call.
#[derive(Clone)]
pub struct ToolDispatcher {
    executor: Arc<dyn FunctionExecutor>,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(executor: Arc<dyn FunctionExecutor>) -> Self {
        Self {
            executor,
            timeout: None,
        }
    }

    /// Bounds each call; a call that runs longer settles as an error.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs every call concurrently and returns one response per call, in
    /// batch order, once all of them have settled.
    pub async fn dispatch(&self, calls: Vec<FunctionCall>) -> Vec<FunctionResponse> {
        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let executor = self.executor.clone();
                let call = call.clone();
                let timeout = self.timeout;
                tokio::spawn(async move { invoke(executor.as_ref(), &call, timeout).await })
            })
            .collect();

        let mut responses = Vec::with_capacity(calls.len());
        for (call, handle) in calls.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(ToolError::Panicked),
                Err(e) => Err(ToolError::Failed(e.to_string())),
            };
            let response = match outcome {
                Ok(value) => {
                    tracing::debug!("tool {} ({}) succeeded", call.name(), call.id());
                    FunctionResponse::result(call, value)
                }
                Err(e) => {
                    tracing::warn!("tool {} ({}) failed: {}", call.name(), call.id(), e);
                    FunctionResponse::error(call, &e.to_string())
                }
            };
            responses.push(response);
        }
        responses
    }
}

async fn invoke(
    executor: &dyn FunctionExecutor,
    call: &FunctionCall,
    timeout: Option<Duration>,
) -> Result<Value, ToolError> {
    let invocation = executor.invoke(call.name(), call.args());
    let value = match timeout {
        Some(limit) => tokio::time::timeout(limit, invocation)
            .await
            .map_err(|_| ToolError::Timeout(limit))??,
        None => invocation.await?,
    };
    Ok(if value.is_null() {
        Value::String(DEFAULT_RESULT.to_string())
    } else {
        value
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_live_types::tools::ToolOutcome;
    use serde_json::json;

    struct Scripted;

    #[async_trait]
    impl FunctionExecutor for Scripted {
        async fn invoke(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
            match name {
                "echo" => Ok(args.clone()),
                "fail" => Err(ToolError::Failed("boom".into())),
                "silent" => Ok(Value::Null),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!("late"))
                }
                "panic" => panic!("tool exploded"),
                other => Err(ToolError::NotFound(other.to_string())),
            }
        }
    }

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(Scripted))
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let calls = vec![
            FunctionCall::new("1", "echo", json!({"n": 1})),
            FunctionCall::new("2", "fail", json!({})),
            FunctionCall::new("3", "echo", json!({"n": 3})),
        ];
        let responses = dispatcher().dispatch(calls).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].id(), "1");
        assert_eq!(responses[0].response(), &ToolOutcome::Result(json!({"n": 1})));
        assert_eq!(responses[1].id(), "2");
        assert_eq!(responses[1].response(), &ToolOutcome::Error("boom".into()));
        assert_eq!(responses[2].id(), "3");
        assert_eq!(responses[2].response(), &ToolOutcome::Result(json!({"n": 3})));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(dispatcher().dispatch(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_default_result() {
        let responses = dispatcher()
            .dispatch(vec![FunctionCall::new("1", "silent", Value::Null)])
            .await;
        assert_eq!(
            responses[0].response(),
            &ToolOutcome::Result(json!(DEFAULT_RESULT))
        );
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let responses = dispatcher()
            .dispatch(vec![FunctionCall::new("9", "nope", Value::Null)])
            .await;
        assert_eq!(
            responses[0].response(),
            &ToolOutcome::Error("unknown function: nope".into())
        );
    }

    #[tokio::test]
    async fn test_timeout_settles_only_the_slow_call() {
        let dispatcher = dispatcher().with_timeout(Some(Duration::from_millis(100)));
        let responses = dispatcher
            .dispatch(vec![
                FunctionCall::new("a", "slow", Value::Null),
                FunctionCall::new("b", "echo", json!(1)),
            ])
            .await;
        assert!(responses[0].response().is_error());
        assert_eq!(responses[1].response(), &ToolOutcome::Result(json!(1)));
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let responses = dispatcher()
            .dispatch(vec![
                FunctionCall::new("p", "panic", Value::Null),
                FunctionCall::new("e", "echo", json!("ok")),
            ])
            .await;
        assert_eq!(
            responses[0].response(),
            &ToolOutcome::Error("function panicked".into())
        );
        assert_eq!(responses[1].response(), &ToolOutcome::Result(json!("ok")));
    }

    #[tokio::test]
    async fn test_registry() {
        let mut registry = FunctionRegistry::new();
        registry.register(
            FunctionDeclaration::new("add").with_description("Adds two numbers"),
            |args: Value| async move {
                let a = args["a"].as_i64().unwrap_or_default();
                let b = args["b"].as_i64().unwrap_or_default();
                Ok(json!(a + b))
            },
        );
        assert_eq!(registry.declarations().len(), 1);
        assert_eq!(
            registry.invoke("add", &json!({"a": 2, "b": 3})).await.unwrap(),
            json!(5)
        );
        assert!(matches!(
            registry.invoke("sub", &Value::Null).await,
            Err(ToolError::NotFound(_))
        ));
    }
}
