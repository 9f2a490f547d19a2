/// A function the model may call, declared in the session handshake.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    /// The name of the function
    name: String,

    /// The description of the function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// The parameters of the function in OpenAPI schema format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

impl FunctionDeclaration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            parameters: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> Option<&serde_json::Value> {
        self.parameters.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

impl Tool {
    pub fn new(function_declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations,
        }
    }

    pub fn function_declarations(&self) -> &[FunctionDeclaration] {
        &self.function_declarations
    }
}

/// One model-requested invocation inside a `toolCall` batch.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

impl FunctionCall {
    pub fn new(id: &str, name: &str, args: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }
}

/// Outcome of a single call: serialised as `{"result": ..}` or `{"error": ".."}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Result(serde_json::Value),
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionResponse {
    id: String,
    name: String,
    response: ToolOutcome,
}

impl FunctionResponse {
    pub fn new(id: &str, name: &str, response: ToolOutcome) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            response,
        }
    }

    pub fn result(call: &FunctionCall, value: serde_json::Value) -> Self {
        Self::new(call.id(), call.name(), ToolOutcome::Result(value))
    }

    pub fn error(call: &FunctionCall, message: &str) -> Self {
        Self::new(call.id(), call.name(), ToolOutcome::Error(message.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn response(&self) -> &ToolOutcome {
        &self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_response_shapes() {
        let call = FunctionCall::new("call-1", "lookup_order", json!({"order": 42}));

        let ok = FunctionResponse::result(&call, json!("shipped"));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": "call-1", "name": "lookup_order", "response": {"result": "shipped"}})
        );

        let err = FunctionResponse::error(&call, "order service unavailable");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"id": "call-1", "name": "lookup_order", "response": {"error": "order service unavailable"}})
        );
        assert!(err.response().is_error());
    }

    #[test]
    fn test_function_call_without_args() {
        let call: FunctionCall = serde_json::from_str(r#"{"id":"a","name":"ping"}"#).unwrap();
        assert_eq!(call.id(), "a");
        assert_eq!(call.name(), "ping");
        assert!(call.args().is_null());
    }

    #[test]
    fn test_declaration_skips_empty_fields() {
        let decl = FunctionDeclaration::new("ping");
        assert_eq!(serde_json::to_string(&decl).unwrap(), r#"{"name":"ping"}"#);
    }
}
