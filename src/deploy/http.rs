//! HTTP client for the function deploy service
//!
//! The deploy service speaks JSON-RPC tool calls over a single `/mcp`
//! endpoint, authenticated with an API key header.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::deploy::{DeployOutcome, DeployRequest, DeployService, FunctionStatus, InvokeOutcome};
use crate::error::{Error, Result};

/// Container builds can take minutes.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(600);

pub struct HttpDeployService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpDeployService {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": tool_name, "arguments": arguments},
        });

        let mut request = self
            .client
            .post(format!("{}/mcp", self.base_url))
            .timeout(DEPLOY_TIMEOUT)
            .json(&payload);
        if !self.api_key.is_empty() {
            request = request.header("X-API-Key", &self.api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Deploy(format!(
                "deploy service returned {} for {}",
                response.status(),
                tool_name
            )));
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            return Err(Error::Deploy(format!("{} failed: {}", tool_name, error)));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl DeployService for HttpDeployService {
    async fn deploy_function(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        let result = self
            .call_tool("deploy_function", serde_json::to_value(request)?)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_function_status(&self, name: &str, region: &str) -> Result<FunctionStatus> {
        let result = self
            .call_tool(
                "get_function_status",
                json!({"function_name": name, "region": region}),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn invoke_function(
        &self,
        url: &str,
        payload: &Value,
        timeout_seconds: u64,
    ) -> Result<InvokeOutcome> {
        let result = self
            .call_tool(
                "invoke_function",
                json!({"function_url": url, "payload": payload, "timeout_seconds": timeout_seconds}),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn delete_function(&self, name: &str, region: &str) -> Result<bool> {
        let result = self
            .call_tool(
                "delete_function",
                json!({"function_name": name, "region": region}),
            )
            .await?;
        Ok(result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn deploy_call_carries_tool_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(header("X-API-Key", "secret"))
            .and(body_partial_json(json!({
                "method": "tools/call",
                "params": {"name": "deploy_function"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "success": true,
                    "function_url": "https://fn.example/run",
                    "status": "ACTIVE"
                }
            })))
            .mount(&server)
            .await;

        let service = HttpDeployService::new(&server.uri(), "secret");
        let outcome = service
            .deploy_function(&DeployRequest {
                function_name: "demo".into(),
                code: "def main(req): return 'ok'".into(),
                region: "europe-north1".into(),
                runtime: "python312".into(),
                memory_mb: 256,
                cpu: "1".into(),
                timeout_seconds: 60,
                entry_point: "main".into(),
                requirements: String::new(),
            })
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.function_url.as_deref(), Some("https://fn.example/run"));
    }

    #[tokio::test]
    async fn rpc_error_is_a_deploy_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "build failed"}
            })))
            .mount(&server)
            .await;

        let service = HttpDeployService::new(&server.uri(), "");
        let err = service
            .get_function_status("demo", "europe-north1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Deploy(_)));
    }

    #[tokio::test]
    async fn status_response_parses_service_state() {
        use crate::deploy::ServiceState;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "exists": true,
                    "status": "ACTIVE",
                    "function_url": "https://fn.example/run"
                }
            })))
            .mount(&server)
            .await;

        let service = HttpDeployService::new(&server.uri(), "");
        let status = service
            .get_function_status("demo", "europe-north1")
            .await
            .unwrap();
        assert!(status.exists);
        assert_eq!(status.status, ServiceState::Active);
    }
}
