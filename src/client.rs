//! 流式客户端核心模块
use crate::{
    config::Config,
    error::{NanoError, Result},
    session::{consume, settle_error, SessionControl, SessionHandle},
    stream::{DeltaStream, StreamWrapper},
    types::{ApiErrorBody, ChatRequest, Role},
    utils::{message, prepare_messages},
};
use log::{debug, error, info};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Response,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const X_TITLE: &str = "x-title";
const HTTP_REFERER: &str = "http-referer";

// ================================================================================================
// 核心客户端模块
// ================================================================================================

/// 流式问答客户端
///
/// 同一时间只有一个活动会话：新的提交会先取消旧会话。客户端被丢弃时也会取消活动会话。
#[derive(Debug)]
pub struct StreamClient {
    client: Arc<Client>,
    config: Arc<Config>,
    stream_handler: StreamWrapper,
    active: Option<SessionControl>,
    next_id: u64,
}

impl StreamClient {
    /// 创建一个新的 `StreamClient` 实例
    pub fn new(config: Config) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive)
            .tcp_nodelay(config.tcp_nodelay)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build reqwest client: {}", e);
                Client::new()
            });

        Self {
            client: Arc::new(client),
            config: Arc::new(config),
            stream_handler: StreamWrapper::new(),
            active: None,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 构建 API 请求所需的 HTTP 标头
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
                .map_err(|e| NanoError::InvalidRequest(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        headers.insert(
            HeaderName::from_static(HTTP_REFERER),
            HeaderValue::from_str(&self.config.referer)
                .map_err(|e| NanoError::InvalidRequest(format!("Invalid referer: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static(X_TITLE),
            HeaderValue::from_str(&self.config.title)
                .map_err(|e| NanoError::InvalidRequest(format!("Invalid title: {}", e)))?,
        );
        Ok(headers)
    }

    /// 构建请求体：固定系统指令 + 用户问题，开启流式
    pub fn build_request(&self, question: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: prepare_messages(
                &self.config.system_message,
                &[message(Role::User, question)],
            ),
            stream: true,
        }
    }

    /// 发送请求并返回文本增量流
    ///
    /// 问题为空时返回 `Validation` 且不会发起请求；发送过程中令牌被取消时返回 `Aborted`。
    pub async fn open_stream(&self, question: &str, token: &CancellationToken) -> Result<DeltaStream> {
        let question = validate_question(question)?;
        let headers = self.build_headers()?;
        let body = self.build_request(question);

        let request = self
            .client
            .post(self.config.endpoint())
            .headers(headers)
            .json(&body);

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(NanoError::Aborted),
            res = request.send() => res?,
        };

        // 读取错误响应体同样可能阻塞
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(NanoError::Aborted),
            res = check_status(response) => res?,
        };
        Ok(DeltaStream::new(self.stream_handler.stream(response.bytes_stream())))
    }

    /// 提交一个问题，立即返回会话句柄
    ///
    /// 文本更新通过句柄异步到达。必须在 tokio 运行时内调用。
    pub fn submit(&mut self, question: &str) -> Result<SessionHandle> {
        let question = validate_question(question)?.to_string();

        if let Some(prev) = self.active.take() {
            debug!("Superseding session {}", prev.id());
            prev.cancel();
        }

        self.next_id += 1;
        let control = SessionControl::new(self.next_id);
        info!("Session {} started", control.id());

        let mut handle = SessionHandle::new(control.clone(), None);
        let this = self.detached();
        let task = tokio::spawn({
            let control = control.clone();
            async move {
                match this.open_stream(&question, control.token()).await {
                    Ok(deltas) => {
                        consume(&control, deltas).await;
                    }
                    Err(e) => settle_error(&control, e),
                }
            }
        });

        handle.attach(task);
        self.active = Some(control);
        Ok(handle)
    }

    /// 取消当前活动会话
    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            active.cancel();
        }
    }

    /// 当前活动会话的句柄（不含任务，可用于观察和取消）
    pub fn active(&self) -> Option<SessionHandle> {
        self.active
            .as_ref()
            .map(|control| SessionHandle::new(control.clone(), None))
    }

    /// 关闭客户端，取消活动会话
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Shutting down, cancelling session {}", active.id());
            active.cancel();
        }
    }

    /// 供后台任务使用的无会话副本
    fn detached(&self) -> StreamClient {
        StreamClient {
            client: Arc::clone(&self.client),
            config: Arc::clone(&self.config),
            stream_handler: self.stream_handler,
            active: None,
            next_id: 0,
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        Err(NanoError::Validation("question required".into()))
    } else {
        Ok(question)
    }
}

/// 非成功状态码时读取错误信息
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.message().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
    Err(NanoError::Api(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StreamClient {
        StreamClient::new(Config::default().with_api_key("test-key".into()))
    }

    #[test]
    fn test_build_request() {
        let req = client().build_request("What is 2+2?");
        assert!(req.stream);
        assert_eq!(req.model, crate::config::DEFAULT_MODEL);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.messages[1].content, "What is 2+2?");
    }

    #[test]
    fn test_build_headers() {
        let headers = client().build_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer test-key");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers["x-title"], "DeepSeek AI Streamer");
        assert_eq!(headers["http-referer"], "http://localhost");
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let client = StreamClient::new(Config::default().with_api_key("bad\nkey".into()));
        assert!(matches!(client.build_headers(), Err(NanoError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_question() {
        let mut client = client();
        for q in ["", "   ", "\n\t"] {
            let result = client.submit(q);
            assert!(matches!(result, Err(NanoError::Validation(ref m)) if m == "question required"));
        }
        assert!(client.active().is_none());
    }

    #[tokio::test]
    async fn test_open_stream_aborts_when_token_cancelled() {
        let client = client();
        let token = CancellationToken::new();
        token.cancel();
        let result = client.open_stream("hi", &token).await;
        assert!(matches!(result, Err(NanoError::Aborted)));
    }
}
