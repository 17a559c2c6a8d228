//! API 数据结构模块

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ================================================================================================
// API 请求结构
// ================================================================================================

/// 对话消息
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// 角色
    pub role: Role,
    /// 内容
    pub content: String,
}

/// 角色枚举
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 系统
    System,
    /// 用户
    #[default]
    User,
    /// 机器人
    Assistant,
}

/// 流式 chat completions 请求体，发送后不再修改
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatRequest {
    /// 模型标识
    pub model: String,
    /// 系统指令 + 用户问题
    pub messages: Vec<Message>,
    /// 始终为 true
    pub stream: bool,
}

// ================================================================================================
// API 错误结构
// ================================================================================================

/// 非成功状态码时的响应体，例如 `{"error":{"message":"rate limited"}}`
#[derive(Debug, Deserialize, Default)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

impl ApiErrorBody {
    /// 非空的错误信息
    pub fn message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .filter(|m| !m.is_empty())
    }
}

// ================================================================================================
// 流式 API 响应结构
// ================================================================================================

/// 流式 API 响应体
///
/// 只关心 `choices[0].delta` 下的 `content` 和 `reasoning`。其余字段（id、model、
/// index、role 等）不做类型校验，类型异常也不会让整帧被丢弃。
#[derive(Debug, Deserialize, Default)]
#[serde(transparent)]
pub struct StreamChunk(Value);

impl StreamChunk {
    /// `choices[0].delta` 对象
    pub fn delta(&self) -> Option<&Value> {
        self.0.pointer("/choices/0/delta")
    }

    /// 本帧要追加的文本，没有时为空
    ///
    /// 优先 `content`，为空时回退到 `reasoning`。两者语义不同（回答与推理过程），
    /// 这里保持与上游网页客户端一致，合并进同一个显示缓冲区。
    pub fn delta_text(&self) -> &str {
        let delta = self.delta();
        non_empty_str(delta, "content")
            .or_else(|| non_empty_str(delta, "reasoning"))
            .unwrap_or_default()
    }
}

fn non_empty_str<'a>(delta: Option<&'a Value>, field: &str) -> Option<&'a str> {
    delta
        .and_then(|d| d.get(field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// ================================================================================================
// 会话数据模型
// ================================================================================================

/// 会话状态，`Streaming` 之后的三个状态都是终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Streaming,
    Cancelled,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Cancelled | SessionStatus::Completed | SessionStatus::Failed
        )
    }
}

/// 发布给调用方的会话快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// 会话编号，由客户端递增分配
    pub id: u64,
    /// 已清理的累积文本
    pub text: String,
    /// 当前状态
    pub status: SessionStatus,
    /// 可见的错误信息，仅在 `Failed` 时存在
    pub error: Option<String>,
}

impl SessionState {
    /// 是否仍在加载（对应界面上的忙碌指示）
    pub fn is_busy(&self) -> bool {
        self.status == SessionStatus::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![Message { role: Role::System, content: "s".into() }],
            stream: true,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "model": "m",
                "messages": [{"role": "system", "content": "s"}],
                "stream": true
            })
        );
    }

    #[test]
    fn test_delta_prefers_content() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"answer","reasoning":"thinking"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.delta_text(), "answer");
    }

    #[test]
    fn test_delta_falls_back_to_reasoning() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"","reasoning":"thinking"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.delta_text(), "thinking");

        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"reasoning":"r"}}]}"#).unwrap();
        assert_eq!(chunk.delta_text(), "r");
    }

    #[test]
    fn test_delta_empty_when_missing() {
        let chunk: StreamChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(chunk.delta_text(), "");
        let chunk: StreamChunk = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(chunk.delta_text(), "");
        let chunk: StreamChunk = serde_json::from_str(r#"{"choices":"oops"}"#).unwrap();
        assert_eq!(chunk.delta_text(), "");
    }

    #[test]
    fn test_delta_ignores_unexpected_sibling_fields() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"id":null,"model":null,"choices":[{"index":null,"delta":{"role":"tool","content":"kept"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.delta_text(), "kept");
    }

    #[test]
    fn test_non_string_content_falls_back_to_reasoning() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":null,"reasoning":"r"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.delta_text(), "r");
    }

    #[test]
    fn test_api_error_body_message() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"error":{"message":"rate limited","code":429}}"#).unwrap();
        assert_eq!(body.message(), Some("rate limited"));

        let body: ApiErrorBody = serde_json::from_str(r#"{"error":{}}"#).unwrap();
        assert_eq!(body.message(), None);
    }
}
