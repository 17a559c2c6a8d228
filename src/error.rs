//! 错误处理模块

use thiserror::Error;

/// 请求失败且没有可用错误信息时展示的文本
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred while fetching the response";

/// NanoAsk 库的统一错误类型
///
/// 按会话生命周期分类：提交前的校验、HTTP 状态、读取响应体、单帧解析和用户取消
#[derive(Debug, Error)]
pub enum NanoError {
    /// 问题为空，不会发起网络请求
    #[error("{0}")]
    Validation(String),

    /// API 返回非成功状态码，内容为服务端给出的错误信息
    #[error("{0}")]
    Api(String),

    /// 读取响应体时出错（不包括取消）
    #[error("流读取错误: {0}")]
    StreamRead(String),

    /// 单个 SSE 帧无法解析，只会被记录并跳过
    #[error("SSE 帧解析错误: {0}")]
    Parse(String),

    /// 用户取消了请求
    #[error("请求已取消")]
    Aborted,

    /// HTTP 请求相关错误
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 请求参数无效
    #[error("请求参数无效: {0}")]
    InvalidRequest(String),

    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// NanoAsk 库的 Result 类型别名
pub type Result<T> = std::result::Result<T, NanoError>;

impl NanoError {
    /// 是否为用户取消，取消不作为可见错误
    pub fn is_abort(&self) -> bool {
        matches!(self, NanoError::Aborted)
    }

    /// 展示给用户的错误文本，空信息时回退到通用提示
    pub fn user_message(&self) -> String {
        let msg = self.to_string();
        if msg.trim().is_empty() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_message_is_shown_verbatim() {
        let err = NanoError::Api("rate limited".into());
        assert_eq!(err.user_message(), "rate limited");
    }

    #[test]
    fn test_empty_message_falls_back() {
        let err = NanoError::Api(String::new());
        assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_only_aborted_is_abort() {
        assert!(NanoError::Aborted.is_abort());
        assert!(!NanoError::StreamRead("reset".into()).is_abort());
    }
}
