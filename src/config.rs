//! 配置模块
use crate::error::{NanoError, Result};
use std::env;
use std::time::Duration;

/// 默认 API 基础 URL
pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
/// 默认模型
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-zero:free";
/// 默认系统指令，要求模型简洁作答
pub const DEFAULT_SYSTEM_MESSAGE: &str = "Please provide a concise response without unnecessary details. Make it as clear and concise as possible.";
/// 默认 `X-Title` 标头
pub const DEFAULT_TITLE: &str = "DeepSeek AI Streamer";
/// 默认 `HTTP-Referer` 标头
pub const DEFAULT_REFERER: &str = "http://localhost";

// ===============================================================================================
// 配置模块
// ===============================================================================================

/// 流式客户端配置
///
/// 支持 Builder 模式和环境变量配置。没有请求超时：流只会因取消或连接关闭而结束。
#[derive(Debug, Clone)]
pub struct Config {
    /// 模型名称
    pub(crate) model: String,
    /// 系统消息
    pub(crate) system_message: String,
    /// API 基础 URL
    pub(crate) api_base: String,
    /// API 密钥
    pub(crate) api_key: String,
    /// `HTTP-Referer` 标头
    pub(crate) referer: String,
    /// `X-Title` 标头
    pub(crate) title: String,
    /// 建立连接的超时时间
    pub(crate) connect_timeout: Duration,
    /// 连接池空闲超时时间
    pub(crate) pool_idle_timeout: Duration,
    /// 每个主机的最大空闲连接数
    pub(crate) pool_max_idle_per_host: usize,
    /// TCP Keepalive
    pub(crate) tcp_keepalive: Duration,
    /// TCP Nodelay
    pub(crate) tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            system_message: DEFAULT_SYSTEM_MESSAGE.into(),
            api_base: DEFAULT_API_BASE.into(),
            api_key: String::new(),
            referer: DEFAULT_REFERER.into(),
            title: DEFAULT_TITLE.into(),
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 4,
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

/// 生成 Config Builder 方法的宏
///
/// 自动生成 `with_field_name` 形式的 builder 方法
macro_rules! config_builder {
    ($field:ident, $type:ty) => {
        paste::paste! {
            #[doc = "设置 `"]
            #[doc = stringify!($field)]
            #[doc = "`"]
            pub fn [<with_ $field>](mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        }
    };
}

impl Config {
    pub fn model(&self) -> &str { &self.model }
    pub fn system_message(&self) -> &str { &self.system_message }
    pub fn api_base(&self) -> &str { &self.api_base }
    pub fn api_key(&self) -> &str { &self.api_key }
    pub fn referer(&self) -> &str { &self.referer }
    pub fn title(&self) -> &str { &self.title }

    /// 完整的 chat completions 端点
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// 从环境变量和 `.env` 文件加载配置
    ///
    /// 环境变量会覆盖 `.env` 文件中的设置
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载配置
    ///
    /// 密钥依次查找 `OPENROUTER_API_KEY` 和 `VITE_OPENROUTER_API_KEY`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .or_else(|| lookup("VITE_OPENROUTER_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| NanoError::Config("OPENROUTER_API_KEY not found".into()))?;

        let defaults = Config::default();
        Ok(Config {
            api_key,
            model: lookup("OPENROUTER_MODEL").unwrap_or(defaults.model.clone()),
            api_base: lookup("API_BASE").unwrap_or(defaults.api_base.clone()),
            referer: lookup("OPENROUTER_REFERER").unwrap_or(defaults.referer.clone()),
            title: lookup("OPENROUTER_TITLE").unwrap_or(defaults.title.clone()),
            ..defaults
        })
    }

    // 使用宏生成 builder 方法
    config_builder!(api_base, String);
    config_builder!(model, String);
    config_builder!(api_key, String);
    config_builder!(system_message, String);
    config_builder!(referer, String);
    config_builder!(title, String);
    config_builder!(connect_timeout, Duration);
    config_builder!(pool_idle_timeout, Duration);
    config_builder!(pool_max_idle_per_host, usize);
    config_builder!(tcp_keepalive, Duration);
    config_builder!(tcp_nodelay, bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// Tests that the default configuration is created correctly.
    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.system_message, DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(config.title, "DeepSeek AI Streamer");
        assert_eq!(config.api_key, "");
        assert_eq!(config.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }

    /// Tests the builder methods for setting configuration fields.
    #[test]
    fn test_config_builder_methods() {
        let config = Config::default()
            .with_model("test_model".to_string())
            .with_api_key("test_key".to_string())
            .with_api_base("http://127.0.0.1:9000/v1/".to_string())
            .with_title("Tester".to_string());

        assert_eq!(config.model(), "test_model");
        assert_eq!(config.api_key(), "test_key");
        assert_eq!(config.title(), "Tester");
        assert_eq!(config.endpoint(), "http://127.0.0.1:9000/v1/chat/completions");
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "env_key"),
            ("OPENROUTER_MODEL", "env_model"),
            ("API_BASE", "http://local/v1"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "env_key");
        assert_eq!(config.model, "env_model");
        assert_eq!(config.api_base, "http://local/v1");
        assert_eq!(config.referer, DEFAULT_REFERER);
    }

    #[test]
    fn test_from_lookup_accepts_vite_key() {
        let config =
            Config::from_lookup(lookup_from(&[("VITE_OPENROUTER_API_KEY", "vite_key")])).unwrap();
        assert_eq!(config.api_key, "vite_key");
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    /// Tests that an error is returned if the API key is not found.
    #[test]
    fn test_from_lookup_missing_api_key() {
        let result = Config::from_lookup(lookup_from(&[("OPENROUTER_MODEL", "m")]));
        assert!(matches!(result, Err(NanoError::Config(_))));

        let blank = Config::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "  ")]));
        assert!(matches!(blank, Err(NanoError::Config(_))));
    }
}
