//! # NanoAsk - 轻量级流式问答客户端
//!
//! 向 OpenRouter（或任何兼容 OpenAI 的 chat completions 端点）提交一个问题，
//! 逐块读取 SSE 响应，把增量拼接成不断增长的文本，并随时可以取消。
//!
//! ## 主要特性
//!
//! - 🔄 **流式响应**：有状态的 UTF-8 解码和按行切分的 SSE 解析，单帧错误不会中断流。
//! - ✋ **可取消**：每个会话拥有独立的取消令牌，新提交会先取消旧会话。
//! - 📡 **状态订阅**：通过 `watch` 通道发布会话快照（文本、状态、错误）。
//! - 🖋️ **渲染**：内置 Markdown → HTML 渲染器，支持数学公式和代码块语言标记。
//! - 🔧 **灵活配置**：支持环境变量和 Builder 模式。
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use nanoask::{Config, MarkdownRenderer, StreamClient};
//! use nanoask::error::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // 需要设置 OPENROUTER_API_KEY
//!     let config = Config::from_env()?;
//!     let mut client = StreamClient::new(config);
//!
//!     let mut session = client.submit("什么是所有权？")?;
//!     while let Some(state) = session.changed().await {
//!         println!("{} chars, busy = {}", state.text.len(), state.is_busy());
//!     }
//!
//!     println!("{}", session.render(&MarkdownRenderer::new()));
//!     Ok(())
//! }
//! ```

// 模块定义
pub mod client;
pub mod config;
pub mod error;
pub mod render;
pub mod session;
pub mod stream;
pub mod types;
pub mod utils;

pub use client::StreamClient;
pub use config::Config;
pub use error::{NanoError, Result};
pub use render::{MarkdownRenderer, Render};
pub use session::{SessionControl, SessionHandle};
pub use types::{SessionState, SessionStatus};
pub use utils::clean_latex_syntax;
