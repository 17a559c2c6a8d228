//! # 流式问答示例
//!
//! - 从环境变量加载配置
//! - 提交问题并实时打印新增文本
//! - Ctrl+C 取消当前请求
//! - 结束后输出渲染好的 HTML
//!
//! ```text
//! cargo run --example ask -- "为什么天空是蓝色的？"
//! ```

use nanoask::{Config, MarkdownRenderer, SessionStatus, StreamClient};
use nanoask::error::Result;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let config = Config::from_env()?;
    let mut client = StreamClient::new(config);

    let mut session = match client.submit(&question) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("错误: {}", e.user_message());
            return Ok(());
        }
    };

    let canceller = client.active();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Some(handle) = canceller {
                handle.cancel();
            }
        }
    });

    let mut printed = 0;
    while let Some(state) = session.changed().await {
        // 清理 \boxed 可能让文本变短，只打印新增部分
        if state.text.len() > printed && state.text.is_char_boundary(printed) {
            print!("{}", &state.text[printed..]);
            std::io::stdout().flush().ok();
        }
        printed = state.text.len();
    }
    println!();

    let state = session.state();
    match state.status {
        SessionStatus::Completed => {
            println!("\n--- HTML ---\n{}", session.render(&MarkdownRenderer::new()));
        }
        SessionStatus::Cancelled => println!("(已取消)"),
        SessionStatus::Failed => eprintln!("错误: {}", state.error.unwrap_or_default()),
        _ => {}
    }

    Ok(())
}
