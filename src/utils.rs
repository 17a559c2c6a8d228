//! 工具函数模块
use crate::types::{Message, Role};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static BOXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\boxed\{([^}]*)\}").expect("invalid boxed regex"));

/// 创建消息的便捷函数
///
/// # 参数
///
/// * `role` - 消息角色
/// * `content` - 消息内容
pub fn message(role: Role, content: &str) -> Message {
    Message {
        role,
        content: content.to_string(),
    }
}

/// 准备发送到 API 的消息列表
///
/// 如果系统消息不为空，则将其作为第一条消息。
pub(crate) fn prepare_messages(system_message: &str, messages: &[Message]) -> Vec<Message> {
    let system_iter = if !system_message.is_empty() {
        vec![message(Role::System, system_message)].into_iter()
    } else {
        vec![].into_iter()
    };
    system_iter.chain(messages.iter().cloned()).collect()
}

/// 去掉模型输出中的 `\boxed{X}` 包装，只保留 `X`
///
/// 每次发布前都会对整个缓冲区执行，对已清理的文本是空操作。
pub fn clean_latex_syntax(text: &str) -> Cow<'_, str> {
    BOXED.replace_all(text, "$1")
}

/// 渲染前把 `\boxed{X}` 包成行内公式 `$\boxed{X}$`
pub(crate) fn wrap_boxed_math(text: &str) -> Cow<'_, str> {
    BOXED.replace_all(text, "$$\\boxed{$1}$$")
}
