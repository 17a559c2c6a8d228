//! 渲染模块
//!
//! 把累积文本渲染成 HTML：GFM 表格、删除线、任务列表、数学公式和内嵌 HTML。
//! 带语言标记的代码块输出 `language-<tag>` 类名，交给前端高亮器着色。
use crate::utils::wrap_boxed_math;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// 展示层协作者：文本进，可显示内容出
pub trait Render {
    fn render(&self, text: &str) -> String;
}

impl<F> Render for F
where
    F: Fn(&str) -> String,
{
    fn render(&self, text: &str) -> String {
        self(text)
    }
}

/// Markdown → HTML 渲染器
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        MarkdownRenderer
    }

    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_MATH);
        options
    }
}

impl Render for MarkdownRenderer {
    fn render(&self, text: &str) -> String {
        // 清理过的文本里不应再有 \boxed，这里再包一次只是兜底
        let prepared = wrap_boxed_math(text);
        let parser = Parser::new_ext(&prepared, Self::options());

        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    code = Some((code_language(&kind), String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, body)) = code.take() {
                        events.push(Event::Html(code_block_html(lang.as_deref(), &body).into()));
                    }
                }
                Event::Text(t) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&t);
                    }
                }
                other => events.push(other),
            }
        }

        // 流式过程中代码块可能还没闭合
        if let Some((lang, body)) = code.take() {
            events.push(Event::Html(code_block_html(lang.as_deref(), &body).into()));
        }

        let mut out = String::with_capacity(prepared.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        out
    }
}

/// 取信息串开头的单词作为语言，例如 "rust ignore" → "rust"
fn code_language(kind: &CodeBlockKind) -> Option<String> {
    match kind {
        CodeBlockKind::Fenced(info) => {
            let lang: String = info
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            (!lang.is_empty()).then_some(lang)
        }
        CodeBlockKind::Indented => None,
    }
}

fn code_block_html(lang: Option<&str>, body: &str) -> String {
    match lang {
        Some(lang) => format!(
            "<pre class=\"highlight\"><code class=\"language-{lang}\" data-lang=\"{lang}\">{}</code></pre>\n",
            escape_html(body.strip_suffix('\n').unwrap_or(body)),
        ),
        None => format!("<pre><code>{}</code></pre>\n", escape_html(body)),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(text: &str) -> String {
        MarkdownRenderer::new().render(text)
    }

    #[test]
    fn test_fenced_code_with_language() {
        let html = render("```rust\nfn main() { let a = 1 < 2; }\n```\n");
        assert!(html.contains(r#"<code class="language-rust" data-lang="rust">"#));
        assert!(html.contains("1 &lt; 2"));
        assert!(!html.contains("}\n</code>"));
    }

    #[test]
    fn test_fenced_code_without_language() {
        let html = render("```\nplain\n```\n");
        assert!(html.contains("<pre><code>plain\n</code></pre>"));
        assert!(!html.contains("language-"));
    }

    #[test]
    fn test_info_string_takes_first_word() {
        let html = render("```python title=x\nprint(1)\n```\n");
        assert!(html.contains(r#"class="language-python""#));
    }

    #[test]
    fn test_unclosed_code_block_while_streaming() {
        let html = render("```js\nconsole.log(1)");
        assert!(html.contains(r#"class="language-js""#));
        assert!(html.contains("console.log(1)"));
    }

    #[test]
    fn test_boxed_answer_rendered_as_math() {
        let html = render(r"The answer is \boxed{42}");
        assert!(html.contains("math-inline"));
        assert!(html.contains(r"\boxed{42}"));
    }

    #[test]
    fn test_markdown_features() {
        let html = render("# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~ <kbd>k</kbd>\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>old</del>"));
        assert!(html.contains("<kbd>k</kbd>"));
    }

    #[test]
    fn test_closure_renderer() {
        let upper = |t: &str| t.to_uppercase();
        assert_eq!(upper.render("hi"), "HI");
    }
}
