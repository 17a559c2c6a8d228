//! 流式响应处理模块
//!
//! 把响应体的字节块逐步还原成文本增量：有状态的 UTF-8 解码、按行切分 SSE 帧、
//! 逐帧解析 JSON。单帧解析失败只会被记录并跳过，不会中断整个流。
use crate::{
    error::{NanoError, Result},
    types::StreamChunk,
};
use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::{
    fmt::Display,
    pin::Pin,
    task::{Context, Poll},
};

const DATA_PREFIX: &str = "data: ";
const DONE_CHUNK: &str = "[DONE]";
/// 单行最大长度，超过后丢弃该行直到下一个换行
pub const DEFAULT_MAX_LINE_LEN: usize = 1 << 20;

// ================================================================================================
// 增量 UTF-8 解码
// ================================================================================================

/// 有状态的 UTF-8 解码器
///
/// 块尾不完整的多字节序列会保留到下一块；非法序列替换为 U+FFFD。
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解码一块字节，返回本次可以确定的文本
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to 之前保证是合法 UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(n) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[n..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// 流结束时冲刷剩余字节
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

// ================================================================================================
// SSE 帧
// ================================================================================================

/// 一条 `data: ` 行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `data: [DONE]`，协议层的结束标记，不代表连接已关闭
    Done,
    /// 其他负载
    Data(String),
}

/// 把一行文本解释为 SSE 帧，不符合 `data: ` 格式的行返回 `None`
pub fn parse_line(line: &str) -> Option<SseFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_CHUNK {
        Some(SseFrame::Done)
    } else {
        Some(SseFrame::Data(payload.to_string()))
    }
}

/// 增量 SSE 解码器：字节块进，帧出
///
/// 不以换行结尾的半行会留到下一块再处理。半行超过 `max_line_len` 时整行丢弃，
/// 避免对端一直不发换行时缓冲区无限增长。
#[derive(Debug)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    line: String,
    max_line_len: usize,
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            utf8: Utf8Decoder::new(),
            line: String::new(),
            max_line_len,
            discarding: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let decoded = self.utf8.decode(bytes);
        let mut text = decoded.as_str();

        if self.discarding {
            match text.find('\n') {
                Some(pos) => {
                    text = &text[pos + 1..];
                    self.discarding = false;
                }
                None => return Vec::new(),
            }
        }
        self.line.push_str(text);

        let mut frames = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let rest = self.line.split_off(pos + 1);
            let line = std::mem::replace(&mut self.line, rest);
            if let Some(frame) = parse_line(&line[..pos]) {
                frames.push(frame);
            }
        }

        if self.line.len() > self.max_line_len {
            warn!("Dropping SSE line longer than {} bytes", self.max_line_len);
            self.line.clear();
            self.discarding = true;
        }
        frames
    }

    /// 连接关闭时处理最后一段没有换行的内容
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let tail = self.utf8.finish();
        if std::mem::take(&mut self.discarding) {
            self.line.clear();
            return Vec::new();
        }
        self.line.push_str(&tail);
        let line = std::mem::take(&mut self.line);
        if !line.is_empty() {
            debug!("Flushing unterminated line: {:?}", line);
        }
        parse_line(&line).into_iter().collect()
    }
}

/// 从一个数据帧中取出文本增量
///
/// `Ok(None)` 表示该帧没有内容，`Err(Parse)` 表示负载不是合法 JSON。
pub fn extract_delta(payload: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| NanoError::Parse(format!("'{}': {}", payload, e)))?;
    let text = chunk.delta_text();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// 把一帧转换为文本增量，解析失败时记录日志并跳过
fn frame_delta(frame: SseFrame) -> Option<String> {
    match frame {
        SseFrame::Done => None,
        SseFrame::Data(payload) => match extract_delta(&payload) {
            Ok(delta) => delta,
            Err(e) => {
                warn!("Error parsing SSE data: {}", e);
                None
            }
        },
    }
}

// ================================================================================================
// 流式响应包装器
// ================================================================================================

/// SSE 数据流处理器
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamWrapper;

impl StreamWrapper {
    pub fn new() -> Self {
        StreamWrapper
    }

    /// 将字节流转换为非空文本增量的流
    ///
    /// 只有连接关闭才会结束流，`[DONE]` 只是被跳过。传输错误映射为 `StreamRead`。
    pub fn stream<S, E>(self, bytes_stream: S) -> impl Stream<Item = Result<String>> + Send
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        try_stream! {
            let mut bytes_stream = Box::pin(bytes_stream);
            let mut decoder = SseDecoder::new();
            while let Some(bytes_res) = bytes_stream.next().await {
                let bytes = bytes_res.map_err(|e| NanoError::StreamRead(e.to_string()))?;
                for frame in decoder.push(&bytes) {
                    if let Some(delta) = frame_delta(frame) {
                        yield delta;
                    }
                }
            }

            for frame in decoder.finish() {
                if let Some(delta) = frame_delta(frame) {
                    yield delta;
                }
            }
        }
    }
}

/// 文本增量流
pub struct DeltaStream {
    inner: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl DeltaStream {
    pub fn new(stream: impl Stream<Item = Result<String>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// 从原始字节流构建
    pub fn from_bytes<S, E>(bytes_stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        Self::new(StreamWrapper::new().stream(bytes_stream))
    }
}

impl Stream for DeltaStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
