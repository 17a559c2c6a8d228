//! 会话模块
//!
//! 一个会话对应一次提问：拥有自己的取消令牌和累积缓冲区，通过 `watch` 通道把快照
//! 发布给调用方。状态只允许从 `Streaming` 进入一个终态，之后的任何更新都会被丢弃。
use crate::{
    error::{NanoError, Result},
    render::Render,
    types::{SessionState, SessionStatus},
    utils::clean_latex_syntax,
};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

// ================================================================================================
// 会话控制
// ================================================================================================

/// 会话的取消令牌与状态发布端
#[derive(Debug, Clone)]
pub struct SessionControl {
    token: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionControl {
    /// 创建处于 `Streaming` 状态的新会话
    pub fn new(id: u64) -> Self {
        let (tx, _rx) = watch::channel(SessionState {
            id,
            status: SessionStatus::Streaming,
            ..SessionState::default()
        });
        Self {
            token: CancellationToken::new(),
            state: Arc::new(tx),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.borrow().id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// 取消会话；已经结束的会话不受影响
    pub fn cancel(&self) {
        self.token.cancel();
        self.finish(SessionStatus::Cancelled, None);
    }

    /// 追加一段增量并发布清理后的全文，会话已结束时返回 `false`
    pub(crate) fn append(&self, buffer: &mut String, delta: &str) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        buffer.push_str(delta);
        let cleaned = clean_latex_syntax(buffer);
        self.state.send_if_modified(|s| {
            if s.status != SessionStatus::Streaming {
                return false;
            }
            s.text = cleaned.into_owned();
            true
        })
    }

    /// 进入终态，只有第一次调用生效
    pub(crate) fn finish(&self, status: SessionStatus, error: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        self.state.send_if_modified(|s| {
            if s.status != SessionStatus::Streaming {
                return false;
            }
            s.status = status;
            s.error = error;
            true
        })
    }
}

// ================================================================================================
// 块消费循环
// ================================================================================================

/// 消费文本增量流直到连接关闭、出错或被取消
///
/// 每个会话拥有自己的缓冲区，被取消的旧循环即使还处理了最后一块，也不会影响新会话。
pub async fn consume<S>(control: &SessionControl, mut deltas: S) -> SessionStatus
where
    S: Stream<Item = Result<String>> + Unpin,
{
    let token = control.token().clone();
    let mut buffer = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => Err(NanoError::Aborted),
            item = deltas.next() => item.transpose(),
        };

        match next {
            Ok(Some(delta)) => {
                if !control.append(&mut buffer, &delta) {
                    debug!("Session {} no longer streaming, dropping delta", control.id());
                    break;
                }
            }
            Ok(None) => {
                control.finish(SessionStatus::Completed, None);
                break;
            }
            Err(e) => {
                settle_error(control, e);
                break;
            }
        }
    }

    let status = control.snapshot().status;
    info!("Session {} ended: {:?} ({} chars)", control.id(), status, buffer.len());
    status
}

/// 按错误种类结束会话：取消静默，其他错误写入可见信息
pub(crate) fn settle_error(control: &SessionControl, err: NanoError) {
    if err.is_abort() || control.token().is_cancelled() {
        control.finish(SessionStatus::Cancelled, None);
    } else {
        warn!("Session {} failed: {}", control.id(), err);
        control.finish(SessionStatus::Failed, Some(err.user_message()));
    }
}

// ================================================================================================
// 会话句柄
// ================================================================================================

/// 调用方持有的会话句柄
#[derive(Debug)]
pub struct SessionHandle {
    control: SessionControl,
    updates: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub(crate) fn new(control: SessionControl, task: Option<JoinHandle<()>>) -> Self {
        let updates = control.subscribe();
        Self {
            control,
            updates,
            task,
        }
    }

    /// 挂上后台任务。句柄先于任务创建，任务发布的第一个快照也能被 `changed` 收到
    pub(crate) fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    pub fn id(&self) -> u64 {
        self.control.id()
    }

    /// 当前快照
    pub fn state(&self) -> SessionState {
        self.control.snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// 订阅状态更新
    pub fn updates(&self) -> watch::Receiver<SessionState> {
        self.control.subscribe()
    }

    /// 等待下一次更新；会话已结束且没有新快照时返回 `None`
    pub async fn changed(&mut self) -> Option<SessionState> {
        if self.updates.borrow().status.is_terminal() && !self.updates.has_changed().unwrap_or(false) {
            return None;
        }
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// 用渲染器展示当前文本
    pub fn render<R: Render + ?Sized>(&self, renderer: &R) -> String {
        renderer.render(&self.state().text)
    }

    /// 等待会话结束并返回最终快照
    pub async fn wait(mut self) -> SessionState {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Session {} task aborted: {}", self.control.id(), e);
                settle_error(&self.control, NanoError::StreamRead(e.to_string()));
            }
        }
        self.control.snapshot()
    }
}
