//! 两阶段超时控制器。
//!
//! 请求阶段与响应阶段在时间上互斥，因此控制器只持有一个可原地重置的
//! `tokio::time::Sleep`，配合 [`Phase`] 标记当前哪个阶段在计时——
//! "最多一个计时器武装" 的不变量由结构本身保证。
//!
//! 刷新（refresh）即把倒计时从当前时刻重新开始：请求阶段在每个成功
//! 写出的请求体分块后刷新，响应阶段在每个到达的入站分块后刷新。

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::ready;
use tokio::time::{sleep_until, Instant, Sleep};

/// 当前在计时的阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// 无计时器武装
    Idle,
    /// 请求阶段：连接可用之后、请求写完之前
    Request,
    /// 响应阶段：请求写完之后、响应流结束之前
    Response,
}

pub(crate) struct TimeoutController {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
    phase: Phase,
}

impl TimeoutController {
    pub(crate) fn new(timeout: Duration) -> TimeoutController {
        TimeoutController {
            timeout,
            // placeholder deadline; every arm operation resets it
            sleep: Box::pin(sleep_until(Instant::now())),
            phase: Phase::Idle,
        }
    }

    /// 连接可用：武装请求阶段计时器。
    pub(crate) fn arm_request(&mut self) {
        debug_assert_eq!(self.phase, Phase::Idle);
        self.phase = Phase::Request;
        self.restart();
    }

    /// 请求写完的里程碑：清除请求阶段计时器并在同一时刻武装响应阶段。
    pub(crate) fn advance_to_response(&mut self) {
        debug_assert_eq!(self.phase, Phase::Request);
        self.phase = Phase::Response;
        self.restart();
    }

    /// 把当前阶段的倒计时从现在重新开始。空闲时无操作。
    pub(crate) fn refresh(&mut self) {
        if self.phase != Phase::Idle {
            self.restart();
        }
    }

    /// 清除计时器。拆除路径与响应流结束时调用。
    pub(crate) fn clear(&mut self) {
        self.phase = Phase::Idle;
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    fn restart(&mut self) {
        let deadline = Instant::now() + self.timeout;
        self.sleep.as_mut().reset(deadline);
    }

    /// 在计时器触发时完成，产出触发的阶段。
    ///
    /// 空闲时永远悬置。调用方把它作为 `select!` 的一个分支，并把 I/O
    /// 进展分支放在它前面（`biased`）——同一调度轮里先处理数据分块，
    /// 计时器只在整个时长内确实无进展时触发。
    pub(crate) async fn fired(&mut self) -> Phase {
        std::future::poll_fn(|cx| self.poll_fired(cx)).await
    }

    fn poll_fired(&mut self, cx: &mut Context<'_>) -> Poll<Phase> {
        if self.phase == Phase::Idle {
            return Poll::Pending;
        }
        ready!(self.sleep.as_mut().poll(cx));
        Poll::Ready(self.phase)
    }
}
