//! 一次性请求实例：`perform()` / `cancel()` / `state()`。
//!
//! [`OneShot`] 是对外的生命周期对象。它不直接做 I/O：首次 `perform()`
//! 把配置交给驱动任务（`tokio::task::spawn_local`，与实例同线程），
//! 自己只保留三样东西——共享的状态单元、perform-future 的共享句柄、
//! 取消通路的两端。
//!
//! 两个 future 都是 `oneshot` 接收端套上 `Shared` 的包装：
//! 在 `Requesting` 内重复调用 `perform()`、在 `Cancelling` 内重复调用
//! `cancel()`，返回的都是同一次结算的句柄（幂等）；其余状态下的调用
//! 同步返回 `PerformUnavailable` / `CancelUnavailable`。
//!
//! 实例内部使用 `Rc`，因此是 `!Send` 的：一个实例的全部工作被类型系统
//! 限定在单个线程上，回调、计时器与调用方的交错全部串行化。

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{LocalBoxFuture, Shared};
use futures_util::FutureExt;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

use crate::config::{Builder, Config};
use crate::driver::{Driver, Settle};
use crate::error::{Error, Kind, Result};
use crate::response::Response;
use crate::state::{State, StateCell};

type SharedResult = Shared<LocalBoxFuture<'static, Result<Response>>>;
type SharedAck = Shared<LocalBoxFuture<'static, bool>>;

/// 一次出站 HTTP/HTTPS 请求的生命周期对象。
///
/// 实例恰好被驱动到终态一次，不可复用。`perform()` 必须在
/// [`tokio::task::LocalSet`] 的上下文内调用——驱动任务与实例同线程
/// 运行，这是单线程协作式调度模型的一部分。
///
/// # Example
///
/// ```no_run
/// use onereq::OneShot;
///
/// # async fn run() -> Result<(), onereq::Error> {
/// let req = OneShot::builder("http://127.0.0.1:3000/checkpattern")
///     .method("POST")
///     .header("content-type", "application/octet-stream")
///     .body(&b"This is a pattern!"[..])
///     .build()?;
/// let response = req.perform()?.await?;
/// assert_eq!(response.status_code(), 200);
/// # Ok(())
/// # }
/// ```
pub struct OneShot {
    state: StateCell,
    inner: RefCell<Inner>,
}

struct Inner {
    /// 构造出的配置，首次 perform 时移交给驱动任务
    config: Option<Config>,
    /// Requesting 期间存放的共享 perform-future
    perform: Option<SharedResult>,
    /// 取消信号的发送端，cancel 受理时消耗
    cancel_tx: Option<oneshot::Sender<()>>,
    /// 取消确认的接收端，首次 cancel 时包装为共享 future
    ack_rx: Option<oneshot::Receiver<bool>>,
    /// Cancelling 期间存放的共享 cancel-future
    cancel: Option<SharedAck>,
}

impl OneShot {
    /// 开始构造一个请求实例。参数与校验见 [`Builder`]。
    pub fn builder<U>(url: U) -> Builder
    where
        http::Uri: TryFrom<U>,
        <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        Builder::new(url)
    }

    pub(crate) fn new(config: Config) -> OneShot {
        OneShot {
            state: StateCell::new(),
            inner: RefCell::new(Inner {
                config: Some(config),
                perform: None,
                cancel_tx: None,
                ack_rx: None,
                cancel: None,
            }),
        }
    }

    /// 当前生命周期状态。
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// 把请求驱动到完成，返回结算恰好一次的 perform-future。
    ///
    /// - `Created`：派生驱动任务，状态进入 `Requesting`；
    /// - `Requesting`：幂等，返回同一结算的句柄;
    /// - 其余状态：同步返回 `PerformUnavailable`。
    ///
    /// # Panics
    ///
    /// 在 `LocalSet` 上下文之外首次调用时 panic（`spawn_local` 的要求）。
    pub fn perform(&self) -> Result<Perform> {
        match self.state.get() {
            State::Created => {}
            State::Requesting => {
                let inner = self.inner.borrow();
                let shared = inner
                    .perform
                    .clone()
                    .expect("requesting state stores the perform future");
                return Ok(Perform { inner: shared });
            }
            state => {
                return Err(Error::new(Kind::PerformUnavailable)
                    .with(format!("instance is {}", state)))
            }
        }

        let mut inner = self.inner.borrow_mut();
        let config = inner.config.take().expect("created state holds the config");
        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();

        self.state.transition(State::Requesting);
        let driver = Driver::new(
            config,
            self.state.clone(),
            Settle::new(result_tx),
            cancel_rx,
            ack_tx,
        );
        tokio::task::spawn_local(driver.run());

        let shared: SharedResult = async move {
            match result_rx.await {
                Ok(result) => result,
                // Settle's drop guard makes this unreachable in practice.
                Err(_) => Err(Error::new(Kind::Unknown).with("request task disappeared")),
            }
        }
        .boxed_local()
        .shared();
        inner.perform = Some(shared.clone());
        inner.cancel_tx = Some(cancel_tx);
        inner.ack_rx = Some(ack_rx);
        Ok(Perform { inner: shared })
    }

    /// 协作式地中止在途请求，返回确认拆除的 cancel-future。
    ///
    /// - `Requesting`：状态立刻进入 `Cancelling`（先于 cancel-future 的
    ///   任何结算被观察到），向驱动任务发出取消信号；
    /// - `Cancelling`：幂等，返回同一确认的句柄；
    /// - 其余状态：同步返回 `CancelUnavailable`。
    ///
    /// perform-future 以 `RequestCancelled` 拒绝；本 future 在传输层确认
    /// 拆除后以 `true` 完成。取消与自然完成赛跑失利时（拆除已以其他因
    /// 收尾），本 future 以 `false` 完成。
    pub fn cancel(&self) -> Result<Cancel> {
        match self.state.get() {
            State::Requesting => {}
            State::Cancelling => {
                let inner = self.inner.borrow();
                let shared = inner
                    .cancel
                    .clone()
                    .expect("cancelling state stores the cancel future");
                return Ok(Cancel { inner: shared });
            }
            state => {
                return Err(Error::new(Kind::CancelUnavailable)
                    .with(format!("instance is {}", state)))
            }
        }

        let mut inner = self.inner.borrow_mut();
        self.state.transition(State::Cancelling);
        let cancel_tx = inner
            .cancel_tx
            .take()
            .expect("requesting state holds the cancel sender");
        // 驱动任务可能已经在收尾路径上；信号丢失由拆除侧的竞态裁决兜底
        let _ = cancel_tx.send(());

        let ack_rx = inner
            .ack_rx
            .take()
            .expect("requesting state holds the ack receiver");
        let shared: SharedAck = async move { ack_rx.await.unwrap_or(false) }
            .boxed_local()
            .shared();
        inner.cancel = Some(shared.clone());
        Ok(Cancel { inner: shared })
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> Option<std::cell::Ref<'_, Config>> {
        std::cell::Ref::filter_map(self.inner.borrow(), |inner| inner.config.as_ref()).ok()
    }

    #[cfg(test)]
    pub(crate) fn take_config_for_test(self) -> Config {
        self.inner
            .into_inner()
            .config
            .expect("config still present")
    }
}

impl std::fmt::Debug for OneShot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShot")
            .field("state", &self.state.get())
            .finish()
    }
}

pin_project! {
    /// `perform()` 返回的单次结算结果句柄。
    ///
    /// 同一实例在 `Requesting` 内重复调用 `perform()` 得到的句柄共享
    /// 同一次结算。
    #[must_use = "futures do nothing unless polled"]
    pub struct Perform {
        #[pin]
        inner: SharedResult,
    }
}

impl Future for Perform {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

impl std::fmt::Debug for Perform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Perform").finish()
    }
}

pin_project! {
    /// `cancel()` 返回的确认句柄；传输层确认拆除后以 `true` 完成。
    #[must_use = "futures do nothing unless polled"]
    pub struct Cancel {
        #[pin]
        inner: SharedAck,
    }
}

impl Future for Cancel {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

impl std::fmt::Debug for Cancel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancel").finish()
    }
}
