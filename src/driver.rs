//! 传输驱动器：消费传输事件、推进请求生命周期、执行一次性拆除。
//!
//! 驱动器是单一所有者聚合体：独占持有传输句柄、两阶段计时器与累积中
//! 的消息体缓冲。它作为一个任务被 `perform()` 派生（`spawn_local`，
//! 与实例同线程），经由三条通道与实例句柄通信：
//!
//! - 结果槽（[`Settle`]）：恰好一次地履行或拒绝 perform-future；
//! - 取消信号（[`CancelSignal`]）：`cancel()` 触发协作式拆除；
//! - 取消确认：拆除以取消为因完成时向 cancel-future 发送 `true`。
//!
//! 拆除只有一条出口路径（`run` 末尾的 `finish`），"一次性" 由控制流
//! 结构保证：清计时器、错误因时销毁传输、置终态、向调度器让出一轮、
//! 最后结算未决的 future。

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::config::Config;
use crate::connect::{self, Io, Origin};
use crate::error::{Error, Kind};
use crate::proto::h1;
use crate::proto::Decoder;
use crate::response::{self, Response};
use crate::state::{State, StateCell};
use crate::timeout::{Phase, TimeoutController};

/// 请求体单个写出分块的上限（传输高水位）。
const WRITE_CHUNK_SIZE: usize = 64 * 1024;
/// 读缓冲的初始容量。
const INIT_READ_BUF: usize = 8 * 1024;

/// 一次请求的驱动聚合体。
pub(crate) struct Driver {
    config: Config,
    state: StateCell,
    settle: Settle,
    cancel: CancelSignal,
    ack: Option<oneshot::Sender<bool>>,
}

/// 驱动结束时的三种走向，决定终态与结算方式。
enum Outcome {
    Fulfilled(Response),
    Failed(Error),
    Cancelled,
}

impl Driver {
    pub(crate) fn new(
        config: Config,
        state: StateCell,
        settle: Settle,
        cancel_rx: oneshot::Receiver<()>,
        ack_tx: oneshot::Sender<bool>,
    ) -> Driver {
        Driver {
            config,
            state,
            settle,
            cancel: CancelSignal::new(cancel_rx),
            ack: Some(ack_tx),
        }
    }

    pub(crate) async fn run(mut self) {
        let mut timer = TimeoutController::new(self.config.timeout);
        let mut io = None;
        let outcome = drive(&self.config, &mut self.cancel, &mut timer, &mut io).await;
        self.finish(outcome, timer, io).await;
    }

    /// 一次性拆除。
    async fn finish(mut self, outcome: Outcome, mut timer: TimeoutController, io: Option<Io>) {
        timer.clear();

        // 竞态裁决：`cancel()` 先把状态推进到了 Cancelling，则取消因获胜，
        // 驱动侧同拍得出的结果被丢弃。
        let outcome = if self.state.get() == State::Cancelling {
            Outcome::Cancelled
        } else {
            outcome
        };

        // 只有错误/取消因需要销毁传输两半；成功路径上句柄随作用域释放。
        if !matches!(outcome, Outcome::Fulfilled(_)) {
            drop(io);
        }

        let terminal = match outcome {
            Outcome::Fulfilled(_) => State::Fulfilled,
            Outcome::Failed(_) => State::Failed,
            Outcome::Cancelled => State::Cancelled,
        };
        self.state.transition(terminal);

        // 让出一轮调度，外部观察者先看到一致的终态，再收到结算。
        tokio::task::yield_now().await;

        match outcome {
            Outcome::Fulfilled(resp) => {
                debug!("request fulfilled: {}", resp.status_code());
                self.settle.settle(Ok(resp));
            }
            Outcome::Failed(err) => {
                debug!("request failed: {}", err);
                self.settle.settle(Err(err));
            }
            Outcome::Cancelled => {
                debug!("request cancelled");
                self.settle
                    .settle(Err(Error::new_cancelled(self.config.origin.clone())));
                if let Some(ack) = self.ack.take() {
                    let _ = ack.send(true);
                }
            }
        }
    }
}

/// 把请求推进到一个走向。错误在这里收束，拆除统一发生在 `finish`。
async fn drive(
    config: &Config,
    cancel: &mut CancelSignal,
    timer: &mut TimeoutController,
    io_slot: &mut Option<Io>,
) -> Outcome {
    let origin = config.origin.clone();
    let timeout = config.timeout;

    // 请求体先于连接编码：不可序列化的值在建立任何连接之前就失败。
    let body = match config.body.as_ref().map(|b| b.encode()).transpose() {
        Ok(body) => body,
        Err(e) => return Outcome::Failed(e),
    };

    let io = tokio::select! { biased;
        res = connect::connect(&origin) => match res {
            Ok(io) => io,
            Err(e) => return Outcome::Failed(e),
        },
        _ = cancel.triggered() => return Outcome::Cancelled,
    };
    *io_slot = Some(io);
    let io = io_slot.as_mut().expect("io stored above");

    // 连接可用：武装请求阶段计时器，开始写出。
    timer.arm_request();
    let mut head = BytesMut::new();
    h1::encode_head(config, body.as_ref().map(|(_, len)| *len), &mut head);
    trace!("writing request head, {} bytes", head.len());
    if let Some(outcome) = write_monitored(io, &head, cancel, timer, &origin, timeout).await {
        return outcome;
    }

    if let Some((ref bytes, _)) = body {
        // 按高水位分块写出；write_all 的悬置就是 drain 等待。
        let mut offset = 0;
        while offset < bytes.len() {
            let end = std::cmp::min(offset + WRITE_CHUNK_SIZE, bytes.len());
            if let Some(outcome) =
                write_monitored(io, &bytes[offset..end], cancel, timer, &origin, timeout).await
            {
                return outcome;
            }
            offset = end;
            timer.refresh();
        }
    }

    let flushed = tokio::select! { biased;
        res = io.flush() => res,
        _ = cancel.triggered() => return Outcome::Cancelled,
        phase = timer.fired() => return Outcome::Failed(timeout_error(phase, &origin, timeout)),
    };
    if let Err(e) = flushed {
        return Outcome::Failed(Error::from_io(e, origin));
    }

    // 请求写完的里程碑：请求阶段计时器清除，响应阶段同拍武装。
    timer.advance_to_response();
    trace!("request finished, awaiting response");

    let mut read_buf = BytesMut::with_capacity(INIT_READ_BUF);
    let head = loop {
        match h1::parse_head(&mut read_buf) {
            Ok(Some(head)) => {
                if (100..200).contains(&head.status) {
                    if head.status == 101 {
                        return Outcome::Failed(
                            Error::new(Kind::Protocol)
                                .with("unexpected 101 switching protocols")
                                .with_origin(origin.clone()),
                        );
                    }
                    trace!("skipping informational response {}", head.status);
                    continue;
                }
                break head;
            }
            Ok(None) => {}
            Err(e) => return Outcome::Failed(e.with_origin(origin.clone())),
        }
        match read_monitored(io, &mut read_buf, cancel, timer, &origin, timeout).await {
            ReadStep::Data => timer.refresh(),
            ReadStep::Eof => {
                return Outcome::Failed(
                    Error::new(Kind::ConnectionReset)
                        .with("connection closed before message completed")
                        .with_origin(origin.clone()),
                )
            }
            ReadStep::Abort(outcome) => return outcome,
        }
    };

    let mut decoder = match Decoder::detect(&config.method, head.status, &head.headers) {
        Ok(decoder) => decoder,
        Err(e) => return Outcome::Failed(e.with_origin(origin.clone())),
    };
    let mut body_acc = BytesMut::new();
    loop {
        match decoder.decode(&mut read_buf, &mut body_acc) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => return Outcome::Failed(e.with_origin(origin.clone())),
        }
        match read_monitored(io, &mut read_buf, cancel, timer, &origin, timeout).await {
            ReadStep::Data => timer.refresh(),
            ReadStep::Eof => match decoder.on_eof() {
                Ok(()) => break,
                Err(e) => return Outcome::Failed(e.with_origin(origin.clone())),
            },
            ReadStep::Abort(outcome) => return outcome,
        }
    }

    // 响应流结束：清计时器、装配响应值。
    timer.clear();
    trace!("response complete, {} body bytes", body_acc.len());
    match response::assemble(head, body_acc.freeze(), config.auto_json_response_parse) {
        Ok(resp) => Outcome::Fulfilled(resp),
        Err(e) => Outcome::Failed(e.with_origin(origin)),
    }
}

/// 写出一个分块，同时监听取消与计时器。`None` 表示写出成功。
async fn write_monitored(
    io: &mut Io,
    chunk: &[u8],
    cancel: &mut CancelSignal,
    timer: &mut TimeoutController,
    origin: &Origin,
    timeout: Duration,
) -> Option<Outcome> {
    tokio::select! { biased;
        res = io.write_all(chunk) => match res {
            Ok(()) => None,
            Err(e) => Some(Outcome::Failed(Error::from_io(e, origin.clone()))),
        },
        _ = cancel.triggered() => Some(Outcome::Cancelled),
        phase = timer.fired() => Some(Outcome::Failed(timeout_error(phase, origin, timeout))),
    }
}

/// 单次读取的三种结局。
enum ReadStep {
    /// 读到了数据（调用方负责刷新计时器）
    Data,
    /// 对端结束了流
    Eof,
    /// 取消或计时器中断了等待
    Abort(Outcome),
}

async fn read_monitored(
    io: &mut Io,
    buf: &mut BytesMut,
    cancel: &mut CancelSignal,
    timer: &mut TimeoutController,
    origin: &Origin,
    timeout: Duration,
) -> ReadStep {
    tokio::select! { biased;
        res = io.read_buf(buf) => match res {
            Ok(0) => ReadStep::Eof,
            Ok(_) => ReadStep::Data,
            Err(e) => ReadStep::Abort(Outcome::Failed(Error::from_io(e, origin.clone()))),
        },
        _ = cancel.triggered() => ReadStep::Abort(Outcome::Cancelled),
        phase = timer.fired() => {
            ReadStep::Abort(Outcome::Failed(timeout_error(phase, origin, timeout)))
        }
    }
}

fn timeout_error(phase: Phase, origin: &Origin, timeout: Duration) -> Error {
    match phase {
        Phase::Request => Error::new_request_timeout(origin.clone(), timeout),
        Phase::Response => Error::new_response_timeout(origin.clone(), timeout),
        Phase::Idle => unreachable!("an idle timer never fires"),
    }
}

/// 来自状态机的取消信号。
///
/// 发送端被丢弃（实例被 drop 而未取消）不算取消：此后该信号永远悬置，
/// 请求继续推进到自然结局。
struct CancelSignal {
    rx: Option<oneshot::Receiver<()>>,
}

impl CancelSignal {
    fn new(rx: oneshot::Receiver<()>) -> CancelSignal {
        CancelSignal { rx: Some(rx) }
    }

    /// 在取消信号到来时完成。
    async fn triggered(&mut self) {
        let fired = match self.rx.as_mut() {
            Some(rx) => rx.await.is_ok(),
            None => false,
        };
        self.rx = None;
        if !fired {
            std::future::pending::<()>().await
        }
    }
}

/// perform-future 的结算端，恰好一次。
///
/// 驱动任务在结算之前被意外丢弃时，Drop 守卫兜底发送一个错误，
/// 保证等待方不会永远悬置。
pub(crate) struct Settle {
    tx: Option<oneshot::Sender<Result<Response, Error>>>,
}

impl Settle {
    pub(crate) fn new(tx: oneshot::Sender<Result<Response, Error>>) -> Settle {
        Settle { tx: Some(tx) }
    }

    fn settle(mut self, result: Result<Response, Error>) {
        if let Some(tx) = self.tx.take() {
            // 等待方可能已放弃，忽略发送失败
            let _ = tx.send(result);
        }
    }
}

impl Drop for Settle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(
                Error::new(Kind::Unknown).with("request task dropped before settling")
            ));
        }
    }
}
