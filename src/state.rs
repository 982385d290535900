//! 请求生命周期状态机。
//!
//! 每个实例拥有一个六状态的生命周期变量，所有对外可见的状态迁移都经过
//! 本模块。迁移合法性由 [`State::can_transition_to`] 的表驱动判断约束，
//! 非法迁移在 debug 构建中触发断言。
//!
//! 状态单元用 `Rc<Cell<State>>` 在实例句柄与驱动任务之间共享——实例被
//! 限定在单线程上（协作式调度），因此不需要原子操作或锁。

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// 一次请求生命周期的状态。
///
/// 六个变体是身份可比较的常量。终态为
/// [`Fulfilled`](State::Fulfilled) | [`Cancelled`](State::Cancelled) |
/// [`Failed`](State::Failed)，进入终态后实例不再接受任何调用。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// 实例已构造，尚未调用 `perform()`
    Created,
    /// `perform()` 已启动，请求在途
    Requesting,
    /// `cancel()` 已受理，等待传输层确认拆除
    Cancelling,
    /// 响应装配成功（终态）
    Fulfilled,
    /// 取消已被确认（终态）
    Cancelled,
    /// 本地或传输层错误（终态）
    Failed,
}

impl State {
    /// 此状态是否为终态。
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Fulfilled | State::Cancelled | State::Failed)
    }

    /// 迁移表：从 `self` 到 `to` 是否合法。
    ///
    /// | 从 | 到 |
    /// |---|---|
    /// | `Created` | `Requesting` |
    /// | `Requesting` | `Fulfilled` \| `Failed` \| `Cancelling` |
    /// | `Cancelling` | `Cancelled` |
    pub fn can_transition_to(&self, to: State) -> bool {
        matches!(
            (self, to),
            (State::Created, State::Requesting)
                | (State::Requesting, State::Fulfilled)
                | (State::Requesting, State::Failed)
                | (State::Requesting, State::Cancelling)
                | (State::Cancelling, State::Cancelled)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Created => "created",
            State::Requesting => "requesting",
            State::Cancelling => "cancelling",
            State::Fulfilled => "fulfilled",
            State::Cancelled => "cancelled",
            State::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 实例句柄与驱动任务共享的状态单元。
#[derive(Clone)]
pub(crate) struct StateCell {
    inner: Rc<Cell<State>>,
}

impl StateCell {
    pub(crate) fn new() -> StateCell {
        StateCell {
            inner: Rc::new(Cell::new(State::Created)),
        }
    }

    pub(crate) fn get(&self) -> State {
        self.inner.get()
    }

    /// 执行一次状态迁移。
    ///
    /// 单线程限定保证了读-改-写不会与其他任务交错。
    pub(crate) fn transition(&self, to: State) {
        let from = self.inner.get();
        debug_assert!(
            from.can_transition_to(to),
            "illegal state transition: {} -> {}",
            from,
            to,
        );
        trace!("state: {} -> {}", from, to);
        self.inner.set(to);
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&self.inner.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_table() {
        assert!(State::Created.can_transition_to(State::Requesting));
        assert!(State::Requesting.can_transition_to(State::Fulfilled));
        assert!(State::Requesting.can_transition_to(State::Failed));
        assert!(State::Requesting.can_transition_to(State::Cancelling));
        assert!(State::Cancelling.can_transition_to(State::Cancelled));
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        let all = [
            State::Created,
            State::Requesting,
            State::Cancelling,
            State::Fulfilled,
            State::Cancelled,
            State::Failed,
        ];
        for terminal in [State::Fulfilled, State::Cancelled, State::Failed] {
            assert!(terminal.is_terminal());
            for to in all {
                assert!(!terminal.can_transition_to(to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn skipping_requesting_is_illegal() {
        assert!(!State::Created.can_transition_to(State::Fulfilled));
        assert!(!State::Created.can_transition_to(State::Cancelling));
        assert!(!State::Cancelling.can_transition_to(State::Fulfilled));
        assert!(!State::Cancelling.can_transition_to(State::Failed));
    }
}
