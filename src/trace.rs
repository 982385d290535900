//! 日志追踪宏模块。
//!
//! 对 `tracing` crate 的日志宏做条件包装：启用 `tracing` feature 时展开为
//! 实际的 `tracing::*` 调用，未启用时展开为空操作（零成本）。
//! 本模块在 `lib.rs` 中通过 `#[macro_use]` 最先引入，整个 crate 内的代码
//! 可以直接使用 `trace!`、`debug!`、`warn!` 等宏而无需关心 feature 开关。

// For completeness, wrappers are provided for all of tracing's public
// logging macros, even those currently unused.
#![allow(unused_macros)]

/// `debug!` —— 调试级别日志宏。
macro_rules! debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)+);
        }
    }
}

/// `error!` —— 错误级别日志宏。
macro_rules! error {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::error!($($arg)+);
        }
    }
}

/// `info!` —— 信息级别日志宏。
macro_rules! info {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::info!($($arg)+);
        }
    }
}

/// `trace!` —— 追踪级别日志宏。
///
/// 最细粒度的日志级别，驱动器内部用它追踪请求生命周期的每一步。
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::trace!($($arg)+);
        }
    }
}

/// `trace_span!` —— 追踪级别 span 创建宏。
///
/// 创建并立即进入一个 span，返回 RAII guard，guard 被 drop 时自动退出。
/// 宏体包裹在块中，未启用 tracing 时展开结果仍是合法表达式（`()`）。
macro_rules! trace_span {
    ($($arg:tt)*) => {
        {
            #[cfg(feature = "tracing")]
            {
                let _span = tracing::trace_span!($($arg)+);
                _span.entered()
            }
        }
    }
}

/// `warn!` —— 警告级别日志宏。
macro_rules! warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            tracing::warn!($($arg)+);
        }
    }
}
