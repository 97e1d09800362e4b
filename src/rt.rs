#[cfg(not(feature = "loom"))]
pub(crate) use std::hint;
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync;
#[cfg(not(feature = "loom"))]
pub(crate) use std::thread;

#[cfg(feature = "loom")]
pub(crate) use loom::hint;
#[cfg(feature = "loom")]
pub(crate) use loom::sync;
#[cfg(feature = "loom")]
pub(crate) use loom::thread;

/// Park until `atomic` no longer holds `expected` (may wake spuriously)
///
/// 阻塞直到 `atomic` 不再等于 `expected`（可能被虚假唤醒）
#[cfg(not(feature = "loom"))]
#[inline(always)]
pub(crate) fn wait(atomic: &sync::atomic::AtomicU32, expected: u32) {
    atomic_wait::wait(atomic, expected);
}

#[cfg(not(feature = "loom"))]
#[inline(always)]
pub(crate) fn wake_all(atomic: &sync::atomic::AtomicU32) {
    atomic_wait::wake_all(atomic);
}

// loom cannot model futexes; yielding keeps the wait loops schedulable
// loom 无法模拟 futex；让出执行权使等待循环可被调度
#[cfg(feature = "loom")]
#[inline(always)]
pub(crate) fn wait(_atomic: &sync::atomic::AtomicU32, _expected: u32) {
    crate::rt::thread::yield_now();
}

#[cfg(feature = "loom")]
#[inline(always)]
pub(crate) fn wake_all(_atomic: &sync::atomic::AtomicU32) {}
