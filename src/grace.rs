//! Grace-period barrier.
//!
//! A grace period ends once every read session that was open when it started has
//! ended. Sessions that begin afterwards are never waited for, and readers never block:
//! only the caller of [`synchronize`] waits.
//!
//! 宽限期屏障。
//! 当开始时已打开的所有读会话都结束后，宽限期即告结束。
//! 之后才开始的会话不会被等待，读者也永远不会阻塞：只有 [`synchronize`] 的调用者等待。

use crate::rt::sync::atomic::{Ordering, fence};
use crate::shared::SharedState;
use crate::sync::ReaderSlot;
use crate::utils::Backoff;

/// Block until every read session open at the time of the call has ended.
/// Returns the number of sessions that had to be waited for.
///
/// 阻塞直到调用时已打开的所有读会话结束。
/// 返回需要等待的会话数量。
pub(crate) fn synchronize<T>(shared: &SharedState<T>) -> usize {
    // Pairs with the fence in `ReaderSlot::enter`
    // 与 `ReaderSlot::enter` 中的 fence 配对
    fence(Ordering::SeqCst);

    let open: Vec<_> = shared
        .readers()
        .iter()
        .filter_map(|slot| slot.open_session().map(|seq| (slot.clone(), seq)))
        .collect();

    for (slot, seq) in &open {
        wait_for_exit(shared, slot, *seq);
    }

    log::trace!("grace period elapsed after {} open session(s)", open.len());
    open.len()
}

#[inline(never)]
fn wait_for_exit<T>(shared: &SharedState<T>, slot: &ReaderSlot, seq: usize) {
    let mut backoff = Backoff::new();
    loop {
        if slot.has_left(seq) {
            return;
        }

        // Spin briefly before sleeping
        // 睡眠前短暂自旋
        if !backoff.is_completed() {
            backoff.snooze();
            continue;
        }

        // Take the ticket before announcing ourselves, so a wake issued after the
        // announcement always invalidates it
        // 先取票据再登记，保证登记之后发出的唤醒必然使票据失效
        let ticket = shared.notifier.ticket();
        shared.parked.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        if !slot.has_left(seq) {
            shared.notifier.wait_ticket(ticket);
        }

        shared.parked.fetch_sub(1, Ordering::Release);
    }
}

/// Reader side of session exit: wake a parked writer, if there is one
///
/// 读端会话退出：若有挂起的写入者则唤醒它
#[inline(always)]
pub(crate) fn notify_exit<T>(shared: &SharedState<T>) {
    // Pairs with the fence in `wait_for_exit`: either the writer sees our exit,
    // or we see it parked and advance its ticket
    // 与 `wait_for_exit` 中的 fence 配对：要么写入者看到退出，要么我们看到它已挂起并推进票据
    fence(Ordering::SeqCst);
    if shared.parked.load(Ordering::Acquire) != 0 {
        shared.notifier.advance_and_wake();
    }
}
