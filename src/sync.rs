use crate::rt::sync::atomic::{AtomicU32, AtomicUsize, Ordering, fence};

/// === ReaderSlot ===
/// Per-reader session counter.
/// Odd values mean a read session is open, even values mean the reader is quiescent.
/// Only the owning reader writes it; the writer only loads it during a grace period.
///
/// === ReaderSlot ===
/// 每个读者的会话计数器。
/// 奇数表示读会话进行中，偶数表示读者处于静止状态。
/// 仅由所属读者写入；写入者只在宽限期内读取。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct ReaderSlot {
    seq: AtomicUsize,
}

impl ReaderSlot {
    #[inline(always)]
    pub(crate) fn new() -> Self {
        Self {
            seq: AtomicUsize::new(0),
        }
    }

    /// Mark the start of a read session and return its (odd) sequence number.
    /// A session leaked with `mem::forget` leaves the slot odd; the new session then
    /// skips to the next odd value, so the slot never reads as quiescent while open.
    ///
    /// 标记读会话开始并返回其（奇数）序号。
    /// 通过 `mem::forget` 泄漏的会话会使槽位保持奇数；新会话跳到下一个奇数，
    /// 因此会话打开期间槽位绝不会显示为静止。
    #[inline(always)]
    pub(crate) fn enter(&self) -> usize {
        let current = self.seq.load(Ordering::Relaxed);
        let seq = if current & 1 == 1 {
            current.wrapping_add(2)
        } else {
            current.wrapping_add(1)
        };
        self.seq.store(seq, Ordering::Relaxed);

        // Pairs with the fence in `grace::synchronize`: either the writer sees this
        // session, or every load below sees the writer's unlink.
        // 与 `grace::synchronize` 中的 fence 配对：要么写入者看到本会话，
        // 要么下面的所有 load 都能看到写入者的摘除操作。
        fence(Ordering::SeqCst);
        seq
    }

    /// Mark the end of the session started with `seq`
    ///
    /// 标记以 `seq` 开始的会话结束
    #[inline(always)]
    pub(crate) fn exit(&self, seq: usize) {
        // Release: node reads inside the session happen-before reclamation
        // Release：会话内的节点读取先于回收发生
        self.seq.store(seq.wrapping_add(1), Ordering::Release);
    }

    /// The sequence of the currently open session, if any
    ///
    /// 当前打开会话的序号（如有）
    #[inline(always)]
    pub(crate) fn open_session(&self) -> Option<usize> {
        let seq = self.seq.load(Ordering::Acquire);
        (seq & 1 == 1).then_some(seq)
    }

    /// End a session leaked by its owner, if one is still open.
    /// Returns `true` if the slot had to be closed.
    ///
    /// 结束被所有者泄漏的会话（若仍打开）。
    /// 若槽位需要被关闭则返回 `true`。
    pub(crate) fn close_leaked(&self) -> bool {
        match self.open_session() {
            Some(seq) => {
                self.exit(seq);
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    pub(crate) fn has_left(&self, seq: usize) -> bool {
        self.seq.load(Ordering::Acquire) != seq
    }
}

/// === Ticket Notifier ===
/// Ticket-based notifier used to park the writer during a grace period.
///
/// === Ticket Notifier ===
/// 宽限期内用于挂起写入者的票据通知器。
#[derive(Debug)]
pub(crate) struct Notifier {
    inner: AtomicU32,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    #[inline(always)]
    pub(crate) fn ticket(&self) -> u32 {
        self.inner.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn wait_ticket(&self, expected: u32) {
        crate::rt::wait(&self.inner, expected);
    }

    #[inline(always)]
    pub(crate) fn advance_and_wake(&self) {
        // Release ordering ensures memory visibility to woken threads
        // Release 序确保内存修改对唤醒线程可见
        self.inner.fetch_add(1, Ordering::Release);
        crate::rt::wake_all(&self.inner);
    }
}
