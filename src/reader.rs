use crate::grace;
use crate::rt::sync::Arc;
use crate::rt::sync::atomic::Ordering;
use crate::shared::{Node, NodeId, SharedState};
use crate::sync::ReaderSlot;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::Deref;

/// A borrowed view of a linked node, valid for the session (or writer borrow) it came from
///
/// 对链表节点的借用视图，仅在其所属会话（或写入者借用）期间有效
pub struct NodeRef<'a, T> {
    pub(crate) node: &'a Node<T>,
}

impl<'a, T> NodeRef<'a, T> {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    #[inline]
    pub fn value(&self) -> &'a T {
        &self.node.value
    }
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<T> Deref for NodeRef<'_, T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &T {
        &self.node.value
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.node.id)
            .field("value", &self.node.value)
            .finish()
    }
}

/// Walks the chain from head to tail.
/// Each `next` load is `Acquire`, pairing with the `Release` publish of the node.
///
/// 从头到尾遍历链表。
/// 每次 `next` 加载均为 `Acquire`，与节点发布时的 `Release` 配对。
pub struct Iter<'a, T> {
    cursor: *const Node<T>,
    _session: PhantomData<&'a Node<T>>,
}

impl<'a, T> Iter<'a, T> {
    #[inline]
    pub(crate) fn from_head(shared: &'a SharedState<T>) -> Self {
        Self {
            cursor: shared.head.load(Ordering::Acquire),
            _session: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = NodeRef<'a, T>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the caller holds a read session (or is the writer), so every node
        // reachable from the head it loaded stays allocated for `'a`
        let node = unsafe { self.cursor.as_ref() }?;
        self.cursor = node.next.load(Ordering::Acquire);
        Some(NodeRef { node })
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

/// An open read session.
/// Ends on drop; node references cannot outlive it.
///
/// 一个打开的读会话。
/// 在 drop 时结束；节点引用无法比它存活更久。
#[must_use = "a read session ends as soon as it is dropped"]
pub struct ReadSession<'r, T> {
    reader: &'r mut Reader<T>,
    seq: usize,
}

impl<'r, T> ReadSession<'r, T> {
    /// Traverse the chain as of now
    ///
    /// 遍历当前的链表
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::from_head(&self.reader.shared)
    }

    /// The newest node, if the chain is non-empty
    ///
    /// 最新节点（若链表非空）
    #[inline]
    pub fn head(&self) -> Option<NodeRef<'_, T>> {
        self.iter().next()
    }

    /// End the session explicitly
    ///
    /// 显式结束会话
    #[inline]
    pub fn end(self) {}
}

impl<'r, T> Drop for ReadSession<'r, T> {
    #[inline(always)]
    fn drop(&mut self) {
        self.reader.slot.exit(self.seq);
        grace::notify_exit(&self.reader.shared);
    }
}

/// A registered reader.
/// Cloning registers a new reader; each reader holds at most one session at a time.
///
/// 已注册的读者。
/// 克隆会注册一个新读者；每个读者同一时刻至多持有一个会话。
pub struct Reader<T> {
    pub(crate) shared: Arc<SharedState<T>>,
    pub(crate) slot: Arc<ReaderSlot>,
}

impl<T> Reader<T> {
    pub(crate) fn register(shared: Arc<SharedState<T>>) -> Self {
        let slot = shared.register();
        Self { shared, slot }
    }

    /// Begin a read session. Never blocks.
    ///
    /// 开始读会话，永不阻塞。
    #[inline]
    pub fn begin(&mut self) -> ReadSession<'_, T> {
        let seq = self.slot.enter();
        ReadSession { reader: self, seq }
    }

    /// Run `f` inside a read session
    ///
    /// 在读会话中执行 `f`
    #[inline]
    pub fn read<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(Iter<'_, T>) -> R,
    {
        let session = self.begin();
        f(session.iter())
    }
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self::register(self.shared.clone())
    }
}

impl<T> Drop for Reader<T> {
    fn drop(&mut self) {
        // No node reference can outlive the reader, so a forgotten session is over
        // 节点引用不可能比读者存活更久，因此被遗忘的会话已结束
        if self.slot.close_leaked() {
            grace::notify_exit(&self.shared);
        }
        self.shared.unregister(&self.slot);
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").finish_non_exhaustive()
    }
}
