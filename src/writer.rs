use crate::error::Result;
use crate::grace;
use crate::reader::{Iter, NodeRef, Reader};
use crate::rt::sync::Arc;
use crate::rt::sync::atomic::{AtomicPtr, Ordering};
use crate::shared::{Node, NodeId, SharedState};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// A node removed from the chain but not yet reclaimed.
///
/// Readers that reached it before the unlink may still be standing on it, so its memory
/// is released only after a grace period: either through [`Writer::retire`] or on drop.
///
/// 已从链表摘除但尚未回收的节点。
/// 摘除前到达该节点的读者可能仍停留在其上，因此其内存只在宽限期之后释放：
/// 通过 [`Writer::retire`] 或在 drop 时。
#[must_use = "dropping an unlinked node waits for a grace period"]
pub struct Unlinked<T> {
    shared: Arc<SharedState<T>>,
    node: NonNull<Node<T>>,
}

impl<T> Unlinked<T> {
    #[inline]
    pub fn id(&self) -> NodeId {
        // SAFETY: the node stays allocated until `self` is consumed
        unsafe { self.node.as_ref().id }
    }

    fn into_value(self) -> T {
        let this = ManuallyDrop::new(self);
        grace::synchronize(&this.shared);
        // SAFETY: unreachable since the unlink, and the grace period has elapsed
        let value = unsafe { Node::free(this.node) };
        // SAFETY: `this` is never touched again
        drop(unsafe { ptr::read(&this.shared) });
        value
    }
}

impl<T> Deref for Unlinked<T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the node stays allocated until `self` is consumed
        unsafe { &self.node.as_ref().value }
    }
}

impl<T> Drop for Unlinked<T> {
    fn drop(&mut self) {
        grace::synchronize(&self.shared);
        // SAFETY: unreachable since the unlink, and the grace period has elapsed
        drop(unsafe { Node::free(self.node) });
    }
}

impl<T: fmt::Debug> fmt::Debug for Unlinked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlinked")
            .field("id", &self.id())
            .field("value", &**self)
            .finish()
    }
}

/// The single writer of the chain
///
/// 链表的唯一写入者
pub struct Writer<T> {
    shared: Arc<SharedState<T>>,
    next_id: NodeId,
}

impl<T> Writer<T> {
    /// Create an empty chain
    ///
    /// 创建一个空链表
    pub fn new() -> (Self, Reader<T>) {
        let shared = Arc::new(SharedState::new());
        let reader = Reader::register(shared.clone());
        (
            Writer {
                shared,
                next_id: NodeId::FIRST,
            },
            reader,
        )
    }

    /// Register another reader
    ///
    /// 注册另一个读者
    pub fn reader(&self) -> Reader<T> {
        Reader::register(self.shared.clone())
    }

    /// The id the next successful publish will get
    ///
    /// 下一次成功发布将获得的 id
    #[inline]
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    /// The id of the most recent successful publish
    ///
    /// 最近一次成功发布的 id
    #[inline]
    pub fn last_id(&self) -> Option<NodeId> {
        self.next_id.generations_back(1)
    }

    /// Publish `value` as the new head
    ///
    /// 将 `value` 发布为新的头节点
    #[inline]
    pub fn publish(&mut self, value: T) -> Result<NodeId> {
        self.publish_with(|_| value)
    }

    /// Publish a value derived from the id it is about to receive.
    ///
    /// The node is fully initialized before the `Release` store makes it reachable.
    /// On [`Error::AllocationFailure`](crate::Error::AllocationFailure) the chain and
    /// the id counter are left unchanged.
    ///
    /// 发布一个由即将分配的 id 推导出的值。
    /// 节点在 `Release` 存储使其可达之前已完整初始化。
    /// 分配失败时链表与 id 计数器均保持不变。
    pub fn publish_with<F>(&mut self, f: F) -> Result<NodeId>
    where
        F: FnOnce(NodeId) -> T,
    {
        let id = self.next_id;
        let value = f(id);

        // Only the writer stores to `head`
        // 只有写入者会写 `head`
        let head = self.shared.head.load(Ordering::Relaxed);
        let node = Node::try_alloc(id, value, head)?;
        self.shared.head.store(node.as_ptr(), Ordering::Release);

        self.next_id = id.successor();
        log::trace!("published node {id}");
        Ok(id)
    }

    /// Scan the chain from the writer's side.
    /// No read session is needed: nodes are only ever freed by this writer.
    ///
    /// 从写入者一侧扫描链表。
    /// 无需读会话：节点只会被此写入者释放。
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::from_head(&self.shared)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.head.load(Ordering::Relaxed).is_null()
    }

    /// Remove the first node matching `predicate`.
    ///
    /// The previous link is redirected around the node; the node's own `next` is left
    /// untouched so readers standing on it still reach its successor.
    ///
    /// 摘除第一个满足 `predicate` 的节点。
    /// 前驱链接被重定向绕过该节点；节点自身的 `next` 保持不变，
    /// 使停留在其上的读者仍能到达其后继。
    pub fn unlink<F>(&mut self, mut predicate: F) -> Option<Unlinked<T>>
    where
        F: FnMut(NodeRef<'_, T>) -> bool,
    {
        let mut link: &AtomicPtr<Node<T>> = &self.shared.head;
        loop {
            let node = NonNull::new(link.load(Ordering::Acquire))?;
            // SAFETY: only this writer frees nodes, and it is borrowed mutably
            let node_ref = unsafe { node.as_ref() };

            if predicate(NodeRef { node: node_ref }) {
                let successor = node_ref.next.load(Ordering::Relaxed);
                link.store(successor, Ordering::Release);
                log::trace!("unlinked node {}", node_ref.id);
                return Some(Unlinked {
                    shared: self.shared.clone(),
                    node,
                });
            }

            link = &node_ref.next;
        }
    }

    /// Remove the node with the given id
    ///
    /// 摘除具有给定 id 的节点
    #[inline]
    pub fn unlink_id(&mut self, id: NodeId) -> Option<Unlinked<T>> {
        self.unlink(|node| node.id() == id)
    }

    /// Wait for a grace period, then free `node` and hand back its payload
    ///
    /// 等待宽限期，然后释放 `node` 并交还其负载
    pub fn retire(&self, node: Unlinked<T>) -> T {
        debug_assert!(
            ptr::eq(&*node.shared, &*self.shared),
            "retiring a node unlinked from another chain"
        );
        let id = node.id();
        let value = node.into_value();
        log::trace!("reclaimed node {id}");
        value
    }

    /// Block until every read session open right now has ended.
    /// Calling it while this thread holds a read session never returns.
    ///
    /// 阻塞直到当前打开的所有读会话结束。
    /// 若当前线程持有读会话，则调用永远不会返回。
    #[inline]
    pub fn wait_for_grace_period(&self) {
        grace::synchronize(&self.shared);
    }

    /// Detach every node, wait for a grace period, then free them all.
    /// Returns the number of reclaimed nodes.
    ///
    /// 摘除所有节点，等待宽限期后全部释放。
    /// 返回回收的节点数量。
    pub fn drain(&mut self) -> usize {
        let mut cursor = self.shared.head.swap(ptr::null_mut(), Ordering::AcqRel);
        if cursor.is_null() {
            return 0;
        }

        grace::synchronize(&self.shared);

        let mut reclaimed = 0;
        while let Some(node) = NonNull::new(cursor) {
            // SAFETY: detached from the handle before the grace period began
            unsafe {
                cursor = node.as_ref().next.load(Ordering::Relaxed);
                drop(Node::free(node));
            }
            reclaimed += 1;
        }

        log::trace!("drained {reclaimed} node(s)");
        reclaimed
    }
}

impl<T> fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
