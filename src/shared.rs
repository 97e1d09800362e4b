use crate::error::{Error, Result};
use crate::rt::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use crate::rt::sync::{Arc, Mutex, MutexGuard};
use crate::sync::{Notifier, ReaderSlot};
use crate::utils::CachePadded;
use std::alloc::{Layout, alloc};
use std::fmt;
use std::ptr::{self, NonNull};

/// Identity of a published node.
/// Assigned by the writer starting at 1, strictly increasing, never reused.
///
/// 已发布节点的标识。
/// 由写入者从 1 开始分配，严格递增，永不复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub const FIRST: NodeId = NodeId(1);

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id `generations` publishes before this one, if it exists
    ///
    /// 比当前早 `generations` 次发布的 id（如存在）
    #[inline]
    pub fn generations_back(self, generations: u64) -> Option<NodeId> {
        match self.0.checked_sub(generations) {
            Some(id) if id >= Self::FIRST.0 => Some(NodeId(id)),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn successor(self) -> NodeId {
        NodeId(self.0 + 1)
    }
}

impl From<NodeId> for u64 {
    fn from(id: NodeId) -> u64 {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
thread_local! {
    static FAILING_ALLOCS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Make the next `count` node allocations on the calling thread fail
#[cfg(all(test, not(feature = "loom")))]
pub(crate) fn fail_next_allocs(count: usize) {
    FAILING_ALLOCS.set(count);
}

fn alloc_node(layout: Layout) -> *mut u8 {
    #[cfg(test)]
    {
        let left = FAILING_ALLOCS.get();
        if left > 0 {
            FAILING_ALLOCS.set(left - 1);
            return ptr::null_mut();
        }
    }

    // SAFETY: `Node<T>` always holds `next`, so the layout is never zero-sized
    unsafe { alloc(layout) }
}

pub(crate) struct Node<T> {
    pub(crate) id: NodeId,
    pub(crate) value: T,
    // Only the writer stores to `next`; it is never touched once the node is unlinked
    // 仅写入者写 `next`；节点被摘除后不再修改
    pub(crate) next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    /// Allocate and fully initialize a node without aborting on OOM
    ///
    /// 分配并完整初始化节点，内存不足时不中止进程
    pub(crate) fn try_alloc(id: NodeId, value: T, next: *mut Node<T>) -> Result<NonNull<Node<T>>> {
        let layout = Layout::new::<Node<T>>();
        let raw = alloc_node(layout).cast::<Node<T>>();
        let ptr = NonNull::new(raw).ok_or(Error::AllocationFailure)?;
        // SAFETY: freshly allocated with the layout of `Node<T>`
        unsafe {
            ptr.as_ptr().write(Node {
                id,
                value,
                next: AtomicPtr::new(next),
            });
        }
        Ok(ptr)
    }

    /// Release a node and hand back its payload
    ///
    /// 释放节点并交还其负载
    ///
    /// # Safety
    /// `ptr` came from `try_alloc`, is unreachable from the chain, and no read session
    /// that could have observed it is still open.
    pub(crate) unsafe fn free(ptr: NonNull<Node<T>>) -> T {
        // SAFETY: allocated by the global allocator with `Layout::new::<Node<T>>()`
        let node = unsafe { Box::from_raw(ptr.as_ptr()) };
        let Node { value, .. } = *node;
        value
    }
}

/// The shared collection handle plus the grace-period bookkeeping
///
/// 共享集合句柄以及宽限期簿记
pub(crate) struct SharedState<T> {
    // Hot: every read session starts here
    // Hot: 每个读会话都从这里开始
    pub(crate) head: CachePadded<AtomicPtr<Node<T>>>,
    // Warm: touched by readers only when the writer is parked
    // Warm: 仅当写入者挂起时读者才会访问
    pub(crate) notifier: CachePadded<Notifier>,
    pub(crate) parked: AtomicUsize,
    // Cold: reader registration and grace-period snapshots
    // Cold: 读者注册与宽限期快照
    readers: Mutex<Vec<Arc<ReaderSlot>>>,
}

unsafe impl<T: Send + Sync> Send for SharedState<T> {}
unsafe impl<T: Send + Sync> Sync for SharedState<T> {}

impl<T> SharedState<T> {
    pub(crate) fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            notifier: CachePadded::new(Notifier::new()),
            parked: AtomicUsize::new(0),
            readers: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn readers(&self) -> MutexGuard<'_, Vec<Arc<ReaderSlot>>> {
        self.readers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self) -> Arc<ReaderSlot> {
        let slot = Arc::new(ReaderSlot::new());
        self.readers().push(slot.clone());
        slot
    }

    pub(crate) fn unregister(&self, slot: &ReaderSlot) {
        self.readers()
            .retain(|registered| !ptr::eq(&**registered, slot));
    }
}

impl<T> Drop for SharedState<T> {
    fn drop(&mut self) {
        // Last handle gone: no reader can observe the chain anymore
        // 最后一个句柄已释放：不会再有读者观察链表
        let mut cursor = self.head.load(Ordering::Relaxed);
        while let Some(node) = NonNull::new(cursor) {
            // SAFETY: nodes are only reachable from here and no session can exist
            unsafe {
                cursor = node.as_ref().next.load(Ordering::Relaxed);
                drop(Node::free(node));
            }
        }
    }
}
