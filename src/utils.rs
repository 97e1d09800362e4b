use crate::rt::hint::spin_loop;
use std::ops::Deref;

/// Number of snoozes spent spinning before a waiter should park
///
/// 等待者在休眠前自旋的次数
pub(crate) const SPIN_LIMIT: u32 = 20;

/// Simple exponential backoff utility
///
/// 简单的指数退避工具
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline(always)]
    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    #[inline(always)]
    pub(crate) fn snooze(&mut self) {
        if self.step < 10 {
            spin_loop();
        } else {
            crate::rt::thread::yield_now();
        }
        // Saturating increment
        // 饱和递增
        if self.step < SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// Whether spinning has stopped paying off
    ///
    /// 自旋是否已不再划算
    #[inline(always)]
    pub(crate) fn is_completed(&self) -> bool {
        self.step >= SPIN_LIMIT
    }
}

/// Padding to avoid false sharing
///
/// 防止伪共享的填充
#[repr(align(64))]
pub(crate) struct CachePadded<T> {
    pub(crate) value: T,
}

impl<T> CachePadded<T> {
    #[inline(always)]
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &T {
        &self.value
    }
}
