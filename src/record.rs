use crate::shared::NodeId;
use std::fmt::{self, Write};

/// Capacity of a node name, in bytes
pub const NAME_CAPACITY: usize = 32;

/// A short fixed-capacity name, `node_{id}` for the demo payload.
/// Writes past the capacity are truncated at a character boundary.
///
/// 固定容量的短名称，演示负载中为 `node_{id}`。
/// 超出容量的写入会在字符边界处截断。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeName {
    len: u8,
    bytes: [u8; NAME_CAPACITY],
}

impl NodeName {
    pub const fn new() -> Self {
        Self {
            len: 0,
            bytes: [0; NAME_CAPACITY],
        }
    }

    /// The name derived from `id`
    ///
    /// 由 `id` 推导出的名称
    pub fn for_id(id: NodeId) -> Self {
        let mut name = Self::new();
        // Truncation is the only failure mode and is intended
        let _ = write!(name, "node_{id}");
        name
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only whole `str`s are ever copied in
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    /// Whether this name is the one `id` would produce
    ///
    /// 该名称是否与 `id` 推导出的名称一致
    #[inline]
    pub fn matches(&self, id: NodeId) -> bool {
        *self == Self::for_id(id)
    }
}

impl Default for NodeName {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for NodeName {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let len = self.len as usize;
        let room = NAME_CAPACITY - len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.bytes[len..len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take as u8;

        if take < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
