//! # rcu-chain
//!
//! A read-copy-update (RCU) singly-linked chain.
//!
//! Readers walk the chain without taking any lock, while a single [`Writer`] publishes
//! new heads and unlinks old nodes. An unlinked node is freed only after a grace period:
//! every read session that was open when it was unlinked has ended.
//!
//! 读-复制-更新（RCU）单向链表。
//! 读者无锁遍历链表，唯一的 [`Writer`] 发布新的头节点并摘除旧节点。
//! 被摘除的节点只有在宽限期之后才会释放：摘除时已打开的所有读会话均已结束。
//!
//! ```
//! use rcu_chain::Writer;
//!
//! let (mut writer, mut reader) = Writer::new();
//! let first = writer.publish("first").unwrap();
//! writer.publish("second").unwrap();
//!
//! let session = reader.begin();
//! let seen: Vec<_> = session.iter().map(|node| *node).collect();
//! assert_eq!(seen, ["second", "first"]);
//!
//! // The unlinked node outlives the session that may still see it
//! let old = writer.unlink_id(first).unwrap();
//! drop(session);
//! assert_eq!(writer.retire(old), "first");
//! ```

mod error;
mod grace;
mod reader;
mod rt;
mod shared;
mod sync;
mod utils;
mod writer;

pub mod config;
pub mod record;
pub mod supervisor;

pub use config::Config;
pub use error::{Error, Result};
pub use reader::{Iter, NodeRef, ReadSession, Reader};
pub use record::NodeName;
pub use shared::NodeId;
pub use supervisor::{Report, Supervisor};
pub use writer::{Unlinked, Writer};
