//! Bootstrap and shutdown of the writer/reader demo.
//!
//! One writer thread keeps a sliding window of `node_{id}` records alive while reader
//! threads repeatedly walk the chain. Shutdown stops and joins every thread before the
//! remaining nodes are drained through a final grace period.
//!
//! 写入者/读者演示的启动与关闭。
//! 一个写入者线程维持 `node_{id}` 记录的滑动窗口，读者线程反复遍历链表。
//! 关闭时先停止并 join 所有线程，再通过最后一次宽限期回收剩余节点。

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::record::NodeName;
use crate::shared::NodeId;
use crate::writer::Writer;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Counters kept by the writer thread
///
/// 写入者线程维护的计数器
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    /// Id of the last successful publish
    pub last_id: Option<NodeId>,
    /// Nodes unlinked and reclaimed after a grace period
    pub retired: u64,
    /// Window nodes that were already gone when the writer tried to unlink them
    pub not_found: u64,
    /// Publishes that failed to allocate and were retried
    pub alloc_failures: u64,
}

/// Counters kept by a reader thread
///
/// 读者线程维护的计数器
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub sessions: u64,
    /// Nodes visited across all sessions
    pub observed: u64,
    /// Nodes whose name did not match their id
    pub inconsistent: u64,
}

impl ReaderStats {
    fn absorb(&mut self, other: ReaderStats) {
        self.sessions += other.sessions;
        self.observed += other.observed;
        self.inconsistent += other.inconsistent;
    }
}

/// Summary returned by [`Supervisor::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub writer: WriterStats,
    /// Totals across all reader threads
    pub readers: ReaderStats,
    /// Nodes still linked at shutdown and reclaimed by the final drain
    pub drained: usize,
}

type WriterExit = (Writer<NodeName>, WriterStats);

/// Owns the writer and reader threads
///
/// 持有写入者与读者线程
pub struct Supervisor {
    stop: Arc<AtomicBool>,
    readers: Vec<JoinHandle<ReaderStats>>,
    writer: Option<JoinHandle<WriterExit>>,
}

impl Supervisor {
    /// Spawn the reader threads, then the writer thread.
    /// If any spawn fails, every started thread is stopped and joined first.
    ///
    /// 先启动读者线程，再启动写入者线程。
    /// 任一线程启动失败时，先停止并 join 所有已启动的线程。
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;
        Self::launch(config, Writer::new())
    }

    fn launch(config: Config, chain: (Writer<NodeName>, Reader<NodeName>)) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (mut writer, first_reader) = chain;
        let mut spare = Some(first_reader);
        let mut readers = Vec::with_capacity(config.readers);

        for index in 0..config.readers {
            let reader = spare.take().unwrap_or_else(|| writer.reader());
            let spawned = spawn(format!("rcu-reader-{index}"), config.stack_size, {
                let stop = stop.clone();
                let config = config.clone();
                move || run_reader(reader, &config, &stop)
            });

            match spawned {
                Ok(handle) => readers.push(handle),
                Err(source) => {
                    error!("failed to start reader thread {index}: {source}");
                    rollback(&stop, readers);
                    writer.drain();
                    return Err(Error::ThreadStart {
                        role: "reader",
                        source,
                    });
                }
            }
        }
        drop(spare);

        let spawned = spawn("rcu-writer".into(), config.stack_size, {
            let stop = stop.clone();
            let config = config.clone();
            move || run_writer(writer, &config, &stop)
        });

        let writer = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                // The writer never ran, so nothing was published
                error!("failed to start writer thread: {source}");
                rollback(&stop, readers);
                return Err(Error::ThreadStart {
                    role: "writer",
                    source,
                });
            }
        };

        info!("started {} reader(s) and the writer", config.readers);
        Ok(Self {
            stop,
            readers,
            writer: Some(writer),
        })
    }

    /// Signal every thread, join them, then drain the chain
    ///
    /// 通知所有线程、join 它们，然后清空链表
    pub fn shutdown(mut self) -> Result<Report> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<Report> {
        signal(&self.stop, &self.readers);
        if let Some(writer) = &self.writer {
            writer.thread().unpark();
        }

        let mut readers = ReaderStats::default();
        let mut panicked = None;
        for handle in self.readers.drain(..) {
            match handle.join() {
                Ok(stats) => readers.absorb(stats),
                Err(_) => panicked = Some("reader"),
            }
        }

        let (mut writer, stats) = match self.writer.take().map(JoinHandle::join) {
            Some(Ok(exit)) => exit,
            // The writer's chain went down with it; the shared state frees what was left
            Some(Err(_)) | None => return Err(Error::ThreadPanicked { role: "writer" }),
        };

        let drained = writer.drain();
        info!("shutdown complete, drained {drained} node(s)");

        match panicked {
            Some(role) => Err(Error::ThreadPanicked { role }),
            None => Ok(Report {
                writer: stats,
                readers,
                drained,
            }),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(err) = self.stop_and_join() {
                error!("supervisor dropped: {err}");
            }
        }
    }
}

fn signal<R>(stop: &AtomicBool, handles: &[JoinHandle<R>]) {
    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.thread().unpark();
    }
}

#[cfg(test)]
thread_local! {
    // Spawns this thread may still perform before `spawn` refuses
    static SPAWNS_LEFT: std::cell::Cell<usize> = const { std::cell::Cell::new(usize::MAX) };
}

fn spawn<F, R>(name: String, stack_size: Option<usize>, body: F) -> io::Result<JoinHandle<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    #[cfg(test)]
    {
        let left = SPAWNS_LEFT.get();
        if left == 0 {
            return Err(io::Error::other("spawn refused"));
        }
        SPAWNS_LEFT.set(left - 1);
    }

    let mut builder = thread::Builder::new().name(name);
    if let Some(bytes) = stack_size {
        builder = builder.stack_size(bytes);
    }
    builder.spawn(body)
}

fn rollback(stop: &AtomicBool, readers: Vec<JoinHandle<ReaderStats>>) {
    signal(stop, &readers);
    for handle in readers {
        let name = handle.thread().name().unwrap_or("reader").to_owned();
        if handle.join().is_err() {
            warn!("{name} panicked during rollback");
        }
    }
}

/// Sleep for `duration` unless `stop` is raised first
///
/// 睡眠 `duration`，除非 `stop` 先被置位
fn pause(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}

fn run_writer(mut writer: Writer<NodeName>, config: &Config, stop: &AtomicBool) -> WriterExit {
    info!("writer started");
    let mut stats = WriterStats::default();

    while !stop.load(Ordering::Acquire) {
        let id = match writer.publish_with(NodeName::for_id) {
            Ok(id) => id,
            Err(err) => {
                warn!("{err}, retrying in {:?}", config.alloc_backoff);
                stats.alloc_failures += 1;
                pause(stop, config.alloc_backoff);
                continue;
            }
        };
        stats.last_id = Some(id);
        debug!("published node {id}");

        if let Some(old) = id.generations_back(config.window) {
            match writer.unlink_id(old) {
                Some(node) => {
                    info!("unlinked node {old} ({}), waiting for a grace period", *node);
                    writer.retire(node);
                    stats.retired += 1;
                    info!("reclaimed node {old}");
                }
                None => {
                    debug!("node {old} is already gone");
                    stats.not_found += 1;
                }
            }
        }

        pause(stop, config.write_interval);
    }

    info!("writer stopped at {:?}", stats.last_id);
    (writer, stats)
}

fn run_reader(mut reader: Reader<NodeName>, config: &Config, stop: &AtomicBool) -> ReaderStats {
    info!("reader started");
    let mut stats = ReaderStats::default();

    while !stop.load(Ordering::Acquire) {
        let session = reader.begin();
        for node in session.iter().take(config.read_budget) {
            if node.matches(node.id()) {
                debug!("read node {}: {}", node.id(), *node);
            } else {
                error!("node {} carries a foreign name {:?}", node.id(), *node);
                stats.inconsistent += 1;
            }
            stats.observed += 1;

            if !config.node_pause.is_zero() {
                thread::sleep(config.node_pause);
            }
        }
        session.end();
        stats.sessions += 1;

        pause(stop, config.read_interval);
    }

    info!("reader stopped after {} session(s)", stats.sessions);
    stats
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::shared;

    fn idle_config(readers: usize) -> Config {
        Config::default()
            .with_readers(readers)
            .with_read_interval(Duration::from_secs(10))
            .with_write_interval(Duration::from_secs(10))
            .with_node_pause(Duration::ZERO)
    }

    /// Start with a spawn budget, keeping a reader outside the supervisor to inspect the chain
    fn launch_with_spawns(spawns: usize, config: Config) -> (Result<Supervisor>, Reader<NodeName>) {
        let (writer, reader) = Writer::new();
        let observer = writer.reader();
        SPAWNS_LEFT.set(spawns);
        let result = Supervisor::launch(config, (writer, reader));
        SPAWNS_LEFT.set(usize::MAX);
        (result, observer)
    }

    fn assert_rolled_back(observer: &Reader<NodeName>) {
        // Only the observer is left: every started thread dropped its handle and was joined
        assert_eq!(observer.shared.readers().len(), 1);
        assert_eq!(Arc::strong_count(&observer.shared), 1);
        assert!(observer.shared.head.load(Ordering::Relaxed).is_null());
    }

    #[test]
    fn reader_spawn_failure_joins_started_readers() {
        let (result, observer) = launch_with_spawns(2, idle_config(4));
        assert!(matches!(
            result,
            Err(Error::ThreadStart { role: "reader", .. })
        ));
        assert_rolled_back(&observer);
    }

    #[test]
    fn writer_spawn_failure_joins_every_reader() {
        let (result, observer) = launch_with_spawns(3, idle_config(3));
        assert!(matches!(
            result,
            Err(Error::ThreadStart { role: "writer", .. })
        ));
        assert_rolled_back(&observer);
    }

    #[test]
    fn first_spawn_failure_leaves_nothing_behind() {
        let (result, observer) = launch_with_spawns(0, idle_config(2));
        assert!(matches!(
            result,
            Err(Error::ThreadStart { role: "reader", .. })
        ));
        assert_rolled_back(&observer);
    }

    #[test]
    fn rollback_survives_a_panicked_reader() {
        let stop = AtomicBool::new(false);
        let panicked = thread::Builder::new()
            .name("rcu-reader-0".into())
            .spawn(|| -> ReaderStats { panic!("reader failed") })
            .unwrap();
        let healthy = thread::spawn(ReaderStats::default);

        rollback(&stop, vec![panicked, healthy]);
        assert!(stop.load(Ordering::Acquire));
    }

    #[test]
    fn writer_loop_retries_failed_allocations() {
        let config = Config::default()
            .with_write_interval(Duration::from_millis(1))
            .with_alloc_backoff(Duration::from_millis(1))
            .with_window(2);
        let (writer, _reader) = Writer::new();
        let stop = Arc::new(AtomicBool::new(false));

        let stopper = thread::spawn({
            let stop = stop.clone();
            move || {
                thread::sleep(Duration::from_millis(100));
                stop.store(true, Ordering::Release);
            }
        });

        // The writer loop runs on this thread, so the injected failures hit it
        shared::fail_next_allocs(3);
        let (writer, stats) = run_writer(writer, &config, &stop);
        stopper.join().unwrap();

        assert_eq!(stats.alloc_failures, 3);
        let last = stats.last_id.expect("the writer published after the failures");
        // Failed publishes consumed no id: every id is either retired or still linked
        assert_eq!(stats.retired + writer.len() as u64, last.get());
        assert_eq!(writer.next_id().get(), last.get() + 1);
        assert!(writer.len() <= 2);
    }

    #[test]
    fn pause_returns_early_once_stopped() {
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        pause(&stop, Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn reader_stats_accumulate() {
        let mut total = ReaderStats::default();
        total.absorb(ReaderStats {
            sessions: 2,
            observed: 5,
            inconsistent: 0,
        });
        total.absorb(ReaderStats {
            sessions: 1,
            observed: 3,
            inconsistent: 1,
        });
        assert_eq!(
            total,
            ReaderStats {
                sessions: 3,
                observed: 8,
                inconsistent: 1
            }
        );
    }
}
