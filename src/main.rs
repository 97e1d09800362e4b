use clap::Parser;
use rcu_chain::{Config, Supervisor};
use std::thread;
use std::time::Duration;

/// Run one RCU writer against a set of lock-free readers
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Number of reader threads
    #[arg(long, default_value_t = 1)]
    readers: usize,

    /// How long to run before shutting down, in seconds
    #[arg(long, default_value_t = 10)]
    run_for: u64,

    /// Pause between writer cycles, in milliseconds
    #[arg(long, default_value_t = 2000)]
    write_interval: u64,

    /// Pause between read sessions, in milliseconds
    #[arg(long, default_value_t = 200)]
    read_interval: u64,

    /// Pause on each node inside a read session, in milliseconds
    #[arg(long, default_value_t = 10)]
    node_pause: u64,

    /// Nodes visited per read session
    #[arg(long, default_value_t = 5)]
    read_budget: usize,

    /// Retire the node published this many insertions ago
    #[arg(long, default_value_t = 2)]
    window: u64,

    /// Stack size of every spawned thread, in bytes
    #[arg(long)]
    stack_size: Option<usize>,
}

impl Args {
    fn config(&self) -> Config {
        let config = Config::default()
            .with_readers(self.readers)
            .with_write_interval(Duration::from_millis(self.write_interval))
            .with_read_interval(Duration::from_millis(self.read_interval))
            .with_node_pause(Duration::from_millis(self.node_pause))
            .with_read_budget(self.read_budget)
            .with_window(self.window);
        match self.stack_size {
            Some(bytes) => config.with_stack_size(bytes),
            None => config,
        }
    }
}

fn main() -> rcu_chain::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let supervisor = Supervisor::start(args.config())?;
    thread::sleep(Duration::from_secs(args.run_for));

    let report = supervisor.shutdown()?;
    log::info!(
        "last id {:?}, retired {}, drained {}, {} session(s) observed {} node(s), {} inconsistent",
        report.writer.last_id.map(u64::from),
        report.writer.retired,
        report.drained,
        report.readers.sessions,
        report.readers.observed,
        report.readers.inconsistent,
    );
    Ok(())
}
