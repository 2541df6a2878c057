//! UDP Echo Server
//!
//! One thread per core, each with its own `SO_REUSEPORT` socket and its
//! own `MsgBatch`; the kernel spreads datagrams across the sockets.
//! Every batch received is sent straight back to its senders.
//!
//! Usage:
//!     cargo build --release -p udp-echo
//!     ./target/release/udp-echo [host:port] [threads] [batch]
//!
//! Socket options come from the environment (`DGRAM_CPU_AFFINITY`,
//! `DGRAM_RCVBUF`, ...); logging from `RUST_LOG`.
//!
//! Test with:
//!     echo "hello" | nc -u -w1 localhost 9999

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dgram::{env, process, report, DgResult, Host, MsgBatch, Udp, UdpOpts};

const SEGMENT: usize = 2048;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_sigint(_: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

#[derive(Default)]
struct Stats {
    batches: AtomicU64,
    msgs_in: AtomicU64,
    msgs_out: AtomicU64,
    bytes_in: AtomicU64,
    errors: AtomicU64,
}

impl Stats {
    fn print(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let msgs_in = self.msgs_in.load(Ordering::Relaxed);
        eprintln!(
            "[{:.1}s] batches={} in={} out={} bytes_in={} err={} ({:.0} msg/s)",
            secs,
            self.batches.load(Ordering::Relaxed),
            msgs_in,
            self.msgs_out.load(Ordering::Relaxed),
            self.bytes_in.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            msgs_in as f64 / secs,
        );
    }
}

/// Pin the calling thread to `cpu` so `SO_INCOMING_CPU` names the core it
/// keeps running on.
fn pin_to(cpu: usize) {
    let mut set = CpuSet::new();
    if set.set(cpu).is_err() || sched_setaffinity(Pid::from_raw(0), &set).is_err() {
        warn!(cpu, "unable to pin worker thread");
    }
}

fn worker(id: usize, host: Host, opts: UdpOpts, batch_len: usize, stats: Arc<Stats>) -> DgResult<()> {
    if opts.cpu_affinity {
        pin_to(id % process::cpus());
    }

    let udp = match Udp::server(&host, &opts) {
        Ok(udp) => udp,
        Err(err) => {
            RUNNING.store(false, Ordering::Relaxed);
            return Err(err);
        }
    };
    let mut batch = MsgBatch::alloc(batch_len, &[SEGMENT]);
    info!(worker = id, fd = udp.fd(), local = ?udp.local_addr().ok(), "worker ready");

    while RUNNING.load(Ordering::Relaxed) {
        let n = match udp.recv_batch(&mut batch, batch_len) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(err) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, error = %err, "recv_batch failed");
                continue;
            }
        };

        let bytes: usize = (0..n).map(|i| batch.msg_len(i)).sum();
        stats.batches.fetch_add(1, Ordering::Relaxed);
        stats.msgs_in.fetch_add(n as u64, Ordering::Relaxed);
        stats.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);

        // Senders' addresses are already in the batch; send it back as is.
        // A partial send drops the tail, as any UDP hop may.
        match udp.send_batch(&mut batch, n) {
            Ok(sent) => {
                stats.msgs_out.fetch_add(sent as u64, Ordering::Relaxed);
            }
            Err(err) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, error = %err, "send_batch failed");
            }
        }
    }

    udp.close()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    report::init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).map(String::as_str).unwrap_or("0.0.0.0:9999");
    let threads: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| env::env_get("DGRAM_THREADS", process::cpus()));
    let batch_len: usize = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| env::env_get("DGRAM_BATCH", 64));

    let threads = threads.max(1);
    let batch_len = batch_len.max(1);

    let host = match Host::parse(addr) {
        Ok(host) => host,
        Err(err) => report::exit_with(&err),
    };

    let mut opts = UdpOpts::from_env();
    if threads > 1 {
        opts.reuse_port = true;
    }
    if opts.recv_timeout.is_none() {
        // Wake periodically to notice shutdown.
        opts.recv_timeout = Some(Duration::from_millis(200));
    }
    if let Err(err) = opts.validate() {
        report::exit_with(&err);
    }

    // SAFETY: the handler only stores to an atomic.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_sigint as libc::sighandler_t);
    }

    eprintln!(
        "udp-echo: {} on {} thread(s), batch {} (reuse_port={}, cpu_affinity={})",
        host, threads, batch_len, opts.reuse_port, opts.cpu_affinity
    );

    let stats = Arc::new(Stats::default());
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|id| {
            let host = host.clone();
            let opts = opts.clone();
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name(format!("udp-echo-{}", id))
                .spawn(move || worker(id, host, opts, batch_len, stats))
        })
        .collect();

    let mut failed = false;
    for handle in handles {
        let result = match handle {
            Ok(h) => h.join(),
            Err(err) => {
                eprintln!("udp-echo: unable to spawn worker: {}", err);
                failed = true;
                continue;
            }
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                report::report(&err);
                failed = true;
            }
            Err(_) => {
                eprintln!("udp-echo: worker panicked");
                failed = true;
            }
        }
    }

    stats.print(start.elapsed());
    if failed {
        std::process::exit(1);
    }
}
