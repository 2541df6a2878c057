//! Process introspection: stable per-thread ids, CPU count, current CPU.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::code::*;
use crate::{DgError, DgResult};

static TID_COUNTER: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static TID: Cell<usize> = const { Cell::new(0) };
}

/// Stable identifier of the calling thread.
///
/// Ids are handed out from 1 in first-call order and never reused.
#[inline]
pub fn tid() -> usize {
    TID.with(|cell| {
        let id = cell.get();
        if id != 0 {
            return id;
        }
        let id = TID_COUNTER.fetch_add(1, Ordering::Relaxed);
        cell.set(id);
        id
    })
}

/// The calling thread's last OS error number.
#[inline]
pub fn last_errno() -> i32 {
    nix::errno::Errno::last() as i32
}

/// Number of online CPUs.
///
/// A sysconf failure here means the environment is broken, so it is
/// reported and the process aborts.
pub fn cpus() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if count > 0 {
        return count as usize;
    }

    let err = crate::fail_errno!(SYS_PROC, ERR_SYSCONF, OP_QUERY,
        "unable to call sysconf to get cpu count");
    crate::report::abort_with(&err)
}

/// CPU the calling thread is currently running on.
#[cfg(target_os = "linux")]
pub fn current_cpu() -> DgResult<usize> {
    nix::sched::sched_getcpu().map_err(|errno| {
        DgError::simple_os(SYS_PROC, ERR_SYSCONF, OP_QUERY, errno as i32)
    })
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> DgResult<usize> {
    Err(DgError::simple_os(SYS_PROC, ERR_SYSCONF, OP_QUERY, libc::ENOSYS))
}
