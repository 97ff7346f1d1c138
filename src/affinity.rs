use core_affinity::CoreId;

use crate::log::{self, Level, Scope};

/// Pin the calling worker thread to one CPU. Must run on the worker thread
/// itself, before scratchpad allocation.
pub(crate) fn pin_current_thread(thread_no: usize, cpu_id: u32) {
    #[cfg(target_os = "macos")]
    log::line(
        Level::Warn,
        Scope::Worker(thread_no),
        "thread affinity is only advisory on macOS",
    );

    if !core_affinity::set_for_current(CoreId {
        id: cpu_id as usize,
    }) {
        log::line(
            Level::Warn,
            Scope::Worker(thread_no),
            format!("failed to pin to cpu {cpu_id}"),
        );
    }
}

/// Prefer the NUMA node owning `cpu_id` for the calling thread's future
/// allocations, so scratchpads land next to the pinned core. Best effort;
/// failures are logged and mining proceeds with default placement.
#[cfg(target_os = "linux")]
pub(crate) fn bind_memory_to_numa(thread_no: usize, cpu_id: u32) {
    const MPOL_PREFERRED: libc::c_int = 1;
    const MAX_NODE_BITS: u32 = 64;

    let Some(node) = numa_node_of_cpu(cpu_id) else {
        // Single-node systems have no node entry worth binding to.
        return;
    };
    if node >= MAX_NODE_BITS {
        log::line(
            Level::Warn,
            Scope::Worker(thread_no),
            format!("numa node {node} outside supported mask"),
        );
        return;
    }

    let mask: u64 = 1 << node;
    let rc = unsafe {
        libc::syscall(
            libc::SYS_set_mempolicy,
            MPOL_PREFERRED,
            &mask as *const u64,
            MAX_NODE_BITS as usize,
        )
    };
    if rc != 0 {
        log::line(
            Level::Warn,
            Scope::Worker(thread_no),
            format!("set_mempolicy for numa node {node} failed"),
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn bind_memory_to_numa(_thread_no: usize, _cpu_id: u32) {}

#[cfg(target_os = "linux")]
fn numa_node_of_cpu(cpu_id: u32) -> Option<u32> {
    let dir = format!("/sys/devices/system/cpu/cpu{cpu_id}");
    for entry in std::fs::read_dir(dir).ok()? {
        let name = entry.ok()?.file_name();
        let name = name.to_str()?;
        if let Some(node) = name.strip_prefix("node") {
            if let Ok(node) = node.parse::<u32>() {
                return Some(node);
            }
        }
    }
    None
}
