use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use trawl_cn_spec::{CN_CACHE_BYTES, CN_SCRATCHPAD_BYTES};

use crate::log::{self, Level, Scope};

/// Backing policy for the 2 MiB slow scratchpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowMemory {
    /// Huge pages and mlock are mandatory; allocation fails otherwise.
    Never,
    /// Huge pages are mandatory, mlock is not attempted.
    NoMlck,
    /// Try huge pages and mlock; warn and fall back to regular pages.
    Warn,
    /// Regular pages only, no mlock.
    Always,
}

impl Default for SlowMemory {
    fn default() -> Self {
        Self::Warn
    }
}

/// Scratchpad pair for one hashing lane: a 2 MiB slow region (large-page
/// backed when the mode allows) and a 200 KiB fast region.
///
/// Contexts are allocated on the worker thread after NUMA binding so the
/// pages land on the right node. Regions are released on drop.
pub struct CnContext {
    slow: Region,
    fast: Region,
}

impl CnContext {
    pub fn alloc(mode: SlowMemory) -> Result<Self> {
        Ok(Self {
            slow: Region::slow(mode)?,
            fast: Region::heap(CN_CACHE_BYTES),
        })
    }

    pub fn scratchpad(&mut self) -> &mut [u8] {
        self.slow.as_mut_slice()
    }

    pub fn cache(&mut self) -> &mut [u8] {
        self.fast.as_mut_slice()
    }
}

/// One-time platform readiness probe: allocates and releases a trial
/// context under `mode`. Strict modes surface missing huge-page
/// reservations here, before any worker spawns.
pub fn scratchpad_init(mode: SlowMemory) -> Result<()> {
    CnContext::alloc(mode)
        .map(drop)
        .context("scratchpad preflight allocation failed")
}

enum Region {
    #[cfg(unix)]
    Mmap(MmapRegion),
    Heap(Vec<u8>),
}

impl Region {
    fn heap(len: usize) -> Self {
        Self::Heap(vec![0u8; len])
    }

    #[cfg(unix)]
    fn slow(mode: SlowMemory) -> Result<Self> {
        match mode {
            SlowMemory::Never => {
                let mut region = MmapRegion::hugetlb(CN_SCRATCHPAD_BYTES)
                    .ok_or_else(|| anyhow!("huge page scratchpad allocation failed"))?;
                if !region.lock() {
                    bail!("mlock of huge page scratchpad failed");
                }
                Ok(Self::Mmap(region))
            }
            SlowMemory::NoMlck => MmapRegion::hugetlb(CN_SCRATCHPAD_BYTES)
                .map(Self::Mmap)
                .ok_or_else(|| anyhow!("huge page scratchpad allocation failed")),
            SlowMemory::Warn => {
                if let Some(mut region) = MmapRegion::hugetlb(CN_SCRATCHPAD_BYTES) {
                    if !region.lock() {
                        log::line(Level::Warn, Scope::Memory, "mlock of huge page scratchpad failed");
                    }
                    return Ok(Self::Mmap(region));
                }
                log::line(
                    Level::Warn,
                    Scope::Memory,
                    "huge page scratchpad unavailable; falling back to regular pages \
                     (expect reduced hashrate)",
                );
                Ok(Self::regular(CN_SCRATCHPAD_BYTES))
            }
            SlowMemory::Always => Ok(Self::regular(CN_SCRATCHPAD_BYTES)),
        }
    }

    #[cfg(not(unix))]
    fn slow(mode: SlowMemory) -> Result<Self> {
        match mode {
            SlowMemory::Never | SlowMemory::NoMlck => {
                bail!("huge page scratchpads are not supported on this platform")
            }
            SlowMemory::Warn => {
                log::line(
                    Level::Warn,
                    Scope::Memory,
                    "huge page scratchpad unavailable; falling back to regular pages \
                     (expect reduced hashrate)",
                );
                Ok(Self::heap(CN_SCRATCHPAD_BYTES))
            }
            SlowMemory::Always => Ok(Self::heap(CN_SCRATCHPAD_BYTES)),
        }
    }

    #[cfg(unix)]
    fn regular(len: usize) -> Self {
        match MmapRegion::regular(len) {
            Some(region) => Self::Mmap(region),
            None => Self::heap(len),
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            #[cfg(unix)]
            Self::Mmap(region) => region.as_mut_slice(),
            Self::Heap(bytes) => bytes.as_mut_slice(),
        }
    }
}

#[cfg(unix)]
struct MmapRegion {
    ptr: *mut u8,
    len: usize,
    locked: bool,
}

#[cfg(unix)]
impl MmapRegion {
    fn hugetlb(len: usize) -> Option<Self> {
        #[cfg(target_os = "linux")]
        {
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_HUGETLB | libc::MAP_POPULATE,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return None;
            }
            Some(Self {
                ptr: ptr as *mut u8,
                len,
                locked: false,
            })
        }

        #[cfg(not(target_os = "linux"))]
        {
            // No explicit huge page interface; strict modes fail here.
            let _ = len;
            None
        }
    }

    fn regular(len: usize) -> Option<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        #[cfg(target_os = "linux")]
        unsafe {
            let _ = libc::madvise(ptr, len, libc::MADV_HUGEPAGE);
        }
        Some(Self {
            ptr: ptr as *mut u8,
            len,
            locked: false,
        })
    }

    fn lock(&mut self) -> bool {
        let rc = unsafe { libc::mlock(self.ptr as *const libc::c_void, self.len) };
        self.locked = rc == 0;
        self.locked
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

#[cfg(unix)]
impl Drop for MmapRegion {
    fn drop(&mut self) {
        unsafe {
            if self.locked {
                let _ = libc::munlock(self.ptr as *const libc::c_void, self.len);
            }
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}
