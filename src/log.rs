//! Console reporting for the pool: startup lines, memory and affinity
//! warnings, worker failures. Routine lines go to stdout, problems to
//! stderr.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Info,
    Ok,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Origin of a line. Worker lines carry the thread number so interleaved
/// output from many workers stays attributable.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scope {
    Pool,
    SelfTest,
    Memory,
    Worker(usize),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool => f.write_str("pool"),
            Self::SelfTest => f.write_str("selftest"),
            Self::Memory => f.write_str("memory"),
            Self::Worker(thread_no) => write!(f, "worker {thread_no}"),
        }
    }
}

pub(crate) fn line(level: Level, scope: Scope, message: impl fmt::Display) {
    let rendered = render(level, scope, &message);
    match level {
        Level::Info | Level::Ok => println!("{rendered}"),
        Level::Warn | Level::Error => eprintln!("{rendered}"),
    }
}

fn render(level: Level, scope: Scope, message: &dyn fmt::Display) -> String {
    format!("trawl[{scope}] {}: {message}", level.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_lines_carry_the_thread_number() {
        assert_eq!(
            render(Level::Warn, Scope::Worker(3), &"failed to pin to cpu 7"),
            "trawl[worker 3] warn: failed to pin to cpu 7"
        );
    }

    #[test]
    fn scopes_and_levels_render_stably() {
        assert_eq!(
            render(Level::Ok, Scope::SelfTest, &"digests verified"),
            "trawl[selftest] ok: digests verified"
        );
        assert_eq!(
            render(Level::Warn, Scope::Memory, &"regular page fallback"),
            "trawl[memory] warn: regular page fallback"
        );
        assert_eq!(
            render(Level::Info, Scope::Pool, &"all workers stopped"),
            "trawl[pool] info: all workers stopped"
        );
    }
}
