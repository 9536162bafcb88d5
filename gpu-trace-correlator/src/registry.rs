use anyhow::{Context, Result};
use gpu_trace_wire::tracepoint_names;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TRACING_DIR: &str = "/sys/kernel/debug/tracing/events";

/// Reads `{tracing_dir}/{category}/{name}/id` and parses its first line as a
/// signed integer. Returns `-1` on any I/O or parse failure, matching the
/// sysfs contract exactly: this never returns `Err`, only the kernel's own
/// "not available" sentinel.
fn lookup_in(tracing_dir: &Path, category: &str, name: &str) -> i32 {
    let path: PathBuf = tracing_dir.join(category).join(name).join("id");
    match fs::read_to_string(&path) {
        Ok(contents) => match contents.lines().next().and_then(|l| l.trim().parse().ok()) {
            Some(id) => id,
            None => {
                log::warn!("tracepoint id file {path:?} did not contain an integer");
                -1
            }
        },
        Err(e) => {
            log::warn!("failed to read tracepoint id file {path:?}: {e}");
            -1
        }
    }
}

/// Resolves a `(category, name)` pair to the kernel-assigned tracepoint id
/// by reading the well-known sysfs path. No caching beyond process startup.
pub fn lookup(category: &str, name: &str) -> i32 {
    lookup_in(Path::new(DEFAULT_TRACING_DIR), category, name)
}

/// The three tracepoint ids the correlator dispatches decoded records on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracepointIds {
    pub user_enqueue: i32,
    pub hw_schedule: i32,
    pub hw_finish: i32,
}

impl TracepointIds {
    /// Resolves all three ids against the real sysfs tree, failing the
    /// whole setup step if any one of them is unavailable on this kernel.
    pub fn resolve() -> Result<Self> {
        Self::resolve_in(Path::new(DEFAULT_TRACING_DIR))
    }

    /// Same as [`Self::resolve`] but against an arbitrary base directory,
    /// so tests can fabricate a fake tracing tree instead of touching the
    /// real `/sys/kernel/debug`.
    pub fn resolve_in(tracing_dir: &Path) -> Result<Self> {
        let (user_cat, user_name) = tracepoint_names::USER_ENQUEUE;
        let (sched_cat, sched_name) = tracepoint_names::HW_SCHEDULE;
        let (finish_cat, finish_name) = tracepoint_names::HW_FINISH;

        let user_enqueue = lookup_in(tracing_dir, user_cat, user_name);
        let hw_schedule = lookup_in(tracing_dir, sched_cat, sched_name);
        let hw_finish = lookup_in(tracing_dir, finish_cat, finish_name);

        let ids = Self {
            user_enqueue,
            hw_schedule,
            hw_finish,
        };
        ids.require_resolved()
    }

    fn require_resolved(self) -> Result<Self> {
        if self.user_enqueue < 0 {
            return Err(anyhow::anyhow!("amdgpu_cs_ioctl tracepoint unavailable"))
                .context("resolving GPU correlator tracepoint ids");
        }
        if self.hw_schedule < 0 {
            return Err(anyhow::anyhow!("amdgpu_sched_run_job tracepoint unavailable"))
                .context("resolving GPU correlator tracepoint ids");
        }
        if self.hw_finish < 0 {
            return Err(anyhow::anyhow!("dma_fence_signaled tracepoint unavailable"))
                .context("resolving GPU correlator tracepoint ids");
        }
        Ok(self)
    }

    /// Classifies a decoded `common_type` id against the three registered
    /// tracepoints, if any.
    pub fn stage_for(&self, common_type: i32) -> Option<Stage> {
        if common_type == self.user_enqueue {
            Some(Stage::UserEnqueue)
        } else if common_type == self.hw_schedule {
            Some(Stage::HwSchedule)
        } else if common_type == self.hw_finish {
            Some(Stage::HwFinish)
        } else {
            None
        }
    }
}

/// Which of the three submission stages a decoded record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    UserEnqueue,
    HwSchedule,
    HwFinish,
}
