use std::cell::Cell;
use std::time::Instant;

thread_local! {
    static PERF_DEPTH: Cell<u32> = Cell::new(0);
}

/// 性能统计 Guard：记录 elapsed_ms + 处理行数
///
/// 嵌套调用时只有最外层以 debug 级别输出，内层降为 trace，避免一次派发刷出多条日志。
///
/// 使用方式：
/// ```ignore
/// let mut perf = csv_import_core::perf::PerfGuard::new("apply_validations");
/// // do work...
/// perf.add_rows(rows.len());
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    rows: usize,
    depth: u32,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        let depth = PERF_DEPTH.with(|d| {
            let current = d.get();
            d.set(current.saturating_add(1));
            current
        });
        Self {
            op,
            start: Instant::now(),
            rows: 0,
            depth,
        }
    }

    /// 累加处理行数
    pub fn add_rows(&mut self, rows: usize) {
        self.rows = self.rows.saturating_add(rows);
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;

        if self.depth == 0 {
            tracing::debug!(
                target: "perf",
                op = self.op,
                elapsed_ms,
                rows = self.rows,
                "done"
            );
        } else {
            tracing::trace!(
                target: "perf",
                op = self.op,
                elapsed_ms,
                rows = self.rows,
                depth = self.depth,
                "done"
            );
        }

        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
