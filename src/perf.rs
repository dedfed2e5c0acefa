use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::debug::json_escape;

/// Timing log. Spans and counters go to the main file as they happen; on drop a
/// `<stem>_hot.log` ranks the accumulated totals.
#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
    count_totals: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, page: Option<usize>, ms: f64) {
        let json = format!(
            "{{\"type\":\"perf.span\",\"name\":\"{}\",\"page\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            json_escape(name),
            page_json(page),
            ms
        );
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{json}");
        }
    }

    /// Times `work` and records it as a span.
    pub fn span<T>(&self, name: &str, page: Option<usize>, work: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = work();
        self.log_span_ms(name, page, started.elapsed().as_secs_f64() * 1000.0);
        out
    }

    pub fn log_counts(&self, name: &str, page: Option<usize>, counts: &[(&str, u64)]) {
        let body = counts
            .iter()
            .map(|(key, value)| format!("\"{}\":{}", json_escape(key), value))
            .collect::<Vec<_>>()
            .join(",");
        let json = format!(
            "{{\"type\":\"perf.counts\",\"name\":\"{}\",\"page\":{},\"counts\":{{{}}}}}",
            json_escape(name),
            page_json(page),
            body
        );
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let entry = state.count_totals.entry(format!("{name}.{key}")).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

fn page_json(page: Option<usize>) -> String {
    page.map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(hot_path_for(&self.path)) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (name, ms)) in spans.into_iter().take(50).enumerate() {
            let count = self.span_counts.get(name).copied().unwrap_or(1).max(1);
            let _ = writeln!(
                writer,
                "{{\"type\":\"perf.hot.span\",\"rank\":{},\"name\":\"{}\",\"ms\":{:.3},\"count\":{},\"avg_ms\":{:.3}}}",
                rank + 1,
                json_escape(name),
                ms,
                count,
                ms / count as f64
            );
        }

        let mut counts: Vec<(&String, &u64)> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (name, value)) in counts.into_iter().take(50).enumerate() {
            let _ = writeln!(
                writer,
                "{{\"type\":\"perf.hot.count\",\"rank\":{},\"name\":\"{}\",\"value\":{}}}",
                rank + 1,
                json_escape(name),
                value
            );
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("inkset_perf.log");
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_log_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("inkset_{tag}_{}_{}.log", std::process::id(), nanos))
    }

    #[test]
    fn hot_path_sits_next_to_the_log() {
        assert_eq!(
            hot_path_for(Path::new("/tmp/run.perf.log")),
            PathBuf::from("/tmp/run.perf_hot.log")
        );
    }

    #[test]
    fn dropping_the_last_handle_writes_the_hot_file() {
        let path = temp_log_path("perf");
        {
            let logger = PerfLogger::new(&path).expect("logger");
            let value = logger.span("flush.fonts", None, || 7);
            assert_eq!(value, 7);
            logger.log_counts("page", Some(1), &[("glyphs", 12)]);
        }
        let main = std::fs::read_to_string(&path).expect("main log");
        assert!(main.contains("\"type\":\"perf.span\",\"name\":\"flush.fonts\",\"page\":null"));
        assert!(main.contains("\"counts\":{\"glyphs\":12}"));
        let hot = hot_path_for(&path);
        let ranked = std::fs::read_to_string(&hot).expect("hot log");
        assert!(ranked.contains("\"name\":\"page.glyphs\",\"value\":12"));
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(hot);
    }
}
