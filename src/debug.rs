use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A value in a debug event.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Field<'a> {
    Str(&'a str),
    Int(i64),
    Num(f64),
    Bool(bool),
}

/// JSON-lines event log. Every event is one object with a `type` key.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    pub fn event(&self, kind: &str, fields: &[(&str, Field<'_>)]) {
        let json = event_json(kind, fields);
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes the accumulated counters as one `debug.summary` event and resets them.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts = counters
                .iter()
                .map(|(key, value)| format!("\"{}\":{}", json_escape(key), value))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(
                state.writer,
                "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{{{}}}}}",
                json_escape(context),
                counts
            );
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

fn event_json(kind: &str, fields: &[(&str, Field<'_>)]) -> String {
    let mut out = format!("{{\"type\":\"{}\"", json_escape(kind));
    for (key, value) in fields {
        out.push_str(&format!(",\"{}\":", json_escape(key)));
        match value {
            Field::Str(text) => out.push_str(&format!("\"{}\"", json_escape(text))),
            Field::Int(n) => out.push_str(&n.to_string()),
            Field::Num(n) if n.is_finite() => out.push_str(&format!("{:.3}", n)),
            Field::Num(_) => out.push_str("null"),
            Field::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        }
    }
    out.push('}');
    out
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_log_path(tag: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("inkset_{tag}_{}_{}.jsonl", std::process::id(), nanos))
    }

    #[test]
    fn events_render_typed_fields() {
        let json = event_json(
            "pdf.link",
            &[
                ("target", Field::Str("a\"b")),
                ("page", Field::Int(2)),
                ("internal", Field::Bool(false)),
                ("ms", Field::Num(f64::NAN)),
            ],
        );
        assert_eq!(
            json,
            "{\"type\":\"pdf.link\",\"target\":\"a\\\"b\",\"page\":2,\"internal\":false,\"ms\":null}"
        );
    }

    #[test]
    fn summary_flushes_sorted_counters() {
        let path = temp_log_path("debug_summary");
        let logger = DebugLogger::new(&path).expect("logger");
        logger.increment("glyphs", 3);
        logger.increment("alpha", 1);
        logger.increment("glyphs", 2);
        logger.emit_summary("finish");
        logger.flush();
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"counts\":{\"alpha\":1,\"glyphs\":5}"));
        let _ = std::fs::remove_file(path);
    }
}
