//! Processing telemetry: JSON-lines event logs with size-based rotation and
//! in-process counters rendered in Prometheus text format.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::config::RotationConfig;

/// Append-only log file that rolls over to `<path>.1 .. <path>.<keep>` once
/// it reaches `max_bytes`.
pub struct RotatingWriter {
    path: PathBuf,
    file: File,
    max_bytes: Option<u64>,
    keep: usize,
    compress: bool,
}

impl RotatingWriter {
    pub fn open(path: impl AsRef<Path>, rotation: &RotationConfig) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            max_bytes: rotation.max_bytes,
            keep: rotation.keep,
            compress: rotation.compress,
        })
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        if let Some(limit) = self.max_bytes {
            if self.size() >= limit {
                self.rotate()?;
            }
        }
        writeln!(self.file, "{}", line)
    }

    pub fn size(&self) -> u64 {
        self.path.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn backup(&self, idx: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", idx));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if self.keep > 0 {
            for idx in (1..self.keep).rev() {
                for suffix in ["", ".gz"] {
                    let from = with_suffix(&self.backup(idx), suffix);
                    if from.exists() {
                        fs::rename(&from, with_suffix(&self.backup(idx + 1), suffix))?;
                    }
                }
            }
            fs::rename(&self.path, self.backup(1))?;
            if self.compress {
                self.compress_backup(&self.backup(1));
            }
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    fn compress_backup(&self, backup: &Path) {
        let Ok(data) = fs::read(backup) else {
            return;
        };
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        if gz.write_all(&data).is_err() {
            return;
        }
        match gz.finish() {
            Ok(buf) => {
                if fs::write(with_suffix(backup, ".gz"), buf).is_ok() {
                    let _ = fs::remove_file(backup);
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to compress rotated log"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// One processing outcome, as written to the event logs.
pub struct EventRecord<'a> {
    pub client: &'a str,
    pub status: u16,
    pub code: Option<&'a str>,
    pub mode: Option<&'a str>,
    pub thread_length: Option<usize>,
    pub processing_time_ms: u64,
    pub tokens_used: Option<u64>,
    pub message: Option<&'a str>,
}

impl EventRecord<'_> {
    fn is_error(&self) -> bool {
        self.status >= 400
    }

    fn to_json(&self) -> Value {
        serde_json::json!({
            "ts": chrono::Utc::now().to_rfc3339(),
            "level": if self.is_error() { "error" } else { "info" },
            "event": "process_thread",
            "client": self.client,
            "status": self.status,
            "code": self.code,
            "mode": self.mode,
            "threadLength": self.thread_length,
            "processingTimeMs": self.processing_time_ms,
            "tokensUsed": self.tokens_used,
            "message": self.message,
        })
    }
}

/// Combined and error-only event logs.  Either file may be absent.
#[derive(Clone, Default)]
pub struct EventLog {
    combined: Option<Arc<Mutex<RotatingWriter>>>,
    errors: Option<Arc<Mutex<RotatingWriter>>>,
    log_stdout: bool,
    lines_total: Arc<AtomicU64>,
    write_errors_total: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new(
        combined: Option<RotatingWriter>,
        errors: Option<RotatingWriter>,
        log_stdout: bool,
    ) -> Self {
        Self {
            combined: combined.map(|w| Arc::new(Mutex::new(w))),
            errors: errors.map(|w| Arc::new(Mutex::new(w))),
            log_stdout,
            ..Self::default()
        }
    }

    /// Open whichever files are configured; an unopenable file only disables
    /// that file.
    pub fn open(
        log_file: Option<&str>,
        error_log_file: Option<&str>,
        rotation: &RotationConfig,
        log_stdout: bool,
    ) -> Self {
        let open = |path: Option<&str>, label: &str| {
            path.and_then(|p| match RotatingWriter::open(p, rotation) {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(path = %p, error = %e, "failed to open {}; disabled", label);
                    None
                }
            })
        };
        if log_file.is_none() {
            tracing::info!("event log disabled: LOG_FILE not set");
        }
        Self::new(
            open(log_file, "LOG_FILE"),
            open(error_log_file, "ERROR_LOG_FILE"),
            log_stdout,
        )
    }

    pub fn record(&self, event: &EventRecord<'_>) {
        let line = event.to_json().to_string();
        self.write(self.combined.as_ref(), &line);
        if event.is_error() {
            self.write(self.errors.as_ref(), &line);
        }
        if self.log_stdout {
            tracing::info!(
                target: "telemetry",
                client = event.client,
                status = event.status,
                code = ?event.code,
                mode = ?event.mode,
                thread_length = ?event.thread_length,
                processing_time_ms = event.processing_time_ms,
                "process_thread"
            );
        }
    }

    pub fn lines_total(&self) -> u64 {
        self.lines_total.load(Ordering::Relaxed)
    }

    pub fn write_errors_total(&self) -> u64 {
        self.write_errors_total.load(Ordering::Relaxed)
    }

    pub fn log_file_size_bytes(&self) -> u64 {
        self.combined
            .as_ref()
            .and_then(|w| w.lock().ok().map(|g| g.size()))
            .unwrap_or(0)
    }

    fn write(&self, target: Option<&Arc<Mutex<RotatingWriter>>>, line: &str) {
        let Some(target) = target else {
            return;
        };
        let mut guard = match target.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.write_line(line) {
            Ok(()) => {
                self.lines_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to write event log line");
                self.write_errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

const LATENCY_BUCKETS_MS: [u64; 12] = [
    10, 50, 100, 250, 500, 1000, 2500, 5000, 10_000, 20_000, 30_000, 60_000,
];

/// Request counters and latency histogram for `/api/process-thread`.
pub struct Metrics {
    requests_total: AtomicU64,
    success_total: AtomicU64,
    errors_by_code: DashMap<&'static str, u64>,
    rate_limited_total: AtomicU64,
    tokens_total: AtomicU64,
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    started: Instant,
    start_epoch_secs: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            errors_by_code: DashMap::new(),
            rate_limited_total: AtomicU64::new(0),
            tokens_total: AtomicU64::new(0),
            hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            started: Instant::now(),
            start_epoch_secs: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn record_success(&self, latency_ms: u64, tokens_used: Option<u64>) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.success_total.fetch_add(1, Ordering::Relaxed);
        if let Some(t) = tokens_used {
            self.tokens_total.fetch_add(t, Ordering::Relaxed);
        }
        self.observe(latency_ms);
    }

    pub fn record_error(&self, code: &'static str, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        *self.errors_by_code.entry(code).or_insert(0) += 1;
        self.observe(latency_ms);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn errors_for(&self, code: &str) -> u64 {
        self.errors_by_code.get(code).map(|v| *v).unwrap_or(0)
    }

    fn observe(&self, ms: u64) {
        self.hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = LATENCY_BUCKETS_MS.iter().position(|ub| ms <= *ub) {
            self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Prometheus text exposition (format 0.0.4).
    pub fn render(&self, events: &EventLog) -> String {
        let mut buf = String::new();
        counter(
            &mut buf,
            "smartthread_requests_total",
            "Thread processing requests handled",
            self.requests_total.load(Ordering::Relaxed),
        );
        counter(
            &mut buf,
            "smartthread_success_total",
            "Thread processing requests that succeeded",
            self.success_total.load(Ordering::Relaxed),
        );
        writeln!(
            buf,
            "# HELP smartthread_errors_total Failed processing requests by error code\n# TYPE smartthread_errors_total counter"
        )
        .ok();
        let mut codes: Vec<(&'static str, u64)> = self
            .errors_by_code
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        codes.sort_unstable();
        for (code, n) in codes {
            writeln!(buf, "smartthread_errors_total{{code=\"{}\"}} {}", code, n).ok();
        }
        counter(
            &mut buf,
            "smartthread_rate_limited_total",
            "Requests rejected by the local rate limiter",
            self.rate_limited_total.load(Ordering::Relaxed),
        );
        counter(
            &mut buf,
            "smartthread_tokens_total",
            "Language model tokens reported by the upstream",
            self.tokens_total.load(Ordering::Relaxed),
        );

        writeln!(
            buf,
            "# HELP smartthread_request_latency_ms Processing latency histogram milliseconds\n# TYPE smartthread_request_latency_ms histogram"
        )
        .ok();
        let mut cumulative = 0;
        for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                buf,
                "smartthread_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        let count = self.hist_count.load(Ordering::Relaxed);
        writeln!(buf, "smartthread_request_latency_ms_bucket{{le=\"+Inf\"}} {}", count).ok();
        writeln!(
            buf,
            "smartthread_request_latency_ms_sum {}",
            self.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(buf, "smartthread_request_latency_ms_count {}", count).ok();

        counter(
            &mut buf,
            "smartthread_event_lines_total",
            "Event log lines written",
            events.lines_total(),
        );
        counter(
            &mut buf,
            "smartthread_event_write_errors_total",
            "Event log write failures",
            events.write_errors_total(),
        );
        gauge(
            &mut buf,
            "smartthread_log_file_size_bytes",
            "Size of the active event log (0 if disabled)",
            events.log_file_size_bytes(),
        );
        writeln!(
            buf,
            "# HELP smartthread_build_info Build information\n# TYPE smartthread_build_info gauge\nsmartthread_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            buf,
            "# HELP smartthread_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE smartthread_process_start_time_seconds gauge\nsmartthread_process_start_time_seconds {}",
            self.start_epoch_secs
        )
        .ok();
        writeln!(
            buf,
            "# HELP smartthread_process_uptime_seconds Process uptime seconds\n# TYPE smartthread_process_uptime_seconds gauge\nsmartthread_process_uptime_seconds {}",
            self.uptime_secs()
        )
        .ok();
        buf
    }
}

fn counter(buf: &mut String, name: &str, help: &str, value: u64) {
    writeln!(buf, "# HELP {} {}\n# TYPE {} counter\n{} {}", name, help, name, name, value).ok();
}

fn gauge(buf: &mut String, name: &str, help: &str, value: u64) {
    writeln!(buf, "# HELP {} {}\n# TYPE {} gauge\n{} {}", name, help, name, name, value).ok();
}
