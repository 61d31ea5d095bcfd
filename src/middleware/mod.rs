use std::backtrace::Backtrace;
use std::future::Future;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;

use crate::codec;
use crate::config::{Level, LoggerConfig};
use crate::entry::{headers_map, LogEntry};
use crate::metrics;
use crate::pipeline::{HandlerResult, Request, ResponseHandle};
use crate::sink::RotatingSink;

/// Upper bound on a captured stack trace snapshot.
const MAX_STACK_BYTES: usize = 8 * 1024;

/// Interception layer producing exactly one structured entry per request.
///
/// Wraps the remaining handler chain, captures request and response state
/// around it and appends the serialized entry to the rotating sink. The
/// chain's outcome is returned unmodified; the only observable side effect
/// is the append.
pub struct RequestLogger {
    config: LoggerConfig,
    sink: Arc<RotatingSink>,
}

impl RequestLogger {
    pub fn new(config: LoggerConfig) -> Self {
        let config = config.normalized();
        let sink = Arc::new(RotatingSink::new(
            &config.filename,
            config.max_size,
            config.max_backups,
            config.max_age,
            config.compress,
        ));
        Self { config, sink }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Rotate the underlying log file immediately.
    pub fn rotate(&self) -> io::Result<()> {
        self.sink.rotate()
    }

    /// Flush buffered sink writes.
    pub fn flush(&self) -> io::Result<()> {
        self.sink.flush()
    }

    /// Run `next` for one request, capturing a log entry around it.
    ///
    /// Requests whose path matches a configured skip prefix pass straight
    /// through with no capture and no entry. For everything else the entry is
    /// built in two phases: request-side fields before `next`, status,
    /// latency and response captures after it returns. `next`'s result is
    /// returned unchanged either way.
    pub async fn intercept<F, Fut>(
        &self,
        mut req: Request,
        res: ResponseHandle,
        next: F,
    ) -> HandlerResult
    where
        F: FnOnce(Request, ResponseHandle) -> Fut,
        Fut: Future<Output = HandlerResult>,
    {
        if self.should_skip(req.uri.path()) {
            return next(req, res).await;
        }

        let start = Instant::now();
        let mut entry = LogEntry {
            timestamp: Utc::now(),
            level: Level::Info,
            request_id: req.header_str(&self.config.request_id_header).to_string(),
            method: req.method.to_string(),
            uri: req.uri.to_string(),
            status: 0,
            latency: Duration::ZERO,
            request_headers: Default::default(),
            request_body: String::new(),
            response_headers: Default::default(),
            response_body: String::new(),
            client_ip: req.client_ip.clone(),
            user_agent: req.user_agent().to_string(),
            error: String::new(),
            stack_trace: String::new(),
        };

        if !self.config.disable_request_log {
            self.capture_request(&mut req, &mut entry);
        }

        let captured = res.install_tap(self.config.max_body_size as usize);

        let result = next(req, res.clone()).await;

        entry.status = res.status().as_u16();
        entry.latency = start.elapsed();

        if let Err(err) = &result {
            entry.error = err.to_string();
            if !self.config.disable_stack_trace {
                entry.stack_trace = capture_stack();
            }
        }

        // Response capture is not gated by disable_request_log.
        entry.response_headers = headers_map(&res.headers());
        {
            let body = captured.lock();
            if !body.is_empty() {
                entry.response_body = String::from_utf8_lossy(&body).into_owned();
            }
        }

        entry.level = entry.classify();
        self.write_entry(&entry);

        result
    }

    fn should_skip(&self, path: &str) -> bool {
        self.config.skip_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Snapshot request headers and a bounded body prefix, then hand the
    /// prefix back to the request as a fresh readable stream.
    ///
    /// A body longer than `max_body_size` reaches downstream truncated to the
    /// captured prefix. This is a documented tradeoff of capturing streamed
    /// bodies, not something this layer patches over by re-reading.
    fn capture_request(&self, req: &mut Request, entry: &mut LogEntry) {
        entry.request_headers = headers_map(&req.headers);

        if req.base_content_type().eq_ignore_ascii_case("multipart/form-data") {
            return;
        }

        let mut buf = Vec::new();
        match req
            .body
            .by_ref()
            .take(self.config.max_body_size)
            .read_to_end(&mut buf)
        {
            Ok(_) => {
                entry.request_body = String::from_utf8_lossy(&buf).into_owned();
                req.body = Box::new(Cursor::new(buf));
            }
            Err(e) => {
                // Degrade: the field stays empty, the entry survives.
                warn!("request body capture failed: {}", e);
            }
        }
    }

    /// Filter by level, serialize and append. Every failure here is reported
    /// and absorbed; the request path never sees it.
    fn write_entry(&self, entry: &LogEntry) {
        if entry.level < self.config.log_level {
            metrics::ENTRIES_DROPPED.inc();
            return;
        }

        let line = if self.config.json_output {
            match codec::encode_json(entry) {
                Ok(line) => line,
                Err(e) => {
                    warn!("failed to serialize log entry: {}", e);
                    metrics::ENTRIES_DROPPED.inc();
                    return;
                }
            }
        } else {
            codec::encode_text(entry)
        };

        match self.sink.append(&line) {
            Ok(()) => metrics::ENTRIES_WRITTEN.inc(),
            Err(e) => {
                warn!("failed to append log entry: {}", e);
                metrics::SINK_ERRORS.inc();
            }
        }
    }
}

/// Best-effort bounded snapshot of the current call stack.
fn capture_stack() -> String {
    let mut trace = Backtrace::force_capture().to_string();
    if trace.len() > MAX_STACK_BYTES {
        let mut cut = MAX_STACK_BYTES;
        while !trace.is_char_boundary(cut) {
            cut -= 1;
        }
        trace.truncate(cut);
    }
    trace
}
