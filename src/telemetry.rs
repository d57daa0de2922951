//! Telemetry utilities for subscribe timing and span construction.

use std::time::Instant;

/// Guard for timing one subscribe request.
///
/// Records latency under the mode set with [`SubscribeTimer::mode`] when
/// dropped; `error` if no mode was set.
pub struct SubscribeTimer {
    mode: &'static str,
    start: Instant,
}

impl SubscribeTimer {
    pub fn start() -> Self {
        Self {
            mode: "error",
            start: Instant::now(),
        }
    }

    pub fn mode(&mut self, mode: &'static str) {
        self.mode = mode;
    }
}

impl Drop for SubscribeTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_subscribe(self.mode, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one subscribe request.
    pub fn subscribe(request_id: &str, model: &str, key: &str, last_seq: Option<u64>) -> Span {
        if let Some(last_seq) = last_seq {
            info_span!("subscribe", request_id = %request_id, model = %model, key = %key, last_seq)
        } else {
            info_span!("subscribe", request_id = %request_id, model = %model, key = %key)
        }
    }

    /// Span for applying one store mutation.
    pub fn mutation(model: &str, key: &str, kind: &str) -> Span {
        info_span!("mutation", model = %model, key = %key, kind = %kind)
    }
}
