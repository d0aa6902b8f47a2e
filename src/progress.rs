//! Progress reporting for long-running sync operations.
//!
//! A [`ProgressSink`] accepts a fractional value in `[0, 1]` and a
//! human-readable status string. [`SubProgress`] derives a narrower
//! sub-range sink, so nested operations can report their own `[0, 1]`
//! progress without knowing the caller's absolute scale.

/// Receiver for fractional progress updates.
pub trait ProgressSink: Sync {
    /// Report progress. `fraction` is clamped to `[0, 1]` by callers.
    fn report(&self, fraction: f64, status: &str);
}

/// A sink that discards all progress reports.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _fraction: f64, _status: &str) {}
}

/// A sink mapping `[0, 1]` into a sub-range of a parent sink.
pub struct SubProgress<'a> {
    parent: &'a dyn ProgressSink,
    start: f64,
    span: f64,
}

impl<'a> SubProgress<'a> {
    /// Derive a sink covering `[start, start + span]` of `parent`.
    pub fn new(parent: &'a dyn ProgressSink, start: f64, span: f64) -> Self {
        Self {
            start: start.clamp(0.0, 1.0),
            span: span.max(0.0),
            parent,
        }
    }
}

impl ProgressSink for SubProgress<'_> {
    fn report(&self, fraction: f64, status: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.parent
            .report((self.start + fraction * self.span).min(1.0), status);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records every report for assertions.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub reports: Mutex<Vec<(f64, String)>>,
    }

    impl ProgressSink for RecordingProgress {
        fn report(&self, fraction: f64, status: &str) {
            self.reports.lock().push((fraction, status.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingProgress;
    use super::*;

    #[test]
    fn test_sub_progress_maps_range() {
        let recorder = RecordingProgress::default();
        let sub = SubProgress::new(&recorder, 0.2, 0.6);

        sub.report(0.0, "start");
        sub.report(0.5, "half");
        sub.report(1.0, "done");

        let reports = recorder.reports.lock();
        assert_eq!(reports[0].0, 0.2);
        assert_eq!(reports[1].0, 0.5);
        assert_eq!(reports[2].0, 0.8);
    }

    #[test]
    fn test_nested_sub_progress() {
        let recorder = RecordingProgress::default();
        let outer = SubProgress::new(&recorder, 0.5, 0.5);
        let inner = SubProgress::new(&outer, 0.0, 0.5);

        inner.report(1.0, "inner done");

        let reports = recorder.reports.lock();
        assert_eq!(reports[0].0, 0.75);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let recorder = RecordingProgress::default();
        let sub = SubProgress::new(&recorder, 0.9, 0.5);

        sub.report(2.0, "overflow");

        let reports = recorder.reports.lock();
        assert_eq!(reports[0].0, 1.0);
    }
}
