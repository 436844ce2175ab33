//! Progress reporting for long-running imports.
//!
//! Stages report into a [`ProgressSink`] through a [`ProgressReporter`],
//! which keeps the percentage monotonic even when several workers report
//! concurrently. Each stage owns a [`TaskProgressInterval`] of the overall
//! 0..=100 range; [`EntityCountProgress`] turns processed-entity counts into
//! percentages inside such an interval.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::i18n::{keys, I18n};
use crate::options::ImportPhase;

/// Receives progress updates. Implementations must be cheap; they are called
/// from worker tasks.
pub trait ProgressSink: Send + Sync {
    fn make_progress(&self, percent: u8, phase: ImportPhase, message: &str);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn make_progress(&self, _percent: u8, _phase: ImportPhase, _message: &str) {}
}

/// A slice `[start, end]` of the overall percentage range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgressInterval {
    start: u8,
    end: u8,
}

impl TaskProgressInterval {
    /// Bounds are clamped to 100 and swapped if given in reverse.
    pub fn new(start: u8, end: u8) -> Self {
        let (start, end) = (start.min(100), end.min(100));
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn full() -> Self {
        Self::new(0, 100)
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    /// The part of this interval between `from` and `to` percent of it.
    pub fn sub_interval(&self, from: u8, to: u8) -> Self {
        Self::new(self.scale(from), self.scale(to))
    }

    /// Percentage reached after `done` of `total` items.
    pub fn percent_at(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.end;
        }
        let ratio = (done.min(total) * 100 / total) as u8;
        self.scale(ratio)
    }

    fn scale(&self, percent_of_interval: u8) -> u8 {
        let width = u32::from(self.end - self.start);
        let offset = width * u32::from(percent_of_interval.min(100)) / 100;
        self.start + offset as u8
    }
}

/// Forwards updates to a sink, never letting the percentage go backwards.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    pub fn report(&self, percent: u8, phase: ImportPhase, message: &str) {
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        self.sink.make_progress(previous.max(percent), phase, message);
    }

    /// Highest percentage reported so far.
    pub fn percent(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }
}

/// Reports every `every` processed entities (and on the last one) while a
/// stage works through a known number of entities.
pub struct EntityCountProgress {
    reporter: Arc<ProgressReporter>,
    i18n: Arc<dyn I18n>,
    interval: TaskProgressInterval,
    phase: ImportPhase,
    label: String,
    total: usize,
    every: usize,
    done: AtomicUsize,
}

impl EntityCountProgress {
    pub fn new(
        reporter: Arc<ProgressReporter>,
        i18n: Arc<dyn I18n>,
        interval: TaskProgressInterval,
        phase: ImportPhase,
        label: impl Into<String>,
        total: usize,
        every: usize,
    ) -> Self {
        Self {
            reporter,
            i18n,
            interval,
            phase,
            label: label.into(),
            total,
            every: every.max(1),
            done: AtomicUsize::new(0),
        }
    }

    /// Count one processed entity.
    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        if done % self.every == 0 || done == self.total {
            let message = self.i18n.text(
                keys::PROGRESS_ENTITY_COUNT,
                &[&self.label, &done.to_string(), &self.total.to_string()],
            );
            self.reporter
                .report(self.interval.percent_at(done, self.total), self.phase, &message);
        }
    }

    pub fn processed(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::i18n::EnglishCatalog;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u8, String)>>);

    impl ProgressSink for Recorder {
        fn make_progress(&self, percent: u8, _phase: ImportPhase, message: &str) {
            self.0.lock().unwrap().push((percent, message.to_string()));
        }
    }

    #[test]
    fn sub_intervals_scale_into_parent() {
        let stage = TaskProgressInterval::new(20, 60);
        let half = stage.sub_interval(50, 100);
        assert_eq!((half.start(), half.end()), (40, 60));
        assert_eq!(stage.percent_at(1, 4), 30);
        assert_eq!(stage.percent_at(0, 0), 60);
        assert_eq!(TaskProgressInterval::new(90, 10), TaskProgressInterval::new(10, 90));
    }

    #[test]
    fn reporter_never_goes_backwards() {
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::new(recorder.clone());
        reporter.report(40, ImportPhase::IssuesImported, "a");
        reporter.report(10, ImportPhase::IssuesImported, "b");
        let seen: Vec<u8> = recorder.0.lock().unwrap().iter().map(|(p, _)| *p).collect();
        assert_eq!(seen, vec![40, 40]);
        assert_eq!(reporter.percent(), 40);
    }

    #[test]
    fn entity_count_reports_every_n_and_at_the_end() {
        let recorder = Arc::new(Recorder::default());
        let reporter = Arc::new(ProgressReporter::new(recorder.clone()));
        let progress = EntityCountProgress::new(
            reporter,
            Arc::new(EnglishCatalog),
            TaskProgressInterval::new(0, 50),
            ImportPhase::IssuesImported,
            "Issues",
            5,
            2,
        );
        for _ in 0..5 {
            progress.tick();
        }
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], (50, "Issues: 5 of 5 processed".to_string()));
        assert_eq!(progress.processed(), 5);
    }
}
