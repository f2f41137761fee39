//! Classification of updater output lines.
//!
//! The updater's output is loosely structured text, so classification is
//! best effort: an ordered list of named classifiers is run over every
//! line and each one that recognises the line contributes an event. The
//! classifiers are independent and may co-fire on a single line; for
//! example "Device already has the current image installed" counts the
//! device as completed and as skipped. Lines nothing recognises are ignored.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::config::LogConfig;
use crate::status::StatusRecord;

static DEVICE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"===== Processing device: ([\w-]+)").expect("device start pattern")
});

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.\d+) KiB / (\d+\.\d+) KiB .* (\d+\.\d+)%").expect("progress pattern")
});

const DEVICE_COMPLETED_MARKERS: &[&str] = &[
    "Flash process completed for",
    "Device already has the current image",
];
const SUCCESS_MARKERS: &[&str] = &["Upload completed successfully"];
// A line holding both substrings still counts as one failure.
const FAILURE_MARKERS: &[&str] = &["Failed to", "Error"];
const SKIPPED_MARKERS: &[&str] = &["already has the current image installed"];

/// A status-affecting fact recognised on one output line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// The updater announced its log file name
    LogFile(String),
    /// The updater began working on a device
    DeviceStarted(String),
    /// Upload progress in percent
    Progress(f64),
    /// A device finished (flashed or already current)
    DeviceCompleted,
    /// An upload succeeded
    UpdateSucceeded,
    /// Something failed
    UpdateFailed,
    /// A device already ran the current image
    UpdateSkipped,
}

impl LineEvent {
    /// Apply this event's effect to `record`.
    pub fn apply(&self, record: &mut StatusRecord) {
        match self {
            LineEvent::LogFile(name) => record.log_file = Some(name.clone()),
            LineEvent::DeviceStarted(name) => record.current_device = Some(name.clone()),
            LineEvent::Progress(percent) => record.set_progress(*percent),
            LineEvent::DeviceCompleted => record.complete_device(),
            LineEvent::UpdateSucceeded => record.successful_updates += 1,
            LineEvent::UpdateFailed => record.failed_updates += 1,
            LineEvent::UpdateSkipped => record.skipped_updates += 1,
        }
    }
}

type Detector = Box<dyn Fn(&str) -> Option<LineEvent> + Send + Sync>;

/// One named, independent line matcher.
pub struct LineClassifier {
    name: &'static str,
    detect: Detector,
}

impl LineClassifier {
    pub fn new<F>(name: &'static str, detect: F) -> Self
    where
        F: Fn(&str) -> Option<LineEvent> + Send + Sync + 'static,
    {
        Self {
            name,
            detect: Box::new(detect),
        }
    }

    /// Classifier that fires `event` when the line contains any of `needles`.
    pub fn contains_any(
        name: &'static str,
        needles: &'static [&'static str],
        event: LineEvent,
    ) -> Self {
        Self::new(name, move |line| {
            needles
                .iter()
                .any(|needle| line.contains(needle))
                .then(|| event.clone())
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn detect(&self, line: &str) -> Option<LineEvent> {
        (self.detect)(line)
    }
}

impl std::fmt::Debug for LineClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineClassifier")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Turns updater output lines into status record mutations.
#[derive(Debug)]
pub struct OutputParser {
    classifiers: Vec<LineClassifier>,
}

impl OutputParser {
    /// Build the standard classifier set, recognising log files named
    /// after `logs`.
    pub fn new(logs: &LogConfig) -> Self {
        let log_file_re = log_file_pattern(logs)
            .inspect_err(|e| warn!("Log file announcements will not be tracked: {}", e))
            .ok();

        let classifiers = vec![
            LineClassifier::new("log_file", move |line| {
                let name = log_file_re.as_ref()?.captures(line)?.get(1)?.as_str();
                Some(LineEvent::LogFile(name.to_string()))
            }),
            LineClassifier::new("device_start", |line| {
                let device = DEVICE_START_RE.captures(line)?.get(1)?.as_str();
                Some(LineEvent::DeviceStarted(device.to_string()))
            }),
            LineClassifier::new("upload_progress", |line| {
                let percent = PROGRESS_RE.captures(line)?.get(3)?.as_str().parse().ok()?;
                Some(LineEvent::Progress(percent))
            }),
            LineClassifier::contains_any(
                "device_completed",
                DEVICE_COMPLETED_MARKERS,
                LineEvent::DeviceCompleted,
            ),
            LineClassifier::contains_any(
                "update_succeeded",
                SUCCESS_MARKERS,
                LineEvent::UpdateSucceeded,
            ),
            LineClassifier::contains_any("update_failed", FAILURE_MARKERS, LineEvent::UpdateFailed),
            LineClassifier::contains_any("update_skipped", SKIPPED_MARKERS, LineEvent::UpdateSkipped),
        ];

        Self { classifiers }
    }

    /// Names of the classifiers, in evaluation order.
    pub fn classifier_names(&self) -> Vec<&'static str> {
        self.classifiers.iter().map(LineClassifier::name).collect()
    }

    /// Every event `line` produces, in classifier order.
    pub fn detect(&self, line: &str) -> Vec<LineEvent> {
        self.classifiers
            .iter()
            .filter_map(|classifier| classifier.detect(line))
            .collect()
    }

    /// Apply `line` to `record`, returning the events that fired.
    ///
    /// `last_update` is refreshed whether or not anything matched.
    pub fn classify(&self, line: &str, record: &mut StatusRecord) -> Vec<LineEvent> {
        let events = self.detect(line);
        for event in &events {
            event.apply(record);
        }
        record.touch();
        events
    }
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

// <prefix><digits and underscores>.<extension>, e.g. flash_logs_20240101_120000.log,
// found anywhere after "Log file: " so trailing text is ignored.
fn log_file_pattern(logs: &LogConfig) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"Log file: ({}[0-9_]+\.{})",
        regex::escape(&logs.prefix),
        regex::escape(&logs.extension)
    ))
}
