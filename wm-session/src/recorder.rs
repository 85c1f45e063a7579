//! Recorder observer interface (spec.md §4.6): a synchronous sink notified
//! at each stage of a fetch. Implementations (WARC writer, stats counter,
//! tracing logger) must not block the event loop — recorders run inline
//! on the async task, so any blocking work belongs on a background
//! thread the recorder dispatches to itself.

use wm_types::{RequestHead, ResponseHead};

/// Observes one HTTP or FTP fetch. All methods have no-op defaults so an
/// implementation only overrides what it cares about.
pub trait Recorder: Send + Sync {
    fn pre_request(&self, _request: &RequestHead) {}
    fn request(&self, _request: &RequestHead) {}
    fn request_data(&self, _chunk: &[u8]) {}
    fn pre_response(&self, _response: &ResponseHead) {}
    fn response(&self, _response: &ResponseHead) {}
    fn response_data(&self, _chunk: &[u8]) {}

    /// FTP-only: brackets the control-channel command/reply exchange.
    fn begin_control(&self) {}
    fn end_control(&self) {}
}

/// A Recorder that observes nothing, for callers (tests, dry runs) that
/// don't need the notifications.
pub struct NullRecorder;

impl Recorder for NullRecorder {}
