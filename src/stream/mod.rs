pub mod sse;

pub use sse::{content_frame, error_frame, event_frame, LineBuffer, DONE_FRAME};
