//! Upstream attempts and the fallback coordinator that sequences them.

pub mod context;
pub mod direct;
pub mod fallback;
pub mod workflow;

use std::pin::Pin;

use futures_util::Stream;

use crate::error::RelayError;
use crate::protocol::canonical::NormalizedEvent;

/// Events of one upstream attempt, pulled lazily.
///
/// `Ok(Done)` or the natural end of the stream is success. `Err` is the
/// attempt's failure and is always the last item.
pub type AttemptStream = Pin<Box<dyn Stream<Item = Result<NormalizedEvent, RelayError>> + Send>>;
