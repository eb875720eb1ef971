//! Request body that reports transmission ticks
//!
//! The body hands its buffer to hyper in `tick_size` slices. Every slice that
//! hyper pulls is reported over an unbounded channel, which the transport
//! drains on the caller's task and turns into progress events.

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedSender;

/// Default slice size handed to the connection per poll (64 KiB)
pub const DEFAULT_TICK_SIZE: usize = 64 * 1024;

/// A fixed-length body that emits one tick per slice polled
pub struct ProgressBody {
    remaining: Bytes,
    tick_size: usize,
    ticks: UnboundedSender<u64>,
}

impl ProgressBody {
    pub fn new(data: Bytes, tick_size: usize, ticks: UnboundedSender<u64>) -> Self {
        Self {
            remaining: data,
            tick_size: tick_size.max(1),
            ticks,
        }
    }
}

impl Body for ProgressBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.remaining.is_empty() {
            return Poll::Ready(None);
        }

        let n = self.tick_size.min(self.remaining.len());
        let slice = self.remaining.split_to(n);
        // Receiver gone means the call was abandoned; the bytes still go out.
        let _ = self.ticks.send(n as u64);
        Poll::Ready(Some(Ok(Frame::data(slice))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining.len() as u64)
    }
}
