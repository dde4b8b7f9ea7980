//! Lookahead between frame encoding and writing.
//!
//! A GIF frame's disposal method and delay only become known once the next
//! frame has been seen, so encoded frames wait here before being written.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::encoder::GifFrame;
use crate::planar::PlanarBitmap;

/// Frames held back. Must be at least the largest ANIM interleave.
pub(crate) const MAX_QUEUE_SIZE: usize = 2;

/// Bounded FIFO of encoded frames and the bitmaps they came from.
#[derive(Debug, Default)]
pub(crate) struct FrameQueue {
    queue: VecDeque<(GifFrame, PlanarBitmap)>,
    /// Source bitmaps of the first frames, to spot the loop frames ANIMs
    /// repeat at their end.
    first_frames: Vec<PlanarBitmap>,
    drop_frames: usize,
    total: usize,
}

impl FrameQueue {
    /// Adds a frame, returning the oldest one if it has to be written now.
    pub(crate) fn push(&mut self, frame: GifFrame, source: &PlanarBitmap) -> Option<GifFrame> {
        let evicted = if self.queue.len() >= MAX_QUEUE_SIZE {
            self.queue.pop_front().map(|(frame, _)| frame)
        } else {
            None
        };
        self.queue.push_back((frame, source.clone()));
        if self.first_frames.len() < MAX_QUEUE_SIZE {
            self.first_frames.push(source.clone());
        }
        self.total += 1;
        evicted
    }

    /// The newest frame, which can still be changed.
    pub(crate) fn most_recent_mut(&mut self) -> Option<&mut GifFrame> {
        self.queue.back_mut().map(|(frame, _)| frame)
    }

    /// The newest frame.
    pub(crate) fn most_recent(&self) -> Option<&GifFrame> {
        self.queue.back().map(|(frame, _)| frame)
    }

    /// Frames ever queued.
    #[inline]
    pub(crate) fn total(&self) -> usize {
        self.total
    }

    /// Sets how many frames at the end of the stream to leave out if they
    /// repeat the first ones.
    #[inline]
    pub(crate) fn set_drop_frames(&mut self, count: usize) {
        self.drop_frames = count;
    }

    /// Empties the queue at the end of a file, returning the frames to write.
    ///
    /// The last `drop_frames` frames are left out when their sources match
    /// the first frames of the stream.
    pub(crate) fn finalize(&mut self) -> Vec<GifFrame> {
        let mut drop = self.drop_frames;
        if drop > 0 {
            let duplicates = drop < self.total
                && drop <= self.queue.len()
                && drop <= self.first_frames.len()
                && self
                    .queue
                    .iter()
                    .skip(self.queue.len() - drop)
                    .zip(&self.first_frames)
                    .all(|((_, source), first)| source == first);
            if duplicates {
                log::warn!("dropping {drop} final frames that repeat the first ones");
            } else {
                drop = 0;
            }
        }
        let keep = self.queue.len() - drop;
        self.queue.drain(..).take(keep).map(|(frame, _)| frame).collect()
    }
}
