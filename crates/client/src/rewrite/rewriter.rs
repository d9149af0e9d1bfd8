//! Streaming delimiter scanner.
//!
//! [`TagRewriter`] sits in front of a byte sink and watches the stream for the
//! first region bounded by a start and an end delimiter. The region may be
//! split across any number of writes. Once the end delimiter completes, the
//! captured span (both delimiters included) goes through a [`RegionTransform`]
//! and the result is spliced into the output in its place.
//!
//! ### Holding rules
//! - Bytes that cannot begin a start delimiter are emitted immediately.
//! - A partial start match is held until it completes or fails. On failure
//!   the held bytes are released, minus the longest tail that could still
//!   begin a match.
//! - Everything from a completed start delimiter up to the end delimiter is
//!   held in the capture buffer.
//! - After the splice, writes go straight to the sink.

use std::io::{self, Write};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while rewriting a stream.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("stream already closed")]
    Closed,

    #[error("delimiter must not be empty")]
    EmptyDelimiter,

    /// The transform callback failed; the stream is closed afterwards.
    #[error("transform failed: {0}")]
    Transform(#[source] BoxError),

    #[error("sink write failed: {0}")]
    Io(#[from] io::Error),
}

impl From<RewriteError> for io::Error {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// Callback applied to the captured region.
pub trait RegionTransform {
    fn transform(&mut self, region: &[u8]) -> Result<Vec<u8>, BoxError>;
}

impl<F> RegionTransform for F
where
    F: FnMut(&[u8]) -> Result<Vec<u8>, BoxError>,
{
    fn transform(&mut self, region: &[u8]) -> Result<Vec<u8>, BoxError> {
        self(region)
    }
}

/// An ASCII delimiter matched without regard to case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    lower: Vec<u8>,
    upper: Vec<u8>,
}

impl Delimiter {
    pub fn new(text: &str) -> Result<Self, RewriteError> {
        if text.is_empty() {
            return Err(RewriteError::EmptyDelimiter);
        }
        Ok(Self {
            lower: text.bytes().map(|b| b.to_ascii_lowercase()).collect(),
            upper: text.bytes().map(|b| b.to_ascii_uppercase()).collect(),
        })
    }

    fn width(&self) -> usize {
        self.lower.len()
    }

    fn matches_at(&self, offset: usize, byte: u8) -> bool {
        byte == self.lower[offset] || byte == self.upper[offset]
    }

    /// Longest proper suffix of `held` that is also a prefix of the delimiter.
    fn fallback(&self, held: &[u8]) -> usize {
        let max = held.len().saturating_sub(1).min(self.width() - 1);
        (1..=max)
            .rev()
            .find(|&k| held[held.len() - k..].iter().enumerate().all(|(i, &b)| self.matches_at(i, b)))
            .unwrap_or(0)
    }
}

/// Scanner state. Persists across writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    LookingForStart,
    MatchingStart,
    LookingForStop,
    MatchingStop,
    Finished,
}

/// Writer adapter that transforms the first delimited region of a stream.
///
/// Output is byte-identical for every way of splitting the same input into
/// writes. Call [`close`](Self::close) at end of stream so held bytes reach
/// the sink.
pub struct TagRewriter<W, T> {
    sink: W,
    transform: T,
    start: Delimiter,
    end: Delimiter,
    state: State,
    matched: usize,
    capture: Vec<u8>,
    closed: bool,
}

impl<W: Write, T: RegionTransform> TagRewriter<W, T> {
    pub fn new(sink: W, start: Delimiter, end: Delimiter, transform: T) -> Self {
        Self {
            sink,
            transform,
            start,
            end,
            state: State::LookingForStart,
            matched: 0,
            capture: Vec::new(),
            closed: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Unwrap the sink. Held bytes are dropped unless [`close`](Self::close) ran first.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Feed the next chunk of the stream.
    ///
    /// Transform failures propagate and close the stream; bytes already
    /// released before the region are still written.
    pub fn feed(&mut self, input: &[u8]) -> Result<(), RewriteError> {
        if self.closed {
            return Err(RewriteError::Closed);
        }
        if self.state == State::Finished {
            self.sink.write_all(input)?;
            return Ok(());
        }

        let mut out = Vec::with_capacity(input.len());
        let scanned = self.scan(input, &mut out);
        self.sink.write_all(&out)?;

        match scanned {
            Ok(consumed) => {
                self.sink.write_all(&input[consumed..])?;
                Ok(())
            }
            Err(err) => {
                self.closed = true;
                Err(err)
            }
        }
    }

    /// Emit held bytes verbatim and mark the stream closed. Idempotent.
    pub fn close(&mut self) -> Result<(), RewriteError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let held = std::mem::take(&mut self.capture);
        if !held.is_empty() {
            tracing::debug!(held = held.len(), state = ?self.state, "closing with unmatched region");
        }
        self.sink.write_all(&held)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Scan until the input ends or the region completes. Returns bytes consumed.
    fn scan(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize, RewriteError> {
        for (i, &byte) in input.iter().enumerate() {
            match self.state {
                State::LookingForStart | State::MatchingStart => self.step_start(byte, out),
                State::LookingForStop | State::MatchingStop => {
                    if self.step_stop(byte) {
                        self.state = State::Finished;
                        let region = std::mem::take(&mut self.capture);
                        let replaced = self.transform.transform(&region).map_err(RewriteError::Transform)?;
                        tracing::trace!(region = region.len(), replaced = replaced.len(), "region rewritten");
                        out.extend_from_slice(&replaced);
                        return Ok(i + 1);
                    }
                }
                State::Finished => return Ok(i),
            }
        }
        Ok(input.len())
    }

    fn step_start(&mut self, byte: u8, out: &mut Vec<u8>) {
        if self.start.matches_at(self.matched, byte) {
            self.capture.push(byte);
            self.matched += 1;
            if self.matched == self.start.width() {
                self.matched = 0;
                self.state = State::LookingForStop;
            } else {
                self.state = State::MatchingStart;
            }
            return;
        }

        if self.matched == 0 {
            out.push(byte);
            return;
        }

        // Abandoned partial match: the mismatching byte may itself begin a new one.
        self.capture.push(byte);
        let keep = self.start.fallback(&self.capture);
        let release = self.capture.len() - keep;
        out.extend(self.capture.drain(..release));
        self.matched = keep;
        self.state = if keep == 0 { State::LookingForStart } else { State::MatchingStart };
    }

    /// Returns true when the end delimiter completes.
    fn step_stop(&mut self, byte: u8) -> bool {
        self.capture.push(byte);

        if self.end.matches_at(self.matched, byte) {
            self.matched += 1;
            if self.matched == self.end.width() {
                self.matched = 0;
                return true;
            }
            self.state = State::MatchingStop;
            return false;
        }

        if self.matched > 0 {
            let tail = &self.capture[self.capture.len() - (self.matched + 1)..];
            self.matched = self.end.fallback(tail);
        }
        self.state = if self.matched == 0 { State::LookingForStop } else { State::MatchingStop };
        false
    }
}

impl<W: Write, T: RegionTransform> Write for TagRewriter<W, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
