//! Cause stack with LIFO frames
//!
//! Frames snapshot the stack depth when pushed. Popping a frame truncates the
//! contributor list back to that depth and restores any named context the
//! frame overwrote, so a nested unit of work can never leak attribution into
//! its caller.

use super::chain::Cause;
use super::contributor::{ContextKey, ContextValue, Contributor};
use crate::core::error::{Result, TrackerError};

/// Token for an open frame, consumed by [`CauseStack::pop_frame`]
#[must_use = "an open cause frame must be popped"]
#[derive(Debug, PartialEq, Eq)]
pub struct CauseFrame {
    id: u64,
}

impl CauseFrame {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct FrameRecord {
    id: u64,
    depth: usize,
    /// Context entries this frame replaced, in write order
    overwritten: Vec<(ContextKey, Option<ContextValue>)>,
}

/// Ordered contributors plus named context, scoped by frames
#[derive(Debug)]
pub struct CauseStack {
    causes: Vec<Contributor>,
    frames: Vec<FrameRecord>,
    context: Vec<(ContextKey, ContextValue)>,
    next_frame_id: u64,
    max_depth: usize,
}

impl CauseStack {
    /// Stack holding only the host contributor
    pub fn new(max_depth: usize) -> Self {
        Self {
            causes: vec![Contributor::Host],
            frames: Vec::new(),
            context: Vec::new(),
            next_frame_id: 1,
            max_depth,
        }
    }

    /// Number of contributors, host included
    pub fn depth(&self) -> usize {
        self.causes.len()
    }

    /// Number of open frames
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_cause(&mut self, contributor: Contributor) -> Result<()> {
        if self.causes.len() >= self.max_depth {
            return Err(TrackerError::CauseDepthExceeded(self.max_depth));
        }
        self.causes.push(contributor);
        Ok(())
    }

    /// Pop the most recent contributor
    ///
    /// Never removes contributors that belong to an enclosing frame, nor the
    /// host contributor.
    pub fn pop_cause(&mut self) -> Option<Contributor> {
        let floor = self.frames.last().map_or(1, |f| f.depth.max(1));
        if self.causes.len() > floor {
            self.causes.pop()
        } else {
            None
        }
    }

    pub fn peek_cause(&self) -> &Contributor {
        // The host contributor is never popped
        &self.causes[self.causes.len() - 1]
    }

    pub fn push_frame(&mut self) -> CauseFrame {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.frames.push(FrameRecord {
            id,
            depth: self.causes.len(),
            overwritten: Vec::new(),
        });
        CauseFrame { id }
    }

    pub fn is_open(&self, frame: &CauseFrame) -> bool {
        self.frames.iter().any(|f| f.id == frame.id)
    }

    /// Id of the innermost open frame
    pub fn innermost_frame(&self) -> Option<u64> {
        self.frames.last().map(|f| f.id)
    }

    /// Attach a named value to the innermost frame
    ///
    /// Returns the value it shadows, which comes back when the frame is popped.
    pub fn add_context(
        &mut self,
        frame: &CauseFrame,
        key: ContextKey,
        value: ContextValue,
    ) -> Result<Option<ContextValue>> {
        if self.innermost_frame() != Some(frame.id) {
            return Err(TrackerError::FrameNotInnermost { frame: frame.id });
        }
        Ok(self.add_context_innermost(key, value))
    }

    fn add_context_innermost(&mut self, key: ContextKey, value: ContextValue) -> Option<ContextValue> {
        let previous = match self.context.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => Some(std::mem::replace(&mut entry.1, value)),
            None => {
                self.context.push((key, value));
                None
            }
        };
        if let Some(record) = self.frames.last_mut() {
            record.overwritten.push((key, previous.clone()));
        }
        previous
    }

    pub fn context(&self, key: ContextKey) -> Option<&ContextValue> {
        self.context.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Close the innermost frame
    ///
    /// On error the stack is left untouched.
    pub fn pop_frame(&mut self, frame: CauseFrame) -> Result<()> {
        let innermost = self.innermost_frame();
        if innermost != Some(frame.id) {
            return Err(TrackerError::UnbalancedFrame {
                popped: frame.id,
                innermost,
            });
        }
        self.close_innermost();
        Ok(())
    }

    fn close_innermost(&mut self) {
        let Some(record) = self.frames.pop() else {
            return;
        };
        self.causes.truncate(record.depth.max(1));
        for (key, previous) in record.overwritten.into_iter().rev() {
            match previous {
                Some(value) => match self.context.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => self.context.push((key, value)),
                },
                None => self.context.retain(|(k, _)| *k != key),
            }
        }
    }

    /// Force-close `frame` and every frame opened inside it
    ///
    /// Used on abnormal exits where inner frames were leaked. Returns how many
    /// leaked frames were closed besides `frame` itself.
    pub fn unwind_to(&mut self, frame: CauseFrame) -> usize {
        let Some(position) = self.frames.iter().position(|f| f.id == frame.id) else {
            return 0;
        };
        let leaked = self.frames.len() - position - 1;
        for _ in position..self.frames.len() {
            self.close_innermost();
        }
        leaked
    }

    /// Immutable copy of the current contributors and visible context
    pub fn current_cause(&self) -> Cause {
        Cause::new(
            self.causes.iter().rev().cloned().collect(),
            self.context.clone(),
        )
    }

    /// Open a frame that closes itself when dropped
    pub fn scoped(&mut self) -> StackFrame<'_> {
        let frame = self.push_frame();
        self.adopt(frame)
    }

    /// Wrap an already open frame so it closes on drop
    pub fn adopt(&mut self, frame: CauseFrame) -> StackFrame<'_> {
        StackFrame {
            stack: self,
            frame: Some(frame),
        }
    }
}

/// Scoped frame over a [`CauseStack`]
///
/// Handed to transactions while their cause is being built. Only exposes
/// operations that stay inside this frame.
pub struct StackFrame<'a> {
    stack: &'a mut CauseStack,
    frame: Option<CauseFrame>,
}

impl StackFrame<'_> {
    /// Push a contributor inside this frame
    ///
    /// Attribution is best-effort here: past the depth limit the contributor
    /// is skipped with a warning.
    pub fn push_cause(&mut self, contributor: Contributor) {
        if let Err(err) = self.stack.push_cause(contributor) {
            tracing::warn!("Dropping cause contributor: {}", err);
        }
    }

    pub fn add_context(&mut self, key: ContextKey, value: ContextValue) {
        self.stack.add_context_innermost(key, value);
    }

    pub fn context(&self, key: ContextKey) -> Option<&ContextValue> {
        self.stack.context(key)
    }

    pub fn cause(&self) -> Cause {
        self.stack.current_cause()
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub(crate) fn stack_mut(&mut self) -> &mut CauseStack {
        self.stack
    }

    /// Close the frame, force-closing anything leaked inside it
    ///
    /// Leaked inner frames are reported as an unbalanced pop; the stack is
    /// repaired either way.
    pub(crate) fn close(mut self) -> Result<()> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        let popped = frame.id;
        let innermost = self.stack.innermost_frame();
        if self.stack.unwind_to(frame) > 0 {
            return Err(TrackerError::UnbalancedFrame { popped, innermost });
        }
        Ok(())
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.stack.unwind_to(frame);
        }
    }
}
