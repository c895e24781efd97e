//! Call frames.

use std::rc::Rc;

use crate::value::Closure;

/// A call frame representing a function invocation.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The closure being executed
    pub closure: Rc<Closure>,
    /// Offset of the instruction being executed. Starts at -1 and is
    /// incremented before each fetch.
    pub ip: isize,
    /// Stack index of the first argument; locals follow the arguments
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    #[inline]
    pub fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}
