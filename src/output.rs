//! Output channel of `puts`.
//!
//! The interpreter writes to stdout unless another [`Write`] is installed.
//! [`MemWriter`] is an in-memory channel for embedding and tests: it is
//! cheap to clone, and every clone sees the same buffer, so one clone can be
//! installed in the interpreter while another reads back what was printed.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
pub struct MemWriter {
    shared: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.shared.borrow()).into_owned()
    }

    /// Return the collected text and empty the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.shared.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.shared.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
