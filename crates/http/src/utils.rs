use bytes::{BufMut, BytesMut};
use std::io;

/// Returns early with `$error` when `$predicate` does not hold.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Lets `write!` format straight into a [`BytesMut`].
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl io::Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
