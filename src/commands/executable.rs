use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// A command that runs to completion while holding the store lock, without suspending.
pub trait Executable {
    fn exec(self, store: Store) -> Result<Frame, Error>;
}
