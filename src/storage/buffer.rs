//! Buffer pool: cached page frames with pinning, latching, and CLOCK
//! eviction.
//!
//! The pool owns a fixed array of frames. Pages are mapped into frames on
//! demand; unpinned frames are handed to the replacer as eviction
//! candidates. All page access goes through RAII guards that release the
//! pin (and any latch) on every exit path.

pub mod error;
pub mod frame;
pub mod guard;
pub mod pool;
pub mod replacer;

pub use error::BufferError;
pub use frame::FrameId;
pub use guard::{PageGuard, PageReadGuard, PageWriteGuard};
pub use pool::BufferPool;
pub use replacer::{ClockReplacer, Replacer};
