//! arbor: the on-disk index and page-caching substrate of a small RDBMS.
//!
//! Two subsystems:
//!
//! - [`storage`] — fixed-size pages, a pluggable disk manager, and a
//!   buffer pool that caches pages in a fixed set of frames, evicting
//!   via CLOCK and handing out RAII page guards.
//! - [`index`] — a concurrent B+tree layered on the buffer pool, with
//!   point lookup, insert with splits, delete with coalesce/redistribute,
//!   and a forward leaf-chain iterator.

pub mod index;
pub mod storage;
