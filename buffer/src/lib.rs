//! Producer/consumer coordination built from counting semaphores.
//!
//! A [`BoundedBuffer`] is a fixed-capacity ring guarded by three
//! [`Semaphore`]s; producers and consumers share it through the
//! [`Driver`], which also runs the poison-pill shutdown protocol.

pub mod bounded;
pub mod driver;
pub mod shutdown;
pub mod sync;

pub use bounded::BoundedBuffer;
pub use driver::{Driver, Event, Observer, Report, RunConfig};
pub use shutdown::{Item, ProducerId, ShutdownCoordinator};
pub use sync::Semaphore;
