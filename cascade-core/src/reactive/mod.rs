//! Reactive Cells
//!
//! This module implements the value-holding side of the engine: signals and
//! the cells derived from them. Every cell is also an [`Observable`], so it
//! can be subscribed to, merged, buffered or awaited like any stream.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. Reads are synchronous and
//! always see the latest value. Changes are announced one scheduler tick
//! later, and only when the comparator says the value actually changed.
//!
//! ## Computed cells
//!
//! [`computed`] derives a cell from several sources. A change to any source
//! schedules one recomputation; several changes in the same turn coalesce,
//! and the recomputation reads every source's current value, so it never
//! sees a half-updated set of inputs.
//!
//! ## Mapped cells
//!
//! `ReadSignal::map` derives a cell from one source, transforming each
//! value synchronously as it is announced.
//!
//! ## Unwrapped cells
//!
//! [`unwrapped`] follows a cell that is itself selected by another cell,
//! switching over whenever the selection changes.
//!
//! # Lifetimes
//!
//! Derived cells keep their sources alive. Sources only hold derived cells
//! weakly, so a derived cell nobody references is dropped and stops
//! recomputing.
//!
//! [`Observable`]: crate::stream::Observable

mod computed;
mod mapped;
mod signal;
mod unwrapped;

pub use computed::{computed, try_computed, ChangeFn, Dependencies, Dependency};
pub use signal::{Comparator, ReadSignal, Signal, SignalBuilder, UpdateCallback};
pub use unwrapped::unwrapped;
