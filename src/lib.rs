//! `sac`: eager self-adjusting computation.
//!
//! A runtime for incremental programs: computations are memoized into
//! named, timestamped nodes; reads of mutable input cells are recorded as
//! dependency edges; after inputs change, [`engine::refresh`] re-executes
//! only the affected nodes, in the order they originally ran.
//!
//! Entry points live in [`engine`]: `cell`/`put`/`set` for inputs, `thunk`
//! for eager computations, [`engine::mk_mfn`] for memoized functions, and
//! `force` to read any node.  Names come from [`name`].

#[macro_use]
pub mod macros;
pub mod engine;
pub mod name;
pub mod order;
pub mod queue;
