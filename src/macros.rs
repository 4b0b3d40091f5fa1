//! Macros making the `engine` interface more ergonomic.
//!
//! Nominal memoization, in brief: below, `sum` is memoized under two
//! different names, then one name is re-bound to new arguments.
//!
//! ```
//! use sac::engine::*;
//! use sac::name::*;
//!
//! sac::engine::manage::init();
//!
//! fn sum(x: usize, y: usize) -> usize { x + y }
//!
//! let mfn = mk_mfn(name_of_str("sum"), |_mfn, (x, y)| sum(x, y));
//!
//! // Build everything inside an outer thunk so the memo table can match
//! // sub-calls against the cursor on later runs.
//! let mfn2 = mfn.clone();
//! let root = thunk(name_of_str("root"), move || {
//!     let a = mfn2.nart(name_of_str("a"), (42, 43));
//!     let b = mfn2.nart(name_of_str("b"), (55, 66));
//!     force(&a) + force(&b)
//! });
//! assert_eq!(force(&root), 85 + 121);
//! ```

/// `cell!(name_str, v)`: a named input cell.
#[macro_export]
macro_rules! cell {
    ( $nm:expr, $val:expr ) => {
        $crate::engine::cell($crate::name::name_of_str($nm), $val)
    };
}

/// `thunk!(name_str, body)`: an eagerly evaluated named computation.
/// The body is moved into the thunk's closure.
#[macro_export]
macro_rules! thunk {
    ( $nm:expr, $body:expr ) => {
        $crate::engine::thunk($crate::name::name_of_str($nm), move || $body)
    };
}

/// `memo!(mfn, arg)` / `memo!(mfn, nm =>> arg)`: force a memoized call in
/// one step, anonymously or under an explicit name.
#[macro_export]
macro_rules! memo {
    ( $mfn:expr, $nm:expr =>> $arg:expr ) => {
        $crate::engine::force(&$mfn.nart($nm, $arg))
    };
    ( $mfn:expr, $arg:expr ) => {
        $crate::engine::force(&$mfn.art($arg))
    };
}
