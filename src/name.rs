//! First-class names.
//!
//! Names give the programmer a symbolic way to identify nodes across
//! re-executions: a computation that allocates under the same name in two
//! successive runs is talking about *the same* node, even if its argument
//! changed in between.  Names form a small algebra: they are built from
//! strings and numbers, paired, and deterministically forked into distinct
//! left/right children (see Chapter 31 of PFPL 2nd Edition for a general
//! semantics of symbols).

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

thread_local!(static GENSYM_COUNTER: Cell<usize> = Cell::new(0));

/// A name: a precomputed hash plus the symbol tree it denotes.
#[derive(Hash, PartialEq, Eq, Clone)]
pub struct Name {
    hash: u64,
    symbol: Rc<NameSym>,
}

impl Name {
    /// The precomputed hash of this name's symbol.
    pub fn hash_val(&self) -> u64 {
        self.hash
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.symbol.fmt(f)
    }
}

#[derive(Hash, PartialEq, Eq)]
enum NameSym {
    /// Strings encode globally-unique symbols.
    String(String),
    /// Usizes encode globally-unique symbols.
    Usize(usize),
    /// A pair of unique symbols, interpreted as a symbol, is unique.
    Pair(Rc<NameSym>, Rc<NameSym>),
    /// Left projection of a unique symbol is unique.
    ForkL(Rc<NameSym>),
    /// Right projection of a unique symbol is unique.
    ForkR(Rc<NameSym>),
    /// Gensym'd symbols pair a string with a thread-local counter value.
    Gensym(String, usize),
    /// Nondeterministic symbols are fresh random bits.
    Nondet(u64),
}

impl Debug for NameSym {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            NameSym::String(ref s) => write!(f, "{}", s),
            NameSym::Usize(ref n) => write!(f, "{}", n),
            NameSym::Pair(ref l, ref r) => write!(f, "({:?},{:?})", l, r),
            NameSym::ForkL(ref s) => write!(f, "{:?}.l", s),
            NameSym::ForkR(ref s) => write!(f, "{:?}.r", s),
            NameSym::Gensym(ref s, ref n) => write!(f, "{}#{}", s, n),
            NameSym::Nondet(ref b) => write!(f, "?{:x}", b),
        }
    }
}

fn my_hash<T: Hash>(x: &T) -> u64 {
    let mut h = DefaultHasher::new();
    x.hash(&mut h);
    h.finish()
}

fn name_of_sym(s: NameSym) -> Name {
    let h = my_hash(&s);
    Name {
        hash: h,
        symbol: Rc::new(s),
    }
}

/// Name from a string slice.
pub fn name_of_str(s: &str) -> Name {
    name_of_sym(NameSym::String(s.to_string()))
}

/// Name from an owned string.
pub fn name_of_string(s: String) -> Name {
    name_of_sym(NameSym::String(s))
}

/// Name from a `usize`.
pub fn name_of_usize(n: usize) -> Name {
    name_of_sym(NameSym::Usize(n))
}

/// Pair two names into one.
pub fn name_pair(fst: Name, snd: Name) -> Name {
    let h = my_hash(&(fst.hash, snd.hash));
    Name {
        hash: h,
        symbol: Rc::new(NameSym::Pair(fst.symbol, snd.symbol)),
    }
}

/// Deterministically split a name into two distinct names.
///
/// Forking the same name twice yields the same pair; the left and right
/// results are distinct from each other and from the input.
pub fn name_fork(nm: Name) -> (Name, Name) {
    let hl = my_hash(&(nm.hash, 11111111u64));
    let hr = my_hash(&(nm.hash, 22222222u64));
    (
        Name {
            hash: hl,
            symbol: Rc::new(NameSym::ForkL(nm.symbol.clone())),
        },
        Name {
            hash: hr,
            symbol: Rc::new(NameSym::ForkR(nm.symbol)),
        },
    )
}

/// A fresh name stamped with a thread-local counter.
///
/// Two `name_gensym` calls never return equal names, even for the same
/// string.
pub fn name_gensym(s: &str) -> Name {
    let n = GENSYM_COUNTER.with(|c| {
        let n = c.get();
        c.set(n + 1);
        n
    });
    name_of_sym(NameSym::Gensym(s.to_string(), n))
}

/// A fresh nondeterministic name.
pub fn name_nondet() -> Name {
    name_of_sym(NameSym::Nondet(rand::random::<u64>()))
}
