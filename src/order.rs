//! Order-maintenance timestamps.
//!
//! A [`TotalOrder`] is a totally ordered set of [`Time`] stamps supporting
//! constant-time comparison and amortized constant-time insertion of a new
//! stamp immediately after an existing one.  The engine brackets every
//! computation between a start and an end stamp; change propagation replays
//! stale computations in stamp order, and [`TotalOrder::splice`] retires the
//! stamps of work that a re-execution did not recreate.
//!
//! The realization is a two-level tag list in the style of Dietz and
//! Sleator: stamps live in groups of bounded size, groups carry widely
//! spaced `u64` labels, and members carry labels within their group.  Comparison is one lexicographic compare of two cached label
//! pairs.  When labels run out of room at an insertion point, the group (or
//! the group directory) is relabeled; the exponential label gaps make
//! relabeling rare enough to amortize away.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::rc::{Rc, Weak};

use log::trace;

const GROUP_CAP: usize = 64;
const GROUP_GAP: u64 = 1 << 32;
const LEAF_GAP: u64 = 1 << 16;

type GroupRef = Rc<RefCell<Group>>;

struct Stamp {
    /// Cached copy of the owning group's label; frozen once invalidated.
    group_label: Cell<u64>,
    label: Cell<u64>,
    valid: Cell<bool>,
    group: RefCell<Weak<RefCell<Group>>>,
    invalidator: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// A timestamp handle.  Cheap to clone; compares by position in the order.
pub struct Time(Rc<Stamp>);

impl Clone for Time {
    fn clone(&self) -> Self {
        Time(self.0.clone())
    }
}

impl Time {
    /// False once the stamp has been removed by a splice.
    pub fn is_valid(&self) -> bool {
        self.0.valid.get()
    }

    /// Identity: do the two handles denote the same stamp?
    pub fn same(&self, other: &Time) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn key(&self) -> (u64, u64) {
        (self.0.group_label.get(), self.0.label.get())
    }
}

impl Debug for Time {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let (g, l) = self.key();
        if self.is_valid() {
            write!(f, "t{:x}.{:x}", g >> 16, l >> 8)
        } else {
            write!(f, "t{:x}.{:x}!", g >> 16, l >> 8)
        }
    }
}

struct Group {
    label: u64,
    /// Ascending by member label.
    members: Vec<Rc<Stamp>>,
    next: Option<GroupRef>,
    prev: Weak<RefCell<Group>>,
}

impl Group {
    fn index_of(&self, s: &Rc<Stamp>) -> usize {
        self.members
            .iter()
            .position(|m| Rc::ptr_eq(m, s))
            .expect("timestamp missing from its group")
    }
}

/// The ordered set of timestamps.  Owns every live stamp.
pub struct TotalOrder {
    first: GroupRef,
    base: Time,
}

impl TotalOrder {
    /// A fresh order containing a single base stamp (see [`TotalOrder::base`]).
    pub fn new() -> TotalOrder {
        let group = Rc::new(RefCell::new(Group {
            label: GROUP_GAP,
            members: Vec::new(),
            next: None,
            prev: Weak::new(),
        }));
        let stamp = Rc::new(Stamp {
            group_label: Cell::new(GROUP_GAP),
            label: Cell::new(LEAF_GAP),
            valid: Cell::new(true),
            group: RefCell::new(Rc::downgrade(&group)),
            invalidator: RefCell::new(None),
        });
        group.borrow_mut().members.push(stamp.clone());
        TotalOrder {
            first: group,
            base: Time(stamp),
        }
    }

    /// The minimal stamp.  Never invalidated.
    pub fn base(&self) -> Time {
        self.base.clone()
    }

    /// Compare two stamps by position.  Constant time; total, transitive,
    /// antisymmetric.  `Equal` only for the same stamp.
    pub fn compare(a: &Time, b: &Time) -> Ordering {
        a.key().cmp(&b.key())
    }

    /// Insert a fresh stamp immediately after `t`: the result `t'` satisfies
    /// `compare(t, t') == Less` with no other stamp in between.
    pub fn insert_after(&self, t: &Time) -> Time {
        assert!(t.is_valid(), "insert_after on an invalidated timestamp");
        let group = t
            .0
            .group
            .borrow()
            .upgrade()
            .expect("valid timestamp must belong to a group");
        let group = self.split_if_full(group, &t.0);
        let stamp = Rc::new(Stamp {
            group_label: Cell::new(0),
            label: Cell::new(0),
            valid: Cell::new(true),
            group: RefCell::new(Rc::downgrade(&group)),
            invalidator: RefCell::new(None),
        });
        let mut g = group.borrow_mut();
        stamp.group_label.set(g.label);
        let i = g.index_of(&t.0);
        let lo = g.members[i].label.get();
        let hi = if i + 1 < g.members.len() {
            g.members[i + 1].label.get()
        } else {
            u64::MAX
        };
        g.members.insert(i + 1, stamp.clone());
        if hi - lo >= 2 {
            stamp.label.set(lo + (hi - lo) / 2);
        } else {
            // No label room at the insertion point: relabel the whole group.
            for (k, m) in g.members.iter().enumerate() {
                m.label.set((k as u64 + 1) * LEAF_GAP);
            }
        }
        drop(g);
        Time(stamp)
    }

    /// Remove every stamp strictly between `lo` and `hi`, marking each
    /// removed stamp invalid and firing its invalidator exactly once.
    /// A no-op unless `lo < hi`.
    pub fn splice(&self, lo: &Time, hi: &Time) {
        if Self::compare(lo, hi) != Ordering::Less {
            return;
        }
        let lo_key = lo.key();
        let hi_key = hi.key();
        let mut removed: Vec<Rc<Stamp>> = Vec::new();
        let mut cur = lo.0.group.borrow().upgrade();
        while let Some(g) = cur {
            if g.borrow().label > hi_key.0 {
                break;
            }
            let next = g.borrow().next.clone();
            {
                let mut gm = g.borrow_mut();
                let mut kept = Vec::with_capacity(gm.members.len());
                for m in gm.members.drain(..) {
                    let k = (m.group_label.get(), m.label.get());
                    if k > lo_key && k < hi_key {
                        removed.push(m);
                    } else {
                        kept.push(m);
                    }
                }
                gm.members = kept;
            }
            if g.borrow().members.is_empty() {
                self.unlink(&g);
            }
            cur = next;
        }
        if !removed.is_empty() {
            trace!("order: splice removed {} stamps", removed.len());
        }
        for m in removed {
            m.valid.set(false);
            *m.group.borrow_mut() = Weak::new();
            let inv = m.invalidator.borrow_mut().take();
            if let Some(f) = inv {
                f();
            }
        }
    }

    /// Register a callback to run when `t` is removed by a splice.
    /// Replaces any previously registered callback.
    pub fn set_invalidator(&self, t: &Time, f: impl FnOnce() + 'static) {
        debug_assert!(t.is_valid());
        *t.0.invalidator.borrow_mut() = Some(Box::new(f));
    }

    /// Visit every stamp from `start` (inclusive) to the end of the order.
    /// `f` must not mutate the order.
    pub fn iter_from(&self, start: &Time, mut f: impl FnMut(&Time)) {
        let group = match start.0.group.borrow().upgrade() {
            Some(g) => g,
            None => return,
        };
        let mut idx = group.borrow().index_of(&start.0);
        let mut cur = Some(group);
        while let Some(g) = cur {
            let (members, next) = {
                let gm = g.borrow();
                (gm.members[idx..].to_vec(), gm.next.clone())
            };
            for m in members {
                f(&Time(m));
            }
            idx = 0;
            cur = next;
        }
    }

    /// Group containing `keep` after ensuring its group has insertion room.
    fn split_if_full(&self, group: GroupRef, keep: &Rc<Stamp>) -> GroupRef {
        if group.borrow().members.len() < GROUP_CAP {
            return group;
        }
        let dense = {
            let g = group.borrow();
            let hi = match g.next {
                Some(ref n) => n.borrow().label,
                None => u64::MAX,
            };
            hi - g.label < 2
        };
        if dense {
            self.renumber_groups();
        }
        let new_group = {
            let mut g = group.borrow_mut();
            let hi = match g.next {
                Some(ref n) => n.borrow().label,
                None => u64::MAX,
            };
            let label = g.label + (hi - g.label) / 2;
            let tail = g.members.split_off(GROUP_CAP / 2);
            let ng = Rc::new(RefCell::new(Group {
                label,
                members: tail,
                next: g.next.take(),
                prev: Rc::downgrade(&group),
            }));
            g.next = Some(ng.clone());
            ng
        };
        {
            let ng = new_group.borrow();
            if let Some(ref n) = ng.next {
                n.borrow_mut().prev = Rc::downgrade(&new_group);
            }
            for m in &ng.members {
                m.group_label.set(ng.label);
                *m.group.borrow_mut() = Rc::downgrade(&new_group);
            }
        }
        let keep_in_old = group.borrow().members.iter().any(|m| Rc::ptr_eq(m, keep));
        if keep_in_old {
            group
        } else {
            new_group
        }
    }

    /// Relabel the whole group directory with fresh exponential gaps.
    fn renumber_groups(&self) {
        trace!("order: renumbering group labels");
        let mut label = GROUP_GAP;
        let mut cur = Some(self.first.clone());
        while let Some(g) = cur {
            let next = {
                let mut gm = g.borrow_mut();
                gm.label = label;
                for m in &gm.members {
                    m.group_label.set(label);
                }
                gm.next.clone()
            };
            label += GROUP_GAP;
            cur = next;
        }
    }

    fn unlink(&self, g: &GroupRef) {
        let (prev, next) = {
            let gm = g.borrow();
            (gm.prev.clone(), gm.next.clone())
        };
        let prev = match prev.upgrade() {
            // The head group stays in place even when empty.
            Some(p) => p,
            None => return,
        };
        prev.borrow_mut().next = next.clone();
        if let Some(n) = next {
            n.borrow_mut().prev = Rc::downgrade(&prev);
        }
        g.borrow_mut().next = None;
    }
}

impl Default for TotalOrder {
    fn default() -> Self {
        TotalOrder::new()
    }
}
