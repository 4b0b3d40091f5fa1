//! The eager self-adjusting computation engine.
//!
//! The engine memoizes computations keyed by function and argument (or by
//! an explicit first-class [`Name`]), records a dynamic dependency graph
//! between computations and mutable input cells, and, after any input
//! mutation, recomputes outer results by re-executing only the affected
//! subgraph in timestamp order.
//!
//! Every computation occupies an interval of timestamps in a single
//! [`TotalOrder`]; nested calls occupy nested intervals.  Mutating a cell
//! enqueues its dependents on a priority set keyed by start timestamp.
//! [`refresh`] drains that set: each stale node is re-executed with the
//! cursor placed at its start stamp, and the stamps its new execution did
//! not recreate are spliced out of the order, invalidating the nodes that
//! owned them.
//!
//! The engine is strictly single-threaded; all state lives in a
//! thread-local context.  Use [`manage::init`] to discard the current graph
//! and start over (tests do this first thing).

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::env;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::mem;
use std::ops::{Add, Sub};
use std::rc::{Rc, Weak};

use log::debug;

use crate::name::Name;
use crate::order::{Time, TotalOrder};
use crate::queue::{PqItem, PrioritySet};

// ---------- Data capability ----------

/// What the engine needs from a value: equality (to cut propagation when a
/// recomputed result is unchanged), hashing (memo keys), display, and a
/// hook to canonicalize values entering the graph.
///
/// Implemented for every `Eq + Hash + Debug + Clone` type via a blanket
/// impl; the methods exist so generic engine code reads as the capability
/// it uses.
pub trait Data: Eq + Hash + Debug + Clone + 'static {
    fn equal(a: &Self, b: &Self) -> bool {
        a == b
    }
    fn hash_seeded(seed: u64, a: &Self) -> u64 {
        let mut h = DefaultHasher::new();
        seed.hash(&mut h);
        a.hash(&mut h);
        h.finish()
    }
    fn show(a: &Self) -> String {
        format!("{:?}", a)
    }
    fn sanitize(a: &Self) -> Self {
        a.clone()
    }
}

impl<T: Eq + Hash + Debug + Clone + 'static> Data for T {}

// ---------- Statistics ----------

/// Monotonic operation counters, readable via [`cnt`] and [`cnt_of`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cnt {
    /// Nodes allocated.
    pub create: u64,
    /// User-function executions (initial and re-executions).
    pub evaluate: u64,
    /// Memo lookups that reused an existing node.
    pub hit: u64,
    /// Memo lookups that allocated a fresh node.
    pub miss: u64,
    /// Nodes enqueued as stale.
    pub dirty: u64,
    /// Stale nodes brought back up to date by propagation.
    pub clean: u64,
    /// Cell mutations that actually changed the stored value.
    pub update: u64,
}

impl Add for Cnt {
    type Output = Cnt;
    fn add(self, o: Cnt) -> Cnt {
        Cnt {
            create: self.create + o.create,
            evaluate: self.evaluate + o.evaluate,
            hit: self.hit + o.hit,
            miss: self.miss + o.miss,
            dirty: self.dirty + o.dirty,
            clean: self.clean + o.clean,
            update: self.update + o.update,
        }
    }
}

impl Sub for Cnt {
    type Output = Cnt;
    fn sub(self, o: Cnt) -> Cnt {
        Cnt {
            create: self.create - o.create,
            evaluate: self.evaluate - o.evaluate,
            hit: self.hit - o.hit,
            miss: self.miss - o.miss,
            dirty: self.dirty - o.dirty,
            clean: self.clean - o.clean,
            update: self.update - o.update,
        }
    }
}

// ---------- Meta: per-node bookkeeping ----------

/// Weak back-references to the nodes that read this node during their last
/// evaluation.  Dead referents are dropped silently; enqueueing dependents
/// drains the set (readers re-register as they re-read).
#[derive(Default)]
struct Dependents {
    items: Vec<Weak<Meta>>,
}

impl Dependents {
    fn add(&mut self, w: Weak<Meta>) {
        let id = match w.upgrade() {
            Some(m) => m.id,
            None => return,
        };
        if self
            .items
            .iter()
            .any(|x| x.upgrade().map_or(false, |m| m.id == id))
        {
            return;
        }
        self.items.push(w);
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn take_all(&mut self) -> Vec<Weak<Meta>> {
        mem::take(&mut self.items)
    }
}

/// The bookkeeping record of one node: its interval in the total order, the
/// closures that re-execute and un-memoize it, and its dependents.
///
/// `evaluate` and `unmemo` both capture the node that stores them; the
/// fields are interior-mutable so the node can be allocated first and the
/// closures installed second.  Invalidation replaces `evaluate` with a
/// no-op and drops `unmemo`, which is also what breaks the reference
/// cycles.
struct Meta {
    id: u64,
    name: Option<Name>,
    start: RefCell<Option<Time>>,
    end: RefCell<Option<Time>>,
    evaluate: RefCell<Box<dyn FnMut()>>,
    unmemo: RefCell<Option<Box<dyn FnOnce()>>>,
    dependents: RefCell<Dependents>,
    enqueued: Cell<bool>,
    onstack: Cell<bool>,
}

impl Debug for Meta {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.name {
            Some(n) => write!(f, "t#{}({:?})", self.id, n),
            None => write!(f, "t#{}", self.id),
        }
    }
}

struct QItem(Rc<Meta>);

impl PqItem for QItem {
    fn pq_before(&self, other: &Self) -> bool {
        let a = self.0.start.borrow();
        let b = other.0.start.borrow();
        match (a.as_ref(), b.as_ref()) {
            (Some(a), Some(b)) => {
                // Entries invalidated while queued sort first, so they
                // surface and are discarded promptly; comparisons between
                // live stamps always use their current label order.
                if !a.is_valid() {
                    return true;
                }
                if !b.is_valid() {
                    return false;
                }
                TotalOrder::compare(a, b) == Ordering::Less
            }
            (Some(_), None) => true,
            _ => false,
        }
    }

    fn pq_id(&self) -> u64 {
        self.0.id
    }
}

// ---------- Art: the public node handle ----------

/// A handle to a node holding a `T`: either a mutable input cell (no
/// interval) or a computed thunk (bracketed by an interval).
///
/// Handles are cheap to clone and compare by node identity, so they can be
/// stored inside other [`Data`] values.
pub struct Art<T> {
    val: Rc<RefCell<T>>,
    meta: Rc<Meta>,
}

impl<T> Clone for Art<T> {
    fn clone(&self) -> Self {
        Art {
            val: self.val.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<T> PartialEq for Art<T> {
    fn eq(&self, other: &Self) -> bool {
        self.meta.id == other.meta.id
    }
}

impl<T> Eq for Art<T> {}

impl<T> Hash for Art<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.meta.id.hash(state);
    }
}

impl<T> Debug for Art<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "art!{:?}", self.meta)
    }
}

impl<T> Art<T> {
    /// Process-unique node id.
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// True while the node is usable: input cells always, thunks until
    /// their start timestamp is spliced out.
    pub fn is_live(&self) -> bool {
        match self.meta.start.borrow().as_ref() {
            None => true,
            Some(s) => s.is_valid(),
        }
    }
}

// ---------- Engine context ----------

struct Engine {
    order: TotalOrder,
    /// Root timestamp; the cursor rests here before any node exists.
    start: Time,
    /// Cursor: the "current time" during evaluation.
    now: Time,
    /// Upper bound of the current refresh scope; `None` is unbounded.
    finger: Option<Time>,
    queue: PrioritySet<QItem>,
    stack: Vec<Rc<Meta>>,
    cnt: Cnt,
    next_id: u64,
    check: bool,
}

impl Engine {
    fn new() -> Engine {
        let order = TotalOrder::new();
        let start = order.base();
        Engine {
            now: start.clone(),
            start,
            finger: None,
            queue: PrioritySet::new(),
            stack: Vec::new(),
            cnt: Cnt::default(),
            next_id: 0,
            check: env::var_os("SAC_CHECK_ENGINE").is_some(),
            order,
        }
    }
}

thread_local!(static ENGINE: RefCell<Engine> = RefCell::new(Engine::new()));

/// Run `f` with the engine borrowed.  `f` must not call back into the
/// public API (user code never runs under this borrow).
fn with_engine<R>(f: impl FnOnce(&mut Engine) -> R) -> R {
    ENGINE.with(|e| f(&mut e.borrow_mut()))
}

/// Engine lifecycle.
pub mod manage {
    use super::{Engine, ENGINE};

    /// Install a fresh engine for the current thread, discarding the
    /// previous graph, queue, and statistics.
    pub fn init() {
        ENGINE.with(|e| *e.borrow_mut() = Engine::new());
    }
}

// ---------- Core: edges, enqueueing, evaluation frames ----------

/// Record that the currently evaluating node (if any) read `meta`.
/// At the outer layer (empty stack) this is a no-op: outer reads are not
/// tracked, and outer callers observe updates via [`refresh`].
fn make_dependency_edge(meta: &Rc<Meta>) {
    with_engine(|e| {
        if let Some(top) = e.stack.last() {
            meta.dependents.borrow_mut().add(Rc::downgrade(top));
        }
    });
}

/// Mark every live dependent of `meta` stale and enqueue it, then drain the
/// dependent set; re-readers re-register.  Dependents already enqueued, on
/// the evaluation stack, or invalidated are skipped.
fn enqueue_dependents(meta: &Rc<Meta>) {
    let deps = meta.dependents.borrow_mut().take_all();
    if deps.is_empty() {
        return;
    }
    with_engine(|e| {
        for w in deps {
            let d = match w.upgrade() {
                Some(d) => d,
                None => continue,
            };
            let valid = d.start.borrow().as_ref().map_or(false, |t| t.is_valid());
            if valid && !d.enqueued.get() && !d.onstack.get() {
                debug!("engine: dirty {:?}", d);
                d.enqueued.set(true);
                e.cnt.dirty += 1;
                e.queue.add(QItem(d));
            }
        }
    });
}

struct StackGuard(Rc<Meta>);

impl Drop for StackGuard {
    fn drop(&mut self) {
        self.0.onstack.set(false);
        let ok = with_engine(|e| match e.stack.pop() {
            Some(m) => Rc::ptr_eq(&m, &self.0),
            None => false,
        });
        if !ok && !std::thread::panicking() {
            panic!("engine: evaluation stack out of order");
        }
    }
}

/// Run `f` as the body of `meta`: push an evaluation frame, run, pop.
/// The frame is popped (and `onstack` cleared) even if `f` panics; the
/// panic propagates unchanged and the graph is left poisoned.
fn evaluate_meta<T>(meta: &Rc<Meta>, f: impl FnOnce() -> T) -> T {
    with_engine(|e| {
        e.cnt.evaluate += 1;
        meta.onstack.set(true);
        e.stack.push(meta.clone());
    });
    let _guard = StackGuard(meta.clone());
    f()
}

fn fresh_meta(name: Option<Name>) -> Rc<Meta> {
    with_engine(|e| {
        e.cnt.create += 1;
        e.next_id += 1;
        Rc::new(Meta {
            id: e.next_id,
            name,
            start: RefCell::new(None),
            end: RefCell::new(None),
            evaluate: RefCell::new(Box::new(|| {})),
            unmemo: RefCell::new(None),
            dependents: RefCell::new(Dependents::default()),
            enqueued: Cell::new(false),
            onstack: Cell::new(false),
        })
    })
}

/// Invalidation: runs when a node's start timestamp is spliced out of the
/// order.  Un-memoizes the node, neuters its re-evaluation closure, and
/// drops its dependents.  A queue entry left behind is discarded when
/// popped.
fn invalidate_meta(meta: &Rc<Meta>) {
    debug!("engine: invalidate {:?}", meta);
    if let Some(un) = meta.unmemo.borrow_mut().take() {
        un();
    }
    *meta.evaluate.borrow_mut() = Box::new(|| {});
    meta.dependents.borrow_mut().clear();
}

/// Allocate a node, evaluate its body inside a fresh interval at the
/// cursor, then install the re-evaluation closure and the invalidator.
fn make_and_eval_node<T: Data>(name: Option<Name>, f: Rc<dyn Fn() -> T>) -> Art<T> {
    let meta = fresh_meta(name);
    let start = with_engine(|e| {
        let s = e.order.insert_after(&e.now);
        if e.check {
            if let Some(fin) = &e.finger {
                assert_eq!(
                    TotalOrder::compare(&s, fin),
                    Ordering::Less,
                    "engine: cursor escaped the refresh scope"
                );
            }
        }
        e.now = s.clone();
        *meta.start.borrow_mut() = Some(s.clone());
        s
    });
    debug!("engine: create {:?} at {:?}", meta, start);
    let v = evaluate_meta(&meta, || f());
    with_engine(|e| {
        let t = e.order.insert_after(&e.now);
        e.now = t.clone();
        *meta.end.borrow_mut() = Some(t);
    });
    let val = Rc::new(RefCell::new(v));
    {
        let meta2 = meta.clone();
        let val2 = val.clone();
        let f2 = f.clone();
        *meta.evaluate.borrow_mut() = Box::new(move || {
            let new = evaluate_meta(&meta2, || f2());
            let changed = !T::equal(&val2.borrow(), &new);
            if changed {
                *val2.borrow_mut() = new;
                enqueue_dependents(&meta2);
            }
        });
    }
    {
        let meta2 = meta.clone();
        with_engine(|e| e.order.set_invalidator(&start, move || invalidate_meta(&meta2)));
    }
    Art { val, meta }
}

// ---------- Change propagation ----------

/// Drain the priority set in start-timestamp order, re-executing each stale
/// node inside its interval and splicing out the stamps its new execution
/// did not recreate.  With `end = Some(e)`, stops (leaving the set
/// non-empty) before any node whose interval ends past `e`; the caller's
/// finger is restored on return.
fn refresh_until(end: Option<&Time>) {
    enum Step {
        Done,
        Skip,
        Run(Rc<Meta>, Time),
    }
    let saved_finger = with_engine(|e| e.finger.clone());
    loop {
        let step = with_engine(|e| {
            let top = match e.queue.top() {
                None => return Step::Done,
                Some(t) => t.0.clone(),
            };
            let start = top.start.borrow().clone();
            let valid = start.as_ref().map_or(false, |s| s.is_valid());
            if !valid {
                // Invalidated while waiting; discard.
                e.queue.pop();
                top.enqueued.set(false);
                return Step::Skip;
            }
            let start = start.unwrap();
            let m_end = top
                .end
                .borrow()
                .clone()
                .expect("engine: queued node has no end timestamp");
            if let Some(bound) = end {
                if TotalOrder::compare(&m_end, bound) == Ordering::Greater {
                    return Step::Done;
                }
            }
            e.queue.pop();
            top.enqueued.set(false);
            e.now = start;
            e.finger = Some(m_end.clone());
            Step::Run(top, m_end)
        });
        match step {
            Step::Done => break,
            Step::Skip => continue,
            Step::Run(meta, m_end) => {
                debug!("engine: refresh {:?}", meta);
                (meta.evaluate.borrow_mut())();
                with_engine(|e| {
                    let now = e.now.clone();
                    e.order.splice(&now, &m_end);
                    e.cnt.clean += 1;
                });
            }
        }
    }
    with_engine(|e| e.finger = saved_finger);
}

/// Propagate all pending changes.  An outer-layer operation: re-executes
/// every stale node, restores the cursor, and unbounds the finger.
pub fn refresh() {
    let saved_now = with_engine(|e| {
        assert!(
            e.stack.is_empty(),
            "engine: refresh is an outer-layer operation"
        );
        e.now.clone()
    });
    refresh_until(None);
    with_engine(|e| {
        e.now = saved_now;
        e.finger = None;
    });
}

// ---------- Public API: cells, thunks, force ----------

/// An anonymous constant input cell: no interval, mutable via [`set`].
pub fn put<T: Data>(v: T) -> Art<T> {
    let meta = fresh_meta(None);
    Art {
        val: Rc::new(RefCell::new(v)),
        meta,
    }
}

/// A named input cell.  The name labels the node for display; mutate the
/// cell through the returned handle with [`set`].
pub fn cell<T: Data>(nm: Name, v: T) -> Art<T> {
    let meta = fresh_meta(Some(nm));
    Art {
        val: Rc::new(RefCell::new(v)),
        meta,
    }
}

/// Mutate an input cell.  Only legal on cells (nodes with no interval) and
/// only from the outer layer.  A no-op when the new value equals the old;
/// otherwise stores it and marks dependents stale (observe the new results
/// after [`refresh`]).
pub fn set<T: Data>(a: &Art<T>, v: T) {
    assert!(
        a.meta.start.borrow().is_none(),
        "engine: set on a computed node (only input cells are mutable)"
    );
    with_engine(|e| {
        assert!(
            e.stack.is_empty(),
            "engine: set is an outer-layer operation"
        )
    });
    let changed = !T::equal(&a.val.borrow(), &v);
    if changed {
        debug!("engine: set {:?} <- {}", a.meta, T::show(&v));
        *a.val.borrow_mut() = v;
        with_engine(|e| e.cnt.update += 1);
        enqueue_dependents(&a.meta);
    }
}

/// An ad-hoc eager computation: evaluates `f` now, bracketed by a fresh
/// interval, and re-evaluates it during propagation when its reads change.
/// Creation alone records no dependency edge; the creator depends on the
/// thunk only once it [`force`]s it.
pub fn thunk<T: Data>(nm: Name, f: impl Fn() -> T + 'static) -> Art<T> {
    make_and_eval_node(Some(nm), Rc::new(f))
}

/// Read a node's cached value, recording a dependency edge when called
/// from inside an evaluation.
pub fn force<T: Data>(a: &Art<T>) -> T {
    make_dependency_edge(&a.meta);
    let v = a.val.borrow().clone();
    v
}

/// No-op: propagation is driven by [`refresh`], not by a write barrier.
pub fn flush() {}

/// Snapshot of the engine's counters.
pub fn cnt() -> Cnt {
    with_engine(|e| e.cnt)
}

/// Run `body` and report the counters it consumed alongside its result.
pub fn cnt_of<R>(body: impl FnOnce() -> R) -> (R, Cnt) {
    let before = cnt();
    let r = body();
    (r, cnt() - before)
}

/// Log the live timeline at debug level, one line per stamp.
pub fn dump_timeline() {
    with_engine(|e| {
        let mut n = 0usize;
        e.order.iter_from(&e.start, |t| {
            debug!("engine: timeline[{}] = {:?}", n, t);
            n += 1;
        });
        debug!("engine: timeline has {} stamps, queue {:?}", n, e.queue);
    });
}

// ---------- Memo tables ----------

/// A memo-table key: by argument value or by explicit name.  The two kinds
/// never compare equal.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum BindingKey<A> {
    Arg(A),
    Name(Name),
}

struct BoundNode<A, T> {
    /// The argument the node's body reads; nominal reuse overwrites it in
    /// place before re-executing.
    arg: Rc<RefCell<A>>,
    node: Art<T>,
}

/// A memo-table entry: the nodes sharing one key.  Stale nodes linger here
/// until invalidation removes them via their `unmemo` hook.
struct Binding<A, T> {
    key: BindingKey<A>,
    nodes: Vec<BoundNode<A, T>>,
}

type BindingRef<A, T> = Rc<RefCell<Binding<A, T>>>;

struct MfnCore<A: Data, T: Data> {
    tag: Name,
    /// Bindings are held weakly here; each live node's `unmemo` closure
    /// holds its binding strongly, so a binding lives exactly as long as
    /// its longest-lived node.
    table: RefCell<HashMap<BindingKey<A>, Weak<RefCell<Binding<A, T>>>>>,
    body: Box<dyn Fn(&MemoFn<A, T>, A) -> T>,
}

/// A memoized function over `A`, produced by [`mk_mfn`].  The body receives
/// the `MemoFn` itself for recursive calls, which it can make either
/// un-memoized ([`MemoFn::data`]), memoized by argument ([`MemoFn::art`]),
/// or memoized by name ([`MemoFn::nart`]).
pub struct MemoFn<A: Data, T: Data> {
    inner: Rc<MfnCore<A, T>>,
}

impl<A: Data, T: Data> Clone for MemoFn<A, T> {
    fn clone(&self) -> Self {
        MemoFn {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Data, T: Data> Debug for MemoFn<A, T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "mfn!{:?}", self.inner.tag)
    }
}

/// Make a memoized function.  `tag` labels the function's own memo table.
pub fn mk_mfn<A: Data, T: Data>(
    tag: Name,
    body: impl Fn(&MemoFn<A, T>, A) -> T + 'static,
) -> MemoFn<A, T> {
    MemoFn {
        inner: Rc::new(MfnCore {
            tag,
            table: RefCell::new(HashMap::new()),
            body: Box::new(body),
        }),
    }
}

/// Is this node's interval reachable for reuse?  Three conjuncts: the start
/// stamp is still valid, the interval lies strictly ahead of the cursor,
/// and it lies strictly inside the current refresh scope.
fn is_available(meta: &Rc<Meta>) -> bool {
    let start = meta.start.borrow();
    let end = meta.end.borrow();
    let (s, t) = match (start.as_ref(), end.as_ref()) {
        (Some(s), Some(t)) => (s, t),
        _ => return false,
    };
    if !s.is_valid() {
        return false;
    }
    with_engine(|e| {
        TotalOrder::compare(s, &e.now) == Ordering::Greater
            && match &e.finger {
                None => true,
                Some(f) => TotalOrder::compare(t, f) == Ordering::Less,
            }
    })
}

/// Adopt an available node: skip the cursor forward to it, splicing out the
/// obsolete work in between, and bring its subgraph up to date.
fn adopt_node(meta: &Rc<Meta>) {
    let s = meta.start.borrow().clone().expect("adopting an interval-less node");
    let t = meta.end.borrow().clone().expect("adopting an unfinished node");
    with_engine(|e| {
        let now = e.now.clone();
        e.order.splice(&now, &s);
    });
    refresh_until(Some(&t));
    with_engine(|e| e.now = t);
}

/// Re-execute an available node in place after its argument was rebound to
/// a different value under the same name.
fn update_node_in_place(meta: &Rc<Meta>, install_arg: impl FnOnce()) {
    let s = meta.start.borrow().clone().expect("updating an interval-less node");
    let t = meta.end.borrow().clone().expect("updating an unfinished node");
    let saved_finger = with_engine(|e| {
        let now = e.now.clone();
        e.order.splice(&now, &s);
        e.now = s.clone();
        if meta.enqueued.get() {
            // Already stale in the queue; this re-execution supersedes it.
            e.queue.remove(meta.id);
            meta.enqueued.set(false);
        }
        mem::replace(&mut e.finger, Some(t.clone()))
    });
    install_arg();
    (meta.evaluate.borrow_mut())();
    with_engine(|e| {
        let now = e.now.clone();
        e.order.splice(&now, &t);
        e.finger = saved_finger;
        e.now = t;
    });
}

impl<A: Data, T: Data> MemoFn<A, T> {
    /// Call the body directly, without memoization or a node.
    pub fn data(&self, arg: A) -> T {
        (self.inner.body)(self, arg)
    }

    /// Memoized call keyed by argument value.
    pub fn art(&self, arg: A) -> Art<T> {
        let binding = self.merge(BindingKey::Arg(A::sanitize(&arg)));
        let found = {
            let b = binding.borrow();
            b.nodes
                .iter()
                .find(|bn| is_available(&bn.node.meta))
                .map(|bn| bn.node.clone())
        };
        match found {
            Some(node) => {
                with_engine(|e| e.cnt.hit += 1);
                debug!("memo {:?}: hit on {}", self.inner.tag, A::show(&arg));
                adopt_node(&node.meta);
                make_dependency_edge(&node.meta);
                node
            }
            None => {
                with_engine(|e| e.cnt.miss += 1);
                self.fresh_binding(&binding, arg)
            }
        }
    }

    /// Memoized call keyed by an explicit name.  When the named node exists
    /// and is available but was built for a different argument, the node is
    /// kept and re-executed in place with the new argument.
    pub fn nart(&self, nm: Name, arg: A) -> Art<T> {
        let binding = self.merge(BindingKey::Name(nm.clone()));
        let found = {
            let b = binding.borrow();
            b.nodes
                .iter()
                .find(|bn| is_available(&bn.node.meta))
                .map(|bn| (bn.arg.clone(), bn.node.clone()))
        };
        match found {
            Some((arg_ref, node)) => {
                with_engine(|e| e.cnt.hit += 1);
                let same = A::equal(&arg_ref.borrow(), &arg);
                if same {
                    debug!("memo {:?}: hit on name {:?}", self.inner.tag, nm);
                    adopt_node(&node.meta);
                } else {
                    debug!(
                        "memo {:?}: rebinding {:?} to {}",
                        self.inner.tag,
                        nm,
                        A::show(&arg)
                    );
                    update_node_in_place(&node.meta, || *arg_ref.borrow_mut() = arg);
                }
                make_dependency_edge(&node.meta);
                node
            }
            None => {
                with_engine(|e| e.cnt.miss += 1);
                self.fresh_binding(&binding, arg)
            }
        }
    }

    /// Number of live bindings in this function's memo table.
    pub fn num_bindings(&self) -> usize {
        self.inner
            .table
            .borrow()
            .values()
            .filter(|w| w.upgrade().is_some())
            .count()
    }

    /// Look up the binding for `key`, installing an empty one if absent or
    /// expired.  The returned binding is the canonical one for the key.
    fn merge(&self, key: BindingKey<A>) -> BindingRef<A, T> {
        let mut table = self.inner.table.borrow_mut();
        if let Some(w) = table.get(&key) {
            if let Some(b) = w.upgrade() {
                return b;
            }
        }
        let b = Rc::new(RefCell::new(Binding {
            key: key.clone(),
            nodes: Vec::new(),
        }));
        table.insert(key, Rc::downgrade(&b));
        b
    }

    /// Allocate and evaluate a fresh node under `binding`.  The body closes
    /// over a shared argument slot so nominal reuse can rewrite the
    /// argument without rebuilding the closure.
    fn fresh_binding(&self, binding: &BindingRef<A, T>, arg: A) -> Art<T> {
        debug!("memo {:?}: miss on {:?}", self.inner.tag, binding.borrow().key);
        let name = match &binding.borrow().key {
            BindingKey::Name(n) => Some(n.clone()),
            BindingKey::Arg(_) => None,
        };
        let arg_ref = Rc::new(RefCell::new(arg));
        let this = self.clone();
        let arg2 = arg_ref.clone();
        let node = make_and_eval_node(name, Rc::new(move || {
            let a = arg2.borrow().clone();
            (this.inner.body)(&this, a)
        }));
        binding.borrow_mut().nodes.push(BoundNode {
            arg: arg_ref,
            node: node.clone(),
        });
        let b2 = binding.clone();
        let id = node.meta.id;
        *node.meta.unmemo.borrow_mut() = Some(Box::new(move || {
            b2.borrow_mut().nodes.retain(|bn| bn.node.meta.id != id);
        }));
        make_dependency_edge(&node.meta);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::name_of_str;

    #[test]
    fn put_then_force() {
        manage::init();
        let a = put(42u32);
        assert_eq!(force(&a), 42);
        assert!(a.is_live());
    }

    #[test]
    fn cells_are_identity_compared() {
        manage::init();
        let a = cell(name_of_str("a"), 1u32);
        let b = cell(name_of_str("b"), 1u32);
        assert!(a != b);
        assert_eq!(a, a.clone());
    }

    #[test]
    #[should_panic(expected = "set on a computed node")]
    fn set_rejects_thunks() {
        manage::init();
        let t = thunk(name_of_str("t"), || 1u32);
        set(&t, 2);
    }

    #[test]
    fn counters_accumulate() {
        manage::init();
        let (_, delta) = cnt_of(|| {
            let c = cell(name_of_str("c"), 1u32);
            let c2 = c.clone();
            let t = thunk(name_of_str("t"), move || force(&c2) + 1);
            assert_eq!(force(&t), 2);
            set(&c, 5);
            refresh();
            assert_eq!(force(&t), 6);
        });
        assert_eq!(delta.create, 2);
        assert_eq!(delta.evaluate, 2);
        assert_eq!(delta.update, 1);
        assert_eq!(delta.dirty, 1);
        assert_eq!(delta.clean, 1);
    }
}
