use std::cmp::Ordering;

use quickcheck::quickcheck;
use sac::order::{Time, TotalOrder};

/// Replay an arbitrary insertion sequence against a `Vec` model: each op
/// inserts after some existing stamp.
fn build(ops: &[u16]) -> (TotalOrder, Vec<Time>) {
    let order = TotalOrder::new();
    let mut model: Vec<Time> = vec![order.base()];
    for op in ops {
        let i = (*op as usize) % model.len();
        let t = order.insert_after(&model[i]);
        model.insert(i + 1, t);
    }
    (order, model)
}

quickcheck! {
    fn traversal_matches_insertion_model(ops: Vec<u16>) -> bool {
        let (order, model) = build(&ops);
        let mut seen: Vec<Time> = Vec::new();
        order.iter_from(&order.base(), |t| seen.push(t.clone()));
        if seen.len() != model.len() {
            return false;
        }
        for (a, b) in seen.iter().zip(model.iter()) {
            if !a.same(b) {
                return false;
            }
        }
        // Pairwise order agrees with positions, i.e. compare is consistent
        // with one global total order.
        for w in model.windows(2) {
            if TotalOrder::compare(&w[0], &w[1]) != Ordering::Less {
                return false;
            }
            if TotalOrder::compare(&w[1], &w[0]) != Ordering::Greater {
                return false;
            }
        }
        true
    }

    fn splice_removes_exactly_the_open_interval(ops: Vec<u16>, a: u16, b: u16) -> bool {
        let (order, model) = build(&ops);
        let n = model.len();
        let (mut i, mut j) = ((a as usize) % n, (b as usize) % n);
        if i > j {
            std::mem::swap(&mut i, &mut j);
        }
        order.splice(&model[i], &model[j]);
        for (k, t) in model.iter().enumerate() {
            let expect_valid = !(k > i && k < j);
            if t.is_valid() != expect_valid {
                return false;
            }
        }
        let removed = if j > i { j - i - 1 } else { 0 };
        let mut seen = 0usize;
        order.iter_from(&order.base(), |_| seen += 1);
        seen == n - removed
    }

    fn compare_total_on_random_triples(ops: Vec<u16>, xs: (u16, u16, u16)) -> bool {
        let (_order, model) = build(&ops);
        let n = model.len();
        let (i, j, k) = (
            (xs.0 as usize) % n,
            (xs.1 as usize) % n,
            (xs.2 as usize) % n,
        );
        let (ti, tj, tk) = (&model[i], &model[j], &model[k]);
        // Position order is the ground truth.
        if TotalOrder::compare(ti, tj) != i.cmp(&j) {
            return false;
        }
        // Transitivity on the sampled triple.
        if TotalOrder::compare(ti, tj) == Ordering::Less
            && TotalOrder::compare(tj, tk) == Ordering::Less
            && TotalOrder::compare(ti, tk) != Ordering::Less
        {
            return false;
        }
        true
    }
}
