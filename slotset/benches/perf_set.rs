// benches/perf_set.rs
//! Head-to-head comparison of SlotSet against std's BTreeSet.
//!
//! Run: cargo bench --bench perf_set
//!
//! Three phases over the same key population: ascending insertion,
//! scrambled erasure, scrambled re-insertion. After each mutation phase
//! both containers must agree on the full iteration order.

use std::collections::BTreeSet;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use slotset::SlotSet;

const LEN: u32 = 256 * 1024 - 1;

/// Two fields; only `key` participates in the order, `tag` is cargo.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(C)]
struct Pair {
    key: u32,
    tag: u32,
}

fn timed<R>(f: impl FnOnce() -> R) -> (R, f64) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed().as_secs_f64() * 1e3)
}

fn verify_same_order(set: &BTreeSet<Pair>, iset: &SlotSet<Pair>) {
    let mut theirs = set.iter();
    let mut ours = iset.iter();
    loop {
        match (theirs.next(), ours.next()) {
            (None, None) => break,
            (a, b) => assert_eq!(a.map(|p| p.key), b.map(|p| p.key), "iteration order diverged"),
        }
    }
}

fn main() {
    let mut source: Vec<Pair> = (0..LEN).map(|key| Pair { key, tag: 0 }).collect();

    let mut set: BTreeSet<Pair> = BTreeSet::new();
    let mut iset: SlotSet<Pair> = SlotSet::with_capacity(LEN).expect("preallocation failed");

    // Ascending insertion.
    let (_, set_ms) = timed(|| {
        for &v in &source {
            set.insert(v);
        }
    });
    let (_, iset_ms) = timed(|| {
        for &v in &source {
            iset.insert(v).unwrap();
        }
    });
    println!("ascending insert ({} keys)", LEN);
    println!("  BTreeSet: {:8.2} ms, len {}", set_ms, set.len());
    println!("  SlotSet:  {:8.2} ms, len {}", iset_ms, iset.len());
    println!("\n{:#?}\n", iset.stats());

    let mut rng = SmallRng::seed_from_u64(0x7E55);
    source.shuffle(&mut rng);

    // Scrambled erase.
    let (_, set_ms) = timed(|| {
        for v in &source {
            set.remove(v);
        }
    });
    let (_, iset_ms) = timed(|| {
        for v in &source {
            iset.remove(v);
        }
    });
    println!("scrambled erase");
    println!("  BTreeSet: {:8.2} ms, len {}", set_ms, set.len());
    println!("  SlotSet:  {:8.2} ms, len {}", iset_ms, iset.len());

    source.shuffle(&mut rng);

    // Scrambled re-insertion; every node now comes off the free list.
    let (_, set_ms) = timed(|| {
        for &v in &source {
            set.insert(v);
        }
    });
    let (_, iset_ms) = timed(|| {
        for &v in &source {
            iset.insert(v).unwrap();
        }
    });
    println!("scrambled insert");
    println!("  BTreeSet: {:8.2} ms, len {}", set_ms, set.len());
    println!("  SlotSet:  {:8.2} ms, len {}", iset_ms, iset.len());
    println!("\n{:#?}\n", iset.stats());

    verify_same_order(&set, &iset);
    println!("iteration order verified against BTreeSet");
}
