//! # Classic — Textbook Sieves over the Bitmap Primitive
//!
//! Reference algorithms used as cross-validation baselines for the iZ
//! engine and exposed as CLI algorithm choices: Eratosthenes ([`soe`]),
//! its segmented form ([`ssoe`]), Euler's linear sieve ([`soeu`]),
//! Sundaram ([`sos`]) and Atkin ([`soa`]). They share the entry contract
//! of every sieve in the crate: 10 < n ≤ 10^12, ordered output, absent
//! return on failure.

use crate::bitmap::Bitmap;
use crate::iz::isqrt;
use crate::uint_array::UintArray;
use crate::{bounds_ok, prime_count_estimate};

/// Sieve of Eratosthenes.
pub fn soe(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SoE") {
        return None;
    }
    let mut bm = Bitmap::new(n + 1, true)?;
    bm.clear(0);
    bm.clear(1);
    for p in 2..=isqrt(n) {
        if bm.get(p) {
            bm.clear_steps(p, p * p, n);
        }
    }
    collect_bits(&bm, 2, n)
}

/// Segmented sieve of Eratosthenes: base primes to √n, then fixed-size
/// windows so the working set stays cache-resident.
pub fn ssoe(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SSoE") {
        return None;
    }
    const SEGMENT_BITS: u64 = 1 << 18;
    let root = isqrt(n);
    let base = simple_soe(root)?;

    let mut out = UintArray::with_capacity(prime_count_estimate(n))?;
    for &p in &base {
        out.push(p);
    }

    let mut window = Bitmap::new(SEGMENT_BITS, true)?;
    let mut lo = root + 1;
    while lo <= n {
        let hi = n.min(lo + SEGMENT_BITS - 1);
        window.set_all();
        for &p in &base {
            if p * p > hi {
                break;
            }
            let first = (p * p).max(lo.div_ceil(p) * p);
            if first > hi {
                continue;
            }
            window.clear_steps(p, first - lo, hi - lo);
        }
        for i in window.iter_set_range(0, hi - lo) {
            out.push(lo + i);
        }
        lo = hi + 1;
    }
    out.set_ordered(true);
    Some(out)
}

/// Euler's linear sieve: every composite is cleared exactly once, by its
/// smallest prime factor.
pub fn soeu(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SoEu") {
        return None;
    }
    let mut composite = Bitmap::new(n + 1, false)?;
    let mut out = UintArray::with_capacity(prime_count_estimate(n))?;
    for i in 2..=n {
        if !composite.get(i) {
            out.push(i);
        }
        for idx in 0..out.len() {
            let p = out[idx];
            match i.checked_mul(p) {
                Some(v) if v <= n => composite.set(v),
                _ => break,
            }
            if i % p == 0 {
                break;
            }
        }
    }
    out.set_ordered(true);
    Some(out)
}

/// Sieve of Sundaram: index k stands for 2k+1; clearing k = i + j(2i+1)
/// leaves exactly the odd primes, with 2 prepended.
pub fn sos(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SoS") {
        return None;
    }
    let m = (n - 1) / 2;
    let mut bm = Bitmap::new(m + 1, true)?;
    let mut i = 1u64;
    while 2 * i * (i + 1) <= m {
        bm.clear_steps(2 * i + 1, 2 * i * (i + 1), m);
        i += 1;
    }
    let mut out = UintArray::with_capacity(prime_count_estimate(n))?;
    out.push(2);
    for k in bm.iter_set_range(1, m) {
        out.push(2 * k + 1);
    }
    out.set_ordered(true);
    Some(out)
}

/// Sieve of Atkin: quadratic-form solution counting modulo 12, then
/// square-multiple elimination.
pub fn soa(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SoA") {
        return None;
    }
    let mut bm = Bitmap::new(n + 1, false)?;
    let root = isqrt(n);

    let mut x = 1u64;
    while 4 * x * x <= n {
        let mut y = 1u64;
        loop {
            let v = 4 * x * x + y * y;
            if v > n {
                break;
            }
            if v % 12 == 1 || v % 12 == 5 {
                bm.flip(v);
            }
            y += 1;
        }
        x += 1;
    }

    let mut x = 1u64;
    while 3 * x * x <= n {
        let mut y = 1u64;
        loop {
            let v = 3 * x * x + y * y;
            if v > n {
                break;
            }
            if v % 12 == 7 {
                bm.flip(v);
            }
            y += 1;
        }
        x += 1;
    }

    for x in 2..=root {
        for y in 1..x {
            let v = 3 * x * x - y * y;
            if v <= n && v % 12 == 11 {
                bm.flip(v);
            }
        }
    }

    for r in 5..=root {
        if bm.get(r) {
            bm.clear_steps(r * r, r * r, n);
        }
    }

    let mut out = UintArray::with_capacity(prime_count_estimate(n))?;
    out.push(2);
    out.push(3);
    for p in bm.iter_set_range(5, n) {
        out.push(p);
    }
    out.set_ordered(true);
    Some(out)
}

/// Unguarded Eratosthenes used internally for base primes.
fn simple_soe(limit: u64) -> Option<Vec<u64>> {
    if limit < 2 {
        return Some(Vec::new());
    }
    let mut bm = Bitmap::new(limit + 1, true)?;
    bm.clear(0);
    bm.clear(1);
    for p in 2..=isqrt(limit) {
        if bm.get(p) {
            bm.clear_steps(p, p * p, limit);
        }
    }
    Some(bm.iter_set_range(2, limit).collect())
}

fn collect_bits(bm: &Bitmap, lo: u64, hi: u64) -> Option<UintArray<u64>> {
    let mut out = UintArray::with_capacity(prime_count_estimate(hi))?;
    for p in bm.iter_set_range(lo, hi) {
        out.push(p);
    }
    out.set_ordered(true);
    Some(out)
}
