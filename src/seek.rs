//! # Seek — Sequential and Random Probable Primes
//!
//! Probable-prime search anchored in the iZ lattice: the sequential walk
//! ([`iz_next_prime`]) visits 6x±1 candidates outward from an arbitrary
//! base, and the random generators draw bit-sized candidates and filter
//! them through the wheel before spending Miller-Rabin rounds. Every
//! candidate goes through the same funnel: wheel residue check, trial
//! division by the small-prime table, then the configurable-round oracle.
//!
//! Multi-core search races `cores` rayon workers on independent random
//! streams; the first hit raises a stop flag and wins.

use rand::Rng;
use rayon::prelude::*;
use rug::integer::IsPrime;
use rug::Integer;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

use crate::iz::{self, Line};
use crate::{clamp_mr_rounds, detected_cores, has_small_factor};

/// Probable-primality after the small-factor pre-filter.
fn is_probable(v: &Integer, mr: u32) -> bool {
    if has_small_factor(v) {
        return false;
    }
    v.is_probably_prime(mr) != IsPrime::No
}

/// The nearest probable prime strictly beyond `base`: the next one upward
/// when `forward`, the next one downward otherwise. Backward search below
/// the smallest prime returns `None`.
pub fn iz_next_prime(base: &Integer, forward: bool, mr_rounds: u32) -> Option<Integer> {
    let mr = clamp_mr_rounds(mr_rounds);
    if forward {
        if *base < 2 {
            return Some(Integer::from(2u32));
        }
        if *base < 3 {
            return Some(Integer::from(3u32));
        }
        if *base < 5 {
            return Some(Integer::from(5u32));
        }
        let mut x = Integer::from(base / 6u32);
        loop {
            if x >= 1 {
                for line in Line::BOTH {
                    let v = iz::iz_big(&x, line);
                    if v > *base && is_probable(&v, mr) {
                        return Some(v);
                    }
                }
            }
            x += 1;
        }
    } else {
        if *base <= 2 {
            return None;
        }
        if *base <= 3 {
            return Some(Integer::from(2u32));
        }
        if *base <= 5 {
            return Some(Integer::from(3u32));
        }
        if *base <= 7 {
            return Some(Integer::from(5u32));
        }
        let mut x = Integer::from(base / 6u32) + 1u32;
        while x >= 1 {
            for line in [Line::X7, Line::X5] {
                let v = iz::iz_big(&x, line);
                if v < *base && is_probable(&v, mr) {
                    return Some(v);
                }
            }
            x -= 1;
        }
        // 6x±1 exhausted down to 5; only 3 and 2 remain and were handled.
        Some(Integer::from(5u32))
    }
}

/// Exactly `bits` random bits with the top bit forced.
fn random_bits(rng: &mut impl Rng, bits: u32) -> Integer {
    let words = bits.div_ceil(32) as usize;
    let mut limbs = vec![0u32; words];
    for limb in limbs.iter_mut() {
        *limb = rng.gen();
    }
    let mut v = Integer::from_digits(&limbs, rug::integer::Order::Lsf);
    v >>= words as u32 * 32 - bits;
    v.set_bit(bits - 1, true);
    v
}

/// Uniform pick among the primes of a tiny bit size (below the wheel).
fn tiny_random_prime(rng: &mut impl Rng, bit_size: u32, mr: u32) -> Integer {
    if bit_size == 2 {
        return Integer::from(if rng.gen_bool(0.5) { 2u32 } else { 3u32 });
    }
    loop {
        let lo = 1u64 << (bit_size - 1);
        let hi = (1u64 << bit_size) - 1;
        let c = rng.gen_range(lo..=hi) | 1;
        let v = Integer::from(c);
        if is_probable(&v, mr) {
            return v;
        }
    }
}

/// Random probable prime of exactly `bit_size` bits, drawn by snapping
/// random values onto the iZ lines and filtering the x-residue through
/// the wheel base. `cores` workers race; `None` only for `bit_size < 2`.
pub fn vx_random_prime(bit_size: u32, mr_rounds: u32, cores: usize) -> Option<Integer> {
    let mr = clamp_mr_rounds(mr_rounds);
    if bit_size < 2 {
        error!(bit_size, "random prime needs at least 2 bits");
        return None;
    }
    if bit_size <= 6 {
        // Below the wheel primes themselves; sample directly.
        return Some(tiny_random_prime(&mut rand::thread_rng(), bit_size, mr));
    }

    let vx = iz::max_vx(bit_size.min(22));
    let (base_x5, base_x7) = iz::build_vx_base(vx)?;
    let workers = cores.clamp(1, detected_cores());
    let stop = AtomicBool::new(false);
    debug!(bit_size, vx, workers, "vx random prime search");

    (0..workers).into_par_iter().find_map_any(|_| {
        let mut rng = rand::thread_rng();
        loop {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            let r = random_bits(&mut rng, bit_size);
            let x = Integer::from(&r / 6u32);
            if x < 1 {
                continue;
            }
            let line = if rng.gen_bool(0.5) { Line::X5 } else { Line::X7 };
            let v = iz::iz_big(&x, line);
            if v.significant_bits() != bit_size {
                continue;
            }
            // Wheel filter: the x-residue class must survive the base.
            // Residue 0 lives at template index vx (index 0 is the
            // artificial non-candidate slot).
            let xm = x.mod_u(vx as u32) as u64;
            let idx = if xm == 0 { vx } else { xm };
            let alive = match line {
                Line::X5 => base_x5.get(idx),
                Line::X7 => base_x7.get(idx),
            };
            if !alive || has_small_factor(&v) {
                continue;
            }
            if v.is_probably_prime(mr) != IsPrime::No {
                stop.store(true, Ordering::Relaxed);
                return Some(v);
            }
        }
    })
}

/// Random probable prime of exactly `bit_size` bits, drawn column-first:
/// a random wheel-coprime column x, then random rows y rejected through
/// the y-solver congruence for the small root primes before the oracle
/// runs. `cores` workers race; `None` only for `bit_size < 2`.
pub fn vy_random_prime(bit_size: u32, mr_rounds: u32, cores: usize) -> Option<Integer> {
    let mr = clamp_mr_rounds(mr_rounds);
    if bit_size < 2 {
        error!(bit_size, "random prime needs at least 2 bits");
        return None;
    }
    if bit_size <= 6 {
        return Some(tiny_random_prime(&mut rand::thread_rng(), bit_size, mr));
    }

    let vx = iz::max_vx(bit_size.min(22));
    let (base_x5, base_x7) = iz::build_vx_base(vx)?;
    let sieve_primes = iz::root_primes(1000)?;
    let k_vx = iz::wheel_div_count(vx) as usize;
    let reject_primes = &sieve_primes.as_slice()[2 + k_vx..];
    let workers = cores.clamp(1, detected_cores());
    let stop = AtomicBool::new(false);
    debug!(bit_size, vx, workers, "vy random prime search");

    (0..workers).into_par_iter().find_map_any(|_| {
        let mut rng = rand::thread_rng();
        'outer: loop {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            let line = if rng.gen_bool(0.5) { Line::X5 } else { Line::X7 };
            let x = rng.gen_range(1..=vx);
            let alive = match line {
                Line::X5 => base_x5.get(x),
                Line::X7 => base_x7.get(x),
            };
            if !alive {
                continue;
            }
            let y = Integer::from(&random_bits(&mut rng, bit_size) / (6 * vx));
            let v = iz::iz_big(&(Integer::from(&y * vx) + x), line);
            if v.significant_bits() != bit_size {
                continue;
            }
            for &p in reject_primes {
                if let Some(y0) = iz::solve_y0(line, p, vx, x) {
                    if y.mod_u(p as u32) as u64 == y0 && v != p {
                        continue 'outer; // p divides v
                    }
                }
            }
            if has_small_factor(&v) {
                continue;
            }
            if v.is_probably_prime(mr) != IsPrime::No {
                stop.store(true, Ordering::Relaxed);
                return Some(v);
            }
        }
    })
}
