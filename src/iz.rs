//! # iZ — Coordinate Mapping, Wheel Construction, Hit Solvers
//!
//! Everything above 3 that is coprime to 6 has the form 6x ± 1. The engine
//! stores the two residue lines as separate bitmaps indexed by x and does
//! all sieve work in that index space, so a "hit solver" answers the only
//! question marking ever asks: given a prime p and a segment position,
//! which is the first index to clear, and every p-th index after it is
//! also a hit.
//!
//! ## The marking identity
//!
//! Write p = 6·xp + ip with xp = (p+1)/6 and ip = ±1. Multiplying p by the
//! candidates 6k ± 1 shows that the composites of p on line m sit exactly
//! at the indices x ≡ xp' (mod p), where xp' = xp when ip = m and p − xp
//! otherwise. On the first segment the marking start is the closed form
//! xp·(p + m·ip), which begins at the first *composite* and never clears
//! p itself.
//!
//! ## Wheel (VX) templates
//!
//! A VX is a product of the small primes 5, 7, 11, ... The base template
//! for a VX is the pair of line bitmaps of length VX+1 in which every
//! index hit by a divisor of VX is pre-cleared; segment sieving starts
//! from a clone of the template instead of re-marking the smallest (and
//! most expensive) primes every segment.

use rug::Integer;

use crate::bitmap::Bitmap;
use crate::uint_array::UintArray;

/// Small primes available for wheel construction, in order. Products of a
/// prefix of this table are the only valid VX values.
pub const WHEEL_PRIMES: [u64; 14] = [5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];

/// Bit budget for one wheel line, sized to stay L2-resident: 2^21 bits
/// (256 KiB) per line.
pub const L2_CACHE_BITS: u64 = 1 << 21;

/// One of the two candidate lines: X5 holds 6x−1, X7 holds 6x+1.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Line {
    X5,
    X7,
}

impl Line {
    /// The additive offset of this line: −1 or +1.
    #[inline]
    pub fn offset(self) -> i64 {
        match self {
            Line::X5 => -1,
            Line::X7 => 1,
        }
    }

    /// Both lines in emission order (smaller value first at equal x).
    pub const BOTH: [Line; 2] = [Line::X5, Line::X7];
}

/// Map an index to its value: iZ(x, m) = 6x + m. Requires x ≥ 1.
#[inline]
pub fn iz(x: u64, line: Line) -> u64 {
    debug_assert!(x >= 1);
    match line {
        Line::X5 => 6 * x - 1,
        Line::X7 => 6 * x + 1,
    }
}

/// Arbitrary-precision variant of [`iz`].
pub fn iz_big(x: &Integer, line: Line) -> Integer {
    Integer::from(x * 6u32) + line.offset()
}

/// Decompose a prime p > 3 into its anchor (xp, ip) with p = 6·xp + ip.
#[inline]
pub fn anchor(p: u64) -> (u64, Line) {
    debug_assert!(p >= 5 && (p % 6 == 1 || p % 6 == 5), "anchor needs p coprime to 6");
    let line = if p % 6 == 1 { Line::X7 } else { Line::X5 };
    ((p + 1) / 6, line)
}

/// Residue of the composite class of p on `line`: xp' = xp if ip = m,
/// else p − xp. Every x ≡ xp' (mod p) on that line is divisible by p.
#[inline]
pub fn residue_on(line: Line, p: u64) -> u64 {
    let (xp, ip) = anchor(p);
    if ip == line {
        xp
    } else {
        p - xp
    }
}

/// First-segment marking start for p on `line`: the closed form
/// xp·(p + m·ip). This is the smallest multiple of p on the line that is
/// not p itself with a co-factor in iZ form; in a full sieve every smaller
/// composite has already been cleared by a smaller prime.
#[inline]
pub fn first_x0(line: Line, p: u64) -> u64 {
    let (xp, ip) = anchor(p);
    if ip == line {
        xp * (p + 1)
    } else {
        xp * (p - 1)
    }
}

/// First hit of p on `line` within segment y (width vx): the least
/// x0 ∈ [0, p) with x0 ≡ xp' − y·vx (mod p). Local index x0 + k·p of the
/// segment is then a hit for every k.
#[inline]
pub fn solve_x0(line: Line, p: u64, vx: u64, y: u64) -> u64 {
    let xpn = residue_on(line, p);
    let yv = ((y as u128 * vx as u128) % p as u128) as u64;
    (xpn + p - yv) % p
}

/// [`solve_x0`] for arbitrary-precision segment indices.
pub fn solve_x0_big(line: Line, p: u64, vx: u64, y: &Integer) -> u64 {
    solve_x0_from_yvx(line, p, &Integer::from(y * vx))
}

/// Solver core shared with the segment engine, which caches y·vx.
pub(crate) fn solve_x0_from_yvx(line: Line, p: u64, yvx: &Integer) -> u64 {
    debug_assert!(p < u32::MAX as u64);
    let xpn = residue_on(line, p);
    let yv = yvx.mod_u(p as u32) as u64;
    (xpn + p - yv) % p
}

/// Vertical solver: the least y0 ∈ [0, p) with x + vx·y0 ≡ xp' (mod p),
/// i.e. the first row of column x hit by p. `None` when gcd(vx, p) ≠ 1
/// (p divides the wheel, so the column is never hit — or always is).
pub fn solve_y0(line: Line, p: u64, vx: u64, x: u64) -> Option<u64> {
    if gcd(vx, p) != 1 {
        return None;
    }
    let xpn = residue_on(line, p);
    let inv = mod_inverse(vx % p, p)?;
    let diff = (xpn + p - x % p) % p;
    Some((diff as u128 * inv as u128 % p as u128) as u64)
}

/// Product of the first k wheel primes (5·7·…). Panics if the product
/// leaves u64; k must be in [1, WHEEL_PRIMES.len()].
pub fn wheel_k(k: usize) -> u64 {
    assert!(k >= 1 && k <= WHEEL_PRIMES.len());
    WHEEL_PRIMES[..k]
        .iter()
        .try_fold(1u64, |acc, &p| acc.checked_mul(p))
        .expect("wheel product overflows u64")
}

/// Number of wheel primes dividing a valid VX (a prefix product).
pub fn wheel_div_count(vx: u64) -> u32 {
    let mut k = 0;
    for &p in &WHEEL_PRIMES {
        if vx % p != 0 {
            break;
        }
        k += 1;
    }
    k
}

/// Cache-aware wheel choice: the largest prefix product w with
/// 35 ≤ w ≤ min(L2_CACHE_BITS, n/6). Never below 35, so tiny n simply
/// gets the minimal wheel.
pub fn l2_vx(n: u64) -> u64 {
    let cap = L2_CACHE_BITS.min(n / 6);
    grow_vx(cap)
}

/// Largest prefix product whose bit length is strictly below `bit_size`,
/// starting from the single-prime wheel 5. Unlike [`l2_vx`] there is no
/// floor: when not even 5 fits (`bit_size ≤ 3`) the result is 0.
pub fn max_vx(bit_size: u32) -> u64 {
    let cap = if bit_size == 0 {
        0
    } else if bit_size > 64 {
        u64::MAX
    } else {
        ((1u128 << (bit_size - 1)) - 1) as u64
    };
    let mut vx = 1u64;
    for &p in &WHEEL_PRIMES {
        match vx.checked_mul(p) {
            Some(next) if next <= cap => vx = next,
            _ => break,
        }
    }
    if vx >= 5 {
        vx
    } else {
        0
    }
}

fn grow_vx(cap: u64) -> u64 {
    let mut vx = 35u64;
    for &p in &WHEEL_PRIMES[2..] {
        match vx.checked_mul(p) {
            Some(next) if next <= cap => vx = next,
            _ => break,
        }
    }
    vx
}

/// Build the pre-sieved base template for a VX: both lines all ones,
/// index 0 cleared, then for every wheel prime p | vx the whole composite
/// class of p cleared on both lines. Length is vx+1 so a segment window
/// [1, vx] has its right edge (the x ≡ 0 class, never hit by a wheel
/// prime) in bounds.
pub fn build_vx_base(vx: u64) -> Option<(Bitmap, Bitmap)> {
    let mut x5 = Bitmap::new(vx + 1, true)?;
    let mut x7 = Bitmap::new(vx + 1, true)?;
    x5.clear(0);
    x7.clear(0);
    for &p in &WHEEL_PRIMES {
        if vx % p != 0 {
            break;
        }
        x5.clear_steps(p, residue_on(Line::X5, p), vx);
        x7.clear_steps(p, residue_on(Line::X7, p), vx);
    }
    Some((x5, x7))
}

/// All primes up to `limit` (inclusive), ascending, via the full two-line
/// iZ sieve with 2 and 3 prepended. `None` on allocation failure.
pub fn root_primes(limit: u64) -> Option<UintArray<u64>> {
    let x_max = limit / 6 + 1;
    let mut x5 = Bitmap::new(x_max + 1, true)?;
    let mut x7 = Bitmap::new(x_max + 1, true)?;
    x5.clear(0);
    x7.clear(0);

    let sqrt_limit = isqrt(limit);
    for x in 1..=x_max {
        if x5.get(x) {
            let p = 6 * x - 1;
            if p <= sqrt_limit {
                x5.clear_steps(p, first_x0(Line::X5, p), x_max);
                x7.clear_steps(p, first_x0(Line::X7, p), x_max);
            }
        }
        if x7.get(x) {
            let p = 6 * x + 1;
            if p <= sqrt_limit {
                x5.clear_steps(p, first_x0(Line::X5, p), x_max);
                x7.clear_steps(p, first_x0(Line::X7, p), x_max);
            }
        }
    }

    let estimate = if limit < 17 {
        8
    } else {
        (limit as f64 / (limit as f64).ln() * 1.2) as usize
    };
    let mut out = UintArray::with_capacity(estimate)?;
    if limit >= 2 {
        out.push(2);
    }
    if limit >= 3 {
        out.push(3);
    }
    for x in 1..=x_max {
        if x5.get(x) {
            let n = 6 * x - 1;
            if n <= limit {
                out.push(n);
            }
        }
        if x7.get(x) {
            let n = 6 * x + 1;
            if n <= limit {
                out.push(n);
            }
        }
    }
    out.set_ordered(true);
    Some(out)
}

/// Integer square root, exact for all u64.
pub(crate) fn isqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut r = (n as f64).sqrt() as u64;
    while r.checked_mul(r).map_or(true, |s| s > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).map_or(false, |s| s <= n) {
        r += 1;
    }
    r
}

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Modular exponentiation with u128 intermediates.
pub fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result = 1u64;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result as u128 * base as u128 % modulus as u128) as u64;
        }
        exp >>= 1;
        base = (base as u128 * base as u128 % modulus as u128) as u64;
    }
    result
}

/// Montgomery context for a fixed odd modulus: replaces the division in
/// repeated modular products with multiply-and-shift. Used by the modular
/// inverse, which the vertical solver calls once per (column, prime) pair.
pub(crate) struct Mont {
    n: u64,
    n_neg_inv: u64,
    one: u64,
    r2: u64,
}

impl Mont {
    pub(crate) fn new(n: u64) -> Self {
        debug_assert!(n > 1 && n & 1 == 1, "Montgomery needs an odd modulus > 1");
        // Hensel lifting of n^-1 mod 2^64: precision doubles per iteration.
        let mut inv = 1u64;
        for _ in 0..6 {
            inv = inv.wrapping_mul(2u64.wrapping_sub(n.wrapping_mul(inv)));
        }
        let one = ((1u128 << 64) % n as u128) as u64;
        let r2 = (one as u128 * one as u128 % n as u128) as u64;
        Mont {
            n,
            n_neg_inv: inv.wrapping_neg(),
            one,
            r2,
        }
    }

    #[inline]
    fn redc(&self, t: u128) -> u64 {
        let m = (t as u64).wrapping_mul(self.n_neg_inv);
        let u = (t + m as u128 * self.n as u128) >> 64;
        let u = u as u64;
        if u >= self.n {
            u - self.n
        } else {
            u
        }
    }

    #[inline]
    pub(crate) fn to_m(&self, a: u64) -> u64 {
        self.redc((a % self.n) as u128 * self.r2 as u128)
    }

    #[inline]
    pub(crate) fn from_m(&self, a: u64) -> u64 {
        self.redc(a as u128)
    }

    #[inline]
    pub(crate) fn mul(&self, a: u64, b: u64) -> u64 {
        self.redc(a as u128 * b as u128)
    }

    pub(crate) fn pow(&self, base_m: u64, mut exp: u64) -> u64 {
        let mut result = self.one;
        let mut b = base_m;
        while exp > 0 {
            if exp & 1 == 1 {
                result = self.mul(result, b);
            }
            exp >>= 1;
            if exp > 0 {
                b = self.mul(b, b);
            }
        }
        result
    }
}

/// Inverse of a modulo an odd prime p, via Fermat (a^(p−2)). `None` when
/// p divides a.
pub(crate) fn mod_inverse(a: u64, p: u64) -> Option<u64> {
    if a % p == 0 {
        return None;
    }
    if p == 2 {
        return Some(a % 2);
    }
    let m = Mont::new(p);
    Some(m.from_m(m.pow(m.to_m(a), p - 2)))
}
