//! # Segment — IZM Context and the Segmented iZ Sieve
//!
//! The engine walks the iZ index space in VX-sized segments. An [`IzmCtx`]
//! holds everything segments share and never mutate: the wheel width, the
//! pre-sieved base templates for both lines, and the root-prime table. A
//! [`VxSegment`] owns the mutable per-segment state: two bitmaps cloned
//! from the base, a window of local indices, and the op counters.
//!
//! Segment lifecycle: cloned from the base (Init), deterministically
//! marked with every root prime up to the segment's root limit (Marked),
//! optionally Miller-Rabin scrubbed when the root limit exceeds the wheel
//! (Cleaned), then counted, gap-collected or streamed (Collected) before
//! the bitmaps drop (Freed).
//!
//! Three public sieves live here:
//! - [`siz`]: the full (non-segmented) two-line sieve,
//! - [`sizm`]: horizontal segment traversal, ascending output,
//! - [`sizm_vy`]: vertical column traversal, unordered output.

use rug::integer::IsPrime;
use rug::Integer;
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::iz::{self, Line};
use crate::uint_array::UintArray;
use crate::{bounds_ok, prime_count_estimate};

/// Shared read-only sieve context for one wheel width. Cloning is a deep
/// copy; workers each get their own so nothing writable ever crosses a
/// worker boundary.
#[derive(Clone)]
pub struct IzmCtx {
    vx: u64,
    k_vx: u32,
    base_x5: Bitmap,
    base_x7: Bitmap,
    root_primes: UintArray<u64>,
}

impl IzmCtx {
    /// Build the context for a wheel width, which must be a prefix product
    /// of [`iz::WHEEL_PRIMES`]. `None` on allocation failure.
    pub fn new(vx: u64) -> Option<Self> {
        let k_vx = iz::wheel_div_count(vx);
        debug_assert!(
            k_vx >= 2 && iz::wheel_k(k_vx as usize) == vx,
            "vx must be a wheel prefix product"
        );
        let (base_x5, base_x7) = iz::build_vx_base(vx)?;
        let root_primes = iz::root_primes(vx)?;
        debug!(vx, k_vx, roots = root_primes.len(), "izm context ready");
        Some(IzmCtx {
            vx,
            k_vx,
            base_x5,
            base_x7,
            root_primes,
        })
    }

    /// Context with the cache-aware wheel for a numeric bound.
    pub fn for_bound(n: u64) -> Option<Self> {
        Self::new(iz::l2_vx(n))
    }

    #[inline]
    pub fn vx(&self) -> u64 {
        self.vx
    }

    #[inline]
    pub fn k_vx(&self) -> u32 {
        self.k_vx
    }

    /// Base template for a line.
    #[inline]
    pub fn base(&self, line: Line) -> &Bitmap {
        match line {
            Line::X5 => &self.base_x5,
            Line::X7 => &self.base_x7,
        }
    }

    /// All primes up to vx, ascending (2 and 3 included).
    pub fn root_primes(&self) -> &[u64] {
        self.root_primes.as_slice()
    }

    /// The wheel primes dividing vx, pre-sieved into the base.
    pub fn wheel_primes(&self) -> &[u64] {
        &self.root_primes.as_slice()[2..2 + self.k_vx as usize]
    }

    /// Root primes actually used for marking: above 3 and coprime to vx.
    pub fn marking_primes(&self) -> &[u64] {
        &self.root_primes.as_slice()[2 + self.k_vx as usize..]
    }
}

/// One y-indexed segment: mutable bitmaps plus bookkeeping. Owned by
/// exactly one worker while it sieves.
pub struct VxSegment {
    vx: u64,
    y: Integer,
    yvx: Integer,
    root_limit: Integer,
    is_large_limit: bool,
    mr_rounds: u32,
    start_x: u64,
    end_x: u64,
    x5: Bitmap,
    x7: Bitmap,
    p_count: u64,
    p_gaps: Option<UintArray<u32>>,
    bit_ops: u64,
    p_test_ops: u64,
}

impl VxSegment {
    /// Clone the base templates into a fresh segment at index `y`.
    /// `None` on allocation failure; nothing partial escapes.
    pub fn init(izm: &IzmCtx, y: Integer, mr_rounds: u32) -> Option<Self> {
        let vx = izm.vx();
        let yvx = Integer::from(&y * vx);
        let top = iz::iz_big(&Integer::from(&yvx + vx), Line::X7);
        let root_limit = top.sqrt();
        let is_large_limit = root_limit > vx;
        Some(VxSegment {
            vx,
            y,
            yvx,
            root_limit,
            is_large_limit,
            mr_rounds,
            start_x: 1,
            end_x: vx,
            x5: izm.base(Line::X5).clone(),
            x7: izm.base(Line::X7).clone(),
            p_count: 0,
            p_gaps: None,
            bit_ops: 0,
            p_test_ops: 0,
        })
    }

    /// Restrict the counted window to local indices `[start_x, end_x]`.
    pub fn set_window(&mut self, start_x: u64, end_x: u64) {
        debug_assert!(1 <= start_x && start_x <= end_x && end_x <= self.vx);
        self.start_x = start_x;
        self.end_x = end_x;
    }

    /// Deterministic composite marking with every applicable root prime.
    /// Segment 0 is sieved by the full-sieve path, not here.
    pub fn mark(&mut self, izm: &IzmCtx) {
        debug_assert!(self.y > 0u32, "segment 0 uses the full-sieve path");
        let small_limit = if self.is_large_limit {
            None
        } else {
            self.root_limit.to_u64()
        };
        for &p in izm.marking_primes() {
            if let Some(limit) = small_limit {
                if p > limit {
                    break;
                }
            }
            for line in Line::BOTH {
                let x0 = iz::solve_x0_from_yvx(line, p, &self.yvx);
                if x0 <= self.end_x {
                    self.bit_ops += (self.end_x - x0) / p + 1;
                }
                match line {
                    Line::X5 => self.x5.clear_steps(p, x0, self.end_x),
                    Line::X7 => self.x7.clear_steps(p, x0, self.end_x),
                }
            }
        }
    }

    /// Probabilistic scrub of survivors. Only runs when root primes up to
    /// vx cannot reach the segment's root limit; each surviving candidate
    /// is Miller-Rabin tested and composites are cleared.
    pub fn cleanup(&mut self) {
        if !self.is_large_limit {
            return;
        }
        self.p_test_ops += mr_sweep(
            &mut self.x5,
            &self.yvx,
            Line::X5,
            self.start_x,
            self.end_x,
            self.mr_rounds,
        );
        self.p_test_ops += mr_sweep(
            &mut self.x7,
            &self.yvx,
            Line::X7,
            self.start_x,
            self.end_x,
            self.mr_rounds,
        );
    }

    /// Count the surviving candidates in the window into `p_count`.
    pub fn tally(&mut self) -> u64 {
        self.p_count = self.x5.count_set_range(self.start_x, self.end_x)
            + self.x7.count_set_range(self.start_x, self.end_x);
        self.p_count
    }

    /// Gap-encode the survivors. Candidates are ordered by (x, line) and
    /// mapped to slots 2x (x5) and 2x+1 (x7); the array holds the first
    /// slot followed by slot deltas. Returns the candidate count, or
    /// `None` on allocation failure.
    pub fn collect_gaps(&mut self) -> Option<usize> {
        let mut gaps = UintArray::with_capacity(self.p_count.max(16) as usize)?;
        let mut prev: Option<u32> = None;
        for x in self.start_x..=self.end_x {
            for line in Line::BOTH {
                let hit = match line {
                    Line::X5 => self.x5.get(x),
                    Line::X7 => self.x7.get(x),
                };
                if !hit {
                    continue;
                }
                let slot = (2 * x + (line == Line::X7) as u64) as u32;
                match prev {
                    None => gaps.push(slot),
                    Some(p) => gaps.push(slot - p),
                }
                prev = Some(slot);
            }
        }
        let count = gaps.len();
        self.p_gaps = Some(gaps);
        Some(count)
    }

    /// The gap stream produced by [`VxSegment::collect_gaps`].
    pub fn gaps(&self) -> Option<&UintArray<u32>> {
        self.p_gaps.as_ref()
    }

    #[inline]
    pub fn y(&self) -> &Integer {
        &self.y
    }

    #[inline]
    pub fn yvx(&self) -> &Integer {
        &self.yvx
    }

    #[inline]
    pub fn is_large_limit(&self) -> bool {
        self.is_large_limit
    }

    #[inline]
    pub fn p_count(&self) -> u64 {
        self.p_count
    }

    #[inline]
    pub fn bit_ops(&self) -> u64 {
        self.bit_ops
    }

    #[inline]
    pub fn p_test_ops(&self) -> u64 {
        self.p_test_ops
    }

    #[inline]
    pub fn window(&self) -> (u64, u64) {
        (self.start_x, self.end_x)
    }
}

/// Decode a slot-gap stream back to (x, line) pairs in emission order.
pub fn decode_gaps(gaps: &UintArray<u32>) -> impl Iterator<Item = (u64, Line)> + '_ {
    let mut slot = 0u32;
    gaps.iter().enumerate().map(move |(i, &g)| {
        slot = if i == 0 { g } else { slot + g };
        let line = if slot & 1 == 0 { Line::X5 } else { Line::X7 };
        ((slot >> 1) as u64, line)
    })
}

/// Per-prime state for the vertical traversal: the composite residues of
/// both lines and the inverse of vx mod p, precomputed once.
struct ColumnSolver {
    p: u64,
    xpn5: u64,
    xpn7: u64,
    inv_vx: u64,
}

impl ColumnSolver {
    fn new(p: u64, vx: u64) -> Self {
        ColumnSolver {
            p,
            xpn5: iz::residue_on(Line::X5, p),
            xpn7: iz::residue_on(Line::X7, p),
            // Marking primes are coprime to the wheel, so the inverse
            // always exists.
            inv_vx: iz::mod_inverse(vx % p, p).expect("marking prime divides vx"),
        }
    }

    /// y0 = (xp' − x) · vx⁻¹ mod p, as in [`iz::solve_y0`].
    #[inline]
    fn solve(&self, line: Line, x: u64) -> u64 {
        let xpn = match line {
            Line::X5 => self.xpn5,
            Line::X7 => self.xpn7,
        };
        let diff = (xpn + self.p - x % self.p) % self.p;
        (diff as u128 * self.inv_vx as u128 % self.p as u128) as u64
    }
}

/// MR-test every set bit on one line of the window, clearing composites.
/// Returns the number of tests run.
fn mr_sweep(bm: &mut Bitmap, yvx: &Integer, line: Line, start: u64, end: u64, mr: u32) -> u64 {
    let mut tests = 0u64;
    let mut composites: Vec<u64> = Vec::new();
    for x in bm.iter_set_range(start, end) {
        tests += 1;
        let v = iz::iz_big(&Integer::from(yvx + x), line);
        if v.is_probably_prime(mr) == IsPrime::No {
            composites.push(x);
        }
    }
    for &x in &composites {
        bm.clear(x);
    }
    tests
}

/// Full (non-segmented) iZ sieve: all primes in [2, n], ascending.
pub fn siz(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SiZ") {
        return None;
    }
    iz::root_primes(n)
}

/// Horizontal segmented iZ sieve: all primes in [2, n], ascending.
/// Delegates to the full sieve below 10^4, where a single wheel segment
/// already covers the range.
pub fn sizm(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SiZm") {
        return None;
    }
    if n < 10_000 {
        return siz(n);
    }
    let izm = IzmCtx::for_bound(n)?;
    sizm_with(&izm, n)
}

/// Horizontal traversal over an existing context.
pub(crate) fn sizm_with(izm: &IzmCtx, n: u64) -> Option<UintArray<u64>> {
    let vx = izm.vx();
    let x_n = n / 6 + 1;
    let mut out = UintArray::with_capacity(prime_count_estimate(n))?;
    out.push(2);
    out.push(3);
    for &p in izm.wheel_primes() {
        out.push(p);
    }

    let mut y = 0u64;
    while y * vx < x_n {
        let base_x = y * vx;
        let end_x = vx.min(x_n - base_x);
        let mut x5 = izm.base(Line::X5).clone();
        let mut x7 = izm.base(Line::X7).clone();

        let root_limit = iz::isqrt(6 * (base_x + end_x) + 1);
        for &p in izm.marking_primes() {
            if p > root_limit {
                break;
            }
            for line in Line::BOTH {
                let x0 = if y == 0 {
                    iz::first_x0(line, p)
                } else {
                    iz::solve_x0(line, p, vx, y)
                };
                match line {
                    Line::X5 => x5.clear_steps(p, x0, end_x),
                    Line::X7 => x7.clear_steps(p, x0, end_x),
                }
            }
        }

        for x in 1..=end_x {
            if x5.get(x) {
                out.push(6 * (base_x + x) - 1);
            }
            if x7.get(x) {
                out.push(6 * (base_x + x) + 1);
            }
        }
        y += 1;
    }

    // The index bound x_n may reach past n by one candidate per line.
    while out.last().map_or(false, |v| v > n) {
        out.pop();
    }
    out.set_ordered(true);
    Some(out)
}

/// Vertical segmented iZ sieve: all primes below n, unordered.
///
/// Walks columns x = 1..=vx; a column is skipped wholesale when its line
/// value shares a factor with the wheel (the base bit is clear). Within a
/// kept column the y-solver turns each root prime into a stepped clear
/// over rows. Output order is column-major, so the `ordered` hint is left
/// cleared; note the row bound uses a strict `value < n` check, which
/// (unlike the horizontal variant) excludes n itself when n is prime.
pub fn sizm_vy(n: u64) -> Option<UintArray<u64>> {
    if !bounds_ok(n, "SiZm_vy") {
        return None;
    }
    if n < 10_000 {
        let mut out = siz(n)?;
        out.set_ordered(false);
        return Some(out);
    }
    let izm = IzmCtx::for_bound(n)?;
    let vx = izm.vx();
    let x_n = n / 6 + 1;
    let vy = x_n / vx + 1;

    let mut out = UintArray::with_capacity(prime_count_estimate(n))?;
    out.push(2);
    out.push(3);
    for &p in izm.wheel_primes() {
        out.push(p);
    }

    // The wheel width is fixed for the whole run, so the y-solver's
    // modular inverse of vx is hoisted out of the column loop: one entry
    // per marking prime, giving y0 in two multiplications per column.
    let root_limit = iz::isqrt(6 * (vy * vx + vx) + 1);
    let solvers: Vec<ColumnSolver> = izm
        .marking_primes()
        .iter()
        .take_while(|&&p| p <= root_limit)
        .map(|&p| ColumnSolver::new(p, vx))
        .collect();

    let mut rows = Bitmap::new(vy + 1, true)?;
    for x in 1..=vx {
        for line in Line::BOTH {
            if !izm.base(line).get(x) {
                continue;
            }
            rows.set_all();
            for s in &solvers {
                let y0 = s.solve(line, x);
                // Row 0 of this column may be p itself; start one
                // period down so the prime survives.
                let start = if y0 == 0 && iz::iz(x, line) == s.p {
                    s.p
                } else {
                    y0
                };
                rows.clear_steps(s.p, start, vy);
            }
            for y in rows.iter_set_range(0, vy) {
                let v = match line {
                    Line::X5 => 6 * (y * vx + x) - 1,
                    Line::X7 => 6 * (y * vx + x) + 1,
                };
                if v < n {
                    out.push(v);
                }
            }
        }
    }
    out.set_ordered(false);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rug::ops::Pow;

    #[test]
    fn izm_ctx_partitions_root_primes() {
        let izm = IzmCtx::new(385).unwrap();
        assert_eq!(izm.vx(), 385);
        assert_eq!(izm.k_vx(), 3);
        assert_eq!(izm.wheel_primes(), &[5, 7, 11]);
        assert_eq!(izm.marking_primes()[0], 13);
        assert_eq!(*izm.root_primes().last().unwrap(), 383);
    }

    #[test]
    fn izm_clone_is_independent() {
        let izm = IzmCtx::new(35).unwrap();
        let copy = izm.clone();
        assert_eq!(copy.base(Line::X5), izm.base(Line::X5));
        assert_eq!(copy.root_primes(), izm.root_primes());
    }

    #[test]
    fn siz_small_counts() {
        let p = siz(1000).unwrap();
        assert_eq!(p.len(), 168);
        assert_eq!(p.last(), Some(997));
        assert!(p.is_ordered());
        assert!(siz(10).is_none()); // below the API floor
        assert!(siz(0).is_none());
    }

    #[test]
    fn sizm_matches_full_sieve_across_segment_boundaries() {
        // 200k spans multiple 5005-wide segments.
        for n in [10_000u64, 50_000, 200_000] {
            let seg = sizm(n).unwrap();
            let full = siz(n).unwrap();
            assert_eq!(seg.as_slice(), full.as_slice(), "n={}", n);
            assert!(seg.is_ordered());
        }
    }

    #[test]
    fn sizm_million() {
        let p = sizm(1_000_000).unwrap();
        assert_eq!(p.len(), 78_498);
        assert_eq!(p.last(), Some(999_983));
    }

    #[test]
    fn sizm_trims_trailing_overshoot() {
        // 999_983 is prime; the index bound reaches past these n and the
        // tail must be trimmed back to the bound.
        for n in [999_982u64, 999_983, 999_984] {
            let p = sizm(n).unwrap();
            let expect_last = if n >= 999_983 { 999_983 } else { 999_979 };
            assert_eq!(p.last(), Some(expect_last), "n={}", n);
        }
    }

    #[test]
    fn sizm_vy_same_set_unordered() {
        let n = 300_000u64;
        let mut vy = sizm_vy(n).unwrap();
        assert!(!vy.is_ordered());
        vy.sort();
        let reference = sizm(n).unwrap();
        assert_eq!(vy.as_slice(), reference.as_slice());
    }

    #[test]
    fn vx_segment_window_count_matches_full_sieve() {
        // Count primes in (6·y·vx, 6·(y+1)·vx] windows via segments and
        // compare against a straight sieve count over the same value range.
        let izm = IzmCtx::new(385).unwrap();
        let vx = izm.vx();
        let full = siz(200_000).unwrap();
        for y in 1u64..10 {
            let mut seg = VxSegment::init(&izm, Integer::from(y), 25).unwrap();
            seg.mark(&izm);
            assert!(!seg.is_large_limit());
            let count = seg.tally();
            let lo = 6 * y * vx; // exclusive
            let hi = 6 * (y + 1) * vx + 1; // inclusive (covers iz(end_x, X7))
            let expected = full.iter().filter(|&&p| p > lo && p <= hi).count() as u64;
            assert_eq!(count, expected, "segment y={}", y);
        }
    }

    #[test]
    fn vx_segment_gap_stream_roundtrip() {
        let izm = IzmCtx::new(385).unwrap();
        let mut seg = VxSegment::init(&izm, Integer::from(3u32), 25).unwrap();
        seg.mark(&izm);
        seg.tally();
        let count = seg.collect_gaps().unwrap();
        assert_eq!(count as u64, seg.p_count());
        let decoded: Vec<(u64, Line)> = decode_gaps(seg.gaps().unwrap()).collect();
        assert_eq!(decoded.len(), count);
        // Every decoded candidate is a surviving bit; order is ascending.
        let mut prev_slot = 0u64;
        for &(x, line) in &decoded {
            let slot = 2 * x + (line == Line::X7) as u64;
            assert!(slot > prev_slot || prev_slot == 0);
            prev_slot = slot;
            assert!(izm_bit(&seg, x, line));
        }
    }

    fn izm_bit(seg: &VxSegment, x: u64, line: Line) -> bool {
        match line {
            Line::X5 => seg.x5.get(x),
            Line::X7 => seg.x7.get(x),
        }
    }

    #[test]
    fn large_limit_flag_flips_with_y() {
        // vx=35: floor(sqrt(6·(y+1)·35 + 1)) first exceeds 35 at y=6.
        let izm = IzmCtx::new(35).unwrap();
        let near = VxSegment::init(&izm, Integer::from(5u32), 25).unwrap();
        assert!(!near.is_large_limit());
        let at = VxSegment::init(&izm, Integer::from(6u32), 25).unwrap();
        assert!(at.is_large_limit());
        let izm_big = IzmCtx::new(1_616_615).unwrap();
        let low = VxSegment::init(&izm_big, Integer::from(1u32), 25).unwrap();
        assert!(!low.is_large_limit());
        let far = VxSegment::init(&izm_big, Integer::from(10u32).pow(30), 25).unwrap();
        assert!(far.is_large_limit());
    }

    #[test]
    fn cleanup_scrubs_composites_on_large_segments() {
        // vx=35 gives a tiny wheel whose root primes stop at 31, so the
        // y=10 window (values 2101..=2311) holds composites like
        // 41·53 = 2173 that marking cannot reach; the MR scrub must
        // leave exactly the primes.
        let izm = IzmCtx::new(35).unwrap();
        let y = 10u64;
        let mut seg = VxSegment::init(&izm, Integer::from(y), 25).unwrap();
        seg.mark(&izm);
        assert!(seg.is_large_limit());
        seg.cleanup();
        assert!(seg.p_test_ops() > 0);
        let count = seg.tally();
        let full = siz(3000).unwrap();
        let lo = 6 * y * 35;
        let hi = 6 * (y + 1) * 35 + 1;
        let expected = full.iter().filter(|&&p| p > lo && p <= hi).count() as u64;
        assert_eq!(count, expected);
    }
}
