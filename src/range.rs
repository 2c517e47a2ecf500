//! # Range — Interval Streaming and Counting Driver
//!
//! Maps a numeric interval [Zs, Ze] — Zs arbitrarily large, width below
//! 2^64 — onto iZ segments at the cache-aware wheel width and drives the
//! segmented engine across them. Two entry points:
//!
//! - [`siz_stream`]: sequential, writes every prime in the interval to a
//!   sink (file or stdout) in ascending order and returns the count;
//! - [`siz_count`]: count only, optionally fanning segments out across
//!   worker threads. Each worker owns a deep clone of the immutable
//!   context and reports exactly one u64 back over a channel; the driver
//!   sums scalars, applies endpoint corrections, and returns the total.
//!
//! Failure policy: both entry points return 0 after a structured log for
//! any failure — unparseable mapping, allocation failure, sink I/O error,
//! or a worker that dies before delivering its result. Every worker is
//! joined on every exit path; no errors unwind across this boundary.
//!
//! ## Boundary reconciliation
//!
//! Segment windows are index-aligned, the interval is value-aligned. The
//! driver first normalizes: the start index advances past x-positions
//! whose candidates both fall below Zs (Zs mod 6 ≥ 2), and the end index
//! advances to cover Ze itself when Ze mod 6 = 5. What remains is at most
//! one overhanging candidate per side — iZ(Xs, −1) below Zs and
//! iZ(Xe, +1) above Ze — which the counting path removes by decrementing
//! the sum when the overhang is (probably) prime, and the streaming path
//! removes exactly by comparison.

use rug::integer::IsPrime;
use rug::Integer;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, error, info};

use crate::iz::{self, Line};
use crate::segment::{decode_gaps, IzmCtx, VxSegment};
use crate::{clamp_mr_rounds, detected_cores};

/// Minimum interval width accepted by [`siz_count`].
pub const MIN_COUNT_RANGE: u64 = 100;

/// A parsed counting/streaming request. The interval is
/// [start, start + range − 1].
#[derive(Clone, Debug)]
pub struct InputRange {
    pub start: Integer,
    pub range: u64,
    pub mr_rounds: u32,
    pub filepath: Option<PathBuf>,
}

impl InputRange {
    pub fn new(start: Integer, range: u64, mr_rounds: u32, filepath: Option<PathBuf>) -> Self {
        InputRange {
            start,
            range,
            mr_rounds,
            filepath,
        }
    }
}

/// The literal interval-to-index mapping at wheel width vx.
#[derive(Clone, Debug)]
pub struct RangeInfo {
    pub vx: u64,
    pub zs: Integer,
    pub ze: Integer,
    pub xs: Integer,
    pub xe: Integer,
    pub ys: Integer,
    pub ye: Integer,
    /// ye − ys when it fits a signed 32-bit value; negative marks an
    /// invalid mapping.
    pub y_range: i32,
}

impl RangeInfo {
    pub fn new(vx: u64, zs: Integer, ze: Integer) -> Self {
        let xs = Integer::from(&zs / 6u32);
        let xe = Integer::from(&ze / 6u32);
        let ys = Integer::from(&xs / vx);
        let ye = Integer::from(&xe / vx);
        let y_range = if zs > ze {
            -1
        } else {
            Integer::from(&ye - &ys).to_i32().unwrap_or(-1)
        };
        RangeInfo {
            vx,
            zs,
            ze,
            xs,
            xe,
            ys,
            ye,
            y_range,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.y_range >= 0
    }
}

/// Normalized decomposition the driver actually walks.
struct Decomp {
    vx: u64,
    zs: Integer,
    ze: Integer,
    /// First and last counted global x (both ≥ 1; empty when last < first).
    x_first: Integer,
    x_last: Integer,
    /// Segment indices of x_first / x_last under the convention that
    /// segment y covers global x in (y·vx, (y+1)·vx].
    y_first: Integer,
    y_last: Integer,
}

impl Decomp {
    fn new(vx: u64, zs: Integer, ze: Integer) -> Self {
        let mut x_first = Integer::from(&zs / 6u32);
        if zs.mod_u(6) >= 2 {
            x_first += 1;
        }
        if x_first < 1 {
            x_first = Integer::from(1u32);
        }
        let mut x_last = Integer::from(&ze / 6u32);
        if ze.mod_u(6) == 5 {
            x_last += 1;
        }
        let y_first = seg_of(&x_first, vx);
        let y_last = if x_last < 1 {
            Integer::new()
        } else {
            seg_of(&x_last, vx)
        };
        Decomp {
            vx,
            zs,
            ze,
            x_first,
            x_last,
            y_first,
            y_last,
        }
    }

    fn is_empty(&self) -> bool {
        self.x_last < self.x_first
    }

    /// Local window of segment `y` (offset from the worker base).
    fn window_for(&self, y: &Integer) -> (u64, u64) {
        let start_x = if *y == self.y_first {
            local_of(&self.x_first, self.vx)
        } else {
            1
        };
        let end_x = if *y == self.y_last {
            local_of(&self.x_last, self.vx)
        } else {
            self.vx
        };
        (start_x, end_x)
    }
}

/// Segment index of a global x ≥ 1: (x − 1) / vx.
fn seg_of(x: &Integer, vx: u64) -> Integer {
    Integer::from(x - 1u32) / vx
}

/// Local index of a global x within its segment, in [1, vx].
fn local_of(x: &Integer, vx: u64) -> u64 {
    Integer::from(x - 1u32).mod_u(vx as u32) as u64 + 1
}

fn probably_prime(v: &Integer, mr: u32) -> bool {
    v.is_probably_prime(mr) != IsPrime::No
}

fn pick_vx(ze: &Integer) -> u64 {
    match ze.to_u64() {
        Some(z) => iz::l2_vx(z),
        None => iz::l2_vx(u64::MAX),
    }
}

/// Init, window, mark, scrub, tally — one segment start to finish.
fn sieve_segment(
    izm: &IzmCtx,
    y: Integer,
    start_x: u64,
    end_x: u64,
    mr: u32,
) -> Option<VxSegment> {
    let mut seg = VxSegment::init(izm, y, mr)?;
    seg.set_window(start_x, end_x);
    seg.mark(izm);
    seg.cleanup();
    seg.tally();
    Some(seg)
}

/// Sieve segment 0 through the full-sieve path (closed-form marking) and
/// feed every value in [zs, ze] — including 2, 3 and the wheel primes —
/// to `emit`, ascending. Returns the emitted count, `None` on allocation
/// failure.
fn segment_zero(
    izm: &IzmCtx,
    zs: &Integer,
    ze: &Integer,
    x_hi: u64,
    emit: &mut dyn FnMut(u64),
) -> Option<u64> {
    let zs_u = zs.to_u64().unwrap_or(u64::MAX);
    let ze_u = ze.to_u64().unwrap_or(u64::MAX);
    let mut count = 0u64;
    let mut push = |v: u64, count: &mut u64, emit: &mut dyn FnMut(u64)| {
        if v >= zs_u && v <= ze_u {
            *count += 1;
            emit(v);
        }
    };

    push(2, &mut count, emit);
    push(3, &mut count, emit);
    for &p in izm.wheel_primes() {
        push(p, &mut count, emit);
    }
    if x_hi == 0 {
        return Some(count);
    }

    let mut x5 = izm.base(Line::X5).clone();
    let mut x7 = izm.base(Line::X7).clone();
    let root_limit = iz::isqrt(6 * x_hi + 1);
    for &p in izm.marking_primes() {
        if p > root_limit {
            break;
        }
        x5.clear_steps(p, iz::first_x0(Line::X5, p), x_hi);
        x7.clear_steps(p, iz::first_x0(Line::X7, p), x_hi);
    }
    for x in 1..=x_hi {
        if x5.get(x) {
            push(6 * x - 1, &mut count, emit);
        }
        if x7.get(x) {
            push(6 * x + 1, &mut count, emit);
        }
    }
    Some(count)
}

/// Count all primes in the segments at offsets [lo_off, hi_off] (relative
/// to `base_y`). `None` signals a failed segment.
fn count_block(
    izm: &IzmCtx,
    d: &Decomp,
    base_y: &Integer,
    lo_off: u64,
    hi_off: u64,
    mr: u32,
) -> Option<u64> {
    let mut sum = 0u64;
    let mut off = lo_off;
    while off <= hi_off {
        let y = Integer::from(base_y + off);
        let (start_x, end_x) = d.window_for(&y);
        let seg = sieve_segment(izm, y, start_x, end_x, mr)?;
        debug!(
            y = %seg.y(),
            count = seg.p_count(),
            bit_ops = seg.bit_ops(),
            p_tests = seg.p_test_ops(),
            "segment counted"
        );
        sum += seg.p_count();
        off += 1;
    }
    Some(sum)
}

/// Count the primes in `[input.start, input.start + input.range − 1]`.
///
/// Requires `input.range > 100`. With `cores > 1` the worker segments are
/// split into that many contiguous blocks (clamped to the detected CPU
/// count and the segment count), one scoped thread per block, each with
/// its own deep-cloned context. Identical results at every core count;
/// any failure returns 0.
pub fn siz_count(input: &InputRange, cores: usize) -> u64 {
    if input.range <= MIN_COUNT_RANGE {
        error!(range = input.range, "count requires a range wider than 100");
        return 0;
    }
    if input.start.is_negative() {
        error!("count requires a non-negative interval start");
        return 0;
    }
    let mr = clamp_mr_rounds(input.mr_rounds);
    let zs = input.start.clone();
    let ze = Integer::from(&zs + input.range) - 1u32;
    let vx = pick_vx(&ze);

    let info = RangeInfo::new(vx, zs.clone(), ze.clone());
    if !info.is_valid() {
        error!(vx, zs = %info.zs, ze = %info.ze, "interval does not map to a valid segment range");
        return 0;
    }
    debug!(vx, ys = %info.ys, ye = %info.ye, y_range = info.y_range, "range mapped");

    let izm = match IzmCtx::new(vx) {
        Some(izm) => izm,
        None => return 0,
    };
    let d = Decomp::new(vx, zs, ze);
    let mut total = 0u64;

    // Segment 0 runs the full-sieve path with explicit value filtering.
    if d.y_first == 0 {
        let x_hi = if d.is_empty() {
            0
        } else if d.x_last >= vx {
            vx
        } else {
            d.x_last.to_u64().unwrap_or(0)
        };
        match segment_zero(&izm, &d.zs, &d.ze, x_hi, &mut |_| {}) {
            Some(c) => total += c,
            None => return 0,
        }
    }

    // Worker segments: everything past segment 0.
    let wy_first = if d.y_first == 0 {
        Integer::from(1u32)
    } else {
        d.y_first.clone()
    };
    if !d.is_empty() && d.y_last >= wy_first {
        let seg_total = Integer::from(&d.y_last - &wy_first).to_u64().unwrap() + 1;
        let workers = cores
            .clamp(1, detected_cores())
            .min(seg_total as usize)
            .max(1);
        info!(
            segments = seg_total,
            workers,
            vx,
            "dispatching worker segments"
        );

        if workers <= 1 {
            match count_block(&izm, &d, &wy_first, 0, seg_total - 1, mr) {
                Some(sum) => total += sum,
                None => {
                    error!("segment sieve failed; aborting count");
                    return 0;
                }
            }
        } else {
            let per = seg_total / workers as u64;
            let rem = seg_total % workers as u64;
            let (tx, rx) = mpsc::channel::<u64>();
            let mut delivered: Option<u64> = Some(0);
            std::thread::scope(|s| {
                for i in 0..workers as u64 {
                    let lo = i * per + i.min(rem);
                    let hi = lo + per + (i < rem) as u64 - 1;
                    let tx = tx.clone();
                    let izm_w = izm.clone();
                    let d_ref = &d;
                    let wy = &wy_first;
                    s.spawn(move || {
                        match count_block(&izm_w, d_ref, wy, lo, hi, mr) {
                            // A worker that fails drops its sender without
                            // reporting; the driver sees the short tally.
                            Some(sum) => {
                                let _ = tx.send(sum);
                            }
                            None => error!(block = i, "worker block failed"),
                        }
                    });
                }
                drop(tx);
                let mut got = 0usize;
                let mut sum = 0u64;
                while let Ok(v) = rx.recv() {
                    sum += v;
                    got += 1;
                }
                delivered = if got == workers { Some(sum) } else { None };
            });
            match delivered {
                Some(sum) => total += sum,
                None => {
                    error!("one or more workers failed to deliver a result");
                    return 0;
                }
            }
        }
    }

    // Endpoint corrections: overhanging candidates counted by unfiltered
    // worker windows.
    if !d.is_empty() {
        if d.y_first >= 1 {
            let v = iz::iz_big(&d.x_first, Line::X5);
            if v < d.zs && probably_prime(&v, mr) {
                total = total.saturating_sub(1);
            }
        }
        if d.y_last >= 1 {
            let v = iz::iz_big(&d.x_last, Line::X7);
            if v > d.ze && probably_prime(&v, mr) {
                total = total.saturating_sub(1);
            }
        }
    }

    info!(total, "count complete");
    total
}

/// Space-separated decimal sink with first/rest separator handling and
/// sticky error capture.
struct Sink {
    w: Box<dyn Write>,
    count: u64,
    err: Option<io::Error>,
}

impl Sink {
    fn emit<D: std::fmt::Display>(&mut self, v: D) {
        if self.err.is_some() {
            return;
        }
        let res = if self.count == 0 {
            write!(self.w, "{}", v)
        } else {
            write!(self.w, " {}", v)
        };
        match res {
            Ok(()) => self.count += 1,
            Err(e) => self.err = Some(e),
        }
    }

    fn finish(mut self) -> Result<u64, io::Error> {
        if let Some(e) = self.err.take() {
            return Err(e);
        }
        self.w.flush()?;
        Ok(self.count)
    }
}

fn open_sink(filepath: Option<&Path>) -> Result<Box<dyn Write>, io::Error> {
    match filepath {
        Some(p) if !p.as_os_str().is_empty() && p != Path::new("/dev/stdout") => {
            if let Some(parent) = p.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = fs::File::create(p)?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

/// Stream every prime in `[input.start, input.start + input.range − 1]`
/// to the configured sink (truncating file, or stdout), ascending,
/// space-separated. Returns the number streamed; 0 after a structured log
/// on any failure. The sink is closed on every path.
pub fn siz_stream(input: &InputRange) -> u64 {
    if input.start.is_negative() {
        error!("stream requires a non-negative interval start");
        return 0;
    }
    if input.range == 0 {
        error!("stream requires a non-empty range");
        return 0;
    }
    let mr = clamp_mr_rounds(input.mr_rounds);
    let zs = input.start.clone();
    let ze = Integer::from(&zs + input.range) - 1u32;
    let vx = pick_vx(&ze);

    let info = RangeInfo::new(vx, zs.clone(), ze.clone());
    if !info.is_valid() {
        error!(vx, zs = %info.zs, ze = %info.ze, "interval does not map to a valid segment range");
        return 0;
    }

    let izm = match IzmCtx::new(vx) {
        Some(izm) => izm,
        None => return 0,
    };
    let d = Decomp::new(vx, zs, ze);

    let w = match open_sink(input.filepath.as_deref()) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "cannot open stream sink");
            return 0;
        }
    };
    let mut sink = Sink {
        w,
        count: 0,
        err: None,
    };

    if d.y_first == 0 {
        let x_hi = if d.is_empty() {
            0
        } else if d.x_last >= vx {
            vx
        } else {
            d.x_last.to_u64().unwrap_or(0)
        };
        if segment_zero(&izm, &d.zs, &d.ze, x_hi, &mut |v| sink.emit(v)).is_none() {
            return 0;
        }
    }

    let wy_first = if d.y_first == 0 {
        Integer::from(1u32)
    } else {
        d.y_first.clone()
    };
    if !d.is_empty() && d.y_last >= wy_first {
        let seg_total = Integer::from(&d.y_last - &wy_first).to_u64().unwrap() + 1;
        for off in 0..seg_total {
            let y = Integer::from(&wy_first + off);
            let (start_x, end_x) = d.window_for(&y);
            let mut seg = match sieve_segment(&izm, y, start_x, end_x, mr) {
                Some(seg) => seg,
                None => {
                    error!("segment sieve failed; aborting stream");
                    return 0;
                }
            };
            if seg.collect_gaps().is_none() {
                return 0;
            }
            let first_seg = *seg.y() == d.y_first;
            let last_seg = *seg.y() == d.y_last;
            let gaps = seg.gaps().expect("gaps just collected");
            for (x, line) in decode_gaps(gaps) {
                let v = iz::iz_big(&Integer::from(seg.yvx() + x), line);
                // Overhanging boundary candidates are filtered exactly.
                if first_seg && v < d.zs {
                    continue;
                }
                if last_seg && v > d.ze {
                    continue;
                }
                sink.emit(v);
            }
            debug!(y = %seg.y(), count = seg.p_count(), "segment streamed");
        }
    }

    match sink.finish() {
        Ok(count) => {
            info!(count, "stream complete");
            count
        }
        Err(e) => {
            error!(error = %e, "stream sink write failed");
            0
        }
    }
}
