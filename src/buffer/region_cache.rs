//! Region caches: remembered summaries of runs of buffer text.
//!
//! A cache holds runs `start..end` with a value computed over them (a
//! newline count, a display width). Before a change, the buffer tells the
//! cache how much text at each end is untouched; runs inside the untouched
//! head keep absolute positions, runs inside the untouched tail are
//! re-expressed as distances from the end so they stay valid however much
//! the middle grows or shrinks, and everything else is dropped.

/// Longest run computed in one go.
const RUN_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Positions are absolute.
    Beg,
    /// Positions are distances back from the end of the buffer.
    End,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    origin: Origin,
    start: usize,
    end: usize,
    value: usize,
}

impl Run {
    const fn absolute(&self, z: usize) -> (usize, usize) {
        match self.origin {
            Origin::Beg => (self.start, self.end),
            Origin::End => (z - self.start, z - self.end),
        }
    }
}

/// Known runs of one summary.
#[derive(Debug, Clone, Default)]
pub struct RegionCache {
    runs: Vec<Run>,
}

impl RegionCache {
    /// Number of known runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether nothing is known.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Forget everything outside the unchanged `head` chars after `beg` and
    /// the unchanged `tail` chars before `z`.
    pub fn invalidate(&mut self, beg: usize, z: usize, head: usize, tail: usize) {
        let head_end = beg + head;
        let tail_start = z - tail;
        self.runs.retain_mut(|run| {
            let (start, end) = run.absolute(z);
            if end <= head_end {
                *run = Run { origin: Origin::Beg, start, end, value: run.value };
                true
            } else if start >= tail_start {
                *run = Run { origin: Origin::End, start: z - start, end: z - end, value: run.value };
                true
            } else {
                false
            }
        });
    }

    /// The known run starting at `at`, as `(end, value)`.
    fn lookup(&self, z: usize, at: usize) -> Option<(usize, usize)> {
        self.runs.iter().find_map(|run| {
            let (start, end) = run.absolute(z);
            (start == at).then_some((end, run.value))
        })
    }

    /// The first known run start after `at`.
    fn next_start(&self, z: usize, at: usize) -> Option<usize> {
        self.runs.iter().map(|run| run.absolute(z).0).filter(|&s| s > at).min()
    }

    fn store(&mut self, start: usize, end: usize, value: usize) {
        self.runs.push(Run { origin: Origin::Beg, start, end, value });
    }
}

/// Sum a summary over `from..to`, reusing known runs and remembering the
/// runs it had to compute with `compute`.
pub fn summarize(
    cache: &mut RegionCache,
    z: usize,
    from: usize,
    to: usize,
    mut compute: impl FnMut(usize, usize) -> usize,
) -> usize {
    let mut total = 0;
    let mut at = from;
    while at < to {
        if let Some((end, value)) = cache.lookup(z, at).filter(|&(end, _)| end <= to) {
            total += value;
            at = end;
            continue;
        }
        let mut end = (at + RUN_LIMIT).min(to);
        if let Some(next) = cache.next_start(z, at) {
            end = end.min(next);
        }
        let value = compute(at, end);
        cache.store(at, end, value);
        total += value;
        at = end;
    }
    total
}
