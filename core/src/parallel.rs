//! Bounded worker pool for per-entity phases.
//!
//! RULE: output order equals input order. Items are split into contiguous
//! chunks, one scoped thread per chunk, and chunks are joined in order.
//! RULE: workers only read shared inputs. Each returns its own Vec.

use crate::error::{EngineError, EngineResult};
use std::{num::NonZeroUsize, thread, time::Instant};

/// Requested worker count, or one per available core.
pub fn worker_count(requested: Option<usize>) -> usize {
    requested
        .filter(|n| *n > 0)
        .unwrap_or_else(|| thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1))
}

pub fn check_deadline(deadline: Option<Instant>, phase: &'static str) -> EngineResult<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(EngineError::DeadlineExceeded { phase }),
        _ => Ok(()),
    }
}

/// Map `f` over `items` on up to `workers` threads. The deadline is checked
/// before every item; expiry aborts the whole map.
pub fn ordered_map<T, R, F>(
    items: &[T],
    workers: usize,
    deadline: Option<Instant>,
    phase: &'static str,
    f: F,
) -> EngineResult<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return check_deadline(deadline, phase).map(|_| Vec::new());
    }
    let workers = workers.clamp(1, items.len());
    if workers == 1 {
        return run_chunk(items, deadline, phase, &f);
    }

    let chunk_size = items.len().div_ceil(workers);
    let f = &f;
    let chunks: Vec<EngineResult<Vec<R>>> = thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || run_chunk(chunk, deadline, phase, f)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(_) => Err(EngineError::Other(anyhow::anyhow!("worker panicked during {phase}"))),
            })
            .collect()
    });

    let mut out = Vec::with_capacity(items.len());
    for chunk in chunks {
        out.extend(chunk?);
    }
    Ok(out)
}

fn run_chunk<T, R, F>(chunk: &[T], deadline: Option<Instant>, phase: &'static str, f: &F) -> EngineResult<Vec<R>>
where
    F: Fn(&T) -> R,
{
    let mut out = Vec::with_capacity(chunk.len());
    for item in chunk {
        check_deadline(deadline, phase)?;
        out.push(f(item));
    }
    Ok(out)
}
