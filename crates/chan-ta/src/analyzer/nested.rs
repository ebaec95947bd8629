//! Nested-interval confirmation on finer frequencies.
//!
//! A signal window `[start, end]` on one frequency is re-examined on each
//! finer frequency: the finer structure points inside the window (plus the
//! opposite-kind point just before it) are replayed through a fresh
//! [`PivotEngine`], and the pivots that come out are the evidence.

use chan_core::Timestamp;

use super::pivot::{Confirmation, PivotContext, PivotEngine};
use super::EngineView;
use crate::types::{Fractal, NestedEvidence, Pivot, PivotKind};

/// Context for the throwaway engines: no resonance, no further nesting.
struct ReplayContext {
    now: Timestamp,
}

impl PivotContext for ReplayContext {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn confirm_turn(&self, _: Timestamp, _: Timestamp, _: PivotKind) -> Confirmation {
        Confirmation::immediate()
    }

    fn confirm_trend(&self, _: Timestamp, _: Timestamp, _: PivotKind) -> Confirmation {
        Confirmation::immediate()
    }
}

/// Structure points within `[start, end]`, oldest first, led by the point
/// before `start` when it turns the opposite way to `kind`.
pub fn window(points: &[Fractal], start: Timestamp, end: Timestamp, kind: PivotKind) -> Vec<Fractal> {
    let mut selected = Vec::new();
    for point in points.iter().skip(1).rev() {
        if point.timestamp >= start {
            if point.timestamp <= end {
                selected.push(*point);
            }
            continue;
        }
        let leads = match kind {
            PivotKind::Up => point.is_bottom(),
            PivotKind::Down => point.is_top(),
        };
        if leads {
            selected.push(*point);
        }
        break;
    }
    selected.reverse();
    selected
}

/// Replay `points` through a fresh engine on `view`'s frequency.
pub fn sub_pivots<V: EngineView + ?Sized>(view: &V, points: &[Fractal], kind: PivotKind) -> Vec<Pivot> {
    let mut engine = PivotEngine::new(format!("{} nested", view.label()), view.third_type_lookback());
    let ctx = ReplayContext {
        now: view.last_candle_time().unwrap_or_default(),
    };
    let areas = view.structure_areas();
    for n in 1..=points.len() {
        engine.on_point(&points[..n], Some(kind), areas, &ctx);
    }
    engine.pivots().to_vec()
}

fn evidence<V: EngineView + ?Sized>(view: &V, pivots: &[Pivot]) -> NestedEvidence {
    NestedEvidence {
        frequency: view.frequency(),
        pivots: pivots.iter().map(Pivot::summary).collect(),
    }
}

/// Confirm a divergence by finding one on every finer frequency in turn,
/// each level narrowing the window to the diverging leg the previous found.
pub fn confirm_turn<V: EngineView>(
    finer: &[V],
    start: Timestamp,
    end: Timestamp,
    kind: PivotKind,
) -> Confirmation {
    let mut found = Vec::with_capacity(finer.len());
    let (mut start, mut end) = (start, end);
    for view in finer {
        let points = window(view.structure(), start, end, kind);
        let pivots = sub_pivots(view, &points, kind);
        found.push(evidence(view, &pivots));

        match pivots.last().and_then(|pivot| pivot.divergences.last()) {
            Some(&(leg_start, leg_end)) => {
                start = leg_start;
                end = leg_end;
            }
            None => {
                log::trace!(
                    "[{}] no divergence in {}..{}, turn rejected",
                    view.label(),
                    start,
                    end
                );
                return Confirmation {
                    confirmed: false,
                    evidence: found,
                };
            }
        }
    }
    Confirmation {
        confirmed: true,
        evidence: found,
    }
}

/// Confirm that some finer frequency shows at least one pivot in the window.
pub fn confirm_trend<V: EngineView>(
    finer: &[V],
    start: Timestamp,
    end: Timestamp,
    kind: PivotKind,
) -> Confirmation {
    if finer.is_empty() {
        return Confirmation::immediate();
    }
    let mut found = Vec::with_capacity(finer.len());
    for view in finer {
        let points = window(view.structure(), start, end, kind);
        let pivots = sub_pivots(view, &points, kind);
        found.push(evidence(view, &pivots));
        if !pivots.is_empty() {
            return Confirmation {
                confirmed: true,
                evidence: found,
            };
        }
    }
    Confirmation {
        confirmed: false,
        evidence: found,
    }
}
