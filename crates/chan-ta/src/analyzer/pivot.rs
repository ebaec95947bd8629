//! Pivot formation and the buy/sell points read off each pivot.
//!
//! A [`PivotEngine`] consumes a structure list (strokes or segments) each
//! time it changes. It either opens a new pivot on the last five points or
//! updates the open one: recomputing its bounds, extending it, checking the
//! exiting leg for divergence and deriving first, second and third-type
//! signals. Signals live in an arena owned by the engine and are referenced by
//! id from pivot slots and from the buy and sell lists, so an invalidation is
//! visible everywhere the signal appears.

use chan_core::Timestamp;

use super::divergence::{on_turn, AreaCache, Leg};
use super::trend::TrendTracker;
use crate::types::{
    Fractal, FractalKind, MoveClass, NestedEvidence, Pivot, PivotKind, Signal, SignalId,
    SignalSide, SignalType, Strength, TrendSegment,
};

/// Points needed before a pivot can form.
const MIN_POINTS: usize = 6;
/// Points that must follow a pivot's exit before another can open.
const REOPEN_GAP: usize = 4;

/// Outcome of a cross-frequency confirmation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmation {
    pub confirmed: bool,
    /// Pivots re-derived on each finer frequency that was consulted.
    pub evidence: Vec<NestedEvidence>,
}

impl Confirmation {
    /// Confirmed without consulting any finer frequency.
    pub fn immediate() -> Self {
        Self {
            confirmed: true,
            evidence: Vec::new(),
        }
    }
}

/// What a [`PivotEngine`] needs from the engine that owns it.
pub trait PivotContext {
    /// Timestamp of the newest raw bar, stamped on evaluations and invalidations.
    fn now(&self) -> Timestamp;

    /// Buy count of the resonance partner, when first-type buys must be held
    /// until the partner confirms one.
    fn resonance_partner(&self) -> Option<usize> {
        None
    }

    /// Confirm a divergence over `[start, end]` on finer frequencies.
    fn confirm_turn(&self, start: Timestamp, end: Timestamp, kind: PivotKind) -> Confirmation;

    /// Confirm that finer frequencies show structure over `[start, end]`.
    fn confirm_trend(&self, start: Timestamp, end: Timestamp, kind: PivotKind) -> Confirmation;
}

/// What one structure update did to the pivot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotUpdate {
    Idle,
    Formed(usize),
    Updated(usize),
}

/// A first-type buy waiting for the resonance partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResonanceHold {
    signal: SignalId,
    pivot: usize,
    partner_buys: usize,
    delay: usize,
}

#[derive(Debug, Clone)]
pub struct PivotEngine {
    label: String,
    third_type_lookback: usize,
    pivots: Vec<Pivot>,
    signals: Vec<Signal>,
    buys: Vec<SignalId>,
    sells: Vec<SignalId>,
    pending: Vec<SignalId>,
    trend: TrendTracker,
    hold: Option<ResonanceHold>,
}

impl PivotEngine {
    /// `label` prefixes log lines. `third_type_lookback` is how many points
    /// back the third-type re-reversal guard looks.
    pub fn new(label: impl Into<String>, third_type_lookback: usize) -> Self {
        Self {
            label: label.into(),
            third_type_lookback,
            pivots: Vec::new(),
            signals: Vec::new(),
            buys: Vec::new(),
            sells: Vec::new(),
            pending: Vec::new(),
            trend: TrendTracker::new(),
            hold: None,
        }
    }

    pub fn pivots(&self) -> &[Pivot] {
        &self.pivots
    }

    /// Every signal ever created, valid or not.
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn signal(&self, id: SignalId) -> Option<&Signal> {
        self.signals.get(id)
    }

    /// Ids of emitted buys, in emission order.
    pub fn buy_ids(&self) -> &[SignalId] {
        &self.buys
    }

    pub fn sell_ids(&self) -> &[SignalId] {
        &self.sells
    }

    pub fn buys(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.buys.iter().filter_map(|&id| self.signals.get(id))
    }

    pub fn sells(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.sells.iter().filter_map(|&id| self.signals.get(id))
    }

    pub fn trends(&self) -> &[TrendSegment] {
        self.trend.trends()
    }

    /// Whether a first-type buy is waiting for resonance.
    pub fn is_holding(&self) -> bool {
        self.hold.is_some()
    }

    /// Take the ids of signals emitted since the last call.
    pub fn drain_pending(&mut self) -> Vec<SignalId> {
        std::mem::take(&mut self.pending)
    }

    /// Process the structure list after it changed.
    ///
    /// `forced` admits a new pivot of that kind even when it overlaps the
    /// previous one. `areas` holds the histogram areas of the legs in `data`.
    pub fn on_point(
        &mut self,
        data: &[Fractal],
        forced: Option<PivotKind>,
        areas: &AreaCache,
        ctx: &dyn PivotContext,
    ) -> PivotUpdate {
        let n = data.len();
        if n < MIN_POINTS {
            return PivotUpdate::Idle;
        }
        let cur = data[n - 1];

        let mut admitted = None;
        let may_open = self
            .pivots
            .last()
            .map_or(true, |last| n > last.exit_index + REOPEN_GAP);
        if may_open {
            if let Some(candidate) = candidate(data) {
                let accept = match self.pivots.last() {
                    None => true,
                    Some(last) => {
                        (candidate.above(last) && cur.is_top())
                            || (candidate.below(last) && cur.is_bottom())
                            || forced == Some(candidate.kind)
                    }
                };
                if accept {
                    admitted = Some(candidate);
                }
            }
        }

        match admitted {
            Some(pivot) => PivotUpdate::Formed(self.open(pivot, data, areas, ctx)),
            None if !self.pivots.is_empty() => match self.update_open(data, areas, ctx) {
                Some(p) => PivotUpdate::Updated(p),
                None => PivotUpdate::Idle,
            },
            None => PivotUpdate::Idle,
        }
    }

    /// Advance a held first-type buy by one bar. `partner_buys` is the
    /// partner's current buy count. Returns the signal if it was released.
    pub fn tick_resonance(
        &mut self,
        partner_buys: usize,
        now: Timestamp,
        max_delay: usize,
    ) -> Option<SignalId> {
        let mut hold = self.hold.take()?;
        hold.delay += 1;
        let still_held = self.slot(hold.pivot, SignalType::B1) == Some(hold.signal);
        if hold.delay >= max_delay || !still_held {
            if still_held {
                self.set_slot(hold.pivot, SignalType::B1, None);
            }
            log::debug!(
                "[{}] resonance hold on B1 #{} discarded after {} bars",
                self.label,
                hold.signal,
                hold.delay
            );
            return None;
        }
        if partner_buys > hold.partner_buys {
            if let Some(signal) = self.signals.get_mut(hold.signal) {
                signal.valid = true;
                signal.evaluated_at = now;
            }
            log::debug!(
                "[{}] resonance released B1 #{} after {} bars",
                self.label,
                hold.signal,
                hold.delay
            );
            self.emit(hold.signal);
            return Some(hold.signal);
        }
        self.hold = Some(hold);
        None
    }

    fn open(
        &mut self,
        pivot: Pivot,
        data: &[Fractal],
        areas: &AreaCache,
        ctx: &dyn PivotContext,
    ) -> usize {
        let n = data.len();
        let (cur, last) = (data[n - 1], data[n - 2]);
        let (entry, exit) = (pivot.entry_index, pivot.exit_index);
        log::debug!(
            "[{}] {:?} pivot formed at {}: zd {} zg {}",
            self.label,
            pivot.kind,
            pivot.formed_at,
            pivot.zd,
            pivot.zg
        );
        self.pivots.push(pivot);
        let p = self.pivots.len() - 1;
        self.trend.process_pivot(&self.pivots[p], p);

        let legs: [Leg; 2] = [(data[entry - 1], data[entry]), (data[exit - 1], data[exit])];
        let diverged = on_turn(
            areas,
            data[entry].timestamp,
            data[exit].timestamp,
            &legs,
            self.pivots[p].kind,
        );
        if !diverged {
            return p;
        }
        let now = ctx.now();
        let Pivot { kind, gg, dd, .. } = self.pivots[p];
        match kind {
            PivotKind::Up if cur.high > gg => {
                self.note_divergence(p, last.timestamp, cur.timestamp);
                self.first_sell(p, last.timestamp, &cur, n - 1, ctx, now);
            }
            PivotKind::Down if cur.low < dd => {
                self.note_divergence(p, last.timestamp, cur.timestamp);
                self.first_buy(p, last.timestamp, &cur, n - 1, ctx, now);
            }
            _ => {}
        }
        p
    }

    fn update_open(
        &mut self,
        data: &[Fractal],
        areas: &AreaCache,
        ctx: &dyn PivotContext,
    ) -> Option<usize> {
        let n = data.len();
        while let Some(pivot) = self.pivots.last() {
            if n > pivot.entry_index {
                break;
            }
            log::debug!(
                "[{}] pivot entering at point {} no longer exists ({} points), dropped",
                self.label,
                pivot.entry_index,
                n
            );
            self.pivots.pop();
            if let Some(hold) = self.hold.filter(|hold| hold.pivot >= self.pivots.len()) {
                log::debug!(
                    "[{}] resonance hold on B1 #{} discarded with its pivot",
                    self.label,
                    hold.signal
                );
                self.hold = None;
            }
        }
        let p = self.pivots.len().checked_sub(1)?;
        let now = ctx.now();
        let s = self.pivots[p].entry_index;
        let (cur, last) = (data[n - 1], data[n - 2]);

        if n > s + 3 {
            let pivot = &mut self.pivots[p];
            let (lows, highs) = match pivot.kind {
                PivotKind::Up => ((data[s + 1], data[s + 3]), (data[s], data[s + 2])),
                PivotKind::Down => ((data[s], data[s + 2]), (data[s + 1], data[s + 3])),
            };
            pivot.zd = lows.0.low.max(lows.1.low);
            pivot.dd = lows.0.low.min(lows.1.low);
            pivot.zg = highs.0.high.min(highs.1.high);
            pivot.gg = highs.0.high.max(highs.1.high);
        }

        let mut legs: Vec<Leg> = Vec::with_capacity(2);
        if let Some(before) = s.checked_sub(1) {
            legs.push((data[before], data[s]));
        }
        legs.push((last, cur));
        let kind = self.pivots[p].kind;
        let diverged = on_turn(areas, data[s].timestamp, cur.timestamp, &legs, kind);

        match (kind, cur.kind) {
            (PivotKind::Up, FractalKind::Top) => self.up_pivot_top(p, data, diverged, ctx),
            (PivotKind::Up, FractalKind::Bottom) => self.up_pivot_bottom(p, data, ctx),
            (PivotKind::Down, FractalKind::Bottom) => self.down_pivot_bottom(p, data, diverged, ctx),
            (PivotKind::Down, FractalKind::Top) => self.down_pivot_top(p, data, ctx),
        }

        if p >= 1 {
            self.review_previous(p - 1, data, ctx);
        }
        if p >= 2 {
            let (older, prev, open) = (&self.pivots[p - 2], &self.pivots[p - 1], &self.pivots[p]);
            if older.below(prev) && prev.below(open) {
                self.drop_slot(p - 2, SignalType::S1, now);
                self.drop_slot(p - 2, SignalType::S2, now);
            }
        }

        let exit_time = self.pivots[p].exit_time;
        for kind in [SignalType::S3, SignalType::B3] {
            if self
                .signal_in(p, kind)
                .map_or(false, |signal| signal.timestamp < exit_time)
            {
                self.drop_slot(p, kind, now);
            }
        }
        self.rederive(p, data, ctx);
        Some(p)
    }

    fn up_pivot_top(&mut self, p: usize, data: &[Fractal], diverged: bool, ctx: &dyn PivotContext) {
        let n = data.len();
        let (cur, last) = (data[n - 1], data[n - 2]);
        let now = ctx.now();
        let Pivot { zd, gg, exit_index, exit_time, .. } = self.pivots[p];

        if let Some(s1) = self.signal_in(p, SignalType::S1) {
            if s1.price < cur.high && n.saturating_sub(exit_index) < 3 {
                self.drop_slot(p, SignalType::S1, now);
                self.drop_slot(p, SignalType::S2, now);
            }
        }

        if diverged && cur.high > gg {
            self.note_divergence(p, last.timestamp, cur.timestamp);
            if self.slot(p, SignalType::S1).is_none() {
                self.first_sell(p, last.timestamp, &cur, n - 1, ctx, now);
            }
        }

        if let (Some(s1), None) = (
            self.signal_in(p, SignalType::S1).cloned(),
            self.slot(p, SignalType::S2),
        ) {
            let pos = s1.anchor_index + 2;
            if n > pos && data[pos].is_top() {
                let follow_up = data[pos];
                if follow_up.high < s1.price {
                    let check = ctx.confirm_trend(last.timestamp, cur.timestamp, PivotKind::Up);
                    if check.confirmed {
                        let class = self.move_class();
                        let signal =
                            new_signal(SignalType::S2, &follow_up, pos, class, None, check.evidence, now);
                        let id = self.record(p, signal);
                        self.emit(id);
                    }
                } else {
                    self.drop_slot(p, SignalType::S1, now);
                }
            }
        }

        if cur.high < zd
            && self.slot(p, SignalType::S3).is_none()
            && self.slot(p, SignalType::B1).is_none()
        {
            let check = ctx.confirm_trend(last.timestamp, cur.timestamp, PivotKind::Up);
            if check.confirmed && !self.reversed(data, exit_time, |fx| fx.high < zd) {
                let class = self.move_class();
                let signal = new_signal(SignalType::S3, &cur, n - 1, class, None, check.evidence, now);
                let id = self.record(p, signal);
                self.emit(id);
            }
        }
    }

    fn up_pivot_bottom(&mut self, p: usize, data: &[Fractal], ctx: &dyn PivotContext) {
        let n = data.len();
        let (cur, last) = (data[n - 1], data[n - 2]);
        let Pivot { zd, zg, .. } = self.pivots[p];

        if !(cur.low > zg) && !(last.high < zd) {
            self.extend(p, &cur, n - 1);
        } else if cur.low > zg
            && self.slot(p, SignalType::B3).is_none()
            && self.slot(p, SignalType::S1).is_none()
        {
            self.third_buy(p, data, ctx);
        }
    }

    fn down_pivot_bottom(
        &mut self,
        p: usize,
        data: &[Fractal],
        diverged: bool,
        ctx: &dyn PivotContext,
    ) {
        let n = data.len();
        let (cur, last) = (data[n - 1], data[n - 2]);
        let now = ctx.now();
        let Pivot { zg, dd, exit_index, .. } = self.pivots[p];

        if let Some(b1) = self.signal_in(p, SignalType::B1) {
            if b1.price > cur.low && n.saturating_sub(exit_index) < 3 {
                self.drop_slot(p, SignalType::B1, now);
                self.drop_slot(p, SignalType::B2, now);
            }
        }

        if diverged && cur.low < dd {
            self.note_divergence(p, last.timestamp, cur.timestamp);
            if self.slot(p, SignalType::B1).is_none() {
                self.first_buy(p, last.timestamp, &cur, n - 1, ctx, now);
            }
        }

        if let (Some(b1), None) = (
            self.signal_in(p, SignalType::B1).filter(|b1| b1.valid).cloned(),
            self.slot(p, SignalType::B2),
        ) {
            let pos = b1.anchor_index + 2;
            if n > pos && data[pos].is_bottom() {
                let follow_up = data[pos];
                if follow_up.low > b1.price {
                    let check = ctx.confirm_trend(last.timestamp, cur.timestamp, PivotKind::Down);
                    if check.confirmed {
                        let class = self.move_class();
                        let strength = b2_strength(follow_up.low, &last, &self.pivots[p]);
                        let signal = new_signal(
                            SignalType::B2,
                            &follow_up,
                            pos,
                            class,
                            Some(strength),
                            check.evidence,
                            now,
                        );
                        let id = self.record(p, signal);
                        self.emit(id);
                    }
                } else {
                    self.drop_slot(p, SignalType::B1, now);
                }
            }
        }

        if cur.low > zg
            && self.slot(p, SignalType::B3).is_none()
            && self.slot(p, SignalType::S1).is_none()
        {
            self.third_buy(p, data, ctx);
        }
    }

    fn down_pivot_top(&mut self, p: usize, data: &[Fractal], ctx: &dyn PivotContext) {
        let n = data.len();
        let (cur, last) = (data[n - 1], data[n - 2]);
        let now = ctx.now();
        let Pivot { zd, zg, exit_time, .. } = self.pivots[p];

        if !(last.low > zg) && !(cur.high < zd) {
            self.extend(p, &cur, n - 1);
        } else if cur.high < zd
            && self.slot(p, SignalType::S3).is_none()
            && self.slot(p, SignalType::B1).is_none()
        {
            let check = ctx.confirm_trend(last.timestamp, cur.timestamp, PivotKind::Up);
            if check.confirmed && !self.reversed(data, exit_time, |fx| fx.high < zd) {
                let class = self.move_class();
                let signal = new_signal(SignalType::S3, &cur, n - 1, class, None, check.evidence, now);
                let id = self.record(p, signal);
                self.emit(id);
            }
        }
    }

    fn first_sell(
        &mut self,
        p: usize,
        start: Timestamp,
        point: &Fractal,
        anchor: usize,
        ctx: &dyn PivotContext,
        now: Timestamp,
    ) {
        let check = ctx.confirm_turn(start, point.timestamp, PivotKind::Up);
        if !check.confirmed {
            return;
        }
        let class = self.move_class();
        let signal = new_signal(SignalType::S1, point, anchor, class, None, check.evidence, now);
        let id = self.record(p, signal);
        self.emit(id);
    }

    /// Create a B1, held back while resonance is active.
    fn first_buy(
        &mut self,
        p: usize,
        start: Timestamp,
        point: &Fractal,
        anchor: usize,
        ctx: &dyn PivotContext,
        now: Timestamp,
    ) {
        let check = ctx.confirm_turn(start, point.timestamp, PivotKind::Down);
        if !check.confirmed {
            return;
        }
        let class = self.move_class();
        let mut signal = new_signal(SignalType::B1, point, anchor, class, None, check.evidence, now);
        match ctx.resonance_partner() {
            Some(partner_buys) => {
                signal.valid = false;
                let id = self.record(p, signal);
                self.hold_for_resonance(id, p, partner_buys);
            }
            None => {
                let id = self.record(p, signal);
                self.emit(id);
            }
        }
    }

    fn third_buy(&mut self, p: usize, data: &[Fractal], ctx: &dyn PivotContext) {
        let n = data.len();
        let (cur, last) = (data[n - 1], data[n - 2]);
        let now = ctx.now();
        let Pivot { zg, exit_time, .. } = self.pivots[p];

        let check = ctx.confirm_trend(last.timestamp, cur.timestamp, PivotKind::Down);
        if !check.confirmed || self.reversed(data, exit_time, |fx| fx.low > zg) {
            return;
        }
        let class = self.move_class();
        let strength = b3_strength(cur.low, &self.pivots[p]);
        let signal = new_signal(
            SignalType::B3,
            &cur,
            n - 1,
            class,
            Some(strength),
            check.evidence,
            now,
        );
        let id = self.record(p, signal);
        self.emit(id);
    }

    /// Whether the point `third_type_lookback` back already sat beyond the
    /// pivot after it was exited.
    fn reversed(&self, data: &[Fractal], exit_time: Timestamp, beyond: impl Fn(&Fractal) -> bool) -> bool {
        let n = data.len();
        let back = self.third_type_lookback;
        if back == 0 || n < back {
            return false;
        }
        let point = &data[n - back];
        beyond(point) && point.timestamp > exit_time
    }

    /// Second-type follow-ups and failures on the pivot before the open one.
    fn review_previous(&mut self, q: usize, data: &[Fractal], ctx: &dyn PivotContext) {
        let n = data.len();
        let now = ctx.now();

        if let (Some(s1), None) = (
            self.signal_in(q, SignalType::S1).cloned(),
            self.slot(q, SignalType::S2),
        ) {
            let pos = s1.anchor_index + 2;
            if n > pos && data[pos].is_top() {
                let follow_up = data[pos];
                if follow_up.high < s1.price {
                    let signal =
                        new_signal(SignalType::S2, &follow_up, pos, s1.move_class, None, Vec::new(), now);
                    let id = self.record(q, signal);
                    self.emit(id);
                } else {
                    self.drop_slot(q, SignalType::S1, now);
                }
            }
        }

        if let (Some(b1), None) = (
            self.signal_in(q, SignalType::B1).filter(|b1| b1.valid).cloned(),
            self.slot(q, SignalType::B2),
        ) {
            let pos = b1.anchor_index + 2;
            if n > pos && data[pos].is_bottom() {
                let follow_up = data[pos];
                if follow_up.low > b1.price {
                    let strength = b2_strength(follow_up.low, &data[pos - 1], &self.pivots[q]);
                    let signal = new_signal(
                        SignalType::B2,
                        &follow_up,
                        pos,
                        b1.move_class,
                        Some(strength),
                        Vec::new(),
                        now,
                    );
                    let id = self.record(q, signal);
                    self.emit(id);
                } else {
                    self.drop_slot(q, SignalType::B1, now);
                }
            }
        }

        // A B2 fails once the top after it cannot clear the top before it.
        if let Some(anchor) = self.signal_in(q, SignalType::B2).map(|b2| b2.anchor_index) {
            if anchor >= 1
                && n > anchor + 2
                && data[anchor + 1].high < data[anchor - 1].high
                && self.slot(q, SignalType::B1).is_some()
            {
                self.drop_slot(q, SignalType::B1, now);
                self.drop_slot(q, SignalType::B2, now);
            }
        }

        self.rederive(q, data, ctx);
    }

    /// Re-derive every signal on pivot `p` whose anchor now holds a
    /// different point.
    fn rederive(&mut self, p: usize, data: &[Fractal], ctx: &dyn PivotContext) {
        let n = data.len();
        let now = ctx.now();
        let drifted = |signal: &Signal| {
            n > signal.anchor_index && data[signal.anchor_index].timestamp != signal.timestamp
        };

        for kind in [SignalType::B1, SignalType::S1] {
            if kind == SignalType::B1 && ctx.resonance_partner().is_some() {
                continue;
            }
            let Some((id, old)) = self.slotted(p, kind) else {
                continue;
            };
            if !drifted(&old) {
                continue;
            }
            self.invalidate(id, now);
            let point = data[old.anchor_index];
            let signal = new_signal(kind, &point, old.anchor_index, old.move_class, None, Vec::new(), now);
            self.rederived(p, signal);
        }

        if let Some((id, old)) = self.slotted(p, SignalType::B2) {
            if drifted(&old) {
                self.invalidate(id, now);
                let point = data[old.anchor_index];
                if let Some((b1_id, b1)) = self.slotted(p, SignalType::B1) {
                    if point.low > b1.price {
                        let strength = b2_strength(point.low, &point, &self.pivots[p]);
                        let signal = new_signal(
                            SignalType::B2,
                            &point,
                            old.anchor_index,
                            old.move_class,
                            Some(strength),
                            Vec::new(),
                            now,
                        );
                        self.rederived(p, signal);
                    } else {
                        self.invalidate(b1_id, now);
                    }
                }
            }
        }

        if let Some((id, old)) = self.slotted(p, SignalType::S2) {
            if drifted(&old) {
                self.invalidate(id, now);
                let point = data[old.anchor_index];
                if let Some((s1_id, s1)) = self.slotted(p, SignalType::S1) {
                    if point.high < s1.price {
                        let signal = new_signal(
                            SignalType::S2,
                            &point,
                            old.anchor_index,
                            old.move_class,
                            None,
                            Vec::new(),
                            now,
                        );
                        self.rederived(p, signal);
                    } else {
                        self.invalidate(s1_id, now);
                    }
                }
            }
        }

        let Pivot { zd, zg, exit_time, .. } = self.pivots[p];
        for kind in [SignalType::B3, SignalType::S3] {
            let Some((id, old)) = self.slotted(p, kind) else {
                continue;
            };
            if !drifted(&old) || old.timestamp <= exit_time {
                continue;
            }
            self.invalidate(id, now);
            let point = data[old.anchor_index];
            let (outside, strength) = match kind {
                SignalType::B3 => (point.low > zg, Some(b3_strength(point.low, &self.pivots[p]))),
                _ => (point.high < zd, None),
            };
            if outside {
                let signal = new_signal(kind, &point, old.anchor_index, old.move_class, strength, Vec::new(), now);
                self.rederived(p, signal);
            }
        }
    }

    fn rederived(&mut self, p: usize, signal: Signal) {
        log::debug!(
            "[{}] {} re-derived at {} price {}",
            self.label,
            signal.kind,
            signal.timestamp,
            signal.price
        );
        let id = self.record(p, signal);
        self.emit(id);
    }

    fn extend(&mut self, p: usize, point: &Fractal, index: usize) {
        let pivot = &mut self.pivots[p];
        pivot.exit_time = point.timestamp;
        pivot.exit_index = index;
        log::trace!("[{}] pivot {} extended to {}", self.label, p, point.timestamp);
    }

    fn note_divergence(&mut self, p: usize, start: Timestamp, end: Timestamp) {
        self.pivots[p].divergences.push((start, end));
        self.trend.record_divergence(p, end);
    }

    fn move_class(&self) -> MoveClass {
        match self.pivots.as_slice() {
            [.., prev, last] if prev.kind == last.kind => MoveClass::Trend,
            _ => MoveClass::Consolidation,
        }
    }

    fn hold_for_resonance(&mut self, id: SignalId, p: usize, partner_buys: usize) {
        if let Some(previous) = self.hold.take() {
            if self.slot(previous.pivot, SignalType::B1) == Some(previous.signal) {
                self.set_slot(previous.pivot, SignalType::B1, None);
            }
            log::debug!(
                "[{}] resonance hold on B1 #{} replaced",
                self.label,
                previous.signal
            );
        }
        log::debug!("[{}] B1 #{} held for resonance", self.label, id);
        self.hold = Some(ResonanceHold {
            signal: id,
            pivot: p,
            partner_buys,
            delay: 0,
        });
    }

    fn slot(&self, p: usize, kind: SignalType) -> Option<SignalId> {
        self.pivots
            .get(p)
            .and_then(|pivot| pivot.slots(kind.side())[kind.slot()])
    }

    fn set_slot(&mut self, p: usize, kind: SignalType, id: Option<SignalId>) {
        if let Some(pivot) = self.pivots.get_mut(p) {
            pivot.slots_mut(kind.side())[kind.slot()] = id;
        }
    }

    fn signal_in(&self, p: usize, kind: SignalType) -> Option<&Signal> {
        self.slot(p, kind).and_then(|id| self.signals.get(id))
    }

    fn slotted(&self, p: usize, kind: SignalType) -> Option<(SignalId, Signal)> {
        let id = self.slot(p, kind)?;
        self.signals.get(id).map(|signal| (id, signal.clone()))
    }

    fn record(&mut self, p: usize, signal: Signal) -> SignalId {
        let id = self.signals.len();
        let kind = signal.kind;
        self.signals.push(signal);
        self.set_slot(p, kind, Some(id));
        id
    }

    fn emit(&mut self, id: SignalId) {
        let Some(signal) = self.signals.get(id) else {
            return;
        };
        log::debug!(
            "[{}] {} at {} price {}",
            self.label,
            signal.kind,
            signal.timestamp,
            signal.price
        );
        match signal.side() {
            SignalSide::Buy => self.buys.push(id),
            SignalSide::Sell => self.sells.push(id),
        }
        self.pending.push(id);
    }

    fn invalidate(&mut self, id: SignalId, now: Timestamp) {
        if let Some(signal) = self.signals.get_mut(id) {
            if signal.valid {
                log::debug!(
                    "[{}] {} at {} invalidated",
                    self.label,
                    signal.kind,
                    signal.timestamp
                );
            }
            signal.invalidate(now);
        }
    }

    /// Invalidate the signal in a slot and empty the slot.
    fn drop_slot(&mut self, p: usize, kind: SignalType, now: Timestamp) {
        if let Some(id) = self.slot(p, kind) {
            self.invalidate(id, now);
            self.set_slot(p, kind, None);
        }
    }
}

/// A pivot on the last five points, if they overlap.
fn candidate(data: &[Fractal]) -> Option<Pivot> {
    let n = data.len();
    let cur = data[n - 1];
    let at = |back: usize| data[n - back];

    let (kind, lows, highs) = match cur.kind {
        FractalKind::Bottom if at(2).high > at(5).low => {
            (PivotKind::Down, (at(3), at(5)), (at(2), at(4)))
        }
        FractalKind::Top if at(2).low < at(5).high => (PivotKind::Up, (at(2), at(4)), (at(3), at(5))),
        _ => return None,
    };
    let zd = lows.0.low.max(lows.1.low);
    let zg = highs.0.high.min(highs.1.high);
    if zg <= zd {
        return None;
    }
    Some(Pivot {
        kind,
        entry_time: at(5).timestamp,
        exit_time: at(2).timestamp,
        zd,
        zg,
        gg: highs.0.high.max(highs.1.high),
        dd: lows.0.low.min(lows.1.low),
        entry_index: n - 5,
        exit_index: n - 2,
        formed_at: cur.timestamp,
        buy: [None; 3],
        sell: [None; 3],
        divergences: Vec::new(),
    })
}

fn new_signal(
    kind: SignalType,
    point: &Fractal,
    anchor: usize,
    move_class: MoveClass,
    strength: Option<Strength>,
    nested: Vec<NestedEvidence>,
    now: Timestamp,
) -> Signal {
    let price = match kind.side() {
        SignalSide::Buy => point.low,
        SignalSide::Sell => point.high,
    };
    Signal {
        timestamp: point.timestamp,
        price,
        kind,
        evaluated_at: now,
        anchor_index: anchor,
        valid: true,
        invalidated_at: None,
        move_class,
        strength,
        nested,
    }
}

fn b3_strength(price: f32, pivot: &Pivot) -> Strength {
    if price > pivot.gg {
        Strength::Strong
    } else {
        Strength::Weak
    }
}

/// `top` is the point the pullback to the B2 started from.
fn b2_strength(price: f32, top: &Fractal, pivot: &Pivot) -> Strength {
    if price > pivot.zg {
        Strength::SuperStrong
    } else if top.high > pivot.zg {
        Strength::Strong
    } else if top.high > pivot.zd {
        Strength::Medium
    } else {
        Strength::Weak
    }
}
