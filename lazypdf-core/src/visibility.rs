//! Decides which pages are near enough to the viewport to be worth rendering.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::surface::Surface;

/// Polling replacement for an intersection observer.
///
/// [`observe`](Self::observe) reports pages that entered the prefetch band since the
/// previous call. [`sweep`](Self::sweep) reports every page near the viewport, regardless
/// of history.
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    prefetch_ratio: f32,
    sweep_margin: f32,
    intersecting: BTreeSet<usize>,
}

impl VisibilityTracker {
    pub fn new(prefetch_ratio: f32, sweep_margin: f32) -> Self {
        Self {
            prefetch_ratio: prefetch_ratio.max(0.0),
            sweep_margin: sweep_margin.max(0.0),
            intersecting: BTreeSet::new(),
        }
    }

    /// Forgets previous observations, e.g. after a new document was opened.
    pub fn reset(&mut self) {
        self.intersecting.clear();
    }

    pub fn observe<S: Surface + ?Sized>(&mut self, surface: &S) -> Vec<usize> {
        let margin = self.prefetch_ratio * surface.viewport().height;
        let now = pages_in_band(surface, margin);
        let entered = now.difference(&self.intersecting).copied().collect();
        self.intersecting = now;
        entered
    }

    pub fn sweep<S: Surface + ?Sized>(&self, surface: &S) -> Vec<usize> {
        pages_in_band(surface, self.sweep_margin)
            .into_iter()
            .collect()
    }
}

fn pages_in_band<S: Surface + ?Sized>(surface: &S, margin: f32) -> BTreeSet<usize> {
    let top = surface.scroll_offset().y - margin;
    let bottom = surface.scroll_offset().y + surface.viewport().height + margin;
    surface
        .regions()
        .iter()
        .enumerate()
        .filter(|(_, rect)| rect.overlaps_band(top, bottom))
        .map(|(slot, _)| slot + 1)
        .collect()
}

/// Trailing-edge debounce: fires once `delay` has passed since the latest trigger.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` exactly once per burst of triggers, when the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}
