//! Carrier phase arc tracking and bias key allocation
use std::collections::HashMap;

use log::debug;

use crate::prelude::{BiasKey, SV};

/// Per satellite arc bookkeeping: last seen phase break marker and the
/// bias key bound to the ongoing arc. Owned exclusively by [ArcTracker],
/// mutated only on observation ingestion for that satellite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcRecord {
    /// Last seen phase break marker
    pub marker: i32,
    /// Bias key of the ongoing arc
    pub bias: BiasKey,
}

/// Outcome of one arc query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArcEvent {
    /// Cycle slip or first sighting: a fresh bias key was allocated,
    /// the caller must create the matching bias state and prior.
    NewArc(BiasKey),
    /// Tracking continues on the current arc.
    Continued(BiasKey),
}

impl ArcEvent {
    /// Bias key currently bound to this satellite, in either case.
    pub fn bias(&self) -> BiasKey {
        match self {
            Self::NewArc(key) | Self::Continued(key) => *key,
        }
    }
}

/// [ArcTracker] detects cycle slips from the phase break marker each
/// observation carries, and allocates ambiguity identities. Keys come
/// from one global counter: unique across satellites, strictly
/// increasing per satellite, never reused.
#[derive(Debug, Clone, Default)]
pub struct ArcTracker {
    /// Next bias key to allocate
    next: u64,
    /// [ArcRecord] per satellite
    records: HashMap<SV, ArcRecord>,
}

impl ArcTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one (satellite, marker) sighting. Infallible: always
    /// resolves to a valid bias key. A marker change on a tracked
    /// satellite is a cycle slip and retires the current key.
    pub fn observe(&mut self, sv: SV, marker: i32) -> ArcEvent {
        match self.records.get(&sv).copied() {
            Some(record) if record.marker == marker => ArcEvent::Continued(record.bias),
            Some(record) => {
                let bias = self.allocate();
                debug!(
                    "{}: cycle slip (marker {} -> {}), new arc {}",
                    sv, record.marker, marker, bias
                );
                self.records.insert(sv, ArcRecord { marker, bias });
                ArcEvent::NewArc(bias)
            },
            None => {
                let bias = self.allocate();
                debug!("{}: first sighting, new arc {}", sv, bias);
                self.records.insert(sv, ArcRecord { marker, bias });
                ArcEvent::NewArc(bias)
            },
        }
    }

    /// Bias key of the ongoing arc for this satellite, if any.
    pub fn current(&self, sv: &SV) -> Option<BiasKey> {
        self.records.get(sv).map(|record| record.bias)
    }

    /// [ArcRecord] currently held for this satellite, if any.
    pub fn record(&self, sv: &SV) -> Option<&ArcRecord> {
        self.records.get(sv)
    }

    fn allocate(&mut self) -> BiasKey {
        let key = BiasKey(self.next);
        self.next += 1;
        key
    }
}

#[cfg(test)]
mod test {
    use super::{ArcEvent, ArcTracker};
    use crate::prelude::SV;
    use gnss_rs::prelude::Constellation;

    #[test]
    fn first_sighting_opens_arc() {
        let mut tracker = ArcTracker::new();
        let g01 = SV::new(Constellation::GPS, 1);
        match tracker.observe(g01, 7) {
            ArcEvent::NewArc(key) => assert_eq!(tracker.current(&g01), Some(key)),
            other => panic!("expected new arc, got {:?}", other),
        }
    }

    #[test]
    fn steady_marker_keeps_arc() {
        let mut tracker = ArcTracker::new();
        let g01 = SV::new(Constellation::GPS, 1);
        let first = tracker.observe(g01, 7).bias();
        for _ in 0..10 {
            assert_eq!(tracker.observe(g01, 7), ArcEvent::Continued(first));
        }
    }

    #[test]
    fn keys_unique_across_satellites() {
        let mut tracker = ArcTracker::new();
        let g01 = SV::new(Constellation::GPS, 1);
        let g02 = SV::new(Constellation::GPS, 2);
        let k1 = tracker.observe(g01, 0).bias();
        let k2 = tracker.observe(g02, 0).bias();
        let k3 = tracker.observe(g01, 1).bias();
        assert!(k2 > k1);
        assert!(k3 > k2);
        assert_eq!(tracker.current(&g01), Some(k3));
        assert_eq!(tracker.current(&g02), Some(k2));
    }
}
