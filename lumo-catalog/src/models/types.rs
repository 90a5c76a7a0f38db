//! Course and run type classifiers
//!
//! A `CourseRunType` enumerates the seat types a run may sell (its tracks);
//! a `CourseType` enumerates the run types a course may schedule and the
//! entitlement modes it may sell. A run/course whose type column is NULL
//! has the "empty type": the reconcilers upgrade it once the observed seat
//! set identifies a unique classifier.

use super::seat::SeatType;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct CourseRunType {
    pub id: i64,
    pub name: String,
    /// Seat types permitted on runs of this type
    pub tracks: Vec<SeatType>,
    /// Run types only sellable through a program (no standalone seats)
    pub program_only: bool,
}

impl CourseRunType {
    pub fn track_set(&self) -> BTreeSet<SeatType> {
        self.tracks.iter().copied().collect()
    }

    /// Whether a set of observed seat types identifies this run type.
    ///
    /// Observed seats must all be permitted tracks, and every paid track
    /// must be present among the seats; free tracks (audit, honor) are
    /// implicit and may be absent from the e-commerce product list.
    pub fn matches_seat_types(&self, seat_types: &BTreeSet<SeatType>) -> bool {
        let tracks = self.track_set();
        if !seat_types.is_subset(&tracks) {
            return false;
        }
        tracks
            .iter()
            .filter(|t| t.is_paid())
            .all(|t| seat_types.contains(t))
    }

    /// Whether a single seat type is permitted on runs of this type
    pub fn permits(&self, seat_type: SeatType) -> bool {
        self.tracks.contains(&seat_type)
    }
}

#[derive(Debug, Clone)]
pub struct CourseType {
    pub id: i64,
    pub name: String,
    /// Entitlement modes sellable on courses of this type
    pub entitlement_modes: Vec<SeatType>,
    /// Run types schedulable under this course type
    pub run_type_ids: Vec<i64>,
}

impl CourseType {
    pub fn permits_entitlement(&self, mode: SeatType) -> bool {
        self.entitlement_modes.contains(&mode)
    }

    pub fn allows_run_type(&self, run_type_id: i64) -> bool {
        self.run_type_ids.contains(&run_type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified_audit() -> CourseRunType {
        CourseRunType {
            id: 1,
            name: "verified-audit".to_string(),
            tracks: vec![SeatType::Verified, SeatType::Audit],
            program_only: false,
        }
    }

    fn audit_only() -> CourseRunType {
        CourseRunType {
            id: 2,
            name: "audit".to_string(),
            tracks: vec![SeatType::Audit],
            program_only: false,
        }
    }

    #[test]
    fn verified_seat_identifies_verified_audit_type() {
        let seats: BTreeSet<_> = [SeatType::Verified].into_iter().collect();
        assert!(verified_audit().matches_seat_types(&seats));
        assert!(!audit_only().matches_seat_types(&seats));
    }

    #[test]
    fn audit_seat_identifies_audit_type_only() {
        let seats: BTreeSet<_> = [SeatType::Audit].into_iter().collect();
        assert!(audit_only().matches_seat_types(&seats));
        // verified-audit requires the paid verified seat to be present
        assert!(!verified_audit().matches_seat_types(&seats));
    }

    #[test]
    fn foreign_seat_type_never_matches() {
        let seats: BTreeSet<_> = [SeatType::Masters].into_iter().collect();
        assert!(!verified_audit().matches_seat_types(&seats));
        assert!(!audit_only().matches_seat_types(&seats));
    }
}
