// src/scheduling.rs
//
// Pure slot logic for therapist schedules. A schedule row is either pinned to
// one calendar date or recurs weekly on a weekday, and carries a JSONB array
// of ad hoc time slots. Matching is a linear scan over slots; counts are small
// (a handful per therapist per day), so nothing fancier is warranted.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::LocationType;

#[derive(Debug, Error, PartialEq)]
pub enum SlotError {
    #[error("bad slot time {0:?}: expected HH:MM")]
    BadTime(String),
    #[error("slot end {end:?} is not after start {start:?}")]
    EndNotAfterStart { start: String, end: String },
    #[error("slot has no location types")]
    NoLocationTypes,
}

fn default_true() -> bool {
    true
}

/// Wire/storage form of one slot inside therapist_schedule.slots.
/// Times are "HH:MM" strings, as the product has always stored them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
    #[serde(default = "default_true")]
    pub available: bool,
    pub location_types: Vec<LocationType>,
}

pub fn parse_slot_time(s: &str) -> Result<NaiveTime, SlotError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| SlotError::BadTime(s.to_string()))
}

impl TimeSlot {
    pub fn window(&self) -> Result<(NaiveTime, NaiveTime), SlotError> {
        let start = parse_slot_time(&self.start)?;
        let end = parse_slot_time(&self.end)?;
        if end <= start {
            return Err(SlotError::EndNotAfterStart {
                start: self.start.clone(),
                end: self.end.clone(),
            });
        }
        Ok((start, end))
    }

    /// Containment check used by slot search: the slot must be open, cover the
    /// requested wall-clock instant (start inclusive, end exclusive), and list
    /// the requested modality.
    pub fn covers(&self, at: NaiveTime, location_type: LocationType) -> bool {
        if !self.available || !self.location_types.contains(&location_type) {
            return false;
        }
        match self.window() {
            Ok((start, end)) => start <= at && at < end,
            // Malformed slots never match; they are caught at save time for
            // new writes but legacy rows may still carry them.
            Err(_) => false,
        }
    }
}

/// Shape validation applied when a schedule is saved. Overlapping slots are
/// deliberately NOT rejected here; see validate-time note at the call site.
pub fn validate_slots(slots: &[TimeSlot]) -> Result<(), SlotError> {
    for slot in slots {
        slot.window()?;
        if slot.location_types.is_empty() {
            return Err(SlotError::NoLocationTypes);
        }
    }
    Ok(())
}

/// Count pairwise overlaps among well-formed slots. Used only to log a warning
/// on save; overlapping slots remain representable.
pub fn overlapping_pairs(slots: &[TimeSlot]) -> usize {
    let windows: Vec<(NaiveTime, NaiveTime)> =
        slots.iter().filter_map(|s| s.window().ok()).collect();
    let mut n = 0;
    for i in 0..windows.len() {
        for j in (i + 1)..windows.len() {
            let (a_start, a_end) = windows[i];
            let (b_start, b_end) = windows[j];
            if a_start < b_end && b_start < a_end {
                n += 1;
            }
        }
    }
    n
}

/// Does a schedule row apply to the given date? Rows are either pinned to one
/// date or recur weekly on a weekday (0 = Monday).
pub fn schedule_applies(
    schedule_date: Option<NaiveDate>,
    weekday: Option<i16>,
    date: NaiveDate,
) -> bool {
    match (schedule_date, weekday) {
        (Some(d), _) => d == date,
        (None, Some(w)) => i16::try_from(date.weekday().num_days_from_monday()).ok() == Some(w),
        (None, None) => false,
    }
}

/// Effective "open for bookings now" state for a therapist: the flag must be
/// on, and any time-box must not have lapsed. The expiry lives in the database
/// so it survives restarts and is never a client-side timer.
pub fn availability_active(
    is_available_now: bool,
    available_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    is_available_now && available_until.map(|until| now < until).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn slot(start: &str, end: &str, types: &[LocationType]) -> TimeSlot {
        TimeSlot {
            start: start.into(),
            end: end.into(),
            available: true,
            location_types: types.to_vec(),
        }
    }

    fn t(s: &str) -> NaiveTime {
        parse_slot_time(s).unwrap()
    }

    #[test]
    fn virtual_only_slot_excludes_clinic_request() {
        // 09:00-17:00 virtual-only: requested 10:00 clinic -> excluded,
        // requested 10:00 virtual -> included.
        let s = slot("09:00", "17:00", &[LocationType::Virtual]);
        assert!(!s.covers(t("10:00"), LocationType::Clinic));
        assert!(s.covers(t("10:00"), LocationType::Virtual));
    }

    #[test]
    fn containment_is_start_inclusive_end_exclusive() {
        let s = slot("09:00", "17:00", &[LocationType::Clinic]);
        assert!(s.covers(t("09:00"), LocationType::Clinic));
        assert!(s.covers(t("16:59"), LocationType::Clinic));
        assert!(!s.covers(t("17:00"), LocationType::Clinic));
        assert!(!s.covers(t("08:59"), LocationType::Clinic));
    }

    #[test]
    fn closed_slot_never_matches() {
        let mut s = slot("09:00", "17:00", &[LocationType::Mobile]);
        s.available = false;
        assert!(!s.covers(t("10:00"), LocationType::Mobile));
    }

    #[test]
    fn malformed_slot_never_matches_but_fails_validation() {
        let s = slot("9am", "17:00", &[LocationType::Clinic]);
        assert!(!s.covers(t("10:00"), LocationType::Clinic));
        assert_eq!(
            validate_slots(std::slice::from_ref(&s)),
            Err(SlotError::BadTime("9am".into()))
        );

        let backwards = slot("17:00", "09:00", &[LocationType::Clinic]);
        assert!(matches!(
            validate_slots(std::slice::from_ref(&backwards)),
            Err(SlotError::EndNotAfterStart { .. })
        ));

        let empty = slot("09:00", "10:00", &[]);
        assert_eq!(validate_slots(&[empty]), Err(SlotError::NoLocationTypes));
    }

    #[test]
    fn overlap_is_counted_not_rejected() {
        let slots = vec![
            slot("09:00", "12:00", &[LocationType::Clinic]),
            slot("11:00", "14:00", &[LocationType::Clinic]),
            slot("15:00", "16:00", &[LocationType::Clinic]),
        ];
        assert_eq!(overlapping_pairs(&slots), 1);
        assert!(validate_slots(&slots).is_ok());
    }

    #[test]
    fn schedule_date_vs_recurring_weekday() {
        // 2026-03-02 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();

        assert!(schedule_applies(Some(monday), None, monday));
        assert!(!schedule_applies(Some(monday), None, tuesday));

        assert!(schedule_applies(None, Some(0), monday));
        assert!(!schedule_applies(None, Some(0), tuesday));
        assert!(schedule_applies(None, Some(1), tuesday));

        assert!(!schedule_applies(None, None, monday));
    }

    #[test]
    fn availability_toggle_respects_time_box() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        assert!(availability_active(true, None, now));
        assert!(availability_active(true, Some(now + Duration::hours(1)), now));
        assert!(!availability_active(true, Some(now - Duration::minutes(1)), now));
        assert!(!availability_active(false, Some(now + Duration::hours(1)), now));
    }

    #[test]
    fn slot_json_wire_shape() {
        let json = r#"[{"start":"09:00","end":"17:00","location_types":["virtual"]}]"#;
        let slots: Vec<TimeSlot> = serde_json::from_str(json).unwrap();
        assert_eq!(slots.len(), 1);
        // "available" defaults to true when omitted
        assert!(slots[0].available);
        assert_eq!(slots[0].location_types, vec![LocationType::Virtual]);
    }
}
