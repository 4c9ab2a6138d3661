use crate::{
    error::TraceError,
    types::{AddressNode, TimeRange},
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Half the width, in days, of a discovered address's query window.
pub const WINDOW_HALF_WIDTH_DAYS: i64 = 7;

/// Window used to query an address discovered through a transaction at `anchor`.
///
/// Always exactly 14 days wide with `anchor` at its midpoint.
pub fn derive_window(anchor: DateTime<Utc>) -> TimeRange {
    let half = Duration::days(WINDOW_HALF_WIDTH_DAYS);
    TimeRange::new(Some(anchor - half), Some(anchor + half))
}

/// Window used for seed addresses, built from the user's calendar dates.
///
/// The end date covers the whole day.
pub fn seed_window(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> TimeRange {
    let start = start_date.map(|d| d.and_time(NaiveTime::MIN).and_utc());
    let end = end_date.and_then(|d| d.and_hms_opt(23, 59, 59)).map(|dt| dt.and_utc());
    TimeRange::new(start, end)
}

/// Picks the query window for a frontier node.
pub fn window_for_node(node: &AddressNode, seed_range: &TimeRange) -> Result<TimeRange, TraceError> {
    if node.is_seed() && node.discovery_level == 0 {
        return Ok(*seed_range);
    }
    node.anchor
        .map(derive_window)
        .ok_or_else(|| TraceError::MissingAnchor {
            address: node.address.clone(),
            level: node.discovery_level,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeRole;
    use chrono::TimeZone;

    #[test]
    fn derived_window_is_fourteen_days_centered_on_anchor() {
        let anchor = Utc.with_ymd_and_hms(2021, 3, 4, 17, 45, 12).unwrap();
        let window = derive_window(anchor);
        let (start, end) = (window.start.unwrap(), window.end.unwrap());

        assert_eq!(end - start, Duration::days(14));
        assert_eq!(anchor - start, end - anchor);
    }

    #[test]
    fn june_fifteenth_maps_to_eighth_through_twenty_second() {
        let anchor = Utc.with_ymd_and_hms(2020, 6, 15, 0, 0, 0).unwrap();
        let window = derive_window(anchor);

        assert_eq!(
            window.start.unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2020, 6, 8).unwrap()
        );
        assert_eq!(
            window.end.unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2020, 6, 22).unwrap()
        );
    }

    #[test]
    fn seed_window_spans_whole_days() {
        let window = seed_window(
            NaiveDate::from_ymd_opt(2020, 1, 1),
            NaiveDate::from_ymd_opt(2020, 1, 31),
        );
        assert_eq!(window.start, Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(window.end, Some(Utc.with_ymd_and_hms(2020, 1, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn seed_window_may_be_open() {
        assert_eq!(seed_window(None, None), TimeRange::unbounded());
    }

    #[test]
    fn seeds_use_user_range() {
        let range = seed_window(NaiveDate::from_ymd_opt(2019, 5, 1), None);
        let seed = AddressNode::seed("A");
        assert_eq!(window_for_node(&seed, &range).unwrap(), range);
    }

    #[test]
    fn discovered_node_without_anchor_is_an_error() {
        let node = AddressNode {
            address: "X".into(),
            role: NodeRole::Discovered,
            discovery_level: 2,
            anchor: None,
        };
        let err = window_for_node(&node, &TimeRange::unbounded()).unwrap_err();
        assert!(matches!(
            err,
            TraceError::MissingAnchor { ref address, level: 2 } if address == "X"
        ));
    }
}
