use serde::{Deserialize, Serialize};

/// Half-open interval [start, end) of the ticket index space owned by
/// one entry. Every issued ticket occupies exactly one unit of the
/// space, so win probability is proportional to tickets held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRange {
    pub entry_id: i64,
    pub start: u64,
    pub end: u64,
}

/// Assign each (entry_id, ticket_count) pair a contiguous interval in
/// input order, with no gaps or overlaps. Returns the ranges and the
/// total ticket count.
pub fn build_entry_ranges(entries: &[(i64, u64)]) -> (Vec<EntryRange>, u64) {
    let mut ranges = Vec::with_capacity(entries.len());
    let mut cursor = 0u64;

    for &(entry_id, ticket_count) in entries {
        if ticket_count == 0 {
            continue;
        }
        ranges.push(EntryRange {
            entry_id,
            start: cursor,
            end: cursor + ticket_count,
        });
        cursor += ticket_count;
    }

    (ranges, cursor)
}

/// Binary search for the range owning a ticket index. Ranges must be the
/// sorted, gapless output of build_entry_ranges.
pub fn find_entry_for_index(ranges: &[EntryRange], target: u64) -> Option<&EntryRange> {
    let idx = ranges.partition_point(|r| r.end <= target);
    ranges
        .get(idx)
        .filter(|r| r.start <= target && target < r.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_cover_index_space_exactly_once() {
        let (ranges, total) = build_entry_ranges(&[(1, 3), (2, 5), (3, 2)]);

        assert_eq!(total, 10);
        assert_eq!(
            ranges,
            vec![
                EntryRange { entry_id: 1, start: 0, end: 3 },
                EntryRange { entry_id: 2, start: 3, end: 8 },
                EntryRange { entry_id: 3, start: 8, end: 10 },
            ]
        );

        // Every index in [0, 10) resolves to exactly one entry
        for target in 0..total {
            let owner = find_entry_for_index(&ranges, target).unwrap();
            assert!(owner.start <= target && target < owner.end);
        }
        assert!(find_entry_for_index(&ranges, 10).is_none());
    }

    #[test]
    fn test_boundaries_belong_to_the_next_range() {
        let (ranges, _) = build_entry_ranges(&[(1, 3), (2, 5), (3, 2)]);

        assert_eq!(find_entry_for_index(&ranges, 2).unwrap().entry_id, 1);
        assert_eq!(find_entry_for_index(&ranges, 3).unwrap().entry_id, 2);
        assert_eq!(find_entry_for_index(&ranges, 7).unwrap().entry_id, 2);
        assert_eq!(find_entry_for_index(&ranges, 8).unwrap().entry_id, 3);
    }

    #[test]
    fn test_empty_and_zero_count_entries() {
        let (ranges, total) = build_entry_ranges(&[]);
        assert!(ranges.is_empty());
        assert_eq!(total, 0);
        assert!(find_entry_for_index(&ranges, 0).is_none());

        let (ranges, total) = build_entry_ranges(&[(1, 0), (2, 4)]);
        assert_eq!(total, 4);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].entry_id, 2);
    }
}
