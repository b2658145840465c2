use std::collections::HashSet;

/// Position recorded for rows whose player is excluded by moderation
pub const EXCLUDED_POSITION: i32 = -1;

/// Computes competition-style positions (1, 1, 3, 4, 4, 6) for entries
/// already sorted by wave descending. Nothing is sorted here.
///
/// Excluded players get [`EXCLUDED_POSITION`] and leave the rank cursor
/// untouched. A tie is detected by comparing with the wave of the directly
/// preceding list slot, even when that slot is an excluded row, so an
/// excluded row with the same wave as the next entry makes that entry share
/// the rank of the last ranked row.
pub fn compute_positions<S: AsRef<str>>(entries: &[(S, i32)], excluded: &HashSet<String>) -> Vec<i32> {
    let mut positions = Vec::with_capacity(entries.len());
    let mut current = 0;
    let mut borrow = 1;
    let mut previous_wave: Option<i32> = None;

    for (player_id, wave) in entries {
        let slot_wave = previous_wave.replace(*wave);

        if excluded.contains(player_id.as_ref()) {
            positions.push(EXCLUDED_POSITION);
            continue;
        }

        if slot_wave == Some(*wave) {
            borrow += 1;
        } else {
            current += borrow;
            borrow = 1;
        }

        positions.push(current);
    }

    positions
}

/// Number of slots whose position differs between two aligned sequences
pub fn count_changes(before: &[i32], after: &[i32]) -> usize {
    before.iter().zip(after).filter(|(old, new)| old != new).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(waves: &[i32]) -> Vec<(String, i32)> {
        waves
            .iter()
            .enumerate()
            .map(|(idx, wave)| (format!("P{idx}"), *wave))
            .collect()
    }

    fn excluded(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn ties_share_minimum_rank_and_skip_ahead() {
        let positions = compute_positions(&entries(&[500, 500, 500, 300, 300, 100]), &HashSet::new());
        assert_eq!(positions, vec![1, 1, 1, 4, 4, 6]);
    }

    #[test]
    fn distinct_waves_are_contiguous() {
        let positions = compute_positions(&entries(&[90, 80, 70, 60]), &HashSet::new());
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_input_yields_no_positions() {
        let positions = compute_positions::<String>(&[], &HashSet::new());
        assert!(positions.is_empty());
    }

    #[test]
    fn excluded_rows_get_sentinel_anywhere() {
        let positions = compute_positions(&entries(&[900, 800, 700, 600]), &excluded(&["P0", "P3"]));
        assert_eq!(positions, vec![-1, 1, 2, -1]);
    }

    #[test]
    fn excluded_row_does_not_consume_a_rank() {
        let positions = compute_positions(&entries(&[900, 800, 700, 600]), &excluded(&["P1"]));
        assert_eq!(positions, vec![1, -1, 2, 3]);
    }

    #[test]
    fn excluded_member_of_a_tie_keeps_group_intact() {
        let positions = compute_positions(&entries(&[500, 500, 500, 300]), &excluded(&["P1"]));
        assert_eq!(positions, vec![1, -1, 1, 3]);
    }

    #[test]
    fn excluded_slot_with_equal_wave_is_treated_as_tie() {
        // P2 compares against the excluded P1 slot (450 == 450) and inherits rank 1.
        let positions = compute_positions(&entries(&[500, 450, 450, 400]), &excluded(&["P1"]));
        assert_eq!(positions, vec![1, -1, 1, 3]);
    }

    #[test]
    fn identical_input_is_deterministic() {
        let input = entries(&[10, 10, 9, 8, 8, 8, 1]);
        let skip = excluded(&["P3"]);
        assert_eq!(compute_positions(&input, &skip), compute_positions(&input, &skip));
    }

    #[test]
    fn counts_changed_slots() {
        assert_eq!(count_changes(&[1, 2, 3, 4], &[1, -1, 2, 3]), 3);
        assert_eq!(count_changes(&[1, 1, 3], &[1, 1, 3]), 0);
    }
}
