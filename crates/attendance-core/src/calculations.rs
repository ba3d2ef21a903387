//! Percentage arithmetic shared by every attendance view.

/// Default defaulter threshold in percent.
pub const DEFAULT_THRESHOLD_PERCENT: u8 = 75;

/// `round(100 * present / total)` with halves rounded up.
///
/// Returns `0` when `total` is zero so callers never see an undefined value.
///
/// # Examples
///
/// ```
/// use attendance_core::calculations::attendance_percentage;
///
/// assert_eq!(attendance_percentage(1, 2), 50);
/// assert_eq!(attendance_percentage(2, 3), 67);
/// assert_eq!(attendance_percentage(1, 8), 13);
/// assert_eq!(attendance_percentage(0, 0), 0);
/// ```
pub fn attendance_percentage(present: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let present = u64::from(present.min(total));
    let total = u64::from(total);
    // floor((200p + t) / 2t) == floor(100p/t + 0.5)
    ((200 * present + total) / (2 * total)) as u32
}

/// `true` when `percentage` is strictly below `threshold`.
pub fn is_below_threshold(percentage: u32, threshold: u8) -> bool {
    percentage < u32::from(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_zero_total_is_zero() {
        assert_eq!(attendance_percentage(0, 0), 0);
    }

    #[test]
    fn test_percentage_whole_values() {
        assert_eq!(attendance_percentage(2, 2), 100);
        assert_eq!(attendance_percentage(0, 4), 0);
        assert_eq!(attendance_percentage(3, 4), 75);
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 12.5 -> 13, 62.5 -> 63, 87.5 -> 88
        assert_eq!(attendance_percentage(1, 8), 13);
        assert_eq!(attendance_percentage(5, 8), 63);
        assert_eq!(attendance_percentage(7, 8), 88);
    }

    #[test]
    fn test_percentage_rounds_down_below_half() {
        // 33.33 -> 33, 16.67 -> 17
        assert_eq!(attendance_percentage(1, 3), 33);
        assert_eq!(attendance_percentage(1, 6), 17);
    }

    #[test]
    fn test_percentage_large_counts_do_not_overflow() {
        assert_eq!(attendance_percentage(u32::MAX, u32::MAX), 100);
    }

    #[test]
    fn test_below_threshold_is_strict() {
        assert!(is_below_threshold(74, 75));
        assert!(!is_below_threshold(75, 75));
        assert!(!is_below_threshold(0, 0));
        assert!(is_below_threshold(99, 100));
    }
}
