//! Rush-hour windows.

use chrono::{NaiveTime, Timelike};

/// Local-time windows `[start, end)` during which delays are scaled up.
const PEAK_WINDOWS: [((u32, u32), (u32, u32)); 2] = [((5, 45), (7, 0)), ((16, 30), (18, 0))];

/// Whether `time` falls in a peak window. Upper bounds are exclusive.
pub fn is_peak(time: NaiveTime) -> bool {
    let minute = time.hour() * 60 + time.minute();
    PEAK_WINDOWS
        .iter()
        .any(|&((sh, sm), (eh, em))| (sh * 60 + sm..eh * 60 + em).contains(&minute))
}

/// Scale `total` by 1.5, rounding half up.
pub fn apply_multiplier(total: u32) -> u32 {
    total.saturating_mul(3).saturating_add(1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn window_boundaries() {
        let cases = [
            (t(5, 44, 59), false),
            (t(5, 45, 0), true),
            (t(6, 30, 0), true),
            (t(6, 59, 59), true),
            (t(7, 0, 0), false),
            (t(12, 0, 0), false),
            (t(16, 29, 59), false),
            (t(16, 30, 0), true),
            (t(17, 59, 59), true),
            (t(18, 0, 0), false),
            (t(0, 0, 0), false),
        ];
        for (time, expected) in cases {
            assert_eq!(is_peak(time), expected, "{time}");
        }
    }

    #[test]
    fn multiplier_rounds_half_up() {
        assert_eq!(apply_multiplier(0), 0);
        assert_eq!(apply_multiplier(1), 2);
        assert_eq!(apply_multiplier(2), 3);
        assert_eq!(apply_multiplier(3), 5);
        assert_eq!(apply_multiplier(14), 21);
    }
}
