pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };

    format!("{}{}", n, suffix)
}

/// Share of `part` in `total` as a percentage rounded to one decimal; 0 when `total` is 0.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }

    round1(part as f64 / total as f64 * 100.0)
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
