//! Small helpers shared by the model and the player

use uuid::Uuid;

/// Returns `6` => `"06"`.
pub fn double_digits(input: u64) -> String {
    format!("{:02}", input)
}

/// Returns `187.0` => `"03:07"`.
///
/// Negative and non-finite inputs are treated as zero.
pub fn seconds_to_time(input: f64) -> String {
    let input = if input.is_finite() { input.max(0.0) } else { 0.0 };
    let minutes = (input / 60.0).floor();
    let seconds = (input - minutes * 60.0).floor();
    format!(
        "{}:{}",
        double_digits(minutes as u64),
        double_digits(seconds as u64)
    )
}

/// Random base-36 fragment followed by the current unix time in milliseconds.
pub fn generate_unique_string() -> String {
    let random = Uuid::new_v4().as_u128();
    format!(
        "{}{}",
        to_base36(random >> 64),
        chrono::Utc::now().timestamp_millis()
    )
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_to_time_formats_minutes_and_seconds() {
        assert_eq!(seconds_to_time(0.0), "00:00");
        assert_eq!(seconds_to_time(65.0), "01:05");
        assert_eq!(seconds_to_time(3599.0), "59:59");
        assert_eq!(seconds_to_time(187.9), "03:07");
    }

    #[test]
    fn seconds_to_time_clamps_bad_input() {
        assert_eq!(seconds_to_time(-4.0), "00:00");
        assert_eq!(seconds_to_time(f64::NAN), "00:00");
    }

    #[test]
    fn unique_strings_differ() {
        let a = generate_unique_string();
        let b = generate_unique_string();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
