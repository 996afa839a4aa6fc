/// Format a byte count with binary units and two decimals.
///
/// Zero is special-cased to `"0 B"`; everything else keeps two decimals,
/// including plain bytes (`"512.00 B"`).
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size == 0 {
        return "0 B".to_string();
    }

    let mut value = size as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.2} {}", value, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_small() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1), "1.00 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_size_caps_at_terabytes() {
        let tb = 1024u64.pow(4);
        assert_eq!(format_size(2 * tb), "2.00 TB");
        assert_eq!(format_size(2048 * tb), "2048.00 TB");
    }
}
