//! Human-readable byte sizes with binary prefixes.

const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Render a byte count: plain integer under 1024, otherwise one decimal
/// place with the largest binary prefix whose value stays at least 1.0.
///
/// Values within rounding distance of the next unit are promoted to it, so
/// the output never reads `1024.0 KiB`.
pub fn human_readable_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes;
    let mut unit = 0usize;
    let mut shift = 40i32;
    while shift >= 0 && bytes > (0x0fff_cccc_cccc_cccc_u64 >> shift) {
        value >>= 10;
        unit += 1;
        shift -= 10;
    }
    format!("{:.1} {}iB", value as f64 / 1024.0, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sizes_are_plain_bytes() {
        assert_eq!(human_readable_bytes(0), "0 B");
        assert_eq!(human_readable_bytes(1), "1 B");
        assert_eq!(human_readable_bytes(1023), "1023 B");
    }

    #[test]
    fn binary_prefixes() {
        assert_eq!(human_readable_bytes(1024), "1.0 KiB");
        assert_eq!(human_readable_bytes(1536), "1.5 KiB");
        assert_eq!(human_readable_bytes(1024 * 1024), "1.0 MiB");
        assert_eq!(human_readable_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
        assert_eq!(human_readable_bytes(u64::MAX), "16.0 EiB");
    }

    #[test]
    fn never_renders_1024_of_a_unit() {
        // 1023.95 KiB rounds up, so it is promoted to MiB
        assert_eq!(human_readable_bytes(1_048_524), "1023.9 KiB");
        assert_eq!(human_readable_bytes(1_048_525), "1.0 MiB");
    }
}
