use num_format::{CustomFormat, Grouping, ToFormattedString};

/// `1_234_567` style grouping for step and episode counters in log output
pub fn number_format() -> CustomFormat {
    CustomFormat::builder()
        .grouping(Grouping::Standard)
        .minus_sign("-")
        .separator("_")
        .build()
        .expect("static number format should be valid")
}

pub fn count(value: usize) -> String {
    value.to_formatted_string(&number_format())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_grouping() {
        assert_eq!(count(0), "0");
        assert_eq!(count(999), "999");
        assert_eq!(count(1_234_567), "1_234_567");
    }
}
