use regex::Regex;

/// Simple PII detection helpers. Patterns are compiled once at construction
/// and re-used for every check.
#[derive(Debug)]
pub struct PiiDetector {
    email: Regex,
    phone: Regex,
    ip: Regex,
    credit: Regex,
}

impl PiiDetector {
    /// Create a detector with sensible defaults.
    pub fn new() -> Self {
        // Static patterns; compilation cannot fail at runtime.
        PiiDetector {
            email: Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").expect("email pattern"),
            phone: Regex::new(r"\+?[0-9]{1,3}[\s-]?(?:\([0-9]{1,4}\)[\s-]?)?[0-9\s-]{5,}")
                .expect("phone pattern"),
            ip: Regex::new(r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(?:\.|$)){4}")
                .expect("ip pattern"),
            credit: Regex::new(r"\b(?:\d[ -]*?){13,16}\b").expect("credit card pattern"),
        }
    }

    /// Reports whether any of the detector's patterns match the input.
    pub fn contains_pii(&self, input: &str) -> bool {
        self.email.is_match(input)
            || self.phone.is_match(input)
            || self.ip.is_match(input)
            || self.credit.is_match(input)
    }
}

impl Default for PiiDetector {
    fn default() -> Self {
        PiiDetector::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_email() {
        let detector = PiiDetector::new();
        assert!(detector.contains_pii("contact me at User.Name+tag@Example.org please"));
    }

    #[test]
    fn test_detects_phone() {
        let detector = PiiDetector::new();
        assert!(detector.contains_pii("call +1 (555) 123-4567"));
    }

    #[test]
    fn test_detects_credit_card() {
        let detector = PiiDetector::new();
        assert!(detector.contains_pii("card 4111 1111 1111 1111"));
    }

    #[test]
    fn test_clean_input() {
        let detector = PiiDetector::new();
        assert!(!detector.contains_pii("nothing sensitive here"));
    }
}
