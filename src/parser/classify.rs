use std::sync::LazyLock;

use regex::Regex;

static PO_BOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:P\.?\s*O\.?|POST\s+OFFICE)\s+BOX\s+\d+(?:-\d+)?\b").unwrap()
});

static ADDRESS_NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:phone|contractor|mt|id|zip|fax|wa|nd|sd)\b").unwrap()
});

static STREET_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = STREET_TOKENS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).unwrap()
});

static CITY_STATE_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?P<city>[\w\s.'\-]+?)[, ]+(?P<state>{})(?:[, ]+\s*(?P<zip>\d{{5}}(?:-\d{{4}})?))?\s*$",
        STATES.join("|")
    ))
    .unwrap()
});

static LICENSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Z]+)\s+([\w\-]+)").unwrap());

const STREET_TOKENS: &[&str] = &[
    "ST", "AVE", "AVENUE", "BLVD", "RD", "ROAD", "DR", "DRIVE", "CT", "LN", "LANE", "PKWY", "PL",
    "WAY", "HWY", "TERR", "EXPRESSWAY", "TRAIL", "CIR", "LOOP", "E.", "W.", "N.", "S.", "SUITE",
    "STE", "UNIT", "FLOOR", "APT",
];

const STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA", "KS",
    "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM", "NY",
    "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV",
    "WI", "WY", "DC",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityStateZip {
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Outcome of the first classifier that accepted a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    PoBox(String),
    Address(String),
    CityStateZip(CityStateZip),
    License(String),
}

type Classifier = fn(&str) -> Option<Classified>;

/// Priority order: the first classifier that matches claims the line.
/// License goes last because it accepts almost any "WORD WORD" line.
pub const CLASSIFIERS: [(&str, Classifier); 4] = [
    ("po_box", as_po_box),
    ("address", as_address),
    ("city_state_zip", as_city_state_zip),
    ("license", as_license),
];

pub fn classify(line: &str) -> Option<Classified> {
    CLASSIFIERS.iter().find_map(|(_, f)| f(line))
}

fn as_po_box(line: &str) -> Option<Classified> {
    extract_po_box(line).map(|s| Classified::PoBox(s.to_string()))
}

fn as_address(line: &str) -> Option<Classified> {
    address_line(line).map(|s| Classified::Address(s.to_string()))
}

fn as_city_state_zip(line: &str) -> Option<Classified> {
    city_state_zip(line).map(Classified::CityStateZip)
}

fn as_license(line: &str) -> Option<Classified> {
    business_license(line).map(|s| Classified::License(s.to_string()))
}

/// Matched PO box span, e.g. "P.O. Box 22-4", not the whole line.
pub fn extract_po_box(line: &str) -> Option<&str> {
    PO_BOX_RE.find(line).map(|m| m.as_str())
}

/// Returns the trimmed line when it reads as a street address.
pub fn address_line(line: &str) -> Option<&str> {
    let stripped = line.trim();

    // Field labels and state codes that would otherwise pass the digit + suffix test.
    if ADDRESS_NOISE_RE.is_match(stripped) {
        return None;
    }

    let has_digit = stripped.chars().any(|c| c.is_ascii_digit());
    if has_digit && STREET_TOKEN_RE.is_match(stripped) {
        Some(stripped)
    } else {
        None
    }
}

/// Whole-line "City, ST 12345" with optional zip and comma/space separators.
pub fn city_state_zip(line: &str) -> Option<CityStateZip> {
    let caps = CITY_STATE_ZIP_RE.captures(line.trim())?;
    Some(CityStateZip {
        city: caps["city"].trim().to_string(),
        state: caps["state"].to_uppercase(),
        zip: caps.name("zip").map(|m| m.as_str().to_string()).unwrap_or_default(),
    })
}

/// Code token following a leading label, e.g. "CONTRACTOR 2015-MSS-CON-00062".
pub fn business_license(line: &str) -> Option<&str> {
    LICENSE_RE
        .captures(line.trim())
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn po_box_plain() {
        assert_eq!(extract_po_box("PO BOX 1951"), Some("PO BOX 1951"));
    }

    #[test]
    fn po_box_dotted_with_suffix() {
        assert_eq!(extract_po_box("P.O. Box 22-4"), Some("P.O. Box 22-4"));
    }

    #[test]
    fn po_box_inside_longer_line() {
        assert_eq!(extract_po_box("CONTRACTOR PO BOX 99"), Some("PO BOX 99"));
        assert_eq!(extract_po_box("Post Office Box 7 Missoula"), Some("Post Office Box 7"));
    }

    #[test]
    fn po_box_requires_digits() {
        assert_eq!(extract_po_box("PO BOX"), None);
        assert_eq!(extract_po_box("Boxer Construction"), None);
    }

    #[test]
    fn address_with_suite() {
        assert_eq!(address_line("123 Main St Suite 4"), Some("123 Main St Suite 4"));
        assert_eq!(address_line("  456 Oak Ave "), Some("456 Oak Ave"));
    }

    #[test]
    fn address_noise_words_reject() {
        assert_eq!(address_line("Phone: 555-1234"), None);
        assert_eq!(address_line("MT License"), None);
        assert_eq!(address_line("100 Fax Way"), None);
        assert_eq!(address_line("Zip 59801 Ave"), None);
    }

    #[test]
    fn address_needs_digit_and_token() {
        assert_eq!(address_line("Main Street Ave"), None);
        assert_eq!(address_line("12345 Something"), None);
        // whole word only: "Stone" does not contain the token ST
        assert_eq!(address_line("12 Stone"), None);
    }

    #[test]
    fn city_state_zip_full() {
        assert_eq!(
            city_state_zip("Missoula, MT 59801"),
            Some(CityStateZip {
                city: "Missoula".into(),
                state: "MT".into(),
                zip: "59801".into(),
            })
        );
    }

    #[test]
    fn city_state_without_zip() {
        assert_eq!(
            city_state_zip("Billings MT"),
            Some(CityStateZip {
                city: "Billings".into(),
                state: "MT".into(),
                zip: String::new(),
            })
        );
    }

    #[test]
    fn city_state_zip_plus_four_and_lowercase_state() {
        let csz = city_state_zip("Coeur d'Alene, id, 83814-1234").unwrap();
        assert_eq!(csz.city, "Coeur d'Alene");
        assert_eq!(csz.state, "ID");
        assert_eq!(csz.zip, "83814-1234");
    }

    #[test]
    fn city_with_spaces_keeps_state_out() {
        let csz = city_state_zip("Great Falls MT 59404").unwrap();
        assert_eq!(csz.city, "Great Falls");
        assert_eq!(csz.state, "MT");
    }

    #[test]
    fn city_state_zip_no_match() {
        assert_eq!(city_state_zip("Random text here"), None);
        assert_eq!(city_state_zip("Missoula, XX 59801"), None);
        assert_eq!(city_state_zip("MT 59801"), None);
    }

    #[test]
    fn license_code() {
        assert_eq!(
            business_license("CONTRACTOR 2015-MSS-CON-00062"),
            Some("2015-MSS-CON-00062")
        );
        assert_eq!(business_license("License 1234-XYZ extra"), Some("1234-XYZ"));
    }

    #[test]
    fn license_needs_label_and_code() {
        assert_eq!(business_license("2015-MSS"), None);
        assert_eq!(business_license("CONTRACTOR"), None);
    }

    #[test]
    fn priority_po_box_before_license() {
        assert_eq!(
            classify("CONTRACTOR PO BOX 99"),
            Some(Classified::PoBox("PO BOX 99".into()))
        );
    }

    #[test]
    fn priority_address_before_license() {
        let line = "SUITE 200 Building";
        assert!(business_license(line).is_some());
        assert_eq!(classify(line), Some(Classified::Address(line.into())));
    }

    #[test]
    fn priority_address_before_city_state_zip() {
        // also parses as city "100 Main St" in Oregon
        let line = "100 Main St OR";
        assert!(city_state_zip(line).is_some());
        assert_eq!(classify(line), Some(Classified::Address(line.into())));
    }

    #[test]
    fn unmatched_line() {
        assert_eq!(classify("!!!"), None);
    }

    #[test]
    fn classifier_order_is_fixed() {
        let names: Vec<&str> = CLASSIFIERS.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["po_box", "address", "city_state_zip", "license"]);
    }
}
