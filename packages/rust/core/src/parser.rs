//! Line parser for ads.txt files.
//!
//! One line in, at most one [`ParsedLine`] out. The parser is deliberately
//! forgiving: real-world ads.txt files are full of stray whitespace, odd
//! casing, and trailing comments, and a line that cannot be made sense of
//! is simply dropped rather than failing the file.

use tracing::trace;

use adstxt_shared::{AdsRecord, AdsVariable, ParsedLine, Relationship};

/// Parse a single ads.txt line. Comments and malformed lines yield `None`.
pub fn parse(line: &str) -> Option<ParsedLine> {
    let line = line.trim_matches([' ', '\t']);
    if line.starts_with('#') {
        return None;
    }

    // Truncate trailing comments.
    let line = match line.find('#') {
        Some(idx) => line[..idx].trim_matches([' ', '\t']),
        None => line,
    };
    if line.is_empty() {
        return None;
    }

    // `concepts` shows up inside pub_id fields that contain `=` noise, so
    // those lines fall through to record parsing instead.
    if line.contains('=') && !line.contains("concepts") {
        let (key, value) = line.split_once('=')?;
        return Some(ParsedLine::Variable(AdsVariable {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        }));
    }

    parse_record(line).map(ParsedLine::Record)
}

fn parse_record(line: &str) -> Option<AdsRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 3 {
        trace!(line, "too few fields for a record");
        return None;
    }

    let supplier_domain = fields[0].trim().to_lowercase();
    let pub_id = fields[1].trim().to_string();

    // Substring match: publishers write "RESELLER", "Direct;", etc.
    // Reseller wins when a field somehow mentions both.
    let relationship_field = fields[2].trim().to_lowercase();
    let relationship = if relationship_field.contains("reseller") {
        Relationship::Reseller
    } else if relationship_field.contains("direct") {
        Relationship::Direct
    } else {
        trace!(line, "unrecognized relationship field");
        return None;
    };

    // The certification authority is only taken from exactly four fields;
    // a line with extra commas loses it rather than guessing which field
    // was meant. A blank fourth field stays as an empty authority, which
    // is a distinct identity from a three-field line.
    let cert_authority = (fields.len() == 4).then(|| fields[3].trim().to_string());

    Some(AdsRecord {
        supplier_domain,
        pub_id,
        relationship,
        cert_authority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> AdsRecord {
        match parse(line) {
            Some(ParsedLine::Record(record)) => record,
            other => panic!("expected a record from {line:?}, got {other:?}"),
        }
    }

    fn variable(line: &str) -> AdsVariable {
        match parse(line) {
            Some(ParsedLine::Variable(variable)) => variable,
            other => panic!("expected a variable from {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn basic_record() {
        let rec = record("adtech.com, 10217, RESELLER");
        assert_eq!(rec.supplier_domain, "adtech.com");
        assert_eq!(rec.pub_id, "10217");
        assert_eq!(rec.relationship, Relationship::Reseller);
        assert_eq!(rec.cert_authority, None);
    }

    #[test]
    fn four_field_record_carries_cert_authority() {
        let rec = record("advertising.com, 10316, DIRECT, 7842df1d2fe2db34");
        assert_eq!(rec.relationship, Relationship::Direct);
        assert_eq!(rec.cert_authority.as_deref(), Some("7842df1d2fe2db34"));
    }

    #[test]
    fn empty_fourth_field_is_an_empty_cert_authority() {
        let rec = record("adtech.com, 10217, RESELLER, ");
        assert_eq!(rec.cert_authority.as_deref(), Some(""));
        // Not the same identity as the three-field form.
        assert_ne!(rec, record("adtech.com, 10217, RESELLER"));
    }

    #[test]
    fn five_field_record_drops_cert_authority() {
        let rec = record("adtech.com, 10217, RESELLER, 7842df1d2fe2db34, banner");
        assert_eq!(rec.cert_authority, None);
    }

    #[test]
    fn supplier_domain_lowercased_pub_id_case_preserved() {
        let rec = record("AdTech.COM, AbC10217xYz, direct");
        assert_eq!(rec.supplier_domain, "adtech.com");
        assert_eq!(rec.pub_id, "AbC10217xYz");
    }

    #[test]
    fn relationship_matched_by_substring() {
        assert_eq!(record("a.com, 1, RESELLER;").relationship, Relationship::Reseller);
        assert_eq!(record("a.com, 1, Direct Account").relationship, Relationship::Direct);
        // Reseller takes precedence over a stray direct mention.
        assert_eq!(
            record("a.com, 1, direct-reseller").relationship,
            Relationship::Reseller
        );
    }

    #[test]
    fn unknown_relationship_is_dropped() {
        assert_eq!(parse("adtech.com, 10217, PARTNER"), None);
    }

    #[test]
    fn too_few_fields_is_dropped() {
        assert_eq!(parse("adtech.com, 10217"), None);
        assert_eq!(parse("just some text"), None);
    }

    #[test]
    fn comment_lines_are_dropped() {
        assert_eq!(parse("# ads.txt for example.com"), None);
        assert_eq!(parse("   # indented comment"), None);
    }

    #[test]
    fn trailing_comment_truncated() {
        let rec = record("adtech.com, 10217, RESELLER # legacy entry");
        assert_eq!(rec.relationship, Relationship::Reseller);
        assert_eq!(rec.cert_authority, None);
    }

    #[test]
    fn comment_only_remainder_is_dropped() {
        assert_eq!(parse("   \t"), None);
        assert_eq!(parse("\t# tab-indented comment"), None);
    }

    #[test]
    fn variables_split_at_first_equals() {
        let var = variable("contact=ads@example.com");
        assert_eq!(var.key, "contact");
        assert_eq!(var.value, "ads@example.com");

        // Values keep any further '=' characters.
        let var = variable("subdomain = divisionone.example.com?a=b");
        assert_eq!(var.key, "subdomain");
        assert_eq!(var.value, "divisionone.example.com?a=b");
    }

    #[test]
    fn concepts_lines_are_not_variables() {
        // A '=' inside a pub_id mentioning concepts must not create a
        // variable; the line is parsed as a record instead.
        let rec = record("adtech.com, concepts=sports, RESELLER");
        assert_eq!(rec.pub_id, "concepts=sports");
    }
}
