//! End-to-end parsing properties: ordering, caps, strict directive,
//! determinism, and file/inline equivalence.

use sqon_core::{
    parse_file, parse_str, renumber_file, renumber_records, Focus, ParseOptions, Parser,
    SqonError, TypeTag, MAX_ERRORS_PER_SECTION,
};
use std::fs;
use std::io::Write;

const WELL_FORMED: &str = "\
*STRICT=TRUE
@schema
id: Number
name: String
roles: String[]
profile: Object {
  bio: String
  links: ObjectArray {
    url: String
  }
}
@end

@validations
id: required, isInteger, isUnique
name: trim(), pattern(/^[A-Z]/), minLength(2)
roles: enum(['admin', 'dev', 'ops']), maxLength(3)
profile.links.url: isURL
@end

@records
#0 { id: 1, name: '  Ann', roles: ['dev'], profile: { bio: 'hi', links: [{ url: 'https://a.example' }] } }
#1 {
  id: 2,
  name: 'Bob',
  roles: ['ops', 'admin'],
  profile: { bio: '', links: [] }
}
@end
";

#[test]
fn well_formed_input_yields_no_errors() {
    let out = parse_str(WELL_FORMED).unwrap();
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    assert!(out.file_rules.strict);
    assert_eq!(
        out.schema.resolve("profile.links.url").unwrap().ty,
        TypeTag::String
    );
    assert_eq!(out.validations.rule_count(), 9);
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].value["name"], "Ann");
    assert_eq!(out.records[1].line, 23);
}

#[test]
fn validations_before_schema_is_exactly_one_error() {
    let src = "@validations\nid: required\n@end\n@schema\nid: Number\n@end\n@records\n#0 { id: 1 }\n@end";
    let out = parse_str(src).unwrap();
    assert_eq!(out.errors.len(), 1, "{:?}", out.errors);
    assert_eq!(out.errors[0].line, Some(1));
    assert_eq!(out.records.len(), 1);
}

#[test]
fn inapplicable_keyword_is_exactly_one_diagnostic() {
    let src = "@schema\nflag: Boolean\n@end\n@validations\nflag: minLength(2)\n@end\n@records\n#0 { flag: true }\n@end";
    let out = parse_str(src).unwrap();
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].message.contains("not applicable"));
    assert!(out.validations.is_empty());
}

#[test]
fn record_cap_keeps_five_hundred() {
    let mut src = String::from("@schema\nn: Number\n@end\n@records\n");
    for i in 0..501 {
        src.push_str(&format!("#{} {{ n: {} }}\n", i, i));
    }
    src.push_str("@end\n");

    let out = parse_str(&src).unwrap();
    assert_eq!(out.records.len(), 500);
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].message.contains("record limit of 500"));
    assert!(out.records.iter().all(|d| d.value["n"] != 500));
}

#[test]
fn record_cap_is_reported_even_when_errors_are_capped() {
    let mut src = String::from("@schema\nn: Number\n@end\n@records\n");
    for i in 0..60 {
        src.push_str(&format!("junk {}\n", i));
    }
    src.push_str("#0 { n: 0 }\n#1 { n: 1 }\n#2 { n: 2 }\n@end\n");

    let out = Parser::new(ParseOptions::from_content(src).max_records(2))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.errors.len(), MAX_ERRORS_PER_SECTION);
    assert!(out
        .errors
        .iter()
        .any(|e| e.message.contains("record limit of 2 reached")));
}

#[test]
fn pathologically_nested_record_is_reported_not_fatal() {
    let depth = 10_000;
    let src = format!(
        "@schema\nn: Array\n@end\n@records\n#0 {{ n: {}{} }}\n#1 {{ n: [] }}\n@end\n",
        "[".repeat(depth),
        "]".repeat(depth)
    );
    let out = parse_str(&src).unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].ordinal, 1);
    assert_eq!(out.errors.len(), 1, "{:?}", out.errors);
    assert_eq!(out.errors[0].line, Some(5));
    assert!(out.errors[0].message.contains("nested deeper than"));
}

#[test]
fn invalid_strict_value_is_one_error_and_strict_stays_false() {
    let out = parse_str("*STRICT=MAYBE\n@schema\na: Number\n@end\n@records\n#0 { a: 1 }\n@end").unwrap();
    assert_eq!(out.errors.len(), 1);
    assert!(!out.file_rules.strict);
}

#[test]
fn error_lists_are_capped_per_section() {
    let mut src = String::from("@schema\n");
    for i in 0..80 {
        src.push_str(&format!("f{}: Nope\n", i));
    }
    src.push_str("ok: Number\n@end\n");
    for i in 0..70 {
        src.push_str(&format!("junk {}\n", i));
    }
    src.push_str("@records\n#0 { ok: 1 }\n@end\n");

    let out = parse_str(&src).unwrap();
    // One capped list for top-level lines, one for the schema section.
    assert_eq!(out.errors.len(), 2 * MAX_ERRORS_PER_SECTION);
    let markers = out
        .errors
        .iter()
        .filter(|e| e.message.contains("too many errors"))
        .count();
    assert_eq!(markers, 2);
}

#[test]
fn reparsing_is_deterministic() {
    let a = parse_str(WELL_FORMED).unwrap();
    let b = parse_str(WELL_FORMED).unwrap();
    assert_eq!(a.schema, b.schema);
    assert_eq!(a.validations, b.validations);
    assert_eq!(a.records, b.records);
    assert_eq!(a.errors, b.errors);

    let parser = Parser::new(ParseOptions::from_content(WELL_FORMED)).unwrap();
    let c = parser.parse().unwrap();
    let d = parser.parse().unwrap();
    assert_eq!(c.records, d.records);
}

#[test]
fn file_and_inline_sources_agree() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(WELL_FORMED.replace('\n', "\r\n").as_bytes())
        .unwrap();
    let from_file = parse_file(tmp.path()).unwrap();
    let inline = parse_str(WELL_FORMED).unwrap();
    assert_eq!(from_file.schema, inline.schema);
    assert_eq!(from_file.validations, inline.validations);
    assert_eq!(from_file.records, inline.records);
    assert!(from_file.metadata.input_bytes > inline.metadata.input_bytes);
}

#[test]
fn source_must_be_exactly_one_of_path_or_content() {
    let neither = Parser::new(ParseOptions::default()).unwrap_err();
    assert!(matches!(neither, SqonError::Config(_)));

    let both = Parser::new(ParseOptions::from_content("@schema").path("x.sqon")).unwrap_err();
    assert!(matches!(both, SqonError::Config(_)));
}

#[test]
fn focused_parse_returns_only_that_section() {
    let out = Parser::new(ParseOptions::from_content(WELL_FORMED.replace("*STRICT=TRUE", "*STRICT=FALSE")).focus(Focus::Schema))
        .unwrap()
        .parse()
        .unwrap();
    assert!(out.errors.is_empty());
    assert_eq!(out.schema.field_count(), 7);
    assert!(out.validations.is_empty());
    assert!(out.records.is_empty());
}

#[test]
fn renumbering_resequences_and_preserves_other_bytes() {
    let src = "@schema\r\nn: Number\r\n@end\r\n@records\r\n  #7 { n: 1 }\r\n#3 {\r\n n: 2 }\r\n#9 { n: 3 }\r\n@end\r\n";
    let out = renumber_records(src);
    assert_eq!(
        out,
        "@schema\r\nn: Number\r\n@end\r\n@records\r\n  #0 { n: 1 }\r\n#1 {\r\n n: 2 }\r\n#2 { n: 3 }\r\n@end\r\n"
    );
    let reparsed = parse_str(&out).unwrap();
    let ordinals: Vec<u64> = reparsed.records.iter().map(|d| d.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
}

#[test]
fn renumber_file_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.sqon");
    fs::write(&path, "@schema\nn: Number\n@end\n@records\n#4 { n: 1 }\n#4 { n: 2 }\n@end\n").unwrap();
    assert_eq!(renumber_file(&path).unwrap(), 2);
    let out = parse_file(&path).unwrap();
    assert_eq!(out.records[1].ordinal, 1);
}
