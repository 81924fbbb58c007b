use pgvecstore_core::filter::translate;
use pgvecstore_core::ident::{is_valid_identifier, quote};
use pgvecstore_core::index::default_lists;
use pgvecstore_core::query::default_ef_search;
use pgvecstore_core::{Filter, Params, Vector};
use proptest::prelude::*;

fn placeholders(sql: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let digits: String = sql[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                found.push(digits.parse().unwrap());
                i += digits.len();
            }
        }
        i += 1;
    }
    found
}

proptest! {
    #[test]
    fn test_valid_identifiers_quote_cleanly(name in "[A-Za-z_][A-Za-z0-9_]{0,40}") {
        prop_assert!(is_valid_identifier(&name));
        prop_assert_eq!(quote(&name), format!("\"{}\"", name));
    }

    #[test]
    fn test_hostile_identifiers_rejected(
        prefix in "[a-z]{0,5}",
        bad in prop::sample::select(vec!["\"", ";", " ", "-", "'", ")", "."]),
        suffix in "[a-z]{0,5}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(!is_valid_identifier(&name));
    }

    #[test]
    fn test_placeholders_cover_params(values in proptest::collection::vec(any::<i32>(), 1..12)) {
        let filter = values
            .iter()
            .skip(1)
            .fold(Filter::field("n").eq(values[0]), |acc, v| acc.or(Filter::field("n").gt(*v)));

        let mut params = Params::new();
        let sql = translate(&filter, &mut params).unwrap();

        let mut used = placeholders(&sql);
        used.sort_unstable();
        used.dedup();
        let expected: Vec<usize> = (1..=params.len()).collect();
        prop_assert_eq!(used, expected);
    }

    #[test]
    fn test_values_never_inlined(text in "[a-z]{8,16}") {
        let filter = Filter::field("title").eq(text.as_str())
            .and(Filter::field("tags").contained_in(vec![text.as_str()]));
        let mut params = Params::new();
        let sql = translate(&filter, &mut params).unwrap();
        prop_assert!(!sql.contains(&text));
    }

    #[test]
    fn test_default_lists_in_range(rows in any::<u64>()) {
        let lists = default_lists(rows);
        prop_assert!((100..=4000).contains(&lists));
    }

    #[test]
    fn test_default_ef_search_in_range(top_k in 0u32..100_000, m in 0u32..256) {
        let ef = default_ef_search(top_k, m);
        prop_assert!((1..=1000).contains(&ef));
        prop_assert!(ef >= top_k.clamp(1, 1000));
    }

    #[test]
    fn test_pg_literal_round_trips(data in proptest::collection::vec(-1.0e6f32..1.0e6f32, 1..64)) {
        let vector = Vector::from_vec(data);
        let parsed = Vector::parse_pg_literal(&vector.to_pg_literal()).unwrap();
        prop_assert_eq!(parsed, vector);
    }
}
