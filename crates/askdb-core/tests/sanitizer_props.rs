//! Property tests for the SQL sanitizer.

use askdb_core::sanitizer::{
    add_pending_filter, has_pending_filter, remove_bind_params, sanitize, validate_statement,
    SanitizeOptions, SqlVerdict,
};
use proptest::prelude::*;

const FORBIDDEN: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "TRUNCATE", "EXEC", "CREATE", "GRANT", "REVOKE",
];

fn arb_forbidden_keyword() -> impl Strategy<Value = String> {
    (
        prop::sample::select(FORBIDDEN.to_vec()),
        prop::collection::vec(any::<bool>(), 8),
    )
        .prop_map(|(kw, lower)| {
            kw.chars()
                .enumerate()
                .map(|(i, c)| {
                    if lower[i % lower.len()] {
                        c.to_ascii_lowercase()
                    } else {
                        c
                    }
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn bind_param_removal_is_identity_without_placeholders(sql in "[A-Za-z0-9_ ,.()=<>*'%-]{0,80}") {
        prop_assert_eq!(remove_bind_params(&sql), sql);
    }

    #[test]
    fn bind_param_removal_leaves_literals_alone(text in "[a-z0-9:@$ ]{0,20}") {
        let sql = format!("SELECT order_no FROM v_open_order WHERE internal_notes = '{}'", text);
        prop_assert_eq!(remove_bind_params(&sql), sql);
    }

    #[test]
    fn forbidden_keywords_rejected_in_any_case(kw in arb_forbidden_keyword()) {
        let sql = format!("SELECT order_no FROM v_open_order WHERE 1=1 {} x", kw);
        let verdict = validate_statement(&sql);
        let expected = format!("Forbidden keyword detected: {}", kw.to_uppercase());
        prop_assert_eq!(verdict.reason(), Some(expected.as_str()));
    }

    #[test]
    fn non_select_leading_keyword_is_named(
        word in "[a-zA-Z]{1,10}".prop_filter("not an allowed prefix", |w| {
            let up = w.to_uppercase();
            up != "SELECT" && up != "WITH"
        })
    ) {
        let verdict = validate_statement(&format!("{} order_no FROM v_open_order", word));
        let expected = format!("First keyword must be SELECT/WITH, got '{}'", word.to_uppercase());
        prop_assert_eq!(verdict.reason(), Some(expected.as_str()));
    }

    #[test]
    fn accepted_statements_are_always_capped(city in "[0-9 ]{0,20}", limit in 1usize..500) {
        let candidate = format!("SELECT order_no FROM v_open_order WHERE city = '{}';", city);
        let verdict = sanitize(&candidate, &SanitizeOptions {
            question: "orders by city",
            allowed_entities: &[],
            row_limit: limit,
        });
        match verdict {
            SqlVerdict::Accepted(sql) => {
                let suffix = format!(" LIMIT {}", limit);
                prop_assert!(sql.ends_with(&suffix));
            }
            SqlVerdict::Rejected { reason, .. } => prop_assert!(false, "rejected: {}", reason),
        }
    }

    #[test]
    fn pending_filter_is_added_once(city in "[A-Za-z]{1,12}") {
        let sql = format!("SELECT order_no FROM v_open_order WHERE city = '{}' ORDER BY due_date", city);
        let once = add_pending_filter(&sql);
        prop_assert!(has_pending_filter(&once));
        prop_assert_eq!(once.matches("balance_qty > 0").count(), 1);
    }
}
