//! Property-based test generators using proptest.

use pcache_core::LocalRecord;
use proptest::prelude::*;

/// Strategy for record identifiers.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for phone numbers (digits only).
pub fn phone_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9]{3,10}").expect("Invalid regex")
}

/// Strategy for display names in mixed case.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z ]{0,15}").expect("Invalid regex")
}

/// Strategy for cached records with any subset of search fields.
pub fn local_record_strategy() -> impl Strategy<Value = LocalRecord> {
    (
        record_id_strategy(),
        prop::option::of(name_strategy()),
        prop::option::of(phone_strategy()),
        prop::option::of(prop::string::string_regex("[A-Za-z0-9_]{1,10}").expect("Invalid regex")),
        0i64..2_000_000_000_000,
    )
        .prop_map(|(id, display_name, phone, handle, updated_at)| LocalRecord {
            id,
            display_name,
            phone,
            handle,
            updated_at,
            ..LocalRecord::default()
        })
}

/// Strategy for search prefixes: either all digits or alphabetic.
pub fn prefix_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[0-9]{1,3}").expect("Invalid regex"),
        prop::string::string_regex("[A-Za-z]{1,3}").expect("Invalid regex"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn records_have_ids(record in local_record_strategy()) {
            prop_assert!(!record.id.is_empty());
            prop_assert!(record.updated_at >= 0);
        }

        #[test]
        fn phones_are_digits(phone in phone_strategy()) {
            prop_assert!(phone.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
