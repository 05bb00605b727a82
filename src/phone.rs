//! Phone number normalization.
//!
//! Every number entering the service (token requests, dial targets) is
//! converted to a single international form before it is stored or dialed.

/// Country calling code applied to national numbers.
const DEFAULT_COUNTRY_CODE: &str = "91";

/// Length of a national subscriber number without the country code.
const NATIONAL_NUMBER_LEN: usize = 10;

/// Normalize an arbitrary phone number string into canonical `+<cc><number>` form.
///
/// Never fails; malformed input produces a best-effort result. An input that
/// already starts with `+` is returned untouched unless its digits form a
/// 10-digit national number or a 12-digit `91`-prefixed number.
pub fn normalize_phone_number(phone_number: &str) -> String {
    let cleaned: String = phone_number
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    if cleaned.len() == NATIONAL_NUMBER_LEN + DEFAULT_COUNTRY_CODE.len()
        && cleaned.starts_with(DEFAULT_COUNTRY_CODE)
    {
        return format!("+{cleaned}");
    }

    if cleaned.len() == NATIONAL_NUMBER_LEN {
        return format!("+{DEFAULT_COUNTRY_CODE}{cleaned}");
    }

    // Checked against the raw input, not the cleaned digits.
    if phone_number.starts_with('+') {
        return phone_number.to_string();
    }

    format!("+{DEFAULT_COUNTRY_CODE}{cleaned}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_digit_numbers_get_country_code() {
        assert_eq!(normalize_phone_number("9876543210"), "+919876543210");
        assert_eq!(normalize_phone_number("98765 43210"), "+919876543210");
        assert_eq!(normalize_phone_number("(987) 654-3210"), "+919876543210");
    }

    #[test]
    fn twelve_digit_numbers_with_prefix_get_plus() {
        assert_eq!(normalize_phone_number("919876543210"), "+919876543210");
        assert_eq!(normalize_phone_number("+91 98765 43210"), "+919876543210");
        assert_eq!(normalize_phone_number("91-9876-543-210"), "+919876543210");
    }

    #[test]
    fn plus_prefixed_input_is_returned_verbatim() {
        assert_eq!(normalize_phone_number("+1 234"), "+1 234");
        assert_eq!(normalize_phone_number("+14155550100"), "+14155550100");
        assert_eq!(normalize_phone_number("+44 (20) 7946-0958"), "+44 (20) 7946-0958");
    }

    #[test]
    fn other_lengths_fall_back_to_country_code() {
        assert_eq!(normalize_phone_number("12345"), "+9112345");
        assert_eq!(normalize_phone_number("0019876543210"), "+910019876543210");
        // 12 digits without the 91 prefix
        assert_eq!(normalize_phone_number("449876543210"), "+91449876543210");
    }

    #[test]
    fn empty_and_garbage_input_do_not_panic() {
        assert_eq!(normalize_phone_number(""), "+91");
        assert_eq!(normalize_phone_number("abc"), "+91");
        assert_eq!(normalize_phone_number("+"), "+");
    }
}
