use std::collections::HashMap;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

/// base64url without padding on encode; accepts padded input on decode,
/// since some browsers and key generators emit it.
pub const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Splits `(a,b),(c,d)` into `["a,b", "c,d"]`. Parentheses nest, so an item
/// may carry balanced `(...)` of its own; text outside any top-level pair is
/// ignored.
pub fn parse_tuple_string(data: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, c) in data.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = index + 1;
                }
                depth += 1;
            },
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    items.push(data[start..index].to_owned());
                }
            },
            _ => {},
        }
    }

    items
}

/// `(user,message),(user,message)` -> user => message. The message is
/// everything after the first comma, so it may contain commas itself.
pub fn parse_message_table(data: &str) -> HashMap<String, String> {
    parse_tuple_string(data)
        .into_iter()
        .filter_map(|item| {
            let (user, message) = item.split_once(',')?;
            let user = user.trim();
            if user.is_empty() {
                return None;
            }
            Some((user.to_owned(), message.trim().to_owned()))
        })
        .collect()
}

pub fn parse_list(data: &str) -> Vec<String> {
    data.split(',')
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect()
}
