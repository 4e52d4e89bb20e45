use crate::models::{Classification, Verdict};

/// Map free-text classifier output to a verdict.
///
/// Only the first word of the trimmed response is looked at, compared
/// case-insensitively: "Yes." and "yes, it is" are `Yes`, "No" is `No`.
/// Anything else, including an empty response, is `Unknown`.
pub fn parse_verdict(response: &str) -> Verdict {
    let first_word: String = response
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    match first_word.as_str() {
        "yes" => Verdict::Yes,
        "no" => Verdict::No,
        _ => Verdict::Unknown,
    }
}

pub fn classify_response(response: String) -> Classification {
    Classification {
        verdict: parse_verdict(&response),
        response,
    }
}
