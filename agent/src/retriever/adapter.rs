use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

const URL_FIELD: &str = "URL";
const TEXT_FIELD: &str = "Clean-Text";

/// A single normalized search hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub href: String,
    pub title: String,
    pub body: String,
}

impl SearchResult {
    /// The title is the first line of the body.
    pub fn new(href: String, body: String) -> Self {
        let title = body
            .split_once('\n')
            .map_or(body.as_str(), |(first, _)| first)
            .to_string();

        Self { href, title, body }
    }
}

/// Decodes one element of the endpoint's `results` array.
pub fn decode_item(item: &Value) -> Result<SearchResult> {
    match item {
        Value::String(encoded) => decode_result(encoded),
        other => Err(Error::DecodeError(format!(
            "expected a base64 string, found {}",
            other
        ))),
    }
}

fn is_base64_symbol(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// Decodes a base64-wrapped `{"URL": .., "Clean-Text": ..}` payload.
///
/// Characters outside the base64 alphabet, such as the line breaks of wrapped
/// output, are skipped before decoding.
pub fn decode_result(encoded: &str) -> Result<SearchResult> {
    let symbols = encoded
        .chars()
        .filter(|c| is_base64_symbol(*c))
        .collect::<String>();

    let bytes = STANDARD
        .decode(symbols)
        .map_err(|e| Error::DecodeError(format!("invalid base64: {}", e)))?;

    let text = String::from_utf8(bytes)
        .map_err(|e| Error::DecodeError(format!("invalid utf-8: {}", e)))?;

    let payload: Map<String, Value> = serde_json::from_str(&text)
        .map_err(|e| Error::DecodeError(format!("invalid json payload: {}", e)))?;

    let href = match payload.get(URL_FIELD) {
        Some(Value::String(url)) => url.trim().to_string(),
        Some(_) => {
            return Err(Error::SchemaError(format!(
                "field {} must be a string",
                URL_FIELD
            )));
        }
        None => return Err(Error::SchemaError(format!("missing field {}", URL_FIELD))),
    };

    let body = match payload.get(TEXT_FIELD) {
        Some(Value::String(text)) => text.clone(),
        Some(_) => {
            return Err(Error::SchemaError(format!(
                "field {} must be a string",
                TEXT_FIELD
            )));
        }
        None => String::new(),
    };

    Ok(SearchResult::new(href, body))
}
