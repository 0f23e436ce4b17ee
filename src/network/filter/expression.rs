use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Errors that can occur during filter validation
///
/// These errors are returned when a filter string has syntax issues
/// or contains invalid values such as out-of-range port numbers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Error for invalid filter syntax
    #[error("Invalid filter syntax: {0}")]
    InvalidSyntax(String),

    /// Error for invalid port numbers in filters
    #[error("Invalid port number detected in filter: {0}")]
    InvalidPort(String),
}

lazy_static! {
    static ref PORT_PATTERN: Regex = Regex::new(
        r"(?i)\b(?:(?:tcp|udp)\.(?:SrcPort|DstPort)|localPort|remotePort)\s*(?:==|!=|<=|>=|=|<|>)\s*(\d+)\b"
    )
    .expect("port pattern is a valid regex");
    static ref CONTRADICTION_PATTERN: Regex =
        Regex::new(r"(?i)\b(?:outbound\s*(?:and|&&)\s*inbound|inbound\s*(?:and|&&)\s*outbound)\b")
            .expect("direction pattern is a valid regex");
}

const FILTER_DOCS: &str = "https://reqrypt.org/windivert-doc.html#filter_language";

/// Validates a filter and adds a documentation link on syntax errors
///
/// # Arguments
///
/// * `filter` - The filter string to validate
///
/// # Returns
///
/// * `Ok(String)` - The validated filter string
/// * `Err(FilterError)` - Error with detailed message including documentation link
pub fn validate_filter_with_docs(filter: &str) -> Result<String, FilterError> {
    match validate_filter(filter) {
        Err(FilterError::InvalidSyntax(msg)) => Err(FilterError::InvalidSyntax(format!(
            "{}\n\nFor more details about the filter syntax, see the filter language documentation: {}",
            msg, FILTER_DOCS
        ))),
        other => other,
    }
}

/// Checks a filter string for mistakes that can be caught without the driver
///
/// Rejects empty expressions, unbalanced parentheses, the contradictory
/// `outbound and inbound`, and port literals outside 0-65535. Full syntax
/// checking is left to the driver's compiler.
///
/// # Arguments
///
/// * `filter` - The filter string to validate
///
/// # Returns
///
/// * `Ok(String)` - The trimmed filter string
/// * `Err(FilterError)` - Detailed error message if validation fails
pub fn validate_filter(filter: &str) -> Result<String, FilterError> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(FilterError::InvalidSyntax("filter is empty".into()));
    }

    let mut depth = 0i32;
    for (pos, ch) in trimmed.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(FilterError::InvalidSyntax(format!(
                        "unexpected ')' at position {}",
                        pos
                    )));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(FilterError::InvalidSyntax("unclosed '('".into()));
    }

    if CONTRADICTION_PATTERN.is_match(trimmed) {
        return Err(FilterError::InvalidSyntax(
            "'outbound and inbound' can never match".into(),
        ));
    }

    for cap in PORT_PATTERN.captures_iter(trimmed) {
        if let Some(port_str) = cap.get(1) {
            let port_str = port_str.as_str();
            port_str.parse::<u16>().map_err(|_| {
                FilterError::InvalidPort(format!(
                    "Port number {} is out of range (0-65535)",
                    port_str
                ))
            })?;
        }
    }

    Ok(trimmed.to_string())
}
