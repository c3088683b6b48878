//! Command handlers

pub mod config;
pub mod find;
pub mod image;
pub mod status;
pub mod sync;

use anyhow::Result;

use posit_core::AttributeValue;

/// Parse a `name=value` argument; integer-looking values become integers
pub fn parse_attribute(input: &str) -> std::result::Result<(String, AttributeValue), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", input))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("attribute name is empty in '{}'", input));
    }
    Ok((name.to_string(), AttributeValue::parse(value)))
}

/// Ask a yes/no question on stdin
pub fn confirm(prompt: &str) -> Result<bool> {
    use std::io::{self, Write};

    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute_text() {
        let (name, value) = parse_attribute("name=Bull frog").unwrap();
        assert_eq!(name, "name");
        assert_eq!(value, AttributeValue::Text("Bull frog".to_string()));
    }

    #[test]
    fn test_parse_attribute_integer() {
        let (name, value) = parse_attribute("legs=4").unwrap();
        assert_eq!(name, "legs");
        assert_eq!(value, AttributeValue::Integer(4));
    }

    #[test]
    fn test_parse_attribute_keeps_later_equals() {
        let (_, value) = parse_attribute("note=a=b").unwrap();
        assert_eq!(value, AttributeValue::Text("a=b".to_string()));
    }

    #[test]
    fn test_parse_attribute_rejects_malformed() {
        assert!(parse_attribute("no-equals").is_err());
        assert!(parse_attribute("=value").is_err());
    }
}
