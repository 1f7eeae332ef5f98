// SPDX-License-Identifier: GPL-2.0-or-later

//! `$Number$`-style filename templates, per `spec.md` §6: "exactly one
//! `$Number$` token is substituted by the sequence counter; any other
//! `$…$` is a configuration error."

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvalidSaveTemplateError {
    #[error("filename template has an unterminated '$' token: {0:?}")]
    UnbalancedDollar(String),

    #[error("unknown filename template token '${0}$', only $Number$ is supported")]
    UnknownToken(String),

    #[error("filename template must contain a $Number$ token: {0:?}")]
    MissingNumberToken(String),

    #[error("filename template must contain exactly one $Number$ token: {0:?}")]
    MultipleNumberTokens(String),
}

/// A parsed, validated filename template. Rendering substitutes the single
/// `$Number$` token with the sequence counter.
pub struct SaveTemplate {
    prefix: String,
    suffix: String,
}

impl SaveTemplate {
    pub fn parse(template: &str) -> Result<Self, InvalidSaveTemplateError> {
        let parts: Vec<&str> = template.split('$').collect();
        if parts.len() % 2 == 0 {
            return Err(InvalidSaveTemplateError::UnbalancedDollar(template.to_owned()));
        }

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut number_token_seen = false;
        for (i, part) in parts.iter().enumerate() {
            if i % 2 == 1 {
                if *part != "Number" {
                    return Err(InvalidSaveTemplateError::UnknownToken((*part).to_owned()));
                }
                if number_token_seen {
                    return Err(InvalidSaveTemplateError::MultipleNumberTokens(
                        template.to_owned(),
                    ));
                }
                number_token_seen = true;
            } else if number_token_seen {
                suffix.push_str(part);
            } else {
                prefix.push_str(part);
            }
        }

        if !number_token_seen {
            return Err(InvalidSaveTemplateError::MissingNumberToken(
                template.to_owned(),
            ));
        }
        Ok(Self { prefix, suffix })
    }

    #[must_use]
    pub fn render(&self, counter: u64) -> String {
        format!("{}{}{}", self.prefix, counter, self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let template = SaveTemplate::parse("segment-$Number$.264").expect("valid template");
        assert_eq!(template.render(0), "segment-0.264");
        assert_eq!(template.render(42), "segment-42.264");
    }

    #[test]
    fn test_missing_number_token_is_an_error() {
        assert!(matches!(
            SaveTemplate::parse("segment.264"),
            Err(InvalidSaveTemplateError::MissingNumberToken(_))
        ));
    }

    #[test]
    fn test_unknown_token_is_an_error() {
        assert!(matches!(
            SaveTemplate::parse("$Track$-$Number$.264"),
            Err(InvalidSaveTemplateError::UnknownToken(t)) if t == "Track"
        ));
    }

    #[test]
    fn test_multiple_number_tokens_is_an_error() {
        assert!(matches!(
            SaveTemplate::parse("$Number$-$Number$.264"),
            Err(InvalidSaveTemplateError::MultipleNumberTokens(_))
        ));
    }

    #[test]
    fn test_unbalanced_dollar_is_an_error() {
        assert!(matches!(
            SaveTemplate::parse("segment-$Number.264"),
            Err(InvalidSaveTemplateError::UnbalancedDollar(_))
        ));
    }
}
