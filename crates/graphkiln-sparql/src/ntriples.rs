//! N-Triples parsing
//!
//! Serialization lives on [`Term::to_ntriples`]. This side reads what an
//! endpoint returns from `CONSTRUCT`: one statement per line, `#` comments,
//! and an optional fourth graph term when the store answers in N-Quads.

use crate::error::{SparqlError, SparqlResult};
use graphkiln_core::{Term, Triple, TripleSet};
use std::iter::Peekable;
use std::str::Chars;

/// Parse an N-Triples document into a set scoped to `graph_uri`
pub fn parse_ntriples(input: &str, graph_uri: &str) -> SparqlResult<TripleSet> {
    let mut set = TripleSet::new(graph_uri);
    for (number, line) in input.lines().enumerate() {
        if let Some(triple) = parse_line(line)
            .map_err(|reason| SparqlError::parse(format!("line {}: {}", number + 1, reason)))?
        {
            set.insert(triple);
        }
    }
    Ok(set)
}

/// Parse one line; `Ok(None)` for blank lines and comments
pub fn parse_line(line: &str) -> Result<Option<Triple>, String> {
    let mut cursor = Cursor {
        chars: line.chars().peekable(),
    };
    cursor.skip_ws();
    match cursor.chars.peek() {
        None | Some('#') => return Ok(None),
        _ => {}
    }

    let subject = cursor.term()?;
    let predicate = cursor.term()?;
    let object = cursor.term()?;

    cursor.skip_ws();
    if cursor.chars.peek() == Some(&'<') {
        // N-Quads graph label
        cursor.term()?;
        cursor.skip_ws();
    }
    if cursor.chars.next() != Some('.') {
        return Err("expected '.' after object".to_string());
    }
    cursor.skip_ws();
    match cursor.chars.peek() {
        None | Some('#') => Ok(Some(Triple::new(subject, predicate, object))),
        Some(c) => Err(format!("unexpected '{c}' after statement")),
    }
}

struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Cursor<'_> {
    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(' ' | '\t')) {
            self.chars.next();
        }
    }

    fn term(&mut self) -> Result<Term, String> {
        self.skip_ws();
        match self.chars.next() {
            Some('<') => Ok(Term::iri(self.iri_body()?)),
            Some('_') => {
                if self.chars.next() != Some(':') {
                    return Err("expected ':' in blank node".to_string());
                }
                let mut label = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    label.push(c);
                    self.chars.next();
                }
                // a label may not end with '.', which then terminates the statement
                if label.ends_with('.') {
                    return Err("blank node label must not end with '.'".to_string());
                }
                if label.is_empty() {
                    return Err("empty blank node label".to_string());
                }
                Ok(Term::blank(label))
            }
            Some('"') => self.literal(),
            Some(c) => Err(format!("unexpected '{c}' at start of term")),
            None => Err("unexpected end of line".to_string()),
        }
    }

    fn iri_body(&mut self) -> Result<String, String> {
        let mut iri = String::new();
        loop {
            match self.chars.next() {
                Some('>') => return Ok(iri),
                Some('\\') => iri.push(self.unicode_escape()?),
                Some(c) => iri.push(c),
                None => return Err("unterminated IRI".to_string()),
            }
        }
    }

    fn literal(&mut self) -> Result<Term, String> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('"') => break,
                Some('\\') => match self.chars.peek() {
                    Some('u' | 'U') => value.push(self.unicode_escape()?),
                    _ => {
                        let escaped = match self.chars.next() {
                            Some('t') => '\t',
                            Some('b') => '\u{08}',
                            Some('n') => '\n',
                            Some('r') => '\r',
                            Some('f') => '\u{0C}',
                            Some('"') => '"',
                            Some('\'') => '\'',
                            Some('\\') => '\\',
                            Some(c) => return Err(format!("invalid escape '\\{c}'")),
                            None => return Err("unterminated escape".to_string()),
                        };
                        value.push(escaped);
                    }
                },
                Some(c) => value.push(c),
                None => return Err("unterminated literal".to_string()),
            }
        }

        match self.chars.peek() {
            Some('@') => {
                self.chars.next();
                let mut lang = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        lang.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                if lang.is_empty() {
                    return Err("empty language tag".to_string());
                }
                Ok(Term::lang_literal(value, lang))
            }
            Some('^') => {
                self.chars.next();
                if self.chars.next() != Some('^') || self.chars.next() != Some('<') {
                    return Err("expected '^^<' before datatype".to_string());
                }
                Ok(Term::typed_literal(value, self.iri_body()?))
            }
            _ => Ok(Term::literal(value)),
        }
    }

    /// `\uXXXX` or `\UXXXXXXXX`, the backslash already consumed
    fn unicode_escape(&mut self) -> Result<char, String> {
        let width = match self.chars.next() {
            Some('u') => 4,
            Some('U') => 8,
            _ => return Err("invalid escape in IRI".to_string()),
        };
        let hex: String = self.chars.by_ref().take(width).collect();
        if hex.len() != width {
            return Err("truncated unicode escape".to_string());
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid unicode escape '{hex}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphkiln_core::triple::XSD_STRING;

    #[test]
    fn test_parses_what_core_serializes() {
        let triples = [
            Triple::new(
                Term::iri("urn:doc:d1"),
                Term::iri("http://purl.org/dc/terms/title"),
                Term::literal("say \"hi\"\n\tback\\slash"),
            ),
            Triple::new(
                Term::iri("urn:doc:d1"),
                Term::iri("urn:p:count"),
                Term::typed_literal("3", "http://www.w3.org/2001/XMLSchema#integer"),
            ),
            Triple::new(Term::iri("urn:doc:d1"), Term::iri("urn:p:label"), Term::lang_literal("Zürich", "de")),
        ];
        let document: String = triples.iter().map(|t| format!("{}\n", t.to_ntriples())).collect();

        let parsed = parse_ntriples(&document, "urn:g").unwrap();
        assert_eq!(parsed, TripleSet::from_triples("urn:g", triples));
    }

    #[test]
    fn test_comments_quads_and_escapes() {
        let document = "# dump\n\n<urn:a> <urn:p> \"caf\\u00E9\"^^<http://www.w3.org/2001/XMLSchema#string> <urn:g> .\n_:b0 <urn:p> <urn:b> . # trailing\n";
        let parsed = parse_ntriples(document, "urn:g").unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains(&Triple::new(Term::iri("urn:a"), Term::iri("urn:p"), Term::literal("café"))));
        assert!(parsed.contains(&Triple::new(Term::blank("b0"), Term::iri("urn:p"), Term::iri("urn:b"))));
        assert_eq!(Term::typed_literal("x", XSD_STRING), Term::literal("x"));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_ntriples("<urn:a> <urn:p> <urn:b> .\n<urn:a> <urn:p> \"open\n", "urn:g").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");

        assert!(parse_line("<urn:a> <urn:p> <urn:b>").is_err());
        assert!(parse_line("<urn:a> <urn:p> <urn:b> . extra").is_err());
    }
}
