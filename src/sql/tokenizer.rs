//! Hand-written tokenizer for the SQL dialect (spec.md §4.7, grounded on
//! `original_source/backend/parser/Tokenizer.go`): whitespace-separated
//! identifiers/keywords, quoted strings, and a fixed symbol set. Extended
//! with the two-character `<=`/`>=` operators the distilled grammar adds.

use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;

pub struct Tokenizer {
    bytes: Vec<u8>,
    pos: usize,
    current: Option<String>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Tokenizer {
        Tokenizer { bytes: input.as_bytes().to_vec(), pos: 0, current: None }
    }

    /// Returns the current token without consuming it. An empty string
    /// marks end of input.
    pub fn peek(&mut self) -> RsqlResult<String> {
        if self.current.is_none() {
            self.current = Some(self.next_token()?);
        }
        Ok(self.current.clone().unwrap())
    }

    /// Consumes the current token so the next `peek` advances.
    pub fn pop(&mut self) {
        self.current = None;
    }

    fn peek_byte(&self) -> u8 {
        *self.bytes.get(self.pos).unwrap_or(&0)
    }

    fn pop_byte(&mut self) {
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> RsqlResult<String> {
        while is_blank(self.peek_byte()) {
            self.pop_byte();
        }
        let b = self.peek_byte();
        if b == 0 {
            return Ok(String::new());
        }
        if b == b'<' || b == b'>' {
            self.pop_byte();
            if self.peek_byte() == b'=' {
                self.pop_byte();
                return Ok(if b == b'<' { "<=".to_string() } else { ">=".to_string() });
            }
            return Ok((b as char).to_string());
        }
        if is_symbol(b) {
            self.pop_byte();
            return Ok((b as char).to_string());
        }
        if b == b'"' || b == b'\'' {
            return self.next_quoted();
        }
        if is_alpha(b) || is_digit(b) {
            return Ok(self.next_word());
        }
        Err(RsqlError::InvalidCommand(format!("unexpected character '{}'", b as char)))
    }

    fn next_word(&mut self) -> String {
        let mut s = String::new();
        loop {
            let b = self.peek_byte();
            if b == 0 || !(is_alpha(b) || is_digit(b) || b == b'_' || b == b'-' || b == b'.') {
                break;
            }
            s.push(b as char);
            self.pop_byte();
        }
        s
    }

    fn next_quoted(&mut self) -> RsqlResult<String> {
        let quote = self.peek_byte();
        self.pop_byte();
        let mut s = String::new();
        loop {
            let b = self.peek_byte();
            if b == 0 {
                return Err(RsqlError::InvalidCommand("unterminated quoted string".to_string()));
            }
            if b == quote {
                self.pop_byte();
                break;
            }
            s.push(b as char);
            self.pop_byte();
        }
        Ok(s)
    }
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn is_alpha(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_symbol(b: u8) -> bool {
    matches!(b, b'=' | b'*' | b',' | b'(' | b')')
}

fn is_blank(b: u8) -> bool {
    matches!(b, b'\n' | b' ' | b'\t' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<String> {
        let mut t = Tokenizer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = t.peek().unwrap();
            if tok.is_empty() {
                break;
            }
            out.push(tok);
            t.pop();
        }
        out
    }

    #[test]
    fn splits_keywords_and_symbols() {
        assert_eq!(
            tokens("select * from t where id >= 5"),
            vec!["select", "*", "from", "t", "where", "id", ">=", "5"]
        );
    }

    #[test]
    fn distinguishes_lt_from_le() {
        assert_eq!(tokens("a < 1"), vec!["a", "<", "1"]);
        assert_eq!(tokens("a <= 1"), vec!["a", "<=", "1"]);
    }

    #[test]
    fn quoted_strings_keep_their_contents() {
        assert_eq!(tokens("insert into t values 'hello world'"), vec!["insert", "into", "t", "values", "hello world"]);
    }

    #[test]
    fn peek_is_idempotent_until_pop() {
        let mut t = Tokenizer::new("create table");
        assert_eq!(t.peek().unwrap(), "create");
        assert_eq!(t.peek().unwrap(), "create");
        t.pop();
        assert_eq!(t.peek().unwrap(), "table");
    }

    #[test]
    fn empty_input_yields_empty_token() {
        assert_eq!(tokens(""), Vec::<String>::new());
    }
}
