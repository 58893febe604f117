//! Forward-only HTML tokenizer.
//!
//! The tokenizer pulls bytes from a buffered reader and yields one [`Token`] at a
//! time. It never builds a tree and never looks back, so memory use is bounded
//! by the largest single token rather than by the size of the page.

use std::io::{self, BufRead, BufReader, Read};
use std::iter::FusedIterator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag(Tag),
    EndTag(String),
    Text(String),
    Comment(String),
    Doctype(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub self_closing: bool,
}

impl Tag {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

pub struct Tokenizer<R> {
    reader: BufReader<R>,
    raw_text: Option<String>,
    pending: Option<Token>,
    done: bool,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self::from_buffered(BufReader::new(reader))
    }

    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self::from_buffered(BufReader::with_capacity(capacity, reader))
    }

    fn from_buffered(reader: BufReader<R>) -> Self {
        Self {
            reader,
            raw_text: None,
            pending: None,
            done: false,
        }
    }

    fn fill(&mut self) -> io::Result<&[u8]> {
        loop {
            match self.reader.fill_buf() {
                Ok(_) => return Ok(self.reader.buffer()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.fill()?.first().copied())
    }

    fn bump(&mut self) -> io::Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.reader.consume(1);
        }
        Ok(byte)
    }

    fn next_token(&mut self) -> io::Result<Option<Token>> {
        if let Some(token) = self.pending.take() {
            return Ok(Some(token));
        }

        if let Some(name) = self.raw_text.take() {
            let text = self.read_raw_text(&name)?;
            if !text.is_empty() {
                return Ok(Some(Token::Text(text)));
            }
            if let Some(token) = self.pending.take() {
                return Ok(Some(token));
            }
        }

        match self.peek()? {
            None => Ok(None),
            Some(b'<') => {
                self.bump()?;
                self.read_markup()
            }
            Some(_) => {
                let mut bytes = Vec::new();
                self.read_until_lt(&mut bytes)?;
                Ok(Some(text_token(&bytes)))
            }
        }
    }

    /// Appends everything up to (not including) the next `<` or end of input.
    fn read_until_lt(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        loop {
            let buf = self.fill()?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'<') {
                Some(i) => {
                    out.extend_from_slice(&buf[..i]);
                    self.reader.consume(i);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    out.extend_from_slice(buf);
                    self.reader.consume(len);
                }
            }
        }
    }

    fn read_markup(&mut self) -> io::Result<Option<Token>> {
        match self.peek()? {
            // "<" at end of input
            None => Ok(Some(Token::Text("<".to_string()))),
            Some(b'!') => {
                self.bump()?;
                self.read_declaration().map(Some)
            }
            Some(b'?') => {
                let body = self.read_until_gt()?;
                Ok(Some(Token::Comment(body)))
            }
            Some(b'/') => {
                self.bump()?;
                match self.peek()? {
                    Some(b) if b.is_ascii_alphabetic() => {
                        let name = self.read_name()?;
                        self.read_until_gt()?;
                        Ok(Some(Token::EndTag(name)))
                    }
                    _ => {
                        let body = self.read_until_gt()?;
                        Ok(Some(Token::Comment(body)))
                    }
                }
            }
            Some(b) if b.is_ascii_alphabetic() => self.read_start_tag(),
            Some(_) => {
                let mut bytes = vec![b'<'];
                self.read_until_lt(&mut bytes)?;
                Ok(Some(text_token(&bytes)))
            }
        }
    }

    fn read_declaration(&mut self) -> io::Result<Token> {
        if self.peek()? == Some(b'-') {
            self.bump()?;
            if self.peek()? == Some(b'-') {
                self.bump()?;
                return self.read_comment();
            }
        }
        let body = self.read_until_gt()?;
        let trimmed = body.trim_start_matches('-');
        match trimmed.get(..7) {
            Some(keyword) if keyword.eq_ignore_ascii_case("doctype") => {
                Ok(Token::Doctype(trimmed[7..].trim().to_string()))
            }
            _ => Ok(Token::Comment(body)),
        }
    }

    fn read_comment(&mut self) -> io::Result<Token> {
        let mut bytes = Vec::new();
        while let Some(b) = self.bump()? {
            bytes.push(b);
            if bytes.ends_with(b"-->") {
                bytes.truncate(bytes.len() - 3);
                break;
            }
        }
        Ok(Token::Comment(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_start_tag(&mut self) -> io::Result<Option<Token>> {
        let mut tag = Tag {
            name: self.read_name()?,
            ..Tag::default()
        };

        loop {
            self.skip_whitespace()?;
            match self.peek()? {
                // unterminated tag at end of input
                None => return Ok(None),
                Some(b'>') => {
                    self.bump()?;
                    break;
                }
                Some(b'/') => {
                    self.bump()?;
                    if self.peek()? == Some(b'>') {
                        self.bump()?;
                        tag.self_closing = true;
                        break;
                    }
                }
                Some(_) => {
                    let (key, value) = self.read_attribute()?;
                    if !key.is_empty() && tag.attr(&key).is_none() {
                        tag.attrs.push((key, value));
                    }
                }
            }
        }

        if !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
            self.raw_text = Some(tag.name.clone());
        }
        Ok(Some(Token::StartTag(tag)))
    }

    fn read_attribute(&mut self) -> io::Result<(String, String)> {
        let mut key = Vec::new();
        while let Some(b) = self.peek()? {
            if b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/') {
                break;
            }
            key.push(b);
            self.bump()?;
        }
        if key.is_empty() {
            // stray '='
            self.bump()?;
            return Ok((String::new(), String::new()));
        }
        let key = String::from_utf8_lossy(&key).to_ascii_lowercase();

        self.skip_whitespace()?;
        if self.peek()? != Some(b'=') {
            return Ok((key, String::new()));
        }
        self.bump()?;
        self.skip_whitespace()?;

        let mut value = Vec::new();
        match self.peek()? {
            Some(quote @ (b'"' | b'\'')) => {
                self.bump()?;
                while let Some(b) = self.bump()? {
                    if b == quote {
                        break;
                    }
                    value.push(b);
                }
            }
            _ => {
                while let Some(b) = self.peek()? {
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    value.push(b);
                    self.bump()?;
                }
            }
        }
        Ok((key, decode_entities(&String::from_utf8_lossy(&value))))
    }

    fn read_name(&mut self) -> io::Result<String> {
        let mut name = Vec::new();
        while let Some(b) = self.peek()? {
            if b.is_ascii_whitespace() || b == b'/' || b == b'>' {
                break;
            }
            name.push(b);
            self.bump()?;
        }
        Ok(String::from_utf8_lossy(&name).to_ascii_lowercase())
    }

    /// Consumes through the next `>` and returns what came before it.
    fn read_until_gt(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        while let Some(b) = self.bump()? {
            if b == b'>' {
                break;
            }
            bytes.push(b);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn skip_whitespace(&mut self) -> io::Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.bump()?;
        }
        Ok(())
    }

    /// Reads raw element content up to `</name`, queueing the end tag.
    fn read_raw_text(&mut self, name: &str) -> io::Result<String> {
        let closing = format!("</{name}");
        let mut bytes = Vec::new();
        while let Some(b) = self.bump()? {
            bytes.push(b);
            if bytes.len() >= closing.len()
                && bytes[bytes.len() - closing.len()..].eq_ignore_ascii_case(closing.as_bytes())
            {
                bytes.truncate(bytes.len() - closing.len());
                self.read_until_gt()?;
                self.pending = Some(Token::EndTag(name.to_string()));
                break;
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<R: Read> Iterator for Tokenizer<R> {
    type Item = io::Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for Tokenizer<R> {}

fn text_token(bytes: &[u8]) -> Token {
    Token::Text(decode_entities(&String::from_utf8_lossy(bytes)))
}

/// Decodes the common named entities and numeric character references.
/// Unknown entities are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let decoded = rest[1..]
            .find(';')
            .filter(|&end| end > 0 && end <= 10)
            .and_then(|end| decode_entity(&rest[1..=end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 2..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
