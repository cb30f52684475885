use crate::elements::is_raw_text;
use crate::error::{SanitizeError, SanitizeResult};

/// Byte range of a token in the tokenized input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The source text covered by this span
    pub fn slice<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }
}

/// Attribute as written in the source, value not decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, lowercased
    pub name: String,
    /// Raw value, `None` for a bare attribute
    pub value: Option<String>,
}

/// Types of HTML tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Start tag
    StartTag {
        /// Tag name, lowercased
        name: String,
        /// Attributes in source order
        attributes: Vec<Attribute>,
        /// Self-closing flag
        self_closing: bool,
        span: Span,
    },
    /// End tag
    EndTag {
        /// Tag name, lowercased
        name: String,
        span: Span,
    },
    /// Character data
    Text { span: Span },
    /// Comments, doctypes, bogus markup and tags cut off by the end of input
    Comment { span: Span },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::StartTag { span, .. }
            | Token::EndTag { span, .. }
            | Token::Text { span }
            | Token::Comment { span } => *span,
        }
    }
}

/// Splits a document into tag, text and comment tokens.
///
/// Nothing here ever fails on malformed markup; the only error is a tag
/// carrying more attributes than allowed.
pub struct Tokenizer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    max_attributes: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer over `input`
    pub fn new(input: &'a str, max_attributes: usize) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            position: 0,
            max_attributes,
        }
    }

    /// Tokenize the whole input
    pub fn tokenize(mut self) -> SanitizeResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while self.position < self.bytes.len() {
            if self.starts_markup(self.position) {
                let token = self.parse_markup()?;
                let raw_text = match &token {
                    Token::StartTag { name, .. } if is_raw_text(name) => Some(name.clone()),
                    _ => None,
                };
                tokens.push(token);
                if let Some(name) = raw_text {
                    if let Some(text) = self.parse_raw_text(&name) {
                        tokens.push(text);
                    }
                }
            } else {
                tokens.push(self.parse_character_data());
            }
        }

        Ok(tokens)
    }

    /// Whether the `<` at `at` opens markup rather than being a literal
    fn starts_markup(&self, at: usize) -> bool {
        if self.bytes[at] != b'<' {
            return false;
        }
        match self.bytes.get(at + 1) {
            Some(b) if b.is_ascii_alphabetic() => true,
            Some(b'!') | Some(b'?') => true,
            Some(b'/') => self.bytes.get(at + 2).is_some_and(|b| b.is_ascii_alphabetic()),
            _ => false,
        }
    }

    fn parse_markup(&mut self) -> SanitizeResult<Token> {
        let start = self.position;
        match self.bytes[start + 1] {
            b'/' => Ok(self.parse_end_tag()),
            b'!' => Ok(self.parse_comment_or_doctype()),
            b'?' => Ok(self.parse_bogus_markup()),
            _ => self.parse_start_tag(),
        }
    }

    /// Parse a start tag
    fn parse_start_tag(&mut self) -> SanitizeResult<Token> {
        let start = self.position;
        self.position += 1;
        let name = self.read_name();

        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.bytes.get(self.position) {
                None => return Ok(self.cut_off(start)),
                Some(b'>') => {
                    self.position += 1;
                    break;
                }
                Some(b'/') => {
                    self.position += 1;
                    if self.bytes.get(self.position) == Some(&b'>') {
                        self_closing = true;
                        self.position += 1;
                        break;
                    }
                }
                Some(_) => match self.parse_attribute() {
                    Some(attribute) => {
                        attributes.push(attribute);
                        if attributes.len() > self.max_attributes {
                            return Err(SanitizeError::TooManyAttributes {
                                tag: name,
                                count: attributes.len(),
                            });
                        }
                    }
                    None => return Ok(self.cut_off(start)),
                },
            }
        }

        // The self-closing flag means nothing on a raw text element.
        if is_raw_text(&name) {
            self_closing = false;
        }

        Ok(Token::StartTag {
            name,
            attributes,
            self_closing,
            span: Span::new(start, self.position),
        })
    }

    /// Parse an end tag
    fn parse_end_tag(&mut self) -> Token {
        let start = self.position;
        self.position += 2;
        let name = self.read_name();

        // Anything between the name and '>' is ignored
        match self.input[self.position..].find('>') {
            Some(offset) => {
                self.position += offset + 1;
                Token::EndTag {
                    name,
                    span: Span::new(start, self.position),
                }
            }
            None => self.cut_off(start),
        }
    }

    /// Parse a comment, a doctype or other `<!` markup
    fn parse_comment_or_doctype(&mut self) -> Token {
        let start = self.position;
        let rest = &self.input[start..];

        let end = if let Some(body) = rest.strip_prefix("<!--") {
            if body.starts_with('>') {
                start + 5
            } else if body.starts_with("->") {
                start + 6
            } else {
                match body.find("-->") {
                    Some(offset) => start + 4 + offset + 3,
                    None => self.bytes.len(),
                }
            }
        } else {
            match rest.find('>') {
                Some(offset) => start + offset + 1,
                None => self.bytes.len(),
            }
        };

        self.position = end;
        Token::Comment { span: Span::new(start, end) }
    }

    /// Parse a processing instruction or other bogus `<?` markup
    fn parse_bogus_markup(&mut self) -> Token {
        let start = self.position;
        self.position = match self.input[start..].find('>') {
            Some(offset) => start + offset + 1,
            None => self.bytes.len(),
        };
        Token::Comment { span: Span::new(start, self.position) }
    }

    /// Parse an attribute; `None` when the input ends inside it
    fn parse_attribute(&mut self) -> Option<Attribute> {
        let name_start = self.position;
        // A leading '=' belongs to the name
        if self.bytes[self.position] == b'=' {
            self.position += 1;
        }
        while let Some(&b) = self.bytes.get(self.position) {
            if b.is_ascii_whitespace() || b == b'=' || b == b'>' || b == b'/' {
                break;
            }
            self.position += 1;
        }
        let name = self.input[name_start..self.position].to_ascii_lowercase();

        let after_name = self.position;
        self.skip_whitespace();
        if self.bytes.get(self.position) != Some(&b'=') {
            self.position = after_name;
            return Some(Attribute { name, value: None });
        }
        self.position += 1;
        self.skip_whitespace();

        let value = match *self.bytes.get(self.position)? {
            quote @ (b'"' | b'\'') => {
                let value_start = self.position + 1;
                let offset = self.input[value_start..].find(quote as char)?;
                self.position = value_start + offset + 1;
                &self.input[value_start..value_start + offset]
            }
            _ => {
                let value_start = self.position;
                while let Some(&b) = self.bytes.get(self.position) {
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    self.position += 1;
                }
                &self.input[value_start..self.position]
            }
        };

        Some(Attribute {
            name,
            value: Some(value.to_string()),
        })
    }

    /// Content of a raw text element, up to its closing tag
    fn parse_raw_text(&mut self, name: &str) -> Option<Token> {
        let start = self.position;
        let end = if name == "plaintext" {
            self.bytes.len()
        } else {
            find_raw_text_close(self.bytes, start, name).unwrap_or(self.bytes.len())
        };
        self.position = end;
        (end > start).then(|| Token::Text { span: Span::new(start, end) })
    }

    /// Parse character data up to the next markup
    fn parse_character_data(&mut self) -> Token {
        let start = self.position;
        let mut end = self.bytes.len();
        let mut at = start + 1;
        while let Some(offset) = self.bytes[at..].iter().position(|&b| b == b'<') {
            at += offset;
            if self.starts_markup(at) {
                end = at;
                break;
            }
            at += 1;
        }
        self.position = end;
        Token::Text { span: Span::new(start, end) }
    }

    /// A tag the input ends inside of
    fn cut_off(&mut self, start: usize) -> Token {
        self.position = self.bytes.len();
        Token::Comment {
            span: Span::new(start, self.position),
        }
    }

    fn read_name(&mut self) -> String {
        let name_start = self.position;
        while let Some(&b) = self.bytes.get(self.position) {
            if b.is_ascii_whitespace() || b == b'/' || b == b'>' {
                break;
            }
            self.position += 1;
        }
        self.input[name_start..self.position].to_ascii_lowercase()
    }

    fn skip_whitespace(&mut self) {
        while self.bytes.get(self.position).is_some_and(|b| b.is_ascii_whitespace()) {
            self.position += 1;
        }
    }
}

/// Find `</name` followed by whitespace, `/`, `>` or the end of input.
fn find_raw_text_close(bytes: &[u8], from: usize, name: &str) -> Option<usize> {
    let name = name.as_bytes();
    let mut at = from;
    while at + 2 + name.len() <= bytes.len() {
        if bytes[at] == b'<' && bytes[at + 1] == b'/' {
            let candidate = &bytes[at + 2..at + 2 + name.len()];
            if candidate.eq_ignore_ascii_case(name) {
                match bytes.get(at + 2 + name.len()) {
                    None => return Some(at),
                    Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => return Some(at),
                    _ => {}
                }
            }
        }
        at += 1;
    }
    None
}
