//! Pairs start and end tags before the filter walk.
//!
//! The filter needs to know, when it meets a start tag, whether the element
//! is ever closed and where its content ends. This pass answers that with a
//! single stack walk using the usual implicit end tag rules.

use crate::elements::{closes_implicitly, is_void};
use crate::error::{SanitizeError, SanitizeResult};
use crate::tokenizer::Token;

/// How an element opened by a start tag ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closing {
    /// By the end tag at this token index
    Explicit(usize),
    /// Implicitly, just before the token at this index (the token count for
    /// the end of input)
    Implicit(usize),
    /// Immediately: void element or self-closing tag
    Immediate,
}

/// Start/end tag pairing for one token stream
#[derive(Debug)]
pub struct Structure {
    closing: Vec<Option<Closing>>,
    matched_start: Vec<Option<usize>>,
    closes_before: Vec<Vec<usize>>,
}

impl Structure {
    /// Analyze `tokens`, failing when open elements nest deeper than `max_depth`.
    pub fn analyze(tokens: &[Token], max_depth: usize) -> SanitizeResult<Self> {
        let len = tokens.len();
        let mut structure = Structure {
            closing: vec![None; len],
            matched_start: vec![None; len],
            closes_before: vec![Vec::new(); len + 1],
        };
        let mut stack: Vec<(usize, &str)> = Vec::new();

        for (idx, token) in tokens.iter().enumerate() {
            match token {
                Token::StartTag { name, self_closing, .. } => {
                    while let Some(&(open_idx, open_name)) = stack.last() {
                        if !closes_implicitly(open_name, name) {
                            break;
                        }
                        stack.pop();
                        structure.close_implicitly(open_idx, idx);
                    }

                    if *self_closing || is_void(name) {
                        structure.closing[idx] = Some(Closing::Immediate);
                    } else {
                        if stack.len() >= max_depth {
                            return Err(SanitizeError::NestingTooDeep(stack.len() + 1));
                        }
                        stack.push((idx, name.as_str()));
                    }
                }
                Token::EndTag { name, .. } => {
                    let Some(pos) = stack.iter().rposition(|(_, open)| *open == name.as_str()) else {
                        continue;
                    };
                    while stack.len() > pos + 1 {
                        if let Some((open_idx, _)) = stack.pop() {
                            structure.close_implicitly(open_idx, idx);
                        }
                    }
                    if let Some((start_idx, _)) = stack.pop() {
                        structure.closing[start_idx] = Some(Closing::Explicit(idx));
                        structure.matched_start[idx] = Some(start_idx);
                    }
                }
                Token::Text { .. } | Token::Comment { .. } => {}
            }
        }

        while let Some((open_idx, _)) = stack.pop() {
            structure.close_implicitly(open_idx, len);
        }

        Ok(structure)
    }

    fn close_implicitly(&mut self, start_idx: usize, before: usize) {
        self.closing[start_idx] = Some(Closing::Implicit(before));
        self.closes_before[before].push(start_idx);
    }

    /// Closing of the start tag at `idx`; `None` for other tokens.
    pub fn closing(&self, idx: usize) -> Option<Closing> {
        self.closing.get(idx).copied().flatten()
    }

    /// Start tag matched by the end tag at `idx`.
    pub fn matched_start(&self, idx: usize) -> Option<usize> {
        self.matched_start.get(idx).copied().flatten()
    }

    /// Start tags implicitly closed just before token `idx`, innermost first.
    pub fn closes_before(&self, idx: usize) -> &[usize] {
        self.closes_before.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Token index where the content of the start tag at `idx` stops.
    ///
    /// Skipping to this index drops the element together with its content.
    pub fn region_end(&self, idx: usize) -> usize {
        match self.closing(idx) {
            Some(Closing::Explicit(end)) => end + 1,
            Some(Closing::Implicit(before)) => before,
            Some(Closing::Immediate) | None => idx + 1,
        }
    }
}
