//! Movetext tokenizer and variation parser.
//!
//! Turns linear movetext such as `1. e4 e5 (1... c5 2. Nf3) 2. Nf3 *` into a list of
//! [`MoveToken`]s for the main line. Each token may own alternative sequences that
//! branch from the position *before* the token is played.
//!
//! Nesting is handled with an explicit stack of open sequences, so the depth of
//! the input never translates into call-stack depth.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::Serialize;
use shakmaty::san::SanPlus;

use crate::error::{Error, Result};

/// Maximum nesting of variation brackets accepted in a single movetext.
pub const MAX_VARIATION_DEPTH: usize = 64;

lazy_static! {
    static ref MOVE_NUMBER: Regex = Regex::new(r"^(\d+)(\.+)").unwrap();
    static ref GLYPHS: Regex = Regex::new(r"[!?]+$").unwrap();
}

/// Lexical unit of movetext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Token<'a> {
    MoveNumber(u32),
    San(&'a str),
    Comment(&'a str),
    Nag(&'a str),
    StartVariation,
    EndVariation,
    Result(&'a str),
}

/// Parsed move together with its annotations and the alternatives to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveToken {
    pub san: String,
    pub comments: Vec<String>,
    pub variations: Vec<Vec<MoveToken>>,
}

impl MoveToken {
    pub fn new(san: impl Into<String>) -> Self {
        Self {
            san: san.into(),
            comments: Vec::new(),
            variations: Vec::new(),
        }
    }

    /// Comment text joined the way it is shown to the trainee.
    pub fn comment(&self) -> Option<String> {
        if self.comments.is_empty() {
            None
        } else {
            Some(self.comments.join(" "))
        }
    }
}

fn is_result(word: &str) -> bool {
    matches!(word, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// Split movetext into tokens.
///
/// Tag pairs (`[Event "..."]`) and `;` rest-of-line comments are skipped. An
/// unterminated brace comment is reported as an unbalanced bracket.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b if b.is_ascii_whitespace() => i += 1,
            b'(' => {
                tokens.push(Token::StartVariation);
                i += 1;
            }
            b')' => {
                tokens.push(Token::EndVariation);
                i += 1;
            }
            b'{' => {
                let end = input[i + 1..]
                    .find('}')
                    .ok_or(Error::UnbalancedVariation)?;
                tokens.push(Token::Comment(input[i + 1..i + 1 + end].trim()));
                i += end + 2;
            }
            b'[' => {
                let end = input[i..].find(']').ok_or(Error::UnbalancedVariation)?;
                i += end + 1;
            }
            b';' => {
                i = input[i..].find('\n').map_or(bytes.len(), |end| i + end + 1);
            }
            b'}' | b']' => return Err(Error::UnbalancedVariation),
            _ => {
                let end = input[i..]
                    .find(|c: char| c.is_ascii_whitespace() || "(){};[]".contains(c))
                    .map_or(bytes.len(), |end| i + end);
                lex_word(&input[i..end], &mut tokens);
                i = end;
            }
        }
    }

    Ok(tokens)
}

fn lex_word<'a>(mut word: &'a str, tokens: &mut Vec<Token<'a>>) {
    if is_result(word) {
        tokens.push(Token::Result(word));
        return;
    }
    if word.starts_with('$') {
        tokens.push(Token::Nag(word));
        return;
    }
    // "12." / "12..." possibly glued to the move that follows ("1.e4")
    if let Some(caps) = MOVE_NUMBER.captures(word) {
        let whole = caps.get(0).map_or(0, |m| m.end());
        if let Ok(number) = caps[1].parse() {
            tokens.push(Token::MoveNumber(number));
        }
        word = &word[whole..];
        if word.is_empty() {
            return;
        }
    }
    tokens.push(Token::San(word));
}

/// Normalise a raw move word into something `SanPlus` accepts.
///
/// Strips move-quality glyphs (`!`, `?!`, ...) and accepts zero-castling.
fn normalize_san(word: &str) -> String {
    let word = GLYPHS.replace(word, "");
    match word.as_ref() {
        "0-0" => "O-O".to_string(),
        "0-0+" => "O-O+".to_string(),
        "0-0#" => "O-O#".to_string(),
        "0-0-0" => "O-O-O".to_string(),
        "0-0-0+" => "O-O-O+".to_string(),
        "0-0-0#" => "O-O-O#".to_string(),
        other => other.to_string(),
    }
}

#[derive(Default)]
struct OpenSequence {
    tokens: Vec<MoveToken>,
    leading_comments: Vec<String>,
}

/// Strict parse: any malformation is an error.
///
/// A missing trailing result marker is not a malformation. Anything after the
/// result marker is ignored.
pub fn try_parse_movetext(input: &str) -> Result<Vec<MoveToken>> {
    let mut stack = vec![OpenSequence::default()];

    for token in tokenize(input)? {
        let depth = stack.len();
        let Some(current) = stack.last_mut() else {
            return Err(Error::UnbalancedVariation);
        };
        match token {
            Token::MoveNumber(_) | Token::Nag(_) => {}
            Token::San(word) => {
                let san = normalize_san(word);
                if SanPlus::from_ascii(san.as_bytes()).is_err() {
                    return Err(Error::InvalidMoveToken(word.to_string()));
                }
                let mut token = MoveToken::new(san);
                token.comments = std::mem::take(&mut current.leading_comments);
                current.tokens.push(token);
            }
            Token::Comment(text) if !text.is_empty() => match current.tokens.last_mut() {
                Some(last) => last.comments.push(text.to_string()),
                None => current.leading_comments.push(text.to_string()),
            },
            Token::Comment(_) => {}
            Token::StartVariation => {
                if current.tokens.is_empty() {
                    return Err(Error::OrphanVariation);
                }
                if depth > MAX_VARIATION_DEPTH {
                    return Err(Error::VariationTooDeep(MAX_VARIATION_DEPTH));
                }
                stack.push(OpenSequence::default());
            }
            Token::EndVariation => {
                if depth == 1 {
                    return Err(Error::UnbalancedVariation);
                }
                let finished = stack.pop().ok_or(Error::UnbalancedVariation)?;
                let parent = stack
                    .last_mut()
                    .and_then(|s| s.tokens.last_mut())
                    .ok_or(Error::OrphanVariation)?;
                if !finished.tokens.is_empty() {
                    parent.variations.push(finished.tokens);
                }
            }
            Token::Result(_) => {
                if depth != 1 {
                    return Err(Error::UnbalancedVariation);
                }
                break;
            }
        }
    }

    if stack.len() != 1 {
        return Err(Error::UnbalancedVariation);
    }
    Ok(stack.pop().map(|s| s.tokens).unwrap_or_default())
}

/// Lenient parse used by everything that treats "no moves" as "invalid".
///
/// Malformed input is logged and yields an empty list.
pub fn parse_movetext(input: &str) -> Vec<MoveToken> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    match try_parse_movetext(input) {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("Rejecting movetext: {}", e);
            Vec::new()
        }
    }
}
