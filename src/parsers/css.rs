use crate::resolver;
use cssparser::{ParseError, Parser, ParserInput, Token};
use std::collections::HashMap;
use url::Url;

/// Selector (or at-rule prelude) to property-block text, in first-seen order.
///
/// Inserting an existing key replaces its block but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssRuleMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl CssRuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, selector: impl Into<String>, block: impl Into<String>) {
        let selector = selector.into();
        let block = block.into();
        match self.index.get(&selector) {
            Some(&i) => self.entries[i].1 = block,
            None => {
                self.index.insert(selector.clone(), self.entries.len());
                self.entries.push((selector, block));
            }
        }
    }

    pub fn get(&self, selector: &str) -> Option<&str> {
        self.index
            .get(selector)
            .map(|&i| self.entries[i].1.as_str())
    }

    /// Merges `other` into `self` with last-write-wins semantics.
    pub fn extend(&mut self, other: CssRuleMap) {
        for (selector, block) in other.entries {
            self.insert(selector, block);
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, b)| b.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flat text form: one `selector{block}` per line.
    pub fn to_css(&self) -> String {
        self.entries
            .iter()
            .map(|(selector, block)| format!("{}{{{}}}", selector, block))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A `prelude { body }` block at the top level of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBlock {
    pub prelude: String,
    pub body: String,
}

/// Top-level tokens of a stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    /// Raw `@import` targets, in source order.
    pub imports: Vec<String>,
    pub blocks: Vec<CssBlock>,
}

/// Splits stylesheet text into imports and top-level blocks.
///
/// Never fails: unbalanced input yields whatever could be recognized, with an
/// unterminated block running to the end of the text.
pub fn parse_stylesheet(text: &str) -> Stylesheet {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut sheet = Stylesheet::default();
    let mut prelude = String::new();

    loop {
        let start = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::Comment(_) | Token::CDO | Token::CDC => {}
            Token::Semicolon => {
                finish_statement(&mut sheet, &prelude);
                prelude.clear();
            }
            Token::CurlyBracketBlock => {
                let body = nested_text(&mut parser);
                let selector = collapse_whitespace(&prelude);
                if selector.is_empty() {
                    ::log::debug!("Skipping CSS block without a selector");
                } else {
                    sheet.blocks.push(CssBlock {
                        prelude: selector,
                        body: body.trim().to_string(),
                    });
                }
                prelude.clear();
            }
            // stray close brace
            Token::CloseCurlyBracket => prelude.clear(),
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                nested_text(&mut parser);
                prelude.push_str(parser.slice_from(start));
            }
            _ => prelude.push_str(parser.slice_from(start)),
        }
    }

    // A trailing `@import url(x)` without its semicolon.
    finish_statement(&mut sheet, &prelude);
    sheet
}

fn finish_statement(sheet: &mut Stylesheet, statement: &str) {
    let statement = statement.trim();
    if let Some(target) = parse_import(statement) {
        sheet.imports.push(target);
    } else if !statement.is_empty() {
        ::log::trace!("Dropping CSS statement: {}", statement);
    }
}

/// Consumes the block just opened and returns its raw inner text.
fn nested_text<'i>(parser: &mut Parser<'i, '_>) -> String {
    parser
        .parse_nested_block(|nested| {
            let start = nested.position();
            while nested.next_including_whitespace_and_comments().is_ok() {}
            Ok::<_, ParseError<'i, ()>>(nested.slice_from(start).to_string())
        })
        .unwrap_or_default()
}

/// Builds a rule map from the blocks of `sheet`, rewriting `url()` references
/// against `base`.
pub fn rule_map(sheet: &Stylesheet, base: &Url) -> CssRuleMap {
    let mut rules = CssRuleMap::new();
    for block in &sheet.blocks {
        rules.insert(block.prelude.clone(), rewrite_urls(&block.body, base));
    }
    rules
}

/// Returns the target of an `@import` statement, if `statement` is one.
pub fn parse_import(statement: &str) -> Option<String> {
    let mut input = ParserInput::new(statement);
    let mut parser = Parser::new(&mut input);

    match parser.next() {
        Ok(Token::AtKeyword(name)) if name.eq_ignore_ascii_case("import") => {}
        _ => return None,
    }

    let target = match parser.next().ok()?.clone() {
        Token::QuotedString(value) | Token::UnquotedUrl(value) => value.to_string(),
        Token::Function(name) if name.eq_ignore_ascii_case("url") => parser
            .parse_nested_block(|nested| {
                let value = nested.expect_string()?.to_string();
                Ok::<_, ParseError<'_, ()>>(value)
            })
            .ok()?,
        _ => return None,
    };

    let target = target.trim();
    (!target.is_empty()).then(|| target.to_string())
}

/// Re-emits the tokens of `parser` verbatim, recording every `url()` value in
/// `urls` and, when `base` is set, replacing relative ones with absolute URLs.
///
/// `in_url` is true directly inside a `url(` function, where a quoted string
/// is the URL value.
fn walk_urls<'i>(
    parser: &mut Parser<'i, '_>,
    in_url: bool,
    base: Option<&Url>,
    urls: &mut Vec<String>,
) -> String {
    let mut out = String::new();

    loop {
        let start = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let raw = parser.slice_from(start);
        let opens_url =
            matches!(&token, Token::Function(name) if name.eq_ignore_ascii_case("url"));

        match token {
            Token::UnquotedUrl(value) => {
                let value = value.trim();
                if !value.is_empty() {
                    urls.push(value.to_string());
                }
                match base.and_then(|base| resolve_relative(value, base)) {
                    Some(resolved) => {
                        out.push_str(raw.get(..4).unwrap_or("url("));
                        out.push_str(&resolved);
                        out.push(')');
                    }
                    None => out.push_str(raw),
                }
            }
            Token::QuotedString(value) if in_url => {
                let value = value.trim();
                if !value.is_empty() {
                    urls.push(value.to_string());
                }
                match base.and_then(|base| resolve_relative(value, base)) {
                    Some(resolved) => {
                        let quote = raw.chars().next().unwrap_or('"');
                        out.push(quote);
                        out.push_str(&resolved);
                        out.push(quote);
                    }
                    None => out.push_str(raw),
                }
            }
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                out.push_str(raw);
                let nested = parser.parse_nested_block(|nested| {
                    let inner_start = nested.position();
                    let inner = walk_urls(nested, opens_url, base, urls);
                    Ok::<_, ParseError<'i, ()>>((inner, nested.slice_from(inner_start).len()))
                });
                let whole = parser.slice_from(start);
                match nested {
                    Ok((inner, inner_len)) => {
                        out.push_str(&inner);
                        // closing delimiter, absent when the block runs to the end
                        out.push_str(whole.get(raw.len() + inner_len..).unwrap_or(""));
                    }
                    Err(_) => out.push_str(whole.get(raw.len()..).unwrap_or("")),
                }
            }
            _ => out.push_str(raw),
        }
    }

    out
}

fn resolve_relative(value: &str, base: &Url) -> Option<String> {
    if value.is_empty() || resolver::is_absolute(value) {
        return None;
    }
    resolver::absolutize(value, base)
}

/// Every value referenced through `url(...)` in `text`, in order of appearance.
pub fn collect_urls(text: &str) -> Vec<String> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut urls = Vec::new();
    walk_urls(&mut parser, false, None, &mut urls);
    urls
}

/// Rewrites relative `url(...)` values in `text` to absolute URLs.
///
/// Only `url()` tokens are replaced; strings and other text that merely look
/// like a URL are left alone.
pub fn rewrite_urls(text: &str, base: &Url) -> String {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut urls = Vec::new();
    walk_urls(&mut parser, false, Some(base), &mut urls)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
