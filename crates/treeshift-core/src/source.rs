//! Lightweight source lexer and outline parser.
//!
//! Source units are plain text. The reorganization engine only needs their
//! outline (namespace declaration, imports, top-level types and members, each
//! with a byte range) and the identifier chains of the body, so this module
//! implements a tolerant tokenizer rather than a full grammar: unknown
//! constructs are skipped, never rejected.

use serde::{Deserialize, Serialize};

use crate::node::TextRange;

/// Keywords accepted in front of a namespace declaration.
const NAMESPACE_KEYWORDS: &[&str] = &["package", "namespace"];

const TYPE_KEYWORDS: &[&str] = &["class", "interface", "enum", "record"];

const MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "final",
    "abstract",
    "native",
    "synchronized",
    "transient",
    "volatile",
    "strictfp",
    "default",
    "sealed",
    "non",
];

/// Lexical token class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Dot,
    Star,
    Semi,
    Comma,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Eq,
    At,
    Lt,
    Gt,
    StringLit,
    CharLit,
    Other,
}

/// A token and its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: TextRange,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

/// Check whether a byte may continue an identifier.
pub fn is_ident_part(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Split source text into tokens, dropping whitespace and comments.
pub fn tokenize(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            continue;
        }

        let kind = if is_ident_start(b) {
            while i < bytes.len() && is_ident_part(bytes[i]) {
                i += 1;
            }
            TokenKind::Ident
        } else if b.is_ascii_digit() {
            while i < bytes.len() && (is_ident_part(bytes[i]) || bytes[i] == b'.') {
                i += 1;
            }
            TokenKind::Other
        } else if b == b'"' {
            if bytes[i..].starts_with(b"\"\"\"") {
                i += 3;
                while i < bytes.len() && !bytes[i..].starts_with(b"\"\"\"") {
                    i += 1;
                }
                i = (i + 3).min(bytes.len());
            } else {
                i = skip_quoted(bytes, i, b'"');
            }
            TokenKind::StringLit
        } else if b == b'\'' {
            i = skip_quoted(bytes, i, b'\'');
            TokenKind::CharLit
        } else {
            i += 1;
            match b {
                b'.' => TokenKind::Dot,
                b'*' => TokenKind::Star,
                b';' => TokenKind::Semi,
                b',' => TokenKind::Comma,
                b'{' => TokenKind::LBrace,
                b'}' => TokenKind::RBrace,
                b'(' => TokenKind::LParen,
                b')' => TokenKind::RParen,
                b'=' => TokenKind::Eq,
                b'@' => TokenKind::At,
                b'<' => TokenKind::Lt,
                b'>' => TokenKind::Gt,
                _ => {
                    // Keep multi-byte characters whole.
                    while i < bytes.len() && !text.is_char_boundary(i) {
                        i += 1;
                    }
                    TokenKind::Other
                }
            }
        };

        tokens.push(Token {
            kind,
            range: TextRange::between(start, i),
        });
    }

    tokens
}

/// Skip a quoted literal starting at `start`; returns the offset after it.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// A dotted sequence of identifiers, e.g. `p.q.A` in `p.q.A.run()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentChain {
    /// Range of every identifier in the chain.
    pub segments: Vec<TextRange>,
    /// Chain ends in `.*`.
    pub on_demand: bool,
    /// The chain continues a member access (`expr.a.b`).
    pub after_dot: bool,
    /// The chain names a declaration (`class A`).
    pub declaration: bool,
}

impl IdentChain {
    /// Range from the first to the last identifier.
    pub fn range(&self) -> TextRange {
        self.prefix_range(self.segments.len())
    }

    /// Range covering the first `count` identifiers.
    pub fn prefix_range(&self, count: usize) -> TextRange {
        let first = self.segments[0];
        let last = self.segments[count.clamp(1, self.segments.len()) - 1];
        TextRange::between(first.offset, last.end())
    }

    /// Dotted text of the first `count` identifiers, without whitespace.
    pub fn prefix_text(&self, text: &str, count: usize) -> String {
        self.segments[..count.min(self.segments.len())]
            .iter()
            .map(|r| &text[r.offset..r.end()])
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Collect the identifier chains of a token stream.
pub fn identifier_chains(text: &str, tokens: &[Token]) -> Vec<IdentChain> {
    let mut chains = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i].kind != TokenKind::Ident {
            i += 1;
            continue;
        }

        let after_dot = i > 0 && tokens[i - 1].kind == TokenKind::Dot;
        let declaration = i > 0 && {
            let prev = tokens[i - 1];
            prev.kind == TokenKind::Ident
                && TYPE_KEYWORDS.contains(&&text[prev.range.offset..prev.range.end()])
        };
        let mut segments = vec![tokens[i].range];
        let mut on_demand = false;
        i += 1;

        while i + 1 < tokens.len() && tokens[i].kind == TokenKind::Dot {
            match tokens[i + 1].kind {
                TokenKind::Ident => {
                    segments.push(tokens[i + 1].range);
                    i += 2;
                }
                TokenKind::Star => {
                    on_demand = true;
                    i += 2;
                    break;
                }
                _ => break,
            }
        }

        chains.push(IdentChain {
            segments,
            on_demand,
            after_dot,
            declaration,
        });
    }

    chains
}

/// Namespace declaration of a unit (`package p.q;`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub name: String,
    pub keyword: String,
    /// Whole statement including the semicolon.
    pub range: TextRange,
    /// The dotted name only.
    pub name_range: TextRange,
}

/// Import declaration of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Imported name without a trailing `.*`.
    pub name: String,
    pub is_static: bool,
    pub on_demand: bool,
    /// Whole statement including the semicolon.
    pub range: TextRange,
    /// The dotted name only (without `.*`).
    pub name_range: TextRange,
}

impl ImportDecl {
    /// Name shown to users and used as the symbol name (`p.*` for wildcards).
    pub fn display_name(&self) -> String {
        if self.on_demand {
            format!("{}.*", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Everything before the last segment (the namespace of a single-type
    /// import).
    pub fn qualifier(&self) -> &str {
        self.name.rsplit_once('.').map(|(q, _)| q).unwrap_or("")
    }
}

/// Member kinds found inside a type body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Type,
    Field { type_name: String },
    Method { parameters: usize, return_type: String },
    Initializer,
}

/// A member of a type body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDecl {
    pub name: String,
    pub kind: MemberKind,
    pub range: TextRange,
}

/// A top-level type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub range: TextRange,
    /// Offset of the closing brace of the body.
    pub body_end: usize,
    pub members: Vec<MemberDecl>,
}

/// Outline of a source unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutline {
    pub namespace: Option<NamespaceDecl>,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<TypeDecl>,
}

impl SourceOutline {
    /// Parse the outline of a source text.
    pub fn parse(text: &str) -> Self {
        let tokens = tokenize(text);
        OutlineParser {
            text,
            tokens: &tokens,
            pos: 0,
        }
        .parse()
    }

    /// Offset where a new import should be inserted, and whether it needs a
    /// leading blank line.
    pub fn import_insertion_point(&self, text: &str) -> (usize, bool) {
        if let Some(last) = self.imports.last() {
            (line_end(text, last.range.end()), false)
        } else if let Some(ns) = &self.namespace {
            (line_end(text, ns.range.end()), true)
        } else {
            (0, false)
        }
    }

    /// Find a top-level type by name.
    pub fn find_type(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }
}

struct OutlineParser<'a> {
    text: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> OutlineParser<'a> {
    fn parse(mut self) -> SourceOutline {
        let mut outline = SourceOutline::default();

        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos];
            let word = self.word(self.pos);

            if token.kind == TokenKind::Ident
                && NAMESPACE_KEYWORDS.contains(&word)
                && outline.namespace.is_none()
                && outline.imports.is_empty()
                && outline.types.is_empty()
            {
                if let Some(decl) = self.parse_namespace() {
                    outline.namespace = Some(decl);
                    continue;
                }
            } else if token.kind == TokenKind::Ident && word == "import" {
                if let Some(decl) = self.parse_import() {
                    outline.imports.push(decl);
                    continue;
                }
            } else if let Some(decl) = self.parse_type() {
                outline.types.push(decl);
                continue;
            }

            self.pos += 1;
        }

        outline
    }

    fn word(&self, index: usize) -> &'a str {
        match self.tokens.get(index) {
            Some(t) if t.kind == TokenKind::Ident => &self.text[t.range.offset..t.range.end()],
            _ => "",
        }
    }

    fn kind(&self, index: usize) -> Option<TokenKind> {
        self.tokens.get(index).map(|t| t.kind)
    }

    /// Read `a.b.c` (optionally followed by `.*`) starting at `index`.
    fn qualified_name(&self, index: usize) -> Option<(String, TextRange, bool, usize)> {
        if self.kind(index) != Some(TokenKind::Ident) {
            return None;
        }
        let mut parts = vec![self.word(index)];
        let start = self.tokens[index].range.offset;
        let mut end = self.tokens[index].range.end();
        let mut i = index + 1;
        let mut on_demand = false;

        while self.kind(i) == Some(TokenKind::Dot) {
            match self.kind(i + 1) {
                Some(TokenKind::Ident) => {
                    parts.push(self.word(i + 1));
                    end = self.tokens[i + 1].range.end();
                    i += 2;
                }
                Some(TokenKind::Star) => {
                    on_demand = true;
                    i += 2;
                    break;
                }
                _ => break,
            }
        }

        Some((parts.join("."), TextRange::between(start, end), on_demand, i))
    }

    /// End offset of a statement: the semicolon if present at `index`.
    fn statement_end(&mut self, index: usize, fallback: usize) -> usize {
        if self.kind(index) == Some(TokenKind::Semi) {
            self.pos = index + 1;
            self.tokens[index].range.end()
        } else {
            self.pos = index;
            fallback
        }
    }

    fn parse_namespace(&mut self) -> Option<NamespaceDecl> {
        let keyword = self.word(self.pos).to_string();
        let start = self.tokens[self.pos].range.offset;
        let (name, name_range, _, next) = self.qualified_name(self.pos + 1)?;
        let end = self.statement_end(next, name_range.end());
        Some(NamespaceDecl {
            name,
            keyword,
            range: TextRange::between(start, end),
            name_range,
        })
    }

    fn parse_import(&mut self) -> Option<ImportDecl> {
        let start = self.tokens[self.pos].range.offset;
        let mut index = self.pos + 1;
        let is_static = self.word(index) == "static";
        if is_static {
            index += 1;
        }
        let (name, name_range, on_demand, next) = self.qualified_name(index)?;
        let end = self.statement_end(next, name_range.end());
        Some(ImportDecl {
            name,
            is_static,
            on_demand,
            range: TextRange::between(start, end),
            name_range,
        })
    }

    /// Skip modifiers and annotations starting at `index`.
    fn skip_modifiers(&self, mut index: usize, limit: usize) -> usize {
        while index < limit {
            match self.kind(index) {
                Some(TokenKind::Ident) if MODIFIERS.contains(&self.word(index)) => index += 1,
                Some(TokenKind::Other)
                    if &self.text[self.tokens[index].range.offset..self.tokens[index].range.end()]
                        == "-" =>
                {
                    // `non-sealed`
                    index += 1
                }
                Some(TokenKind::At) if self.word(index + 1) != "interface" => {
                    index = match self.qualified_name(index + 1) {
                        Some((_, _, _, next)) => next,
                        None => index + 1,
                    };
                    if self.kind(index) == Some(TokenKind::LParen) {
                        index = self.matching(index, TokenKind::LParen, TokenKind::RParen) + 1;
                    }
                }
                _ => break,
            }
        }
        index
    }

    /// Index of the token closing the group opened at `open`, or the last
    /// token when unbalanced.
    fn matching(&self, open: usize, opener: TokenKind, closer: TokenKind) -> usize {
        let mut depth = 0usize;
        for i in open..self.tokens.len() {
            let kind = self.tokens[i].kind;
            if kind == opener {
                depth += 1;
            } else if kind == closer {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i;
                }
            }
        }
        self.tokens.len().saturating_sub(1)
    }

    /// Type keyword at `index` (`class`, `@interface`, ...); returns the index
    /// of the type name.
    fn type_keyword(&self, index: usize) -> Option<usize> {
        if self.kind(index) == Some(TokenKind::At) && self.word(index + 1) == "interface" {
            return Some(index + 2);
        }
        (self.kind(index) == Some(TokenKind::Ident) && TYPE_KEYWORDS.contains(&self.word(index)))
            .then_some(index + 1)
    }

    fn parse_type(&mut self) -> Option<TypeDecl> {
        let start = self.pos;
        let index = self.skip_modifiers(start, self.tokens.len());
        let name_index = self.type_keyword(index)?;
        if self.kind(name_index) != Some(TokenKind::Ident) {
            return None;
        }
        let is_enum = self.word(index) == "enum";
        let (open, close) = self.body(name_index + 1)?;

        self.pos = close + 1;
        Some(TypeDecl {
            name: self.word(name_index).to_string(),
            range: TextRange::between(
                self.tokens[start].range.offset,
                self.tokens[close].range.end(),
            ),
            body_end: self.tokens[close].range.offset,
            members: self.parse_members(open + 1, close, is_enum),
        })
    }

    /// Locate the braces of a type body after its name.
    fn body(&self, mut index: usize) -> Option<(usize, usize)> {
        while index < self.tokens.len() {
            match self.tokens[index].kind {
                TokenKind::LBrace => {
                    let close = self.matching(index, TokenKind::LBrace, TokenKind::RBrace);
                    return Some((index, close));
                }
                TokenKind::LParen => {
                    index = self.matching(index, TokenKind::LParen, TokenKind::RParen) + 1;
                }
                TokenKind::Semi | TokenKind::RBrace => return None,
                _ => index += 1,
            }
        }
        None
    }

    fn parse_members(&self, from: usize, to: usize, is_enum: bool) -> Vec<MemberDecl> {
        let mut members = Vec::new();
        let mut i = from;

        if is_enum {
            // Constants run until the first top-level semicolon.
            let mut depth = 0i32;
            let mut found = None;
            for j in from..to {
                match self.tokens[j].kind {
                    TokenKind::LParen | TokenKind::LBrace => depth += 1,
                    TokenKind::RParen | TokenKind::RBrace => depth -= 1,
                    TokenKind::Semi if depth == 0 => {
                        found = Some(j);
                        break;
                    }
                    _ => {}
                }
            }
            match found {
                Some(semi) => i = semi + 1,
                None => return members,
            }
        }

        while i < to {
            if self.tokens[i].kind == TokenKind::Semi {
                i += 1;
                continue;
            }

            let start = i;
            let index = self.skip_modifiers(i, to);
            let start_offset = self.tokens[start].range.offset;

            if index >= to {
                break;
            }

            if self.tokens[index].kind == TokenKind::LBrace {
                let close = self.matching(index, TokenKind::LBrace, TokenKind::RBrace);
                members.push(MemberDecl {
                    name: "initializer".to_string(),
                    kind: MemberKind::Initializer,
                    range: TextRange::between(start_offset, self.tokens[close].range.end()),
                });
                i = close + 1;
                continue;
            }

            if let Some(name_index) = self.type_keyword(index) {
                if let Some((_, close)) = self.body(name_index + 1) {
                    members.push(MemberDecl {
                        name: self.word(name_index).to_string(),
                        kind: MemberKind::Type,
                        range: TextRange::between(start_offset, self.tokens[close].range.end()),
                    });
                    i = close + 1;
                    continue;
                }
            }

            i = self.parse_member(index, start_offset, to, &mut members);
        }

        members
    }

    /// Parse a field or method starting at `index`; returns the next index.
    fn parse_member(
        &self,
        index: usize,
        start_offset: usize,
        to: usize,
        members: &mut Vec<MemberDecl>,
    ) -> usize {
        let mut type_start = index;
        if self.kind(index) == Some(TokenKind::Lt) {
            type_start = self.matching(index, TokenKind::Lt, TokenKind::Gt) + 1;
        }

        let mut angle = 0i32;
        let mut j = type_start;
        while j < to {
            match self.tokens[j].kind {
                TokenKind::Lt => angle += 1,
                TokenKind::Gt => angle -= 1,
                TokenKind::LParen if angle <= 0 => {
                    return self.finish_method(type_start, j, start_offset, to, members);
                }
                TokenKind::Eq | TokenKind::Semi | TokenKind::Comma if angle <= 0 => {
                    return self.finish_field(type_start, j, start_offset, to, members);
                }
                TokenKind::LBrace => {
                    return self.matching(j, TokenKind::LBrace, TokenKind::RBrace) + 1;
                }
                TokenKind::RBrace => return j + 1,
                _ => {}
            }
            j += 1;
        }
        to
    }

    fn type_text(&self, type_start: usize, name_index: usize) -> String {
        if name_index <= type_start {
            return String::new();
        }
        let from = self.tokens[type_start].range.offset;
        let to = self.tokens[name_index].range.offset;
        self.text[from..to].trim().to_string()
    }

    fn finish_method(
        &self,
        type_start: usize,
        paren: usize,
        start_offset: usize,
        to: usize,
        members: &mut Vec<MemberDecl>,
    ) -> usize {
        let close = self.matching(paren, TokenKind::LParen, TokenKind::RParen);
        let name_index = paren.saturating_sub(1);

        let mut parameters = 0;
        if close > paren + 1 {
            parameters = 1;
            let mut depth = 0i32;
            for k in paren + 1..close {
                match self.tokens[k].kind {
                    TokenKind::LParen | TokenKind::Lt => depth += 1,
                    TokenKind::RParen | TokenKind::Gt => depth -= 1,
                    TokenKind::Comma if depth == 0 => parameters += 1,
                    _ => {}
                }
            }
        }

        let mut k = close + 1;
        let mut end = self.tokens[close].range.end();
        while k < to {
            match self.tokens[k].kind {
                TokenKind::LBrace => {
                    let body_close = self.matching(k, TokenKind::LBrace, TokenKind::RBrace);
                    end = self.tokens[body_close].range.end();
                    k = body_close + 1;
                    break;
                }
                TokenKind::Semi => {
                    end = self.tokens[k].range.end();
                    k += 1;
                    break;
                }
                _ => k += 1,
            }
        }

        if self.kind(name_index) == Some(TokenKind::Ident) {
            members.push(MemberDecl {
                name: self.word(name_index).to_string(),
                kind: MemberKind::Method {
                    parameters,
                    return_type: self.type_text(type_start, name_index),
                },
                range: TextRange::between(start_offset, end),
            });
        }
        k
    }

    fn finish_field(
        &self,
        type_start: usize,
        stop: usize,
        start_offset: usize,
        to: usize,
        members: &mut Vec<MemberDecl>,
    ) -> usize {
        let name_index = stop.saturating_sub(1);
        let mut k = stop;
        let mut depth = 0i32;
        while k < to {
            match self.tokens[k].kind {
                TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrace => depth -= 1,
                TokenKind::Semi if depth <= 0 => break,
                _ => {}
            }
            k += 1;
        }
        let end = if k < to {
            self.tokens[k].range.end()
        } else {
            self.tokens[to.saturating_sub(1)].range.end()
        };

        if self.kind(name_index) == Some(TokenKind::Ident) && name_index > type_start {
            members.push(MemberDecl {
                name: self.word(name_index).to_string(),
                kind: MemberKind::Field {
                    type_name: self.type_text(type_start, name_index),
                },
                range: TextRange::between(start_offset, end),
            });
        }
        k + 1
    }
}

/// A replacement of a byte range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: TextRange,
    pub replacement: String,
}

impl TextEdit {
    pub fn replace(range: TextRange, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(TextRange::new(offset, 0), text)
    }

    pub fn delete(range: TextRange) -> Self {
        Self::replace(range, "")
    }
}

/// Apply non-overlapping edits. Insertions at the same offset keep their
/// relative order.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by_key(|e| (e.range.offset, e.range.len));

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in sorted {
        if edit.range.offset < cursor {
            continue;
        }
        result.push_str(&text[cursor..edit.range.offset]);
        result.push_str(&edit.replacement);
        cursor = edit.range.end().min(text.len());
    }
    result.push_str(&text[cursor.min(text.len())..]);
    result
}

/// Offset just after the end of the line containing `offset` (including the
/// newline).
pub fn line_end(text: &str, offset: usize) -> usize {
    match text[offset.min(text.len())..].find('\n') {
        Some(pos) => offset + pos + 1,
        None => text.len(),
    }
}

/// Offset of the first byte of the line containing `offset`.
pub fn line_start(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())]
        .rfind('\n')
        .map(|pos| pos + 1)
        .unwrap_or(0)
}

/// Grow `range` to whole lines when it is only surrounded by whitespace on
/// its first and last line.
pub fn expand_to_lines(text: &str, range: TextRange) -> TextRange {
    let start = line_start(text, range.offset);
    let end = line_end(text, range.end());
    let before = &text[start..range.offset];
    let after = &text[range.end()..end];
    if before.trim().is_empty() && after.trim().is_empty() {
        TextRange::between(start, end)
    } else {
        range
    }
}

/// Check whether `name` is a valid identifier.
pub fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty() && is_ident_start(bytes[0]) && bytes.iter().all(|b| is_ident_part(*b))
}

/// Check whether `name` is a valid dotted namespace name (empty is the
/// default namespace).
pub fn is_namespace_name(name: &str) -> bool {
    name.is_empty() || name.split('.').all(is_identifier)
}

/// Last segment of a dotted name.
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit_once('.').map(|(_, s)| s).unwrap_or(qualified)
}

/// Everything before the last segment of a dotted name.
pub fn qualifier(qualified: &str) -> &str {
    qualified.rsplit_once('.').map(|(q, _)| q).unwrap_or("")
}

/// Join a namespace and a simple name.
pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &str = r#"package p.q;

import java.util.List;
import static p.Util.helper;
import r.*;

/** Doc. */
public class A extends Base {
    private static final String NAME = "x.y.Z";
    private int count;
    private boolean active = true;

    static {
        init();
    }

    public A(int count) {
        this.count = count;
    }

    public int getCount() { return count; }

    public void setCount(int count) { this.count = count; }

    public boolean isActive() { return active; }

    <T> List<T> wrap(T a, Map<String, T> b) { return null; }

    interface Inner { void run(); }
}

enum Color { RED, GREEN; int code; }
"#;

    #[test]
    fn test_outline_header() {
        let outline = SourceOutline::parse(UNIT);
        let ns = outline.namespace.as_ref().unwrap();
        assert_eq!(ns.name, "p.q");
        assert_eq!(&UNIT[ns.range.offset..ns.range.end()], "package p.q;");

        assert_eq!(outline.imports.len(), 3);
        assert_eq!(outline.imports[0].name, "java.util.List");
        assert!(outline.imports[1].is_static);
        assert_eq!(outline.imports[1].qualifier(), "p.Util");
        assert!(outline.imports[2].on_demand);
        assert_eq!(outline.imports[2].display_name(), "r.*");
    }

    #[test]
    fn test_outline_members() {
        let outline = SourceOutline::parse(UNIT);
        assert_eq!(outline.types.len(), 2);

        let a = outline.find_type("A").unwrap();
        let names: Vec<_> = a.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "NAME",
                "count",
                "active",
                "initializer",
                "A",
                "getCount",
                "setCount",
                "isActive",
                "wrap",
                "Inner"
            ]
        );

        let active = &a.members[2];
        assert_eq!(
            active.kind,
            MemberKind::Field {
                type_name: "boolean".to_string()
            }
        );
        let wrap = &a.members[8];
        assert_eq!(
            wrap.kind,
            MemberKind::Method {
                parameters: 2,
                return_type: "List<T>".to_string()
            }
        );
        assert_eq!(&UNIT[a.body_end..a.body_end + 1], "}");

        let color = outline.find_type("Color").unwrap();
        assert_eq!(color.members.len(), 1);
        assert_eq!(color.members[0].name, "code");
    }

    #[test]
    fn test_tokenize_skips_comments_and_strings() {
        let text = "a /* b */ c // d\n\"e.f\" 'g'";
        let tokens = tokenize(text);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::StringLit,
                TokenKind::CharLit
            ]
        );
    }

    #[test]
    fn test_identifier_chains() {
        let text = "p.q.A.run(); x.y; import r.*; class B {}";
        let chains = identifier_chains(text, &tokenize(text));
        assert_eq!(chains[0].prefix_text(text, 3), "p.q.A");
        assert_eq!(chains[0].len(), 4);
        assert!(chains.iter().any(|c| c.on_demand));
        let b = chains.last().unwrap();
        assert!(b.declaration);
        assert_eq!(b.prefix_text(text, 1), "B");
    }

    #[test]
    fn test_apply_edits_and_line_expansion() {
        let text = "line1\n  remove me\nline3\n";
        let range = TextRange::new(8, 9);
        let expanded = expand_to_lines(text, range);
        assert_eq!(apply_edits(text, &[TextEdit::delete(expanded)]), "line1\nline3\n");

        let edits = vec![
            TextEdit::insert(0, "a"),
            TextEdit::insert(0, "b"),
            TextEdit::replace(TextRange::new(2, 3), "X"),
        ];
        assert_eq!(apply_edits(text, &edits), "abliX\n  remove me\nline3\n");
    }

    #[test]
    fn test_name_helpers() {
        assert!(is_namespace_name("a.b1.c_d"));
        assert!(is_namespace_name(""));
        assert!(!is_namespace_name("a..b"));
        assert_eq!(simple_name("p.q.A"), "A");
        assert_eq!(qualifier("p.q.A"), "p.q");
        assert_eq!(qualify("", "A"), "A");
    }
}
