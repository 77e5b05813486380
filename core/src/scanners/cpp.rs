/// C and C++ call-site scanner
///
/// Finds marker calls such as `tr("...")` and records:
/// - the enclosing namespace / class / member-function scope
/// - `Q_DECLARE_TR_FUNCTIONS(Ctx)` and `TRANSLATOR Ctx` context overrides
/// - `//:` and `/*: */` developer comments for the next message
/// - `using namespace` directives and every class defined in the file
///
/// Comments, string/char/raw literals and preprocessor lines are lexed so that
/// markers inside them are never picked up.

use super::{ContextSource, DeclaredClass, MarkerSpec, RawMessage, ScanError, ScanOutput};
use once_cell::sync::Lazy;
use regex::Regex;

static TRANSLATOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*TRANSLATOR\s+([A-Za-z_][\w:]*)").expect("valid translator regex")
});

const STRING_PREFIXES: &[&str] = &["L", "u", "U", "u8", "R", "LR", "uR", "UR", "u8R"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    /// Decoded string literal
    Str(String),
    /// Number or character literal
    Literal,
    ScopeSep,
    Arrow,
    Punct(char),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    line: usize,
}

impl Lexeme {
    fn is_punct(&self, ch: char) -> bool {
        self.token == Token::Punct(ch)
    }

    fn ident(&self) -> Option<&str> {
        match &self.token {
            Token::Ident(name) => Some(name),
            _ => None,
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    at_line_start: bool,
    tokens: Vec<Lexeme>,
}

impl Lexer {
    fn new(content: &str) -> Self {
        Self {
            chars: content.chars().collect(),
            pos: 0,
            line: 1,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, token: Token, line: usize) {
        self.tokens.push(Lexeme { token, line });
        self.at_line_start = false;
    }

    fn tokenize(mut self) -> Result<Vec<Lexeme>, ScanError> {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                    self.at_line_start = true;
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.line += 1;
                    self.pos += 2;
                }
                c if c.is_whitespace() => self.pos += 1,
                '#' if self.at_line_start => self.skip_preprocessor(),
                '/' if self.peek(1) == Some('/') => self.line_comment(),
                '/' if self.peek(1) == Some('*') => self.block_comment()?,
                '"' => {
                    let line = self.line;
                    let text = self.string_literal()?;
                    self.push(Token::Str(text), line);
                }
                '\'' => {
                    let line = self.line;
                    self.char_literal()?;
                    self.push(Token::Literal, line);
                }
                c if is_ident_start(c) => self.identifier()?,
                c if c.is_ascii_digit() => self.number(),
                '.' if self.peek(1).map_or(false, |n| n.is_ascii_digit()) => self.number(),
                ':' if self.peek(1) == Some(':') => {
                    self.pos += 2;
                    self.push(Token::ScopeSep, self.line);
                }
                '-' if self.peek(1) == Some('>') => {
                    self.pos += 2;
                    self.push(Token::Arrow, self.line);
                }
                other => {
                    self.pos += 1;
                    self.push(Token::Punct(other), self.line);
                }
            }
        }
        Ok(self.tokens)
    }

    fn skip_preprocessor(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            if c == '\\' && self.peek(1) == Some('\n') {
                self.line += 1;
                self.pos += 2;
                continue;
            }
            self.pos += 1;
        }
    }

    fn line_comment(&mut self) {
        let line = self.line;
        let start = self.pos + 2;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.push(Token::Comment(text), line);
    }

    fn block_comment(&mut self) -> Result<(), ScanError> {
        let line = self.line;
        let start = self.pos + 2;
        self.pos += 2;
        loop {
            match self.peek(0) {
                None => return Err(ScanError::new(line, "unterminated comment")),
                Some('*') if self.peek(1) == Some('/') => break,
                Some('\n') => self.line += 1,
                Some(_) => {}
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.pos += 2;
        self.push(Token::Comment(text), line);
        Ok(())
    }

    fn identifier(&mut self) -> Result<(), ScanError> {
        let line = self.line;
        let start = self.pos;
        while self.peek(0).map_or(false, is_ident_char) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        match self.peek(0) {
            Some('"') if STRING_PREFIXES.contains(&name.as_str()) => {
                let text = if name.ends_with('R') {
                    self.raw_string_literal()?
                } else {
                    self.string_literal()?
                };
                self.push(Token::Str(text), line);
            }
            Some('\'') if matches!(name.as_str(), "L" | "u" | "U" | "u8") => {
                self.char_literal()?;
                self.push(Token::Literal, line);
            }
            _ => self.push(Token::Ident(name), line),
        }
        Ok(())
    }

    fn number(&mut self) {
        let line = self.line;
        let mut prev = '\0';
        while let Some(c) = self.peek(0) {
            let continues = is_ident_char(c)
                || c == '.'
                || (c == '\'' && self.peek(1).map_or(false, |n| n.is_ascii_alphanumeric()))
                || ((c == '+' || c == '-') && matches!(prev, 'e' | 'E' | 'p' | 'P'));
            if !continues {
                break;
            }
            prev = c;
            self.pos += 1;
        }
        self.push(Token::Literal, line);
    }

    fn char_literal(&mut self) -> Result<(), ScanError> {
        let line = self.line;
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(ScanError::new(line, "unterminated character literal"))
                }
                Some('\\') => self.pos += 2,
                Some('\'') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Decodes a `"..."` literal. Escapes that produce bytes are collected as
    /// UTF-8, the way a compiler sees a UTF-8 source file.
    fn string_literal(&mut self) -> Result<String, ScanError> {
        let line = self.line;
        let unterminated = || ScanError::new(line, "unterminated string literal");
        self.pos += 1;
        let mut bytes: Vec<u8> = Vec::new();
        let mut utf8 = [0u8; 4];

        loop {
            let c = self.peek(0).ok_or_else(unterminated)?;
            self.pos += 1;
            match c {
                '"' => break,
                '\n' => return Err(unterminated()),
                '\\' => {
                    let escape = self.peek(0).ok_or_else(unterminated)?;
                    self.pos += 1;
                    match escape {
                        'n' => bytes.push(b'\n'),
                        't' => bytes.push(b'\t'),
                        'r' => bytes.push(b'\r'),
                        'a' => bytes.push(0x07),
                        'b' => bytes.push(0x08),
                        'f' => bytes.push(0x0C),
                        'v' => bytes.push(0x0B),
                        'e' => bytes.push(0x1B),
                        '\n' => self.line += 1,
                        '0'..='7' => {
                            let mut value = escape.to_digit(8).unwrap_or(0);
                            for _ in 0..2 {
                                match self.peek(0).and_then(|d| d.to_digit(8)) {
                                    Some(digit) => {
                                        value = value * 8 + digit;
                                        self.pos += 1;
                                    }
                                    None => break,
                                }
                            }
                            bytes.push((value & 0xFF) as u8);
                        }
                        'x' => {
                            let mut value: u32 = 0;
                            while let Some(digit) = self.peek(0).and_then(|d| d.to_digit(16)) {
                                value = value.wrapping_mul(16).wrapping_add(digit);
                                self.pos += 1;
                            }
                            bytes.push((value & 0xFF) as u8);
                        }
                        'u' | 'U' => {
                            let width = if escape == 'u' { 4 } else { 8 };
                            let mut value: u32 = 0;
                            for _ in 0..width {
                                match self.peek(0).and_then(|d| d.to_digit(16)) {
                                    Some(digit) => {
                                        value = value * 16 + digit;
                                        self.pos += 1;
                                    }
                                    None => break,
                                }
                            }
                            let ch = char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER);
                            bytes.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
                        }
                        other => bytes.extend_from_slice(other.encode_utf8(&mut utf8).as_bytes()),
                    }
                }
                other => bytes.extend_from_slice(other.encode_utf8(&mut utf8).as_bytes()),
            }
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn raw_string_literal(&mut self) -> Result<String, ScanError> {
        let line = self.line;
        let unterminated = || ScanError::new(line, "unterminated raw string literal");
        self.pos += 1;

        let delimiter_start = self.pos;
        loop {
            match self.peek(0) {
                Some('(') => break,
                Some('\n') | None => return Err(unterminated()),
                Some(_) => self.pos += 1,
            }
        }
        let delimiter: String = self.chars[delimiter_start..self.pos].iter().collect();
        let terminator: Vec<char> = format!("){delimiter}\"").chars().collect();
        self.pos += 1;

        let start = self.pos;
        loop {
            if self.pos >= self.chars.len() {
                return Err(unterminated());
            }
            if self.chars[self.pos..].starts_with(&terminator) {
                break;
            }
            if self.chars[self.pos] == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.pos += terminator.len();
        Ok(text)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[derive(Debug, Clone)]
enum FrameKind {
    Namespace,
    /// Index into `ScanOutput::declared_classes`
    Class(usize),
    /// Function body; the qualifier of `A::B::f` is `[A, B]`
    Function(Vec<String>),
    Block,
    /// Braces that do not open a scope (enums, initialisers, `extern "C"`)
    Transparent,
    /// `m{..}` inside a constructor initialiser list; the pending header is restored on close
    InitializerBrace(Vec<Lexeme>),
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    /// Qualified namespace/class path in effect inside the braces
    scope: Vec<String>,
    context_override: Option<String>,
    /// Line of the opening brace
    line: usize,
}

enum Head {
    Namespace(Vec<String>),
    Class(Vec<String>),
    Function(Vec<String>),
    InitializerBrace,
    Block,
    Transparent,
}

#[derive(Debug, Clone)]
pub struct CppScanner {
    markers: Vec<MarkerSpec>,
}

impl CppScanner {
    pub fn new(markers: Vec<MarkerSpec>) -> Self {
        Self { markers }
    }

    pub fn scan(&self, content: &str) -> Result<ScanOutput, ScanError> {
        let tokens = Lexer::new(content).tokenize()?;
        Parser::new(tokens, &self.markers).run()
    }
}

struct Parser<'a> {
    tokens: Vec<Lexeme>,
    pos: usize,
    markers: &'a [MarkerSpec],
    frames: Vec<Frame>,
    /// Tokens since the last `;`, `{` or `}`
    stmt: Vec<Lexeme>,
    file_override: Option<String>,
    pending_extra: Vec<String>,
    using_namespaces: Vec<Vec<String>>,
    output: ScanOutput,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Lexeme>, markers: &'a [MarkerSpec]) -> Self {
        Self {
            tokens,
            pos: 0,
            markers,
            frames: Vec::new(),
            stmt: Vec::new(),
            file_override: None,
            pending_extra: Vec::new(),
            using_namespaces: Vec::new(),
            output: ScanOutput::default(),
        }
    }

    fn run(mut self) -> Result<ScanOutput, ScanError> {
        while self.pos < self.tokens.len() {
            let lexeme = self.tokens[self.pos].clone();
            match &lexeme.token {
                Token::Comment(text) => {
                    self.comment(text);
                    self.pos += 1;
                }
                Token::Ident(name) if name == "Q_DECLARE_TR_FUNCTIONS" => {
                    if !self.declare_tr_functions() {
                        self.stmt.push(lexeme);
                        self.pos += 1;
                    }
                }
                Token::Ident(name) if self.next_significant_is(self.pos + 1, '(') => {
                    match self.markers.iter().find(|spec| &spec.name == name) {
                        Some(spec) => self.marker_call(spec, &lexeme)?,
                        None => {
                            self.stmt.push(lexeme);
                            self.pos += 1;
                        }
                    }
                }
                Token::Punct('{') => {
                    self.open_brace(lexeme.line);
                    self.pos += 1;
                }
                Token::Punct('}') => {
                    self.close_brace(lexeme.line)?;
                    self.pos += 1;
                }
                Token::Punct(';') => {
                    self.end_statement();
                    self.pos += 1;
                }
                _ => {
                    self.stmt.push(lexeme);
                    self.pos += 1;
                }
            }
        }
        if let Some(frame) = self.frames.last() {
            return Err(ScanError::new(frame.line, "unclosed '{'"));
        }
        Ok(self.output)
    }

    fn next_significant(&self, mut idx: usize) -> Option<usize> {
        while let Some(lexeme) = self.tokens.get(idx) {
            if !matches!(lexeme.token, Token::Comment(_)) {
                return Some(idx);
            }
            idx += 1;
        }
        None
    }

    fn next_significant_is(&self, idx: usize, ch: char) -> bool {
        self.next_significant(idx)
            .map_or(false, |idx| self.tokens[idx].is_punct(ch))
    }

    fn comment(&mut self, text: &str) {
        if let Some(note) = text.strip_prefix(':') {
            let note = note.split_whitespace().collect::<Vec<_>>().join(" ");
            if !note.is_empty() {
                self.pending_extra.push(note);
            }
            return;
        }

        if let Some(captures) = TRANSLATOR_REGEX.captures(text) {
            let context = captures[1].to_string();
            match self.frames.last_mut() {
                Some(frame) => frame.context_override = Some(context),
                None => self.file_override = Some(context),
            }
        }
    }

    /// `Q_DECLARE_TR_FUNCTIONS(Context)`; returns false when the tokens do not fit
    fn declare_tr_functions(&mut self) -> bool {
        let open = match self.next_significant(self.pos + 1) {
            Some(idx) if self.tokens[idx].is_punct('(') => idx,
            _ => return false,
        };
        let mut idx = open + 1;
        let mut context = String::new();
        loop {
            match self.tokens.get(idx).map(|lexeme| &lexeme.token) {
                Some(Token::Ident(name)) => context.push_str(name),
                Some(Token::ScopeSep) => context.push_str("::"),
                Some(Token::Comment(_)) => {}
                Some(Token::Punct(')')) => break,
                _ => return false,
            }
            idx += 1;
        }
        if context.is_empty() {
            return false;
        }

        if let Some(frame) = self.frames.last_mut() {
            if let FrameKind::Class(declared) = frame.kind {
                if let Some(class) = self.output.declared_classes.get_mut(declared) {
                    class.context_name = context.clone();
                }
            }
            frame.context_override = Some(context);
        }
        self.pos = idx + 1;
        true
    }

    fn marker_call(&mut self, spec: &MarkerSpec, marker: &Lexeme) -> Result<(), ScanError> {
        let open = match self.next_significant(self.pos + 1) {
            Some(idx) => idx,
            None => return Ok(()),
        };
        let (args, close) = self.split_args(open).ok_or_else(|| {
            ScanError::new(marker.line, format!("unterminated call to {}", spec.name))
        })?;

        let literal = |idx: Option<usize>| {
            idx.and_then(|idx| args.get(idx))
                .and_then(|arg| string_literal(arg))
        };
        let source_text = literal(Some(spec.source_arg));
        let context = match spec.context_arg {
            Some(idx) => literal(Some(idx)).map(ContextSource::Explicit),
            None => Some(self.scope_context(self.call_qualifier())),
        };

        let (source_text, context) = match (source_text, context) {
            (Some(source_text), Some(context)) => (source_text, context),
            // Not a translatable literal; keep scanning inside the arguments
            _ => {
                self.stmt.push(marker.clone());
                self.pos += 1;
                return Ok(());
            }
        };

        let disambiguation = literal(spec.disambiguation_arg).filter(|text| !text.is_empty());
        let is_plural = spec.always_plural
            || spec
                .count_arg
                .and_then(|idx| args.get(idx))
                .map_or(false, |arg| !arg.is_empty());

        if source_text.is_empty() {
            log::debug!("line {}: ignoring empty {} call", marker.line, spec.name);
        } else {
            let extra_comment = if self.pending_extra.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.pending_extra).join(" "))
            };
            self.output.messages.push(RawMessage {
                context,
                source_text,
                disambiguation,
                is_plural,
                line: marker.line,
                extra_comment,
            });
        }

        self.stmt.push(marker.clone());
        self.stmt.push(Lexeme {
            token: Token::Literal,
            line: marker.line,
        });
        self.pos = close + 1;
        Ok(())
    }

    /// Top-level comma-separated arguments of the call opened at `open`, and the
    /// index of the closing parenthesis. `None` when the file ends first.
    fn split_args(&self, open: usize) -> Option<(Vec<Vec<Lexeme>>, usize)> {
        let mut args: Vec<Vec<Lexeme>> = vec![Vec::new()];
        let mut depth = 0usize;
        let mut idx = open + 1;
        loop {
            let lexeme = self.tokens.get(idx)?;
            match &lexeme.token {
                Token::Comment(_) => {}
                Token::Punct('(' | '[' | '{') => {
                    depth += 1;
                    args.last_mut()?.push(lexeme.clone());
                }
                Token::Punct(')') if depth == 0 => break,
                Token::Punct(')' | ']' | '}') => {
                    depth = depth.saturating_sub(1);
                    args.last_mut()?.push(lexeme.clone());
                }
                Token::Punct(',') if depth == 0 => args.push(Vec::new()),
                _ => args.last_mut()?.push(lexeme.clone()),
            }
            idx += 1;
        }
        if args.len() == 1 && args[0].is_empty() {
            args.clear();
        }
        Some((args, idx))
    }

    /// `Foo::Bar::` written directly before the marker name
    fn call_qualifier(&self) -> Vec<String> {
        let mut qualifier = Vec::new();
        let mut idx = self.stmt.len();
        while idx >= 2 && self.stmt[idx - 1].token == Token::ScopeSep {
            match self.stmt[idx - 2].ident() {
                Some(name) => qualifier.insert(0, name.to_string()),
                None => break,
            }
            idx -= 2;
        }
        qualifier
    }

    fn current_scope(&self) -> Vec<String> {
        self.frames
            .last()
            .map(|frame| frame.scope.clone())
            .unwrap_or_default()
    }

    fn in_code(&self) -> bool {
        matches!(
            self.frames.last().map(|frame| &frame.kind),
            Some(FrameKind::Function(_) | FrameKind::Block)
        )
    }

    fn scope_context(&self, call_qualifier: Vec<String>) -> ContextSource {
        if !call_qualifier.is_empty() {
            return ContextSource::Member {
                enclosing: self.current_scope(),
                qualifier: call_qualifier,
                using_namespaces: self.using_namespaces.clone(),
                is_definition: false,
            };
        }

        // Inside a constructor initialiser list the body has not opened yet
        if !self.in_code() {
            if let Some(qualifier) = pending_initializer_qualifier(&self.stmt) {
                if !qualifier.is_empty() {
                    return ContextSource::Member {
                        enclosing: self.current_scope(),
                        qualifier,
                        using_namespaces: self.using_namespaces.clone(),
                        is_definition: true,
                    };
                }
                if let Some(frame) = self.frames.last() {
                    if let (None, FrameKind::Class(_)) = (&frame.context_override, &frame.kind) {
                        return ContextSource::Lexical(frame.scope.clone());
                    }
                }
            }
        }

        for frame in self.frames.iter().rev() {
            if let Some(context) = &frame.context_override {
                return ContextSource::Explicit(context.clone());
            }
            match &frame.kind {
                FrameKind::Function(qualifier) if !qualifier.is_empty() => {
                    return ContextSource::Member {
                        enclosing: frame.scope.clone(),
                        qualifier: qualifier.clone(),
                        using_namespaces: self.using_namespaces.clone(),
                        is_definition: true,
                    };
                }
                FrameKind::Class(_) => return ContextSource::Lexical(frame.scope.clone()),
                _ => {}
            }
        }

        match &self.file_override {
            Some(context) => ContextSource::Explicit(context.clone()),
            None => ContextSource::Default,
        }
    }

    fn open_brace(&mut self, line: usize) {
        let scope = self.current_scope();
        let head = if self.in_code() {
            Head::Block
        } else {
            classify_head(&self.stmt)
        };

        let (kind, scope) = match head {
            Head::Namespace(segments) => (FrameKind::Namespace, [scope, segments].concat()),
            Head::Class(chain) => {
                let scope = [scope, chain].concat();
                let qualified_name = scope.join("::");
                self.output.declared_classes.push(DeclaredClass {
                    qualified_name: qualified_name.clone(),
                    context_name: qualified_name,
                });
                (FrameKind::Class(self.output.declared_classes.len() - 1), scope)
            }
            Head::Function(qualifier) => (FrameKind::Function(qualifier), scope),
            Head::InitializerBrace => (
                FrameKind::InitializerBrace(std::mem::take(&mut self.stmt)),
                scope,
            ),
            Head::Block => (FrameKind::Block, scope),
            Head::Transparent => (FrameKind::Transparent, scope),
        };
        let frame = Frame {
            kind,
            scope,
            context_override: None,
            line,
        };
        self.frames.push(frame);
        self.stmt.clear();
    }

    fn close_brace(&mut self, line: usize) -> Result<(), ScanError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| ScanError::new(line, "unbalanced '}'"))?;
        match frame.kind {
            FrameKind::InitializerBrace(saved) => {
                self.stmt = saved;
                self.stmt.push(Lexeme {
                    token: Token::Punct('}'),
                    line,
                });
            }
            _ => self.stmt.clear(),
        }
        Ok(())
    }

    fn end_statement(&mut self) {
        let is_using_namespace = self.stmt.len() > 2
            && self.stmt[0].ident() == Some("using")
            && self.stmt[1].ident() == Some("namespace");
        if is_using_namespace {
            let chain: Vec<String> = self.stmt[2..]
                .iter()
                .filter_map(|lexeme| lexeme.ident().map(str::to_string))
                .collect();
            if !chain.is_empty() && !self.using_namespaces.contains(&chain) {
                self.using_namespaces.push(chain);
            }
        }
        self.stmt.clear();
    }
}

/// The literal value of an argument made only of (adjacent) string literals
fn string_literal(arg: &[Lexeme]) -> Option<String> {
    if arg.is_empty() {
        return None;
    }
    let mut text = String::new();
    for lexeme in arg {
        match &lexeme.token {
            Token::Str(part) => text.push_str(part),
            _ => return None,
        }
    }
    Some(text)
}

/// Decides what a `{` opens, from the statement tokens before it
fn classify_head(stmt: &[Lexeme]) -> Head {
    let first = match stmt.first() {
        Some(first) => first,
        None => return Head::Transparent,
    };

    let namespace_at = match (first.ident(), stmt.get(1).and_then(Lexeme::ident)) {
        (Some("namespace"), _) => Some(1),
        (Some("inline"), Some("namespace")) => Some(2),
        _ => None,
    };
    if let Some(start) = namespace_at {
        let segments = stmt[start..]
            .iter()
            .filter_map(|lexeme| lexeme.ident().map(str::to_string))
            .collect();
        return Head::Namespace(segments);
    }

    if first.ident() == Some("extern")
        && matches!(stmt.get(1).map(|l| &l.token), Some(Token::Str(_)))
    {
        return Head::Transparent;
    }

    let has_operator = stmt.iter().any(|lexeme| lexeme.ident() == Some("operator"));
    let mut depth = 0usize;
    for lexeme in stmt {
        match lexeme.token {
            Token::Punct('(' | '[') => depth += 1,
            Token::Punct(')' | ']') => depth = depth.saturating_sub(1),
            Token::Punct('=') if depth == 0 && !has_operator => return Head::Transparent,
            _ => {}
        }
        if depth == 0 && lexeme.ident() == Some("enum") {
            return Head::Transparent;
        }
    }

    match class_head(stmt) {
        Some(Some(chain)) => return Head::Class(chain),
        Some(None) => return Head::Transparent,
        None => {}
    }

    if let Some(colon) = initializer_colon(stmt) {
        let last = stmt.last().map(|lexeme| &lexeme.token);
        let opens_member_init = match last {
            Some(Token::Ident(_)) | Some(Token::Punct('>')) => true,
            _ => false,
        };
        if opens_member_init {
            return Head::InitializerBrace;
        }
        return Head::Function(header_qualifier(&stmt[..colon]).unwrap_or_default());
    }

    match header_qualifier(stmt) {
        Some(qualifier) => Head::Function(qualifier),
        None => Head::Transparent,
    }
}

/// `Some(Some(name))` for a class head, `Some(None)` for an anonymous one,
/// `None` when the statement does not define a class
fn class_head(stmt: &[Lexeme]) -> Option<Option<Vec<String>>> {
    let mut paren = 0usize;
    let mut angle = 0usize;
    let mut keyword_at = None;
    for (idx, lexeme) in stmt.iter().enumerate() {
        match &lexeme.token {
            Token::Punct('(') => paren += 1,
            Token::Punct(')') => paren = paren.saturating_sub(1),
            Token::Punct('<') => angle += 1,
            Token::Punct('>') => angle = angle.saturating_sub(1),
            Token::Ident(word)
                if paren == 0
                    && angle == 0
                    && matches!(word.as_str(), "class" | "struct" | "union") =>
            {
                keyword_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let keyword_at = keyword_at?;

    let rest = &stmt[keyword_at + 1..];
    let end = rest
        .iter()
        .position(|lexeme| lexeme.is_punct(':'))
        .unwrap_or(rest.len());
    let head = &rest[..end];
    if head.iter().any(|lexeme| lexeme.is_punct('(')) {
        return None;
    }

    let mut chain: Vec<String> = Vec::new();
    let mut after_scope = false;
    let mut idx = 0;
    while idx < head.len() {
        match &head[idx].token {
            Token::Ident(name) if name == "final" || name == "alignas" => {}
            Token::Ident(name) => {
                if !after_scope {
                    chain.clear();
                }
                chain.push(name.clone());
                after_scope = false;
            }
            Token::ScopeSep => after_scope = true,
            Token::Punct('<') => {
                idx = skip_angles(head, idx);
                continue;
            }
            _ => after_scope = false,
        }
        idx += 1;
    }

    Some(if chain.is_empty() { None } else { Some(chain) })
}

/// Index just past the `>` matching the `<` at `open`
fn skip_angles(tokens: &[Lexeme], open: usize) -> usize {
    let mut depth = 0usize;
    let mut idx = open;
    while idx < tokens.len() {
        match tokens[idx].token {
            Token::Punct('<') => depth += 1,
            Token::Punct('>') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return idx + 1;
                }
            }
            _ => {}
        }
        idx += 1;
    }
    tokens.len()
}

/// Position of a constructor initialiser `:` following the parameter list
fn initializer_colon(stmt: &[Lexeme]) -> Option<usize> {
    let mut depth = 0usize;
    let mut closed_group = false;
    for (idx, lexeme) in stmt.iter().enumerate() {
        match lexeme.token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    closed_group = true;
                }
            }
            Token::Punct(':') if depth == 0 && closed_group => return Some(idx),
            _ => {}
        }
    }
    None
}

/// For a header still being read inside its initialiser list, the qualifier
/// of the function being defined
fn pending_initializer_qualifier(stmt: &[Lexeme]) -> Option<Vec<String>> {
    let colon = initializer_colon(stmt)?;
    Some(header_qualifier(&stmt[..colon]).unwrap_or_default())
}

/// Qualifier of the function declared by `stmt`, i.e. `[A, B]` for
/// `void A::B::f(...)`. `None` when the statement has no parameter list.
fn header_qualifier(stmt: &[Lexeme]) -> Option<Vec<String>> {
    let mut depth = 0usize;
    let mut last_group = None;
    for (idx, lexeme) in stmt.iter().enumerate() {
        match lexeme.token {
            Token::Punct('(') => {
                if depth == 0 {
                    last_group = Some(idx);
                }
                depth += 1;
            }
            Token::Punct(')') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    let open = last_group?;

    // Walk back over the declarator name
    let mut idx = open;
    if let Some(op) = stmt[..open].iter().rposition(|lexeme| lexeme.ident() == Some("operator")) {
        if stmt[op + 1..open].iter().all(|lexeme| matches!(lexeme.token, Token::Punct(_))) {
            idx = op;
        }
    }
    if idx == open {
        match stmt[..idx].last().and_then(Lexeme::ident) {
            Some(_) => idx -= 1,
            None => return Some(Vec::new()),
        }
    }
    if idx > 0 && stmt[idx - 1].is_punct('~') {
        idx -= 1;
    }

    let mut qualifier = Vec::new();
    while idx >= 2 && stmt[idx - 1].token == Token::ScopeSep {
        idx -= 1;
        if stmt[idx - 1].is_punct('>') {
            let mut depth = 0usize;
            while idx > 0 {
                idx -= 1;
                match stmt[idx].token {
                    Token::Punct('>') => depth += 1,
                    Token::Punct('<') => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
        match stmt[..idx].last().and_then(Lexeme::ident) {
            Some(name) => {
                qualifier.insert(0, name.to_string());
                idx -= 1;
            }
            None => break,
        }
    }
    Some(qualifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanners::default_markers;

    fn scan(content: &str) -> ScanOutput {
        CppScanner::new(default_markers()).scan(content).unwrap()
    }

    fn member(enclosing: &[&str], qualifier: &[&str], definition: bool) -> ContextSource {
        ContextSource::Member {
            enclosing: enclosing.iter().map(|s| s.to_string()).collect(),
            qualifier: qualifier.iter().map(|s| s.to_string()).collect(),
            using_namespaces: Vec::new(),
            is_definition: definition,
        }
    }

    #[test]
    fn finds_tr_in_class_body() {
        let output = scan(
            r#"
namespace Tiled {

class Dialog : public QDialog
{
    Q_OBJECT

public:
    Dialog() { setWindowTitle(tr("Cancel")); }
};

} // namespace Tiled
"#,
        );
        assert_eq!(output.messages.len(), 1);
        let message = &output.messages[0];
        assert_eq!(message.source_text, "Cancel");
        assert_eq!(message.line, 9);
        assert_eq!(
            message.context,
            ContextSource::Lexical(vec!["Tiled".into(), "Dialog".into()])
        );
        assert_eq!(
            output.declared_classes,
            vec![DeclaredClass {
                qualified_name: "Tiled::Dialog".into(),
                context_name: "Tiled::Dialog".into(),
            }]
        );
    }

    #[test]
    fn out_of_line_members_carry_their_qualifier() {
        let output = scan(
            r#"
using namespace Tiled;

void MapEditor::setupUi()
{
    mLabel->setText(tr("Ready"));
}

MapEditor::MapEditor(QObject *parent)
    : QObject(parent)
    , mName(tr("Untitled"))
    , mSize{0, 0}
{
    QString s = tr("Body");
}
"#,
        );
        let texts: Vec<&str> = output.messages.iter().map(|m| m.source_text.as_str()).collect();
        assert_eq!(texts, vec!["Ready", "Untitled", "Body"]);

        let expected = ContextSource::Member {
            enclosing: Vec::new(),
            qualifier: vec!["MapEditor".into()],
            using_namespaces: vec![vec!["Tiled".into()]],
            is_definition: true,
        };
        for message in &output.messages {
            assert_eq!(message.context, expected, "{}", message.source_text);
        }
    }

    #[test]
    fn explicit_contexts_and_plurals() {
        let output = scan(
            r#"
static const char *names[] = {
    QT_TRANSLATE_NOOP("Tiled::Tool", "Stamp Brush"),
    QT_TRANSLATE_NOOP3("Tiled::Tool", "Fill", "bucket"),
};

void f(int n)
{
    QCoreApplication::translate("Command line", "Export %1").arg(n);
    tr("%n file(s)", "", n);
    tr("Open", "verb");
    tr(variable);
}
"#,
        );
        assert_eq!(output.messages.len(), 5);
        assert_eq!(
            output.messages[0].context,
            ContextSource::Explicit("Tiled::Tool".into())
        );
        assert_eq!(output.messages[1].disambiguation.as_deref(), Some("bucket"));
        assert_eq!(
            output.messages[2].context,
            ContextSource::Explicit("Command line".into())
        );
        assert!(output.messages[3].is_plural);
        assert_eq!(output.messages[3].disambiguation, None);
        assert_eq!(output.messages[3].context, ContextSource::Default);
        assert_eq!(output.messages[4].disambiguation.as_deref(), Some("verb"));
        assert!(!output.messages[4].is_plural);
    }

    #[test]
    fn qualified_tr_calls_are_members() {
        let output = scan("namespace Tiled {\nvoid helper() { QObject::tr(\"Hello\"); }\n}\n");
        assert_eq!(output.messages[0].context, member(&["Tiled"], &["QObject"], false));
    }

    #[test]
    fn decodes_literals_and_concatenates() {
        let output = scan(
            "void A::f() {\n    tr(\"Tab\\there \" \"and \\\"quotes\\\"\");\n    tr(u8\"caf\\xc3\\xa9\");\n    tr(R\"x(raw \\n text)x\");\n}\n",
        );
        let texts: Vec<&str> = output.messages.iter().map(|m| m.source_text.as_str()).collect();
        assert_eq!(texts, vec!["Tab\there and \"quotes\"", "café", "raw \\n text"]);
    }

    #[test]
    fn ignores_markers_in_comments_strings_and_directives() {
        let output = scan(
            r#"
#define LABEL tr("macro")
// tr("commented")
/* tr("block") */
const char *s = "tr(\"quoted\")";
char c = '"';
int big = 1'000'000;
void A::f() { tr("real"); }
"#,
        );
        let texts: Vec<&str> = output.messages.iter().map(|m| m.source_text.as_str()).collect();
        assert_eq!(texts, vec!["real"]);
    }

    #[test]
    fn declare_tr_functions_renames_context() {
        let output = scan(
            r#"
namespace Tiled {
class TilesetHelper
{
    Q_DECLARE_TR_FUNCTIONS(TilesetHelper)
public:
    QString name() const { return tr("Tileset"); }
};
}
"#,
        );
        assert_eq!(
            output.messages[0].context,
            ContextSource::Explicit("TilesetHelper".into())
        );
        assert_eq!(output.declared_classes[0].qualified_name, "Tiled::TilesetHelper");
        assert_eq!(output.declared_classes[0].context_name, "TilesetHelper");
    }

    #[test]
    fn translator_comment_and_extra_comments() {
        let output = scan(
            r#"
void helper()
{
    /* TRANSLATOR Tiled::Helper */
    //: Shown in the status bar
    //: while saving
    tr("Saving...");
    tr("Done");
}
"#,
        );
        assert_eq!(
            output.messages[0].context,
            ContextSource::Explicit("Tiled::Helper".into())
        );
        assert_eq!(
            output.messages[0].extra_comment.as_deref(),
            Some("Shown in the status bar while saving")
        );
        assert_eq!(output.messages[1].extra_comment, None);
        assert_eq!(
            output.messages[1].context,
            ContextSource::Explicit("Tiled::Helper".into())
        );
    }

    #[test]
    fn enums_and_initialisers_do_not_open_scopes() {
        let output = scan(
            r#"
class Panel
{
    enum class Mode { A, B };
    QList<int> mSizes{1, 2};
    struct Entry { const char *name; };
    void f() { tr("Panel text"); }
};
"#,
        );
        assert_eq!(output.messages[0].context, ContextSource::Lexical(vec!["Panel".into()]));
        let classes: Vec<&str> = output
            .declared_classes
            .iter()
            .map(|c| c.qualified_name.as_str())
            .collect();
        assert_eq!(classes, vec!["Panel", "Panel::Entry"]);
    }

    #[test]
    fn template_and_export_macros_in_class_heads() {
        let output = scan(
            "template<typename T> class TILEDSHARED_EXPORT Grid final : public Base<T> { void f() { tr(\"Grid\"); } };\n",
        );
        assert_eq!(output.messages[0].context, ContextSource::Lexical(vec!["Grid".into()]));
    }

    #[test]
    fn reports_unterminated_literal() {
        let err = CppScanner::new(default_markers())
            .scan("void f() {\n    tr(\"oops);\n}\n")
            .unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn reports_unbalanced_braces_and_calls() {
        let err = CppScanner::new(default_markers()).scan("}\n").unwrap_err();
        assert_eq!(err, ScanError::new(1, "unbalanced '}'"));

        let err = CppScanner::new(default_markers())
            .scan("void f() {\n tr(\"x\"\n")
            .unwrap_err();
        assert!(err.message.contains("unterminated call to tr"));

        let err = CppScanner::new(default_markers()).scan("/* open").unwrap_err();
        assert!(err.message.contains("unterminated comment"));
    }

    #[test]
    fn reports_braces_left_open_at_end_of_file() {
        let err = CppScanner::new(default_markers())
            .scan("class Dialog {
 void f() { tr(\"x\");
")
            .unwrap_err();
        assert_eq!(err, ScanError::new(2, "unclosed '{'"));
    }

    #[test]
    fn custom_markers_are_honoured() {
        let markers = vec![MarkerSpec {
            name: "i18n".into(),
            context_arg: None,
            source_arg: 0,
            disambiguation_arg: None,
            count_arg: None,
            always_plural: false,
        }];
        let output = CppScanner::new(markers)
            .scan("void f() { i18n(\"Hello\"); tr(\"Ignored\"); }")
            .unwrap();
        assert_eq!(output.messages.len(), 1);
        assert_eq!(output.messages[0].source_text, "Hello");
    }
}
