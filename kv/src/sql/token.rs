//! Lexer (§4.8, §1.11): a `logos`-driven token kind enum plus the
//! `Tokenizer` iterator wrapper, adapted from the CLI's own SQL lexer and
//! narrowed to the keywords and operators this grammar actually parses.

use logos::{Lexer, Logos};
use std::ops::Range as StdRange;

#[allow(non_camel_case_types)]
#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Error,
    EOI,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"--[^\n]*", logos::skip)]
    Comment,

    #[regex(r#"[_a-zA-Z][_a-zA-Z0-9]*"#)]
    Ident,

    #[regex(r#"'([^'\\]|\\.|'')*'"#)]
    QuotedString,

    #[regex(r"[0-9]+")]
    LiteralInteger,

    #[regex(r"([0-9]*\.[0-9]+([eE][+-]?[0-9]+)?)|([0-9]+\.[0-9]*([eE][+-]?[0-9]+)?)|([0-9]+[eE][+-]?[0-9]+)")]
    LiteralFloat,

    #[regex(r#"\$[_a-zA-Z][_a-zA-Z0-9]*"#)]
    NamedParameter,

    #[token("?")]
    Placeholder,

    #[token("=")]
    Eq,
    #[token("<>")]
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Lte,
    #[token(">=")]
    Gte,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Multiply,
    #[token("/")]
    Divide,
    #[token("%")]
    Modulo,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Period,
    #[token(";")]
    SemiColon,
    #[token(":")]
    Colon,

    #[token("SELECT", ignore(ascii_case))]
    SELECT,
    #[token("FROM", ignore(ascii_case))]
    FROM,
    #[token("WHERE", ignore(ascii_case))]
    WHERE,
    #[token("GROUP", ignore(ascii_case))]
    GROUP,
    #[token("BY", ignore(ascii_case))]
    BY,
    #[token("HAVING", ignore(ascii_case))]
    HAVING,
    #[token("ORDER", ignore(ascii_case))]
    ORDER,
    #[token("ASC", ignore(ascii_case))]
    ASC,
    #[token("DESC", ignore(ascii_case))]
    DESC,
    #[token("LIMIT", ignore(ascii_case))]
    LIMIT,
    #[token("OFFSET", ignore(ascii_case))]
    OFFSET,
    #[token("UNION", ignore(ascii_case))]
    UNION,
    #[token("ALL", ignore(ascii_case))]
    ALL,
    #[token("DISTINCT", ignore(ascii_case))]
    DISTINCT,
    #[token("AS", ignore(ascii_case))]
    AS,
    #[token("AND", ignore(ascii_case))]
    AND,
    #[token("OR", ignore(ascii_case))]
    OR,
    #[token("NOT", ignore(ascii_case))]
    NOT,
    #[token("IN", ignore(ascii_case))]
    IN,
    #[token("IS", ignore(ascii_case))]
    IS,
    #[token("NULL", ignore(ascii_case))]
    NULL,
    #[token("LIKE", ignore(ascii_case))]
    LIKE,
    #[token("TRUE", ignore(ascii_case))]
    TRUE,
    #[token("FALSE", ignore(ascii_case))]
    FALSE,
    #[token("CAST", ignore(ascii_case))]
    CAST,

    #[token("CREATE", ignore(ascii_case))]
    CREATE,
    #[token("DROP", ignore(ascii_case))]
    DROP,
    #[token("TABLE", ignore(ascii_case))]
    TABLE,
    #[token("INDEX", ignore(ascii_case))]
    INDEX,
    #[token("SEQUENCE", ignore(ascii_case))]
    SEQUENCE,
    #[token("UNIQUE", ignore(ascii_case))]
    UNIQUE,
    #[token("IF", ignore(ascii_case))]
    IF,
    #[token("EXISTS", ignore(ascii_case))]
    EXISTS,
    #[token("PRIMARY", ignore(ascii_case))]
    PRIMARY,
    #[token("KEY", ignore(ascii_case))]
    KEY,
    #[token("DEFAULT", ignore(ascii_case))]
    DEFAULT,
    #[token("CHECK", ignore(ascii_case))]
    CHECK,
    #[token("ON", ignore(ascii_case))]
    ON,

    #[token("INCREMENT", ignore(ascii_case))]
    INCREMENT,
    #[token("MINVALUE", ignore(ascii_case))]
    MINVALUE,
    #[token("MAXVALUE", ignore(ascii_case))]
    MAXVALUE,
    #[token("START", ignore(ascii_case))]
    START,
    #[token("WITH", ignore(ascii_case))]
    WITH,
    #[token("CACHE", ignore(ascii_case))]
    CACHE,
    #[token("CYCLE", ignore(ascii_case))]
    CYCLE,

    #[token("INSERT", ignore(ascii_case))]
    INSERT,
    #[token("INTO", ignore(ascii_case))]
    INTO,
    #[token("VALUES", ignore(ascii_case))]
    VALUES,
    #[token("UPDATE", ignore(ascii_case))]
    UPDATE,
    #[token("SET", ignore(ascii_case))]
    SET,
    #[token("DELETE", ignore(ascii_case))]
    DELETE,

    #[token("BEGIN", ignore(ascii_case))]
    BEGIN,
    #[token("COMMIT", ignore(ascii_case))]
    COMMIT,
    #[token("ROLLBACK", ignore(ascii_case))]
    ROLLBACK,
    #[token("READ", ignore(ascii_case))]
    READ,
    #[token("ONLY", ignore(ascii_case))]
    ONLY,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::LiteralInteger
                | TokenKind::LiteralFloat
                | TokenKind::QuotedString
                | TokenKind::TRUE
                | TokenKind::FALSE
                | TokenKind::NULL
        )
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub source: &'a str,
    pub slice: &'a str,
    pub kind: TokenKind,
    pub span: StdRange<usize>,
}

impl<'a> Token<'a> {
    fn new_eoi(source: &'a str) -> Self {
        Token { source, slice: "", kind: TokenKind::EOI, span: source.len()..source.len() }
    }

    pub fn text(&self) -> &'a str {
        &self.source[self.span.clone()]
    }
}

impl std::fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.slice)
    }
}

pub struct Tokenizer<'a> {
    source: &'a str,
    lexer: Lexer<'a, TokenKind>,
    eoi: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Tokenizer { source, lexer: TokenKind::lexer(source), eoi: false }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lexer.next() {
            Some(Err(_)) => Some(Err(format!("unrecognized token near '{}'", self.lexer.slice()))),
            Some(Ok(kind)) => Some(Ok(Token {
                source: self.source,
                slice: self.lexer.slice(),
                kind,
                span: self.lexer.span(),
            })),
            None if !self.eoi => {
                self.eoi = true;
                Some(Ok(Token::new_eoi(self.source)))
            }
            None => None,
        }
    }
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>, String> {
    Tokenizer::new(sql).collect()
}
