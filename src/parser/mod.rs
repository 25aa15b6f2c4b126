mod expr;
mod stmt;

use std::fmt;
use std::rc::Rc;

use crate::ast::{Node, NodeKind, Position, SourceKind, Span};
use crate::lexer::{Keyword, LexError, Lexer, Punct, Token, TokenKind};

const PARSER_STACK_RED_ZONE: usize = 64 * 1024;
const PARSER_STACK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.position)
    }
}

impl From<LexError> for ParseError {
    fn from(value: LexError) -> Self {
        ParseError {
            message: value.message,
            position: value.position,
        }
    }
}

pub(crate) type ParseResult<T> = Result<T, ParseError>;

/// Parses a complete program in one pass.
pub fn parse_program(source: &str, kind: SourceKind) -> Result<Rc<Node>, ParseError> {
    let mut parser = Parser::new(source, kind)?;
    parser.parse_program()
}

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    prev_end: Position,
    source_kind: SourceKind,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, kind: SourceKind) -> ParseResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token(true)?;
        Ok(Parser {
            lexer,
            current,
            prev_end: Position { line: 1, column: 1 },
            source_kind: kind,
        })
    }

    pub(crate) fn parse_program(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current.span.start;
        let mut body = Vec::new();
        while !self.current.is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(self.node_at(NodeKind::Program { body }, start))
    }

    pub(crate) fn node_at(&self, kind: NodeKind, start: Position) -> Rc<Node> {
        Node::new(
            kind,
            Span {
                start,
                end: self.prev_end,
            },
            self.source_kind,
        )
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.current.span.start,
        }
    }

    pub(crate) fn unexpected(&self) -> ParseError {
        let what = match &self.current.kind {
            TokenKind::Eof => "unexpected end of input".to_string(),
            TokenKind::Identifier(name) => format!("unexpected identifier: {}", name),
            TokenKind::Number(n) => format!("unexpected number: {}", n),
            TokenKind::String(_) => "unexpected string literal".to_string(),
            TokenKind::Regex { .. } => "unexpected regular expression".to_string(),
            TokenKind::Keyword(k) => format!("unexpected keyword: {:?}", k).to_lowercase(),
            TokenKind::Punct(p) => format!("unexpected token: {:?}", p),
        };
        self.error(what)
    }

    /// Consumes the current token. `regex_allowed` describes the position
    /// that follows: whether a `/` there would begin a regex literal.
    pub(crate) fn bump(&mut self, regex_allowed: bool) -> ParseResult<Token> {
        let next = self.lexer.next_token(regex_allowed)?;
        self.prev_end = self.current.span.end;
        Ok(std::mem::replace(&mut self.current, next))
    }

    pub(crate) fn at_punct(&self, punct: Punct) -> bool {
        self.current.kind == TokenKind::Punct(punct)
    }

    pub(crate) fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current.kind == TokenKind::Keyword(keyword)
    }

    pub(crate) fn eat_punct(&mut self, punct: Punct, regex_allowed: bool) -> ParseResult<bool> {
        if self.at_punct(punct) {
            self.bump(regex_allowed)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn expect_punct(&mut self, punct: Punct, regex_allowed: bool) -> ParseResult<()> {
        if !self.eat_punct(punct, regex_allowed)? {
            return Err(self.error(format!("expected {:?}", punct)));
        }
        Ok(())
    }

    pub(crate) fn eat_keyword(&mut self, keyword: Keyword, regex_allowed: bool) -> ParseResult<bool> {
        if self.at_keyword(keyword) {
            self.bump(regex_allowed)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: Keyword, regex_allowed: bool) -> ParseResult<()> {
        if !self.eat_keyword(keyword, regex_allowed)? {
            return Err(self.error(format!("expected keyword {:?}", keyword).to_lowercase()));
        }
        Ok(())
    }

    pub(crate) fn expect_identifier(&mut self, regex_allowed: bool) -> ParseResult<Rc<str>> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = Rc::clone(name);
                self.bump(regex_allowed)?;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Automatic semicolon insertion: an explicit `;`, or a `}` / EOF /
    /// preceding line terminator closes the statement.
    pub(crate) fn consume_semicolon(&mut self) -> ParseResult<()> {
        if self.eat_punct(Punct::Semicolon, true)? {
            return Ok(());
        }
        if self.at_punct(Punct::RBrace) || self.current.is_eof() || self.current.newline_before {
            return Ok(());
        }
        Err(self.unexpected())
    }

    pub(crate) fn with_stack_room<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        stacker::maybe_grow(PARSER_STACK_RED_ZONE, PARSER_STACK_SIZE, || f(self))
    }

    pub(crate) fn snapshot(&self) -> (Lexer<'a>, Token, Position) {
        (self.lexer.clone(), self.current.clone(), self.prev_end)
    }

    pub(crate) fn restore(&mut self, saved: (Lexer<'a>, Token, Position)) {
        self.lexer = saved.0;
        self.current = saved.1;
        self.prev_end = saved.2;
    }

    pub(crate) fn current(&self) -> &Token {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LiteralValue;

    fn parse(source: &str) -> Rc<Node> {
        parse_program(source, SourceKind::User).expect("parse failure")
    }

    fn body(node: &Rc<Node>) -> &[Rc<Node>] {
        match &node.kind {
            NodeKind::Program { body } => body,
            _ => panic!("not a program"),
        }
    }

    #[test]
    fn parses_var_and_expression_statements() {
        let program = parse("var x = 1; x;");
        let stmts = body(&program);
        assert_eq!(stmts.len(), 2);
        assert!(matches!(
            stmts[0].kind,
            NodeKind::VariableDeclaration { .. }
        ));
        assert!(matches!(
            stmts[1].kind,
            NodeKind::ExpressionStatement { .. }
        ));
    }

    #[test]
    fn asi_closes_statements_at_newlines() {
        let program = parse("var a = 1\nvar b = 2\na + b");
        assert_eq!(body(&program).len(), 3);
    }

    #[test]
    fn restricted_return_takes_no_argument_across_newline() {
        let program = parse("function f() { return\n1 }");
        let NodeKind::Program { body } = &program.kind else {
            unreachable!();
        };
        let NodeKind::FunctionDeclaration { body: fn_body, .. } = &body[0].kind else {
            panic!("expected function declaration");
        };
        let NodeKind::BlockStatement { body: stmts } = &fn_body.kind else {
            panic!("expected block");
        };
        assert!(matches!(
            stmts[0].kind,
            NodeKind::ReturnStatement { argument: None }
        ));
    }

    #[test]
    fn precedence_of_arithmetic() {
        let program = parse("1 + 2 * 3;");
        let NodeKind::ExpressionStatement { expression } = &body(&program)[0].kind else {
            panic!("expected expression statement");
        };
        let NodeKind::BinaryExpression { operator, right, .. } = &expression.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*operator, crate::ast::BinaryOp::Add);
        assert!(matches!(right.kind, NodeKind::BinaryExpression { .. }));
    }

    #[test]
    fn for_in_left_var_declaration() {
        let program = parse("for (var k in o) {}");
        assert!(matches!(body(&program)[0].kind, NodeKind::ForInStatement { .. }));
    }

    #[test]
    fn labeled_break_targets() {
        let program = parse("outer: while (true) { break outer; }");
        let NodeKind::LabeledStatement { label, .. } = &body(&program)[0].kind else {
            panic!("expected labeled statement");
        };
        assert_eq!(&**label, "outer");
    }

    #[test]
    fn object_literal_accessors() {
        let program = parse("var o = { get a() { return 1; }, set a(v) {}, b: 2 };");
        let NodeKind::VariableDeclaration { declarations } = &body(&program)[0].kind else {
            panic!("expected var declaration");
        };
        let init = declarations[0].init.as_ref().unwrap();
        let NodeKind::ObjectExpression { properties } = &init.kind else {
            panic!("expected object literal");
        };
        assert_eq!(properties.len(), 3);
        assert_eq!(properties[0].kind, crate::ast::PropertyKind::Get);
        assert_eq!(properties[1].kind, crate::ast::PropertyKind::Set);
        assert_eq!(properties[2].kind, crate::ast::PropertyKind::Init);
    }

    #[test]
    fn regex_literal_in_expression_position() {
        let program = parse("var re = /a+b/g;");
        let NodeKind::VariableDeclaration { declarations } = &body(&program)[0].kind else {
            panic!("expected var declaration");
        };
        let init = declarations[0].init.as_ref().unwrap();
        assert!(matches!(
            &init.kind,
            NodeKind::Literal {
                value: LiteralValue::Regex { .. }
            }
        ));
    }

    #[test]
    fn division_after_identifier_is_not_regex() {
        let program = parse("var x = a / b / c;");
        assert_eq!(body(&program).len(), 1);
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(parse_program("var = 1;", SourceKind::User).is_err());
        assert!(parse_program("if (", SourceKind::User).is_err());
        assert!(parse_program("function () {}", SourceKind::User).is_err());
    }

    #[test]
    fn polyfill_nodes_are_flagged() {
        let program = parse_program("1;", SourceKind::Polyfill).unwrap();
        assert!(program.polyfill);
        assert!(program.span.is_none());
        let user = parse("1;");
        assert!(!user.polyfill);
        assert!(user.span.is_some());
    }
}
