use std::rc::Rc;

use super::{ParseResult, Parser};
use crate::ast::{Node, NodeKind, SwitchCase, VarDeclarator};
use crate::lexer::{Keyword, Punct, TokenKind};

impl<'a> Parser<'a> {
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Rc<Node>> {
        self.with_stack_room(|parser| parser.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        match &self.current().kind {
            TokenKind::Punct(Punct::LBrace) => self.parse_block(),
            TokenKind::Punct(Punct::Semicolon) => {
                self.bump(true)?;
                Ok(self.node_at(NodeKind::EmptyStatement, start))
            }
            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Var => {
                    let decl = self.parse_variable_declaration()?;
                    self.consume_semicolon()?;
                    Ok(decl)
                }
                Keyword::Function => self.parse_function_declaration(),
                Keyword::If => self.parse_if(),
                Keyword::While => self.parse_while(),
                Keyword::Do => self.parse_do_while(),
                Keyword::For => self.parse_for(),
                Keyword::Switch => self.parse_switch(),
                Keyword::Try => self.parse_try(),
                Keyword::With => self.parse_with(),
                Keyword::Return => {
                    self.bump(true)?;
                    let argument = if self.at_punct(Punct::Semicolon)
                        || self.at_punct(Punct::RBrace)
                        || self.current().is_eof()
                        || self.current().newline_before
                    {
                        None
                    } else {
                        Some(self.parse_expression()?)
                    };
                    self.consume_semicolon()?;
                    Ok(self.node_at(NodeKind::ReturnStatement { argument }, start))
                }
                Keyword::Throw => {
                    self.bump(true)?;
                    if self.current().newline_before {
                        return Err(self.error("newline not allowed after throw"));
                    }
                    let argument = self.parse_expression()?;
                    self.consume_semicolon()?;
                    Ok(self.node_at(NodeKind::ThrowStatement { argument }, start))
                }
                Keyword::Break => {
                    self.bump(true)?;
                    let label = self.parse_optional_label()?;
                    self.consume_semicolon()?;
                    Ok(self.node_at(NodeKind::BreakStatement { label }, start))
                }
                Keyword::Continue => {
                    self.bump(true)?;
                    let label = self.parse_optional_label()?;
                    self.consume_semicolon()?;
                    Ok(self.node_at(NodeKind::ContinueStatement { label }, start))
                }
                Keyword::Debugger => {
                    self.bump(true)?;
                    self.consume_semicolon()?;
                    Ok(self.node_at(NodeKind::DebuggerStatement, start))
                }
                _ => self.parse_expression_statement(),
            },
            TokenKind::Identifier(_) => {
                if let Some(labeled) = self.try_parse_labeled_statement()? {
                    return Ok(labeled);
                }
                self.parse_expression_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_optional_label(&mut self) -> ParseResult<Option<Rc<str>>> {
        if self.current().newline_before {
            return Ok(None);
        }
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = Rc::clone(name);
                self.bump(true)?;
                Ok(Some(name))
            }
            _ => Ok(None),
        }
    }

    fn try_parse_labeled_statement(&mut self) -> ParseResult<Option<Rc<Node>>> {
        let start = self.current().span.start;
        let saved = self.snapshot();
        let TokenKind::Identifier(name) = &self.current().kind else {
            return Ok(None);
        };
        let label = Rc::clone(name);
        self.bump(false)?;
        if !self.at_punct(Punct::Colon) {
            self.restore(saved);
            return Ok(None);
        }
        self.bump(true)?;
        let body = self.parse_statement()?;
        Ok(Some(
            self.node_at(NodeKind::LabeledStatement { label, body }, start),
        ))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        let expression = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(self.node_at(NodeKind::ExpressionStatement { expression }, start))
    }

    pub(crate) fn parse_block(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_punct(Punct::LBrace, true)?;
        let mut body = Vec::new();
        while !self.at_punct(Punct::RBrace) {
            if self.current().is_eof() {
                return Err(self.error("unexpected end of input in block"));
            }
            body.push(self.parse_statement()?);
        }
        self.bump(true)?;
        Ok(self.node_at(NodeKind::BlockStatement { body }, start))
    }

    /// Parses `var a = 1, b` without the trailing semicolon; `for` heads
    /// share this path.
    fn parse_variable_declaration_common(&mut self, no_in: bool) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::Var, true)?;
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_identifier(false)?;
            let init = if self.eat_punct(Punct::Assign, true)? {
                Some(self.parse_assignment(no_in)?)
            } else {
                None
            };
            declarations.push(VarDeclarator { name, init });
            if !self.eat_punct(Punct::Comma, true)? {
                break;
            }
        }
        Ok(self.node_at(NodeKind::VariableDeclaration { declarations }, start))
    }

    pub(crate) fn parse_variable_declaration(&mut self) -> ParseResult<Rc<Node>> {
        self.parse_variable_declaration_common(false)
    }

    fn parse_function_declaration(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::Function, false)?;
        let name = self.expect_identifier(false)?;
        let (params, body) = self.parse_function_rest()?;
        Ok(self.node_at(NodeKind::FunctionDeclaration { name, params, body }, start))
    }

    pub(crate) fn parse_function_rest(&mut self) -> ParseResult<(Vec<Rc<str>>, Rc<Node>)> {
        self.expect_punct(Punct::LParen, false)?;
        let mut params = Vec::new();
        if !self.at_punct(Punct::RParen) {
            loop {
                params.push(self.expect_identifier(false)?);
                if !self.eat_punct(Punct::Comma, false)? {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, false)?;
        let body = self.parse_block()?;
        Ok((params, body))
    }

    fn parse_if(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::If, false)?;
        self.expect_punct(Punct::LParen, true)?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen, true)?;
        let consequent = self.parse_statement()?;
        let alternate = if self.eat_keyword(Keyword::Else, true)? {
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.node_at(
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            },
            start,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::While, false)?;
        self.expect_punct(Punct::LParen, true)?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen, true)?;
        let body = self.parse_statement()?;
        Ok(self.node_at(NodeKind::WhileStatement { test, body }, start))
    }

    fn parse_do_while(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::Do, true)?;
        let body = self.parse_statement()?;
        self.expect_keyword(Keyword::While, false)?;
        self.expect_punct(Punct::LParen, true)?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen, true)?;
        // The closing paren of do-while acts as a statement terminator.
        self.eat_punct(Punct::Semicolon, true)?;
        Ok(self.node_at(NodeKind::DoWhileStatement { body, test }, start))
    }

    fn parse_for(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::For, false)?;
        self.expect_punct(Punct::LParen, true)?;

        if self.at_keyword(Keyword::Var) {
            let decl = self.parse_variable_declaration_common(true)?;
            if self.at_keyword(Keyword::In) {
                let NodeKind::VariableDeclaration { declarations } = &decl.kind else {
                    unreachable!();
                };
                if declarations.len() != 1 {
                    return Err(self.error("for-in requires a single binding"));
                }
                self.bump(true)?;
                let right = self.parse_expression()?;
                self.expect_punct(Punct::RParen, true)?;
                let body = self.parse_statement()?;
                return Ok(self.node_at(
                    NodeKind::ForInStatement {
                        left: decl,
                        right,
                        body,
                    },
                    start,
                ));
            }
            self.expect_punct(Punct::Semicolon, true)?;
            return self.parse_for_tail(start, Some(decl));
        }

        if self.eat_punct(Punct::Semicolon, true)? {
            return self.parse_for_tail(start, None);
        }

        let init_start = self.current().span.start;
        let init = self.parse_expression_no_in()?;
        if self.at_keyword(Keyword::In) {
            if !matches!(
                init.kind,
                NodeKind::Identifier { .. } | NodeKind::MemberExpression { .. }
            ) {
                return Err(self.error("invalid left-hand side in for-in"));
            }
            self.bump(true)?;
            let right = self.parse_expression()?;
            self.expect_punct(Punct::RParen, true)?;
            let body = self.parse_statement()?;
            return Ok(self.node_at(
                NodeKind::ForInStatement {
                    left: init,
                    right,
                    body,
                },
                start,
            ));
        }
        let init = self.node_at(NodeKind::ExpressionStatement { expression: init }, init_start);
        self.expect_punct(Punct::Semicolon, true)?;
        self.parse_for_tail(start, Some(init))
    }

    fn parse_for_tail(
        &mut self,
        start: crate::ast::Position,
        init: Option<Rc<Node>>,
    ) -> ParseResult<Rc<Node>> {
        let test = if self.at_punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::Semicolon, true)?;
        let update = if self.at_punct(Punct::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::RParen, true)?;
        let body = self.parse_statement()?;
        Ok(self.node_at(
            NodeKind::ForStatement {
                init,
                test,
                update,
                body,
            },
            start,
        ))
    }

    fn parse_switch(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::Switch, false)?;
        self.expect_punct(Punct::LParen, true)?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(Punct::RParen, false)?;
        self.expect_punct(Punct::LBrace, true)?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.at_punct(Punct::RBrace) {
            let test = if self.eat_keyword(Keyword::Case, true)? {
                let test = self.parse_expression()?;
                self.expect_punct(Punct::Colon, true)?;
                Some(test)
            } else if self.eat_keyword(Keyword::Default, false)? {
                if seen_default {
                    return Err(self.error("multiple default clauses in switch"));
                }
                seen_default = true;
                self.expect_punct(Punct::Colon, true)?;
                None
            } else {
                return Err(self.unexpected());
            };
            let mut consequent = Vec::new();
            while !self.at_punct(Punct::RBrace)
                && !self.at_keyword(Keyword::Case)
                && !self.at_keyword(Keyword::Default)
            {
                if self.current().is_eof() {
                    return Err(self.error("unexpected end of input in switch"));
                }
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.bump(true)?;
        Ok(self.node_at(
            NodeKind::SwitchStatement {
                discriminant,
                cases,
            },
            start,
        ))
    }

    fn parse_try(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::Try, false)?;
        let block = self.parse_block()?;
        let handler = if self.at_keyword(Keyword::Catch) {
            let catch_start = self.current().span.start;
            self.bump(false)?;
            self.expect_punct(Punct::LParen, false)?;
            let param = self.expect_identifier(false)?;
            self.expect_punct(Punct::RParen, false)?;
            let body = self.parse_block()?;
            Some(self.node_at(NodeKind::CatchClause { param, body }, catch_start))
        } else {
            None
        };
        let finalizer = if self.eat_keyword(Keyword::Finally, false)? {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("try requires catch or finally"));
        }
        Ok(self.node_at(
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            },
            start,
        ))
    }

    fn parse_with(&mut self) -> ParseResult<Rc<Node>> {
        let start = self.current().span.start;
        self.expect_keyword(Keyword::With, false)?;
        self.expect_punct(Punct::LParen, true)?;
        let object = self.parse_expression()?;
        self.expect_punct(Punct::RParen, true)?;
        let body = self.parse_statement()?;
        Ok(self.node_at(NodeKind::WithStatement { object, body }, start))
    }
}
