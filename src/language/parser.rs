use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};

/// Lexes and parses a complete program. All syntax errors found while
/// scanning or parsing are collected and returned together; the parser
/// resynchronizes after each error and keeps going.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span, err.line))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Vec<Stmt>, SyntaxErrors> {
        let mut statements = Vec::new();

        while !self.is_eof() {
            while self.matches(&TokenKind::Newline) {}
            if self.is_eof() {
                break;
            }
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn declaration(&mut self) -> Result<Stmt, SyntaxError> {
        if self.matches(&TokenKind::Fun) {
            return self.function("function").map(Stmt::Function);
        }
        if self.matches(&TokenKind::Let) {
            return self.let_declaration();
        }
        if self.matches(&TokenKind::Type) {
            return self.type_declaration();
        }
        if self.matches(&TokenKind::Impl) {
            return self.impl_declaration();
        }
        if self.matches(&TokenKind::Import) {
            return self.import_declaration();
        }
        if self.matches(&TokenKind::Delete) {
            return self.delete_statement();
        }
        self.statement()
    }

    fn let_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let mutable = self.matches(&TokenKind::Mutable);
        let name = self.expect_identifier("Expect variable name.")?;
        self.expect(&TokenKind::Assign, "Expect '=' after variable name.")?;
        let initializer = self.expression()?;
        self.consume_newline("Expect newline after let declaration.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Let(LetStmt {
            name: name.name,
            initializer,
            mutable,
            span,
        }))
    }

    fn type_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let name = self.expect_identifier("Expect type name.")?;
        self.expect(&TokenKind::Assign, "Expect '=' after type name.")?;

        let kind = if self.matches(&TokenKind::Class) {
            TypeKind::Class
        } else if self.matches(&TokenKind::Struct) {
            TypeKind::Struct
        } else {
            return Err(self.error_here("Expect 'class' or 'struct'."));
        };

        self.expect(&TokenKind::LBrace, "Expect '{' before type body.")?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            // Field separators and any layout tokens inside the braces.
            if self.matches(&TokenKind::Comma)
                || self.matches(&TokenKind::Semicolon)
                || self.matches(&TokenKind::Newline)
                || self.matches(&TokenKind::Indent)
                || self.matches(&TokenKind::Dedent)
            {
                continue;
            }
            let field = self.expect_identifier("Expect field name.")?;
            self.expect(&TokenKind::Colon, "Expect ':' after field name.")?;
            self.expect_identifier("Expect field type.")?;
            fields.push(field.name);
        }

        self.expect(&TokenKind::RBrace, "Expect '}' after type body.")?;
        self.matches(&TokenKind::Newline);

        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Type(TypeDecl {
            name: name.name,
            kind,
            fields,
            span,
        }))
    }

    fn impl_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let name = self.expect_identifier("Expect type name to implement.")?;
        self.expect(&TokenKind::Colon, "Expect ':' after type name.")?;
        self.expect(&TokenKind::Newline, "Expect newline before 'impl' block.")?;
        self.expect(&TokenKind::Indent, "Expect indented 'impl' block.")?;

        let mut methods = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.is_eof() {
            while self.matches(&TokenKind::Newline) {}
            if self.check(&TokenKind::Dedent) {
                break;
            }
            if self.matches(&TokenKind::Fun) {
                methods.push(self.function("method")?);
            } else {
                return Err(self.error_here("Expect 'fun' inside 'impl'."));
            }
        }

        self.expect(&TokenKind::Dedent, "Expect dedent after 'impl' block.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Impl(ImplBlock {
            type_name: name.name,
            methods,
            span,
        }))
    }

    fn function(&mut self, kind: &str) -> Result<FunctionDecl, SyntaxError> {
        let name = self.expect_identifier(&format!("Expect {kind} name."))?;
        self.expect(&TokenKind::LParen, &format!("Expect '(' after {kind} name."))?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier("Expect parameter name.")?.name);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "Expect ')' after parameters.")?;
        self.expect(&TokenKind::Colon, &format!("Expect ':' before {kind} body."))?;
        self.expect(&TokenKind::Newline, &format!("Expect newline before {kind} body."))?;
        self.expect(&TokenKind::Indent, &format!("Expect indented {kind} body."))?;
        let body = self.block_body()?;
        let span = Span::new(name.span.start, self.previous().span.end);
        Ok(FunctionDecl {
            name: name.name,
            params,
            body,
            span,
        })
    }

    fn import_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let (path, _) = self.expect_string("Expect module path.")?;
        self.expect(&TokenKind::As, "Expect 'as' after import path.")?;
        let alias = self.expect_identifier("Expect module alias.")?;
        self.consume_newline("Expect newline after import.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Import(ImportStmt {
            path,
            alias: alias.name,
            span,
        }))
    }

    fn delete_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let name = self.expect_identifier("Expect variable name to delete.")?;
        self.consume_newline("Expect newline after delete.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Delete(DeleteStmt {
            name: name.name,
            span,
        }))
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        if self.matches(&TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(&TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(&TokenKind::Print) {
            return self.print_statement();
        }
        if self.matches(&TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(&TokenKind::Indent) {
            return Ok(Stmt::Block(self.block_body()?));
        }
        self.expression_statement()
    }

    fn block_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.is_eof() {
            while self.matches(&TokenKind::Newline) {}
            if self.check(&TokenKind::Dedent) || self.is_eof() {
                break;
            }
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }
        self.expect(&TokenKind::Dedent, "Expect dedent after block.")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let condition = self.expression()?;
        self.expect(&TokenKind::Colon, "Expect ':' after if condition.")?;
        self.expect(&TokenKind::Newline, "Expect newline after if condition.")?;

        let then_branch = Box::new(self.statement()?);

        // Blank lines (and the separator emitted after a dedent) may
        // sit between the then branch and an else arm.
        while self.matches(&TokenKind::Newline) {}

        let else_branch = if self.matches(&TokenKind::Else) {
            self.expect(&TokenKind::Colon, "Expect ':' after else.")?;
            self.expect(&TokenKind::Newline, "Expect newline after else.")?;
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        }))
    }

    fn while_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let condition = self.expression()?;
        self.expect(&TokenKind::Colon, "Expect ':' after while condition.")?;
        self.expect(&TokenKind::Newline, "Expect newline after while condition.")?;
        let body = Box::new(self.statement()?);
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    fn print_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let expr = self.expression()?;
        self.consume_newline("Expect newline after value.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Print(PrintStmt { expr, span }))
    }

    fn return_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.previous().span.start;
        let value = if !self.check(&TokenKind::Newline) && !self.is_eof() {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume_newline("Expect newline after return.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Stmt::Return(ReturnStmt { value, span }))
    }

    fn expression_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let expr = self.expression()?;
        self.consume_newline("Expect newline after expression.")?;
        let span = Span::new(self.previous().span.start, self.previous().span.end);
        Ok(Stmt::Expression(ExprStmt { expr, span }))
    }

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.equality()?;

        if self.matches(&TokenKind::Assign) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return Ok(match expr {
                Expr::Variable(name) => Expr::Assign { name, value },
                Expr::Get { object, name } => Expr::Set {
                    object,
                    name,
                    value,
                },
                Expr::Dereference { expr: pointer, span } => Expr::PointerSet {
                    pointer,
                    value,
                    span,
                },
                other => {
                    let err = SyntaxError::new(
                        "Invalid assignment target.",
                        equals.span,
                        equals.line,
                    )
                    .with_label("cannot assign here");
                    self.report(err);
                    other
                }
            });
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.matches(&TokenKind::EqualEqual) {
                BinaryOp::Eq
            } else if self.matches(&TokenKind::BangEqual) {
                BinaryOp::NotEq
            } else {
                break;
            };
            let right = self.comparison()?;
            expr = self.binary(op, expr, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.term()?;
        loop {
            let op = if self.matches(&TokenKind::Greater) {
                BinaryOp::Greater
            } else if self.matches(&TokenKind::GreaterEqual) {
                BinaryOp::GreaterEq
            } else if self.matches(&TokenKind::Less) {
                BinaryOp::Less
            } else if self.matches(&TokenKind::LessEqual) {
                BinaryOp::LessEq
            } else {
                break;
            };
            let right = self.term()?;
            expr = self.binary(op, expr, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.matches(&TokenKind::Minus) {
                BinaryOp::Sub
            } else if self.matches(&TokenKind::Plus) {
                BinaryOp::Add
            } else {
                break;
            };
            let right = self.factor()?;
            expr = self.binary(op, expr, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.matches(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.matches(&TokenKind::Star) {
                BinaryOp::Mul
            } else {
                break;
            };
            let right = self.unary()?;
            expr = self.binary(op, expr, right);
        }
        Ok(expr)
    }

    fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = Span::new(expr_start(&left), self.previous().span.end);
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.matches(&TokenKind::Bang) {
            let start = self.previous().span.start;
            let expr = self.unary()?;
            let span = Span::new(start, self.previous().span.end);
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        if self.matches(&TokenKind::Minus) {
            let start = self.previous().span.start;
            let expr = self.unary()?;
            let span = Span::new(start, self.previous().span.end);
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        if self.matches(&TokenKind::Star) {
            // Prefix '*' builds a pointer and only accepts a bare name.
            let star = self.previous().clone();
            let expr = self.unary()?;
            return match expr {
                Expr::Variable(name) => Ok(Expr::AddressOf(name)),
                _ => Err(SyntaxError::new(
                    "Can only take address of a variable.",
                    star.span,
                    star.line,
                )
                .with_label("'*' needs a variable")),
            };
        }
        if self.matches(&TokenKind::Ampersand) {
            // '&e' is shorthand for the postfix dereference 'e.*'.
            let start = self.previous().span.start;
            let expr = self.unary()?;
            let span = Span::new(start, self.previous().span.end);
            return Ok(Expr::Dereference {
                expr: Box::new(expr),
                span,
            });
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(&TokenKind::LParen) {
                let start = expr_start(&expr);
                let args = self.arguments()?;
                let span = Span::new(start, self.previous().span.end);
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.matches(&TokenKind::Dot) {
                if self.matches(&TokenKind::Star) {
                    let span = Span::new(expr_start(&expr), self.previous().span.end);
                    expr = Expr::Dereference {
                        expr: Box::new(expr),
                        span,
                    };
                } else {
                    let name = self.expect_identifier("Expect property name after '.'.")?;
                    expr = Expr::Get {
                        object: Box::new(expr),
                        name,
                    };
                }
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "Expect ')' after arguments.")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        if self.matches(&TokenKind::This) {
            return Ok(Expr::This(self.previous().span));
        }

        if self.matches(&TokenKind::New) {
            let start = self.previous().span.start;
            let type_name = self.expect_identifier("Expect type name after new.")?;
            self.expect(&TokenKind::LParen, "Expect '(' after type name.")?;
            let args = self.arguments()?;
            let span = Span::new(start, self.previous().span.end);
            return Ok(Expr::New {
                type_name,
                args,
                span,
            });
        }

        if self.matches(&TokenKind::LBracket) {
            return self.list_or_lambda();
        }

        if self.matches(&TokenKind::LParen) {
            let expr = self.expression()?;
            self.expect(&TokenKind::RParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }

        if self.matches(&TokenKind::MapStart) {
            return self.map_literal();
        }

        if self.matches(&TokenKind::LBrace) {
            let start = self.previous().span.start;
            let mut elements = Vec::new();
            if !self.check(&TokenKind::RBrace) {
                loop {
                    elements.push(self.expression()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RBrace, "Expect '}' after tuple elements.")?;
            let span = Span::new(start, self.previous().span.end);
            return Ok(Expr::Tuple { elements, span });
        }

        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(value, token.span)))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(value, token.span)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Variable(Identifier {
                    name,
                    span: token.span,
                }))
            }
            TokenKind::Atom(name) => {
                self.advance();
                Ok(Expr::Atom {
                    name,
                    span: token.span,
                })
            }
            _ => Err(self.error_here("Expect expression.")),
        }
    }

    /// `[` has been consumed; decide by lookahead whether a capture
    /// list or a list literal follows. A capture list is a comma run of
    /// (optionally `*`-prefixed) identifiers closed by `](`.
    fn list_or_lambda(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.previous().span.start;
        if self.looks_like_lambda() {
            return self.lambda(start);
        }

        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "Expect ']' after list elements.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Expr::ListLit { elements, span })
    }

    fn looks_like_lambda(&self) -> bool {
        // Empty capture list: `](`.
        if matches!(self.kind_at(0), TokenKind::RBracket)
            && matches!(self.kind_at(1), TokenKind::LParen)
        {
            return true;
        }

        let mut i = 0usize;
        loop {
            if matches!(self.kind_at(i), TokenKind::Star) {
                i += 1;
                if !matches!(self.kind_at(i), TokenKind::Identifier(_)) {
                    return false;
                }
            }
            if matches!(self.kind_at(i), TokenKind::Identifier(_)) {
                i += 1;
                match self.kind_at(i) {
                    TokenKind::Comma => {
                        i += 1;
                        continue;
                    }
                    TokenKind::RBracket => {
                        return matches!(self.kind_at(i + 1), TokenKind::LParen);
                    }
                    _ => return false,
                }
            } else {
                return false;
            }
        }
    }

    fn lambda(&mut self, start: usize) -> Result<Expr, SyntaxError> {
        let mut captures = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                if self.matches(&TokenKind::Star) {
                    let name = self.expect_identifier("Expect identifier after '*'.")?;
                    captures.push(Capture::ByAddress(name));
                } else {
                    let name = self.expect_identifier("Expect capture identifier.")?;
                    captures.push(Capture::ByValue(name));
                }
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "Expect ']' after captures.")?;

        self.expect(&TokenKind::LParen, "Expect '(' after captures.")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier("Expect parameter name.")?.name);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "Expect ')' after parameters.")?;
        self.expect(&TokenKind::Colon, "Expect ':' before lambda body.")?;
        self.expect(&TokenKind::Newline, "Expect newline after lambda header.")?;
        self.expect(&TokenKind::Indent, "Expect indented lambda body.")?;
        let body = self.block_body()?;

        let span = Span::new(start, self.previous().span.end);
        Ok(Expr::Lambda(LambdaExpr {
            captures,
            params,
            body,
            span,
        }))
    }

    fn map_literal(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.previous().span.start;
        let mut keys = Vec::new();
        let mut values = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                keys.push(self.expression()?);
                self.expect(&TokenKind::Arrow, "Expect '=>' after map key.")?;
                values.push(self.expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace, "Expect '}' after map entries.")?;
        let span = Span::new(start, self.previous().span.end);
        Ok(Expr::MapLit { keys, values, span })
    }

    // Token plumbing.

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_eof() {
            return false;
        }
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            Err(self.error_here(message))
        }
    }

    fn expect_identifier(&mut self, message: &str) -> Result<Identifier, SyntaxError> {
        let token = self.peek().clone();
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            Ok(Identifier {
                name,
                span: token.span,
            })
        } else {
            Err(self.error_here(message))
        }
    }

    fn expect_string(&mut self, message: &str) -> Result<(String, Span), SyntaxError> {
        let token = self.peek().clone();
        if let TokenKind::Str(value) = token.kind {
            self.advance();
            Ok((value, token.span))
        } else {
            Err(self.error_here(message))
        }
    }

    /// Statement terminator: a NEWLINE, or end of input.
    fn consume_newline(&mut self, message: &str) -> Result<(), SyntaxError> {
        if self.is_eof() || self.matches(&TokenKind::Newline) {
            Ok(())
        } else {
            Err(self.error_here(message))
        }
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn kind_at(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(message, token.span, token.line)
            .with_label(format!("unexpected {}", token.kind.describe()))
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    /// Skips to the next statement boundary after a syntax error.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_eof() {
            if matches!(self.previous().kind, TokenKind::Newline) {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Struct
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::Print
                | TokenKind::Type
                | TokenKind::Delete
                | TokenKind::Impl
                | TokenKind::Fun
                | TokenKind::Return
                | TokenKind::While => return,
                _ => self.advance(),
            }
        }
    }
}

fn expr_start(expr: &Expr) -> usize {
    match expr {
        Expr::Literal(Literal::Int(_, span)) | Expr::Literal(Literal::Str(_, span)) => span.start,
        Expr::Variable(name) | Expr::AddressOf(name) => name.span.start,
        Expr::Assign { name, .. } => name.span.start,
        Expr::Binary { span, .. }
        | Expr::Unary { span, .. }
        | Expr::Call { span, .. }
        | Expr::New { span, .. }
        | Expr::ListLit { span, .. }
        | Expr::Dereference { span, .. }
        | Expr::PointerSet { span, .. }
        | Expr::Atom { span, .. }
        | Expr::Tuple { span, .. }
        | Expr::MapLit { span, .. } => span.start,
        Expr::Grouping(inner) => expr_start(inner),
        Expr::Get { object, .. } | Expr::Set { object, .. } => expr_start(object),
        Expr::This(span) => span.start,
        Expr::Lambda(lambda) => lambda.span.start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        parse_program(source).expect("program should parse")
    }

    fn parse_err(source: &str) -> SyntaxErrors {
        parse_program(source).expect_err("program should fail to parse")
    }

    #[test]
    fn parses_let_declarations() {
        let stmts = parse_ok("let x = 10\nlet mutable y = 20\n");
        assert_eq!(stmts.len(), 2);
        let Stmt::Let(first) = &stmts[0] else {
            panic!("expected let");
        };
        assert_eq!(first.name, "x");
        assert!(!first.mutable);
        let Stmt::Let(second) = &stmts[1] else {
            panic!("expected let");
        };
        assert!(second.mutable);
    }

    #[test]
    fn parses_type_declarations() {
        let stmts = parse_ok("type P = struct { x: int, y: int }\ntype Box = class { v: int }\n");
        let Stmt::Type(p) = &stmts[0] else {
            panic!("expected type");
        };
        assert_eq!(p.kind, TypeKind::Struct);
        assert_eq!(p.fields, vec!["x".to_string(), "y".to_string()]);
        let Stmt::Type(b) = &stmts[1] else {
            panic!("expected type");
        };
        assert_eq!(b.kind, TypeKind::Class);
    }

    #[test]
    fn parses_multi_line_type_bodies() {
        let stmts = parse_ok("type P = struct {\n    x: int\n    y: int\n}\n");
        let Stmt::Type(p) = &stmts[0] else {
            panic!("expected type");
        };
        assert_eq!(p.fields.len(), 2);
    }

    #[test]
    fn parses_impl_blocks() {
        let source = "impl Counter:\n    fun bump():\n        this.v = this.v + 1\n    fun value():\n        return this.v\n";
        let stmts = parse_ok(source);
        let Stmt::Impl(block) = &stmts[0] else {
            panic!("expected impl");
        };
        assert_eq!(block.type_name, "Counter");
        assert_eq!(block.methods.len(), 2);
        assert_eq!(block.methods[1].name, "value");
    }

    #[test]
    fn parses_if_else_blocks() {
        let source = "if x > 1:\n    print 1\nelse:\n    print 2\n";
        let stmts = parse_ok(source);
        let Stmt::If(stmt) = &stmts[0] else {
            panic!("expected if");
        };
        assert!(stmt.else_branch.is_some());
    }

    #[test]
    fn lambda_and_list_disambiguate() {
        let stmts = parse_ok("let f = [x](n):\n    return n\n");
        let Stmt::Let(decl) = &stmts[0] else {
            panic!("expected let");
        };
        assert!(matches!(decl.initializer, Expr::Lambda(_)));

        let stmts = parse_ok("let l = [1, 2, 3]\n");
        let Stmt::Let(decl) = &stmts[0] else {
            panic!("expected let");
        };
        assert!(matches!(decl.initializer, Expr::ListLit { .. }));

        // Identifiers without a following '(' stay a list literal.
        let stmts = parse_ok("let l = [a, b]\n");
        let Stmt::Let(decl) = &stmts[0] else {
            panic!("expected let");
        };
        assert!(matches!(decl.initializer, Expr::ListLit { .. }));
    }

    #[test]
    fn lambda_captures_by_address() {
        let stmts = parse_ok("let f = [*x, y]():\n    return y\n");
        let Stmt::Let(decl) = &stmts[0] else {
            panic!("expected let");
        };
        let Expr::Lambda(lambda) = &decl.initializer else {
            panic!("expected lambda");
        };
        assert!(matches!(lambda.captures[0], Capture::ByAddress(_)));
        assert!(matches!(lambda.captures[1], Capture::ByValue(_)));
    }

    #[test]
    fn rewrites_assignment_targets() {
        let stmts = parse_ok("x = 1\no.field = 2\np.* = 3\n&p = 4\n");
        assert!(matches!(
            &stmts[0],
            Stmt::Expression(ExprStmt { expr: Expr::Assign { .. }, .. })
        ));
        assert!(matches!(
            &stmts[1],
            Stmt::Expression(ExprStmt { expr: Expr::Set { .. }, .. })
        ));
        assert!(matches!(
            &stmts[2],
            Stmt::Expression(ExprStmt { expr: Expr::PointerSet { .. }, .. })
        ));
        assert!(matches!(
            &stmts[3],
            Stmt::Expression(ExprStmt { expr: Expr::PointerSet { .. }, .. })
        ));
    }

    #[test]
    fn invalid_assignment_target_is_reported() {
        let errors = parse_err("1 = 2\n");
        assert!(errors
            .errors
            .iter()
            .any(|e| e.message.contains("Invalid assignment target")));
    }

    #[test]
    fn address_of_requires_a_variable() {
        let errors = parse_err("let p = *1\n");
        assert!(errors
            .errors
            .iter()
            .any(|e| e.message.contains("address of a variable")));
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let errors = parse_err("let = 1\nlet 2\nlet ok = 3\n");
        assert!(errors.errors.len() >= 2);
    }

    #[test]
    fn parses_erlang_flavored_literals() {
        let stmts = parse_ok("print {@ok, 200, \"OK\"}\nprint #{@a => 1, @b => 2}\n");
        let Stmt::Print(first) = &stmts[0] else {
            panic!("expected print");
        };
        assert!(matches!(first.expr, Expr::Tuple { .. }));
        let Stmt::Print(second) = &stmts[1] else {
            panic!("expected print");
        };
        let Expr::MapLit { keys, values, .. } = &second.expr else {
            panic!("expected map literal");
        };
        assert_eq!(keys.len(), 2);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn parses_imports_and_delete() {
        let stmts = parse_ok("import \"util.rill\" as util\ndelete x\n");
        assert!(matches!(&stmts[0], Stmt::Import(_)));
        assert!(matches!(&stmts[1], Stmt::Delete(_)));
    }

    #[test]
    fn parses_program_without_trailing_newline() {
        let stmts = parse_ok("let x = 1\nprint x");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn method_calls_chain_after_dereference() {
        let stmts = parse_ok("p.*.field\n");
        let Stmt::Expression(stmt) = &stmts[0] else {
            panic!("expected expression");
        };
        let Expr::Get { object, .. } = &stmt.expr else {
            panic!("expected get");
        };
        assert!(matches!(**object, Expr::Dereference { .. }));
    }
}
