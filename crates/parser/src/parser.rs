use crate::{ast::*, error::*};
use sprig_lexer::{LexedToken, Lexer, QuotedIdentifier, Span, Token};
use std::{iter::Peekable, str::Chars};

// Infix operators that are parsed with precedence climbing
#[derive(Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Range,
}

impl Infix {
    fn from_token(token: Token) -> Option<Self> {
        use BinaryOp::*;

        let result = match token {
            Token::Or => Self::Binary(Or),
            Token::And => Self::Binary(And),
            Token::Equal => Self::Binary(Equal),
            Token::NotEqual => Self::Binary(NotEqual),
            Token::Less => Self::Binary(Less),
            Token::LessOrEqual => Self::Binary(LessOrEqual),
            Token::Greater => Self::Binary(Greater),
            Token::GreaterOrEqual => Self::Binary(GreaterOrEqual),
            Token::Add => Self::Binary(Add),
            Token::Subtract => Self::Binary(Subtract),
            Token::Multiply => Self::Binary(Multiply),
            Token::Divide => Self::Binary(Divide),
            Token::Remainder => Self::Binary(Remainder),
            Token::RangeExclusive => Self::Range,
            _ => return None,
        };

        Some(result)
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Binary(op) => op.precedence(),
            // Ranges bind more loosely than arithmetic, and tighter than comparisons
            Self::Range => 5,
        }
    }
}

/// The maximum depth that expressions, blocks, and types can be nested to
pub(crate) const MAX_NESTING_DEPTH: usize = 128;

fn assign_op(token: Token) -> Option<AssignOp> {
    let result = match token {
        Token::Assign => AssignOp::Assign,
        Token::AddAssign => AssignOp::Add,
        Token::SubtractAssign => AssignOp::Subtract,
        Token::MultiplyAssign => AssignOp::Multiply,
        Token::DivideAssign => AssignOp::Divide,
        Token::RemainderAssign => AssignOp::Remainder,
        _ => return None,
    };
    Some(result)
}

/// Sprig's parser
///
/// Produces a [SyntaxUnit] containing the top-level items of the input, with the source text of
/// each item preserved so that it can be re-emitted verbatim later on.
pub struct Parser<'source> {
    source: &'source str,
    lexer: Lexer<'source>,
    current_token: LexedToken,
    nesting_depth: usize,
}

impl<'source> Parser<'source> {
    /// Takes in a source script, and produces a [SyntaxUnit]
    pub fn parse(source: &'source str) -> Result<SyntaxUnit> {
        let mut parser = Parser {
            source,
            lexer: Lexer::new(source),
            current_token: LexedToken::default(),
            nesting_depth: 0,
        };

        let mut items = Vec::new();
        while let Some(item) = parser.parse_top_level()? {
            items.push(item);
        }

        Ok(SyntaxUnit { items })
    }

    fn parse_top_level(&mut self) -> Result<Option<TopLevel>> {
        let Some(first) = self.peek_info(0) else {
            return Ok(None);
        };

        let kind = match first.token {
            Token::Import => TopLevelKind::Import(self.consume_import()?),
            Token::Type => TopLevelKind::Type(self.consume_type_definition()?),
            Token::Function => TopLevelKind::Function(self.consume_function()?),
            _ => {
                let statement = self.parse_statement(true)?;
                let terminated = self.current_token.token == Token::Semicolon;
                match statement.kind {
                    StatementKind::Variable(declaration) => TopLevelKind::Variable(declaration),
                    StatementKind::Expression(expression) if !terminated => {
                        TopLevelKind::Expression(expression)
                    }
                    _ => TopLevelKind::Statement(statement),
                }
            }
        };

        let source_bytes = first.source_bytes.start..self.current_token.source_bytes.end;
        Ok(Some(TopLevel {
            kind,
            span: self.span_with_start(first.span),
            text: self.source[source_bytes].to_string(),
        }))
    }

    fn consume_import(&mut self) -> Result<ImportDeclaration> {
        self.consume_token(); // import
        let start_span = self.current_span();

        let (org, _) = self.consume_id(SyntaxError::ExpectedModuleName)?;
        self.expect(Token::Divide, SyntaxError::ExpectedModuleSeparator)?;

        let mut names = astvec![self.consume_id(SyntaxError::ExpectedModuleName)?.0];
        while self.peek_token() == Some(Token::Dot) {
            self.consume_token();
            names.push(self.consume_id(SyntaxError::ExpectedModuleName)?.0);
        }

        let prefix = if self.peek_token() == Some(Token::As) {
            self.consume_token();
            Some(self.consume_id(SyntaxError::ExpectedIdAfterAs)?.0)
        } else {
            None
        };

        let span = self.span_with_start(start_span);
        self.consume_statement_end(true)?;

        Ok(ImportDeclaration {
            module: ModulePath { org, names },
            prefix,
            span,
        })
    }

    fn consume_type_definition(&mut self) -> Result<TypeDefinition> {
        self.consume_token(); // type

        let (name, name_span) = self.consume_id(SyntaxError::ExpectedId)?;
        let descriptor = self.parse_type()?;
        self.consume_statement_end(true)?;

        Ok(TypeDefinition {
            name,
            descriptor,
            name_span,
        })
    }

    fn consume_function(&mut self) -> Result<FunctionDefinition> {
        self.consume_token(); // function

        let (name, name_span) = self.consume_id(SyntaxError::ExpectedFunctionName)?;
        self.expect(Token::RoundOpen, SyntaxError::ExpectedFunctionArgsStart)?;

        let mut params = AstVec::new();
        loop {
            if self.peek_token() == Some(Token::RoundClose) {
                self.consume_token();
                break;
            }

            let start_span = self.peek_span();
            let ty = self.parse_type()?;
            let (param_name, _) = self.consume_id(SyntaxError::ExpectedParameterName)?;
            params.push(Parameter {
                ty,
                name: param_name,
                span: self.span_with_start(start_span),
            });

            match self.peek_token() {
                Some(Token::Comma) => {
                    self.consume_token();
                }
                Some(Token::RoundClose) => {}
                _ => return self.consume_token_and_error(SyntaxError::ExpectedArgsEnd),
            }
        }

        let returns = if self.peek_token() == Some(Token::Returns) {
            self.consume_token();
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(FunctionDefinition {
            name,
            params,
            returns,
            body,
            name_span,
        })
    }

    // Parses a statement, at the top level a missing ';' is allowed at the end of the input
    fn parse_statement(&mut self, at_top_level: bool) -> Result<Statement> {
        let start_span = self.peek_span();

        let kind = match self.peek_token() {
            Some(Token::If) => self.consume_if_statement()?,
            Some(Token::While) => {
                self.consume_token();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                StatementKind::While { condition, body }
            }
            Some(Token::Foreach) => self.consume_foreach_statement()?,
            Some(Token::Break) => {
                self.consume_token();
                self.consume_statement_end(at_top_level)?;
                StatementKind::Break
            }
            Some(Token::Continue) => {
                self.consume_token();
                self.consume_statement_end(at_top_level)?;
                StatementKind::Continue
            }
            Some(Token::Return) => {
                self.consume_token();
                let value = match self.peek_token() {
                    None | Some(Token::Semicolon | Token::CurlyClose) => None,
                    Some(_) => Some(self.parse_expression()?),
                };
                self.consume_statement_end(at_top_level)?;
                StatementKind::Return(value)
            }
            Some(Token::CurlyOpen) => StatementKind::Block(self.parse_block()?),
            Some(Token::Import) => {
                return self.consume_token_and_error(SyntaxError::ImportNotAtTopLevel);
            }
            Some(Token::Type | Token::Function) => {
                return self.consume_token_and_error(SyntaxError::DefinitionNotAtTopLevel);
            }
            Some(Token::Final | Token::Var) => {
                StatementKind::Variable(self.consume_variable_declaration(at_top_level)?)
            }
            Some(_) if self.next_is_typed_declaration() => {
                StatementKind::Variable(self.consume_variable_declaration(at_top_level)?)
            }
            _ => {
                let expression = self.parse_expression()?;
                match self.peek_token().and_then(assign_op) {
                    Some(op) => self.consume_assignment(expression, op, at_top_level)?,
                    None => {
                        self.consume_statement_end(at_top_level)?;
                        StatementKind::Expression(expression)
                    }
                }
            }
        };

        Ok(Statement {
            kind,
            span: self.span_with_start(start_span),
        })
    }

    fn consume_if_statement(&mut self) -> Result<StatementKind> {
        self.consume_token(); // if

        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;

        let else_block = if self.peek_token() == Some(Token::Else) {
            self.consume_token();
            if self.peek_token() == Some(Token::If) {
                let start_span = self.peek_span();
                let else_if = self.consume_if_statement()?;
                let span = self.span_with_start(start_span);
                Some(Block {
                    statements: vec![Statement {
                        kind: else_if,
                        span,
                    }],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(StatementKind::If {
            condition,
            then_block,
            else_block,
        })
    }

    fn consume_foreach_statement(&mut self) -> Result<StatementKind> {
        self.consume_token(); // foreach

        let ty = if self.peek_token() == Some(Token::Var) {
            self.consume_token();
            None
        } else {
            Some(self.parse_type()?)
        };

        let (name, _) = self.consume_id(SyntaxError::ExpectedVariableName)?;
        self.expect(Token::In, SyntaxError::ExpectedForeachInKeyword)?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;

        Ok(StatementKind::Foreach {
            ty,
            name,
            iterable,
            body,
        })
    }

    fn consume_variable_declaration(&mut self, at_top_level: bool) -> Result<VariableDeclaration> {
        let is_final = if self.peek_token() == Some(Token::Final) {
            self.consume_token();
            true
        } else {
            false
        };

        let ty = if self.peek_token() == Some(Token::Var) {
            self.consume_token();
            None
        } else {
            Some(self.parse_type()?)
        };

        let (name, name_span) = self.consume_id(SyntaxError::ExpectedVariableName)?;
        self.expect(Token::Assign, SyntaxError::ExpectedAssignment)?;
        let value = self.parse_expression()?;
        self.consume_statement_end(at_top_level)?;

        Ok(VariableDeclaration {
            is_final,
            ty,
            name,
            value,
            name_span,
        })
    }

    fn consume_assignment(
        &mut self,
        target: Expr,
        op: AssignOp,
        at_top_level: bool,
    ) -> Result<StatementKind> {
        let target_span = target.span;
        let Some(target) = assign_target(target) else {
            return Err(Error::new(
                SyntaxError::InvalidAssignmentTarget.into(),
                target_span,
            ));
        };

        self.consume_token(); // The assignment operator
        let value = self.parse_expression()?;
        self.consume_statement_end(at_top_level)?;

        Ok(StatementKind::Assign { target, op, value })
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.nested(Self::parse_block_contents)
    }

    fn parse_block_contents(&mut self) -> Result<Block> {
        self.expect(Token::CurlyOpen, SyntaxError::ExpectedBlockStart)?;
        let start_span = self.current_span();

        let mut statements = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token::CurlyClose) => {
                    self.consume_token();
                    break;
                }
                None => return self.consume_token_and_error(SyntaxError::ExpectedBlockEnd),
                Some(_) => statements.push(self.parse_statement(false)?),
            }
        }

        Ok(Block {
            statements,
            span: self.span_with_start(start_span),
        })
    }

    // Checks if the next tokens have the shape `<type> <id>`
    //
    // Type descriptors and expressions share their leading tokens (e.g. `xs[0] = 1` vs.
    // `int[] xs = []`), so the tokens are scanned without consuming them.
    fn next_is_typed_declaration(&mut self) -> bool {
        let mut n = 0;
        self.scan_type(&mut n)
            && matches!(self.peek_token_n(n), Some(Token::Id | Token::QuotedId))
    }

    fn scan_type(&mut self, n: &mut usize) -> bool {
        loop {
            match self.peek_token_n(*n) {
                Some(Token::Id | Token::QuotedId) => {
                    *n += 1;
                    if self.peek_token_n(*n) == Some(Token::Colon)
                        && matches!(self.peek_token_n(*n + 1), Some(Token::Id | Token::QuotedId))
                    {
                        *n += 2;
                    }
                }
                Some(Token::Nil) => *n += 1,
                Some(Token::RoundOpen) => {
                    if self.nesting_depth == MAX_NESTING_DEPTH {
                        return false;
                    }
                    *n += 1;
                    self.nesting_depth += 1;
                    let nested = self.scan_type(n);
                    self.nesting_depth -= 1;
                    if !nested || self.peek_token_n(*n) != Some(Token::RoundClose) {
                        return false;
                    }
                    *n += 1;
                }
                _ => return false,
            }

            loop {
                match self.peek_token_n(*n) {
                    Some(Token::SquareOpen)
                        if self.peek_token_n(*n + 1) == Some(Token::SquareClose) =>
                    {
                        *n += 2
                    }
                    Some(Token::Question) => *n += 1,
                    _ => break,
                }
            }

            if self.peek_token_n(*n) == Some(Token::Pipe) {
                *n += 1;
            } else {
                return true;
            }
        }
    }

    fn parse_type(&mut self) -> Result<TypeDescriptor> {
        let mut members = vec![self.parse_type_term()?];
        while self.peek_token() == Some(Token::Pipe) {
            self.consume_token();
            members.push(self.parse_type_term()?);
        }

        match members.len() {
            1 => Ok(members.remove(0)),
            _ => Ok(TypeDescriptor::Union(members)),
        }
    }

    fn parse_type_term(&mut self) -> Result<TypeDescriptor> {
        let mut result = match self.peek_token() {
            Some(Token::Id | Token::QuotedId) => {
                let name = self.consume_qualified_name()?;
                match &name.prefix {
                    None => TypeDescriptor::builtin(name.name.as_str())
                        .unwrap_or(TypeDescriptor::Named(name)),
                    Some(_) => TypeDescriptor::Named(name),
                }
            }
            Some(Token::Nil) => {
                self.consume_token();
                TypeDescriptor::Nil
            }
            Some(Token::RoundOpen) => {
                self.consume_token();
                let nested = self.nested(Self::parse_type)?;
                self.expect(Token::RoundClose, SyntaxError::ExpectedCloseParen)?;
                nested
            }
            _ => return self.consume_token_and_error(SyntaxError::ExpectedType),
        };

        loop {
            match self.peek_token() {
                Some(Token::SquareOpen) if self.peek_token_n(1) == Some(Token::SquareClose) => {
                    self.consume_token();
                    self.consume_token();
                    result = TypeDescriptor::Array(Box::new(result));
                }
                Some(Token::Question) => {
                    self.consume_token();
                    result = TypeDescriptor::Optional(Box::new(result));
                }
                _ => break,
            }
        }

        Ok(result)
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_expression_with_min_precedence(0)
    }

    fn parse_expression_with_min_precedence(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut lhs = self.nested(Self::parse_unary)?;

        while let Some(op) = self.peek_token().and_then(Infix::from_token) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }

            self.consume_token();
            let rhs = self.parse_expression_with_min_precedence(precedence + 1)?;
            let span = lhs.span.to(rhs.span);

            let kind = match op {
                Infix::Binary(op) => ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Infix::Range => ExprKind::Range {
                    start: Box::new(lhs),
                    end: Box::new(rhs),
                },
            };
            lhs = Expr { kind, span };
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek_token() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Subtract) => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };

        self.consume_token();
        let start_span = self.current_span();
        let operand = self.nested(Self::parse_unary)?;

        Ok(Expr {
            span: start_span.to(operand.span),
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut result = self.parse_term()?;

        while self.peek_token() == Some(Token::SquareOpen) {
            self.consume_token();
            let index = self.parse_expression()?;
            self.expect(Token::SquareClose, SyntaxError::ExpectedIndexEnd)?;
            result = Expr {
                span: self.span_with_start(result.span),
                kind: ExprKind::Index {
                    target: Box::new(result),
                    index: Box::new(index),
                },
            };
        }

        Ok(result)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let kind = match self.peek_token() {
            Some(Token::Number) => {
                self.consume_token();
                self.parse_number()?
            }
            Some(Token::Str) => {
                self.consume_token();
                ExprKind::Str(self.parse_string()?)
            }
            Some(Token::True) => {
                self.consume_token();
                ExprKind::Bool(true)
            }
            Some(Token::False) => {
                self.consume_token();
                ExprKind::Bool(false)
            }
            Some(Token::Nil) => {
                self.consume_token();
                ExprKind::Nil
            }
            Some(Token::Id | Token::QuotedId) => {
                let name = self.consume_qualified_name()?;
                if self.peek_token() == Some(Token::RoundOpen) {
                    let start_span = name.span;
                    self.consume_token();
                    let args = self.parse_call_args()?;
                    return Ok(Expr {
                        kind: ExprKind::Call {
                            function: name,
                            args,
                        },
                        span: self.span_with_start(start_span),
                    });
                }
                return Ok(Expr {
                    span: name.span,
                    kind: ExprKind::Name(name),
                });
            }
            Some(Token::RoundOpen) => {
                self.consume_token();
                let start_span = self.current_span();
                let nested = self.parse_expression()?;
                self.expect(Token::RoundClose, SyntaxError::ExpectedCloseParen)?;
                return Ok(Expr {
                    kind: nested.kind,
                    span: self.span_with_start(start_span),
                });
            }
            Some(Token::SquareOpen) => {
                self.consume_token();
                let start_span = self.current_span();
                let entries = self.parse_list_entries()?;
                return Ok(Expr {
                    kind: ExprKind::List(entries),
                    span: self.span_with_start(start_span),
                });
            }
            Some(Token::Error) => {
                self.consume_token();
                let error = if self.current_token.slice(self.source).starts_with('"') {
                    self.make_error(SyntaxError::UnterminatedString, false)
                } else {
                    self.make_error(SyntaxError::UnexpectedToken, false)
                };
                return Err(error);
            }
            _ => return self.consume_token_and_error(SyntaxError::ExpectedExpression),
        };

        Ok(Expr {
            kind,
            span: self.current_span(),
        })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();

        loop {
            if self.peek_token() == Some(Token::RoundClose) {
                self.consume_token();
                break;
            }

            args.push(self.parse_expression()?);

            match self.peek_token() {
                Some(Token::Comma) => {
                    self.consume_token();
                }
                Some(Token::RoundClose) => {}
                _ => return self.consume_token_and_error(SyntaxError::ExpectedArgsEnd),
            }
        }

        Ok(args)
    }

    fn parse_list_entries(&mut self) -> Result<Vec<Expr>> {
        let mut entries = Vec::new();

        loop {
            if self.peek_token() == Some(Token::SquareClose) {
                self.consume_token();
                break;
            }

            entries.push(self.parse_expression()?);

            match self.peek_token() {
                Some(Token::Comma) => {
                    self.consume_token();
                }
                Some(Token::SquareClose) => {}
                _ => return self.consume_token_and_error(SyntaxError::ExpectedListEnd),
            }
        }

        Ok(entries)
    }

    fn consume_qualified_name(&mut self) -> Result<QualifiedName> {
        let (first, start_span) = self.consume_id(SyntaxError::ExpectedId)?;

        if self.peek_token() == Some(Token::Colon) {
            self.consume_token();
            let (name, _) = self.consume_id(SyntaxError::ExpectedIdAfterPrefix)?;
            Ok(QualifiedName {
                prefix: Some(first),
                name,
                span: self.span_with_start(start_span),
            })
        } else {
            Ok(QualifiedName {
                prefix: None,
                name: first,
                span: start_span,
            })
        }
    }

    fn consume_id<E>(&mut self, error_type: E) -> Result<(QuotedIdentifier, Span)>
    where
        E: Into<ErrorKind>,
    {
        match self.peek_token() {
            Some(Token::Id | Token::QuotedId) => {
                self.consume_token();
                let id = QuotedIdentifier::new(self.current_token.slice(self.source));
                if id.as_str().is_empty() {
                    return self.error(InternalError::IdParseFailure);
                }
                Ok((id, self.current_span()))
            }
            _ => self.consume_token_and_error(error_type),
        }
    }

    fn parse_number(&mut self) -> Result<ExprKind> {
        let slice = self.current_token.slice(self.source);

        if let Some(hex) = slice.strip_prefix("0x") {
            return match i64::from_str_radix(hex, 16) {
                Ok(n) => Ok(ExprKind::Int(n)),
                Err(_) => self.error(SyntaxError::IntegerOutOfRange),
            };
        }

        if slice.contains(['.', 'e']) {
            match slice.parse::<f64>() {
                Ok(n) => Ok(ExprKind::Float(n)),
                Err(_) => self.error(InternalError::NumberParseFailure),
            }
        } else {
            match slice.parse::<i64>() {
                Ok(n) => Ok(ExprKind::Int(n)),
                Err(_) => self.error(SyntaxError::IntegerOutOfRange),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let slice = self.current_token.slice(self.source);
        let contents = slice
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or_default();

        let mut result = String::with_capacity(contents.len());
        let mut chars = contents.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '\\' {
                let escaped = self.escape_string_character(&mut chars)?;
                result.push(escaped);
            } else {
                result.push(c);
            }
        }

        Ok(result)
    }

    fn escape_string_character(&mut self, chars: &mut Peekable<Chars>) -> Result<char> {
        match chars.next() {
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some('u') => {
                if chars.next() != Some('{') {
                    return self.error(SyntaxError::UnexpectedCharInNumericEscapeCode);
                }

                let mut code = 0u32;
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => match c.to_digit(16) {
                            Some(digit) => code = code.saturating_mul(16).saturating_add(digit),
                            None => {
                                return self.error(SyntaxError::UnexpectedCharInNumericEscapeCode);
                            }
                        },
                        None => return self.error(SyntaxError::UnterminatedNumericEscapeCode),
                    }
                }

                match char::from_u32(code) {
                    Some(c) => Ok(c),
                    None => self.error(SyntaxError::UnicodeEscapeCodeOutOfRange),
                }
            }
            _ => self.error(SyntaxError::UnexpectedEscapeInString),
        }
    }

    fn consume_statement_end(&mut self, at_top_level: bool) -> Result<()> {
        match self.peek_token() {
            Some(Token::Semicolon) => {
                self.consume_token();
                Ok(())
            }
            None if at_top_level => Ok(()),
            _ => self.consume_token_and_error(SyntaxError::ExpectedSemicolon),
        }
    }

    fn expect<E>(&mut self, token: Token, error_type: E) -> Result<()>
    where
        E: Into<ErrorKind>,
    {
        if self.peek_token() == Some(token) {
            self.consume_token();
            Ok(())
        } else {
            self.consume_token_and_error(error_type)
        }
    }

    //// Error helpers

    fn error<E, T>(&mut self, error_type: E) -> Result<T>
    where
        E: Into<ErrorKind>,
    {
        let incomplete_input = self.peek_token().is_none();
        Err(self.make_error(error_type, incomplete_input))
    }

    // Runs a parsing function one nesting level deeper, failing once the depth limit is reached
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting_depth == MAX_NESTING_DEPTH {
            self.consume_token();
            return Err(self.make_error(SyntaxError::NestingTooDeep, false));
        }

        self.nesting_depth += 1;
        let result = parse(self);
        self.nesting_depth -= 1;
        result
    }

    fn make_error<E>(&mut self, error_type: E, incomplete_input: bool) -> Error
    where
        E: Into<ErrorKind>,
    {
        Error {
            error: error_type.into(),
            span: self.current_span(),
            incomplete_input,
        }
    }

    // Consumes the unexpected token so that the error's span points at it
    fn consume_token_and_error<E, T>(&mut self, error_type: E) -> Result<T>
    where
        E: Into<ErrorKind>,
    {
        let incomplete_input = self.peek_token().is_none();
        self.consume_token();
        Err(self.make_error(error_type, incomplete_input))
    }

    //// Lexer getters

    // Consumes whitespace, comments, and newlines up to and including the next token
    fn consume_token(&mut self) -> Option<Token> {
        for next in self.lexer.by_ref() {
            if !next.token.is_whitespace_including_newline() {
                self.current_token = next;
                return Some(self.current_token.token);
            }
        }

        None
    }

    fn peek_token(&mut self) -> Option<Token> {
        self.peek_token_n(0)
    }

    fn peek_token_n(&mut self, n: usize) -> Option<Token> {
        self.peek_info(n).map(|peeked| peeked.token)
    }

    // Peeks the nth token that isn't whitespace
    fn peek_info(&mut self, n: usize) -> Option<LexedToken> {
        let mut peek_count = 0;
        let mut found = 0;

        while let Some(peeked) = self.lexer.peek(peek_count) {
            if !peeked.token.is_whitespace_including_newline() {
                if found == n {
                    return Some(peeked.clone());
                }
                found += 1;
            }
            peek_count += 1;
        }

        None
    }

    fn peek_span(&mut self) -> Span {
        self.peek_info(0)
            .map_or_else(|| self.current_span(), |peeked| peeked.span)
    }

    fn current_span(&self) -> Span {
        self.current_token.span
    }

    fn span_with_start(&self, start_span: Span) -> Span {
        Span {
            start: start_span.start,
            end: self.current_span().end,
        }
    }
}

// Converts a parsed expression into an assignment target, if it has a suitable shape
fn assign_target(expression: Expr) -> Option<AssignTarget> {
    let mut indices = Vec::new();
    let mut current = expression;

    loop {
        match current.kind {
            ExprKind::Name(QualifiedName {
                prefix: None, name, ..
            }) => {
                if indices.is_empty() {
                    return Some(AssignTarget::Name(name));
                }
                indices.reverse();
                return Some(AssignTarget::Index { name, indices });
            }
            ExprKind::Index { target, index } => {
                indices.push(*index);
                current = *target;
            }
            _ => return None,
        }
    }
}
