//! Recursive-descent parser (§4.8, §1.11) turning a token stream into a
//! `Statement`. Operator precedence follows the usual SQL ladder: OR, AND,
//! NOT, comparison, additive, multiplicative, unary, primary.

use super::ast::*;
use super::token::{Token, TokenKind, Tokenizer};
use crate::error::{CResult, Error};

pub fn parse(sql: &str) -> CResult<Statement> {
    let tokens: Vec<Token> = Tokenizer::new(sql).collect::<Result<Vec<_>, String>>().map_err(Error::Parse)?;
    let mut parser = Parser { tokens, pos: 0, source: sql };
    let statement = parser.parse_statement()?;
    parser.expect_end()?;
    Ok(statement)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn peek_text(&self) -> &'a str {
        self.tokens[self.pos].text()
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CResult<Token<'a>> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(Error::Parse(format!("expected {kind:?}, found {:?} ('{}')", self.peek(), self.peek_text())))
        }
    }

    fn expect_end(&mut self) -> CResult<()> {
        self.check(TokenKind::SemiColon);
        if self.peek() != TokenKind::EOI {
            return Err(Error::Parse(format!("unexpected trailing input near '{}'", self.peek_text())));
        }
        Ok(())
    }

    fn ident(&mut self) -> CResult<String> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(token.text().to_string())
    }

    fn parse_statement(&mut self) -> CResult<Statement> {
        match self.peek() {
            TokenKind::CREATE => self.parse_create(),
            TokenKind::DROP => self.parse_drop(),
            TokenKind::INSERT => self.parse_insert(),
            TokenKind::UPDATE => self.parse_update(),
            TokenKind::DELETE => self.parse_delete(),
            TokenKind::SELECT => Ok(Statement::Select(self.parse_select()?)),
            TokenKind::BEGIN => self.parse_begin(),
            TokenKind::COMMIT => {
                self.advance();
                Ok(Statement::Commit)
            }
            TokenKind::ROLLBACK => {
                self.advance();
                Ok(Statement::Rollback)
            }
            other => Err(Error::Parse(format!("unexpected token {other:?} at start of statement"))),
        }
    }

    fn parse_begin(&mut self) -> CResult<Statement> {
        self.expect(TokenKind::BEGIN)?;
        let read_only = if self.check(TokenKind::READ) {
            self.expect(TokenKind::ONLY)?;
            true
        } else {
            false
        };
        Ok(Statement::Begin { read_only })
    }

    fn parse_create(&mut self) -> CResult<Statement> {
        let start = self.tokens[self.pos].span.start;
        self.expect(TokenKind::CREATE)?;
        match self.peek() {
            TokenKind::TABLE => self.parse_create_table(start),
            TokenKind::UNIQUE | TokenKind::INDEX => self.parse_create_index(start),
            TokenKind::SEQUENCE => self.parse_create_sequence(),
            other => Err(Error::Parse(format!("expected TABLE, INDEX, or SEQUENCE, found {other:?}"))),
        }
    }

    fn parse_create_table(&mut self, start: usize) -> CResult<Statement> {
        self.expect(TokenKind::TABLE)?;
        let name = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);
            if !self.check(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let sql = self.consumed_text(start);
        Ok(Statement::CreateTable { name, columns, sql })
    }

    fn parse_column_def(&mut self) -> CResult<ColumnDef> {
        let name = self.ident()?;
        let data_type = self.ident()?;
        let mut nullable = true;
        let mut primary_key = false;
        let mut unique = false;
        let mut default = None;
        let mut check = None;
        loop {
            match self.peek() {
                TokenKind::NOT => {
                    self.advance();
                    self.expect(TokenKind::NULL)?;
                    nullable = false;
                }
                TokenKind::PRIMARY => {
                    self.advance();
                    self.expect(TokenKind::KEY)?;
                    primary_key = true;
                    nullable = false;
                }
                TokenKind::UNIQUE => {
                    self.advance();
                    unique = true;
                }
                TokenKind::DEFAULT => {
                    self.advance();
                    default = Some(self.parse_expression()?);
                }
                TokenKind::CHECK => {
                    self.advance();
                    self.expect(TokenKind::LParen)?;
                    check = Some(self.parse_expression()?);
                    self.expect(TokenKind::RParen)?;
                }
                _ => break,
            }
        }
        Ok(ColumnDef { name, data_type, nullable, primary_key, unique, default, check })
    }

    fn parse_create_index(&mut self, start: usize) -> CResult<Statement> {
        let unique = self.check(TokenKind::UNIQUE);
        self.expect(TokenKind::INDEX)?;
        let name = self.ident()?;
        self.expect(TokenKind::ON)?;
        let table = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut columns = Vec::new();
        loop {
            let column = self.ident()?;
            let direction = if self.check(TokenKind::DESC) {
                Direction::Desc
            } else {
                self.check(TokenKind::ASC);
                Direction::Asc
            };
            columns.push((column, direction));
            if !self.check(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let sql = self.consumed_text(start);
        Ok(Statement::CreateIndex { name, table, columns, unique, sql })
    }

    fn parse_create_sequence(&mut self) -> CResult<Statement> {
        self.expect(TokenKind::SEQUENCE)?;
        let name = self.ident()?;
        let mut increment = 1;
        let mut min = None;
        let mut max = None;
        let mut start = None;
        let mut cache = 1;
        let mut cycle = false;
        loop {
            match self.peek() {
                TokenKind::INCREMENT => {
                    self.advance();
                    self.check(TokenKind::BY);
                    increment = self.parse_signed_integer()?;
                }
                TokenKind::MINVALUE => {
                    self.advance();
                    min = Some(self.parse_signed_integer()?);
                }
                TokenKind::MAXVALUE => {
                    self.advance();
                    max = Some(self.parse_signed_integer()?);
                }
                TokenKind::START => {
                    self.advance();
                    self.check(TokenKind::WITH);
                    start = Some(self.parse_signed_integer()?);
                }
                TokenKind::CACHE => {
                    self.advance();
                    cache = self.parse_signed_integer()?;
                }
                TokenKind::CYCLE => {
                    self.advance();
                    cycle = true;
                }
                _ => break,
            }
        }
        Ok(Statement::CreateSequence { name, increment, min, max, start, cache, cycle })
    }

    fn parse_signed_integer(&mut self) -> CResult<i64> {
        let negative = self.check(TokenKind::Minus);
        let token = self.expect(TokenKind::LiteralInteger)?;
        let value: i64 =
            token.text().parse().map_err(|_| Error::Parse(format!("invalid integer '{}'", token.text())))?;
        Ok(if negative { -value } else { value })
    }

    fn parse_drop(&mut self) -> CResult<Statement> {
        self.expect(TokenKind::DROP)?;
        match self.peek() {
            TokenKind::TABLE => {
                self.advance();
                let if_exists = self.check(TokenKind::IF) && self.expect(TokenKind::EXISTS).is_ok();
                Ok(Statement::DropTable { name: self.ident()?, if_exists })
            }
            TokenKind::INDEX => {
                self.advance();
                let if_exists = self.check(TokenKind::IF) && self.expect(TokenKind::EXISTS).is_ok();
                Ok(Statement::DropIndex { name: self.ident()?, if_exists })
            }
            TokenKind::SEQUENCE => {
                self.advance();
                let if_exists = self.check(TokenKind::IF) && self.expect(TokenKind::EXISTS).is_ok();
                Ok(Statement::DropSequence { name: self.ident()?, if_exists })
            }
            other => Err(Error::Parse(format!("expected TABLE, INDEX, or SEQUENCE, found {other:?}"))),
        }
    }

    fn parse_insert(&mut self) -> CResult<Statement> {
        self.expect(TokenKind::INSERT)?;
        self.expect(TokenKind::INTO)?;
        let table = self.ident()?;
        let columns = if self.check(TokenKind::LParen) {
            let mut names = Vec::new();
            loop {
                names.push(self.ident()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            Some(names)
        } else {
            None
        };
        self.expect(TokenKind::VALUES)?;
        let mut values = Vec::new();
        loop {
            self.expect(TokenKind::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.parse_expression()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            values.push(row);
            if !self.check(TokenKind::Comma) {
                break;
            }
        }
        Ok(Statement::Insert { table, columns, values })
    }

    fn parse_update(&mut self) -> CResult<Statement> {
        self.expect(TokenKind::UPDATE)?;
        let table = self.ident()?;
        self.expect(TokenKind::SET)?;
        let mut assignments = Vec::new();
        loop {
            let column = self.ident()?;
            self.expect(TokenKind::Eq)?;
            assignments.push((column, self.parse_expression()?));
            if !self.check(TokenKind::Comma) {
                break;
            }
        }
        let filter = if self.check(TokenKind::WHERE) { Some(self.parse_expression()?) } else { None };
        Ok(Statement::Update { table, assignments, filter })
    }

    fn parse_delete(&mut self) -> CResult<Statement> {
        self.expect(TokenKind::DELETE)?;
        self.expect(TokenKind::FROM)?;
        let table = self.ident()?;
        let filter = if self.check(TokenKind::WHERE) { Some(self.parse_expression()?) } else { None };
        Ok(Statement::Delete { table, filter })
    }

    fn parse_select(&mut self) -> CResult<Select> {
        self.expect(TokenKind::SELECT)?;
        let distinct = self.check(TokenKind::DISTINCT);
        let mut columns = Vec::new();
        if self.check(TokenKind::Multiply) {
            columns.push((Expression::Column("*".to_string()), None));
        } else {
            loop {
                let expr = self.parse_expression()?;
                let alias = if self.check(TokenKind::AS) { Some(self.ident()?) } else { None };
                columns.push((expr, alias));
                if !self.check(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::FROM)?;
        let from = self.ident()?;
        let filter = if self.check(TokenKind::WHERE) { Some(self.parse_expression()?) } else { None };
        let group_by = if self.check(TokenKind::GROUP) {
            self.expect(TokenKind::BY)?;
            let mut exprs = Vec::new();
            loop {
                exprs.push(self.parse_expression()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
            }
            exprs
        } else {
            Vec::new()
        };
        let having = if self.check(TokenKind::HAVING) { Some(self.parse_expression()?) } else { None };
        let order_by = if self.check(TokenKind::ORDER) {
            self.expect(TokenKind::BY)?;
            let mut keys = Vec::new();
            loop {
                let expr = self.parse_expression()?;
                let direction = if self.check(TokenKind::DESC) {
                    Direction::Desc
                } else {
                    self.check(TokenKind::ASC);
                    Direction::Asc
                };
                keys.push((expr, direction));
                if !self.check(TokenKind::Comma) {
                    break;
                }
            }
            keys
        } else {
            Vec::new()
        };
        let limit = if self.check(TokenKind::LIMIT) { Some(self.parse_expression()?) } else { None };
        let offset = if self.check(TokenKind::OFFSET) { Some(self.parse_expression()?) } else { None };

        let mut select = Select { columns, from, filter, group_by, having, order_by, limit, offset, distinct, union: None };
        if self.check(TokenKind::UNION) {
            let all = self.check(TokenKind::ALL);
            let rhs = self.parse_select()?;
            select.union = Some((Box::new(rhs), all));
        }
        Ok(select)
    }

    // OR
    fn parse_expression(&mut self) -> CResult<Expression> {
        let mut lhs = self.parse_and()?;
        while self.check(TokenKind::OR) {
            let rhs = self.parse_and()?;
            lhs = Expression::BinaryOp(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // AND
    fn parse_and(&mut self) -> CResult<Expression> {
        let mut lhs = self.parse_not()?;
        while self.check(TokenKind::AND) {
            let rhs = self.parse_not()?;
            lhs = Expression::BinaryOp(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> CResult<Expression> {
        if self.check(TokenKind::NOT) {
            return Ok(Expression::UnaryOp(UnaryOp::Not, Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> CResult<Expression> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Lte => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Gte => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_additive()?;
            return Ok(Expression::BinaryOp(op, Box::new(lhs), Box::new(rhs)));
        }
        if self.peek() == TokenKind::IS {
            self.advance();
            self.check(TokenKind::NOT);
            let negated = self.tokens[self.pos - 1].kind == TokenKind::NOT;
            self.expect(TokenKind::NULL)?;
            let is_null = Expression::IsNull(Box::new(lhs));
            return Ok(if negated { Expression::UnaryOp(UnaryOp::Not, Box::new(is_null)) } else { is_null });
        }
        if self.peek() == TokenKind::LIKE {
            self.advance();
            let rhs = self.parse_additive()?;
            return Ok(Expression::Like(Box::new(lhs), Box::new(rhs)));
        }
        if self.peek() == TokenKind::IN {
            self.advance();
            self.expect(TokenKind::LParen)?;
            let mut items = Vec::new();
            loop {
                items.push(self.parse_expression()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(Expression::In(Box::new(lhs), items));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> CResult<Expression> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expression::BinaryOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> CResult<Expression> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Multiply => BinaryOp::Mul,
                TokenKind::Divide => BinaryOp::Div,
                TokenKind::Modulo => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expression::BinaryOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> CResult<Expression> {
        if self.check(TokenKind::Minus) {
            return Ok(Expression::UnaryOp(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> CResult<Expression> {
        match self.peek() {
            TokenKind::LiteralInteger => {
                let text = self.advance().text().to_string();
                text.parse::<i64>()
                    .map(|i| Expression::Literal(Literal::Integer(i)))
                    .map_err(|_| Error::Parse(format!("invalid integer '{text}'")))
            }
            TokenKind::LiteralFloat => {
                let text = self.advance().text().to_string();
                text.parse::<f64>()
                    .map(|f| Expression::Literal(Literal::Float(f)))
                    .map_err(|_| Error::Parse(format!("invalid float '{text}'")))
            }
            TokenKind::QuotedString => {
                let text = self.advance().text();
                let inner = &text[1..text.len() - 1];
                Ok(Expression::Literal(Literal::String(inner.replace("''", "'"))))
            }
            TokenKind::TRUE => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenKind::FALSE => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenKind::NULL => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            TokenKind::Placeholder => {
                self.advance();
                Ok(Expression::Parameter(ParameterRef::Positional))
            }
            TokenKind::NamedParameter => {
                let text = self.advance().text().to_string();
                Ok(Expression::Parameter(ParameterRef::Named(text[1..].to_string())))
            }
            TokenKind::CAST => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::AS)?;
                let type_name = self.ident()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expression::Cast(Box::new(expr), type_name))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != TokenKind::RBracket {
                    loop {
                        items.push(self.parse_expression()?);
                        if !self.check(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expression::Array(items))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident => {
                let name = self.ident()?;
                if self.check(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.check(TokenKind::Multiply) {
                        // COUNT(*): represented as a bare "*" column arg.
                        args.push(Expression::Column("*".to_string()));
                    } else if self.peek() != TokenKind::RParen {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.check(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expression::Function(name, args))
                } else {
                    Ok(Expression::Column(name))
                }
            }
            other => Err(Error::Parse(format!("unexpected token {other:?} ('{}')", self.peek_text()))),
        }
    }

    fn consumed_text(&self, start: usize) -> String {
        let end = self.tokens[self.pos.saturating_sub(1)].span.end;
        self.source[start..end.max(start)].to_string()
    }
}
