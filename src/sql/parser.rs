use crate::core::error::{Error, Result};
use crate::sql::ast::{
    AggregateFunc, BinaryOp, ColumnConstraint, ColumnDef, CreateTable, Expr, Insert, Literal, Projection, Select,
    Statement, UnaryOp,
};
use crate::sql::lexer::{tokenize, Spanned, Token};

/// Parses one SQL statement; a trailing `;` is allowed.
pub fn parse(sql: &str) -> Result<Statement> {
    let mut parser = SqlParser::new(tokenize(sql)?);
    let statement = parser.parse_statement()?;
    while parser.consume(&Token::Semicolon) {}
    if !parser.at(&Token::Eof) {
        if parser.tokens_remain_after_semicolon() {
            return Err(Error::unsupported("only one statement per request is supported"));
        }
        return Err(parser.unexpected("end of statement"));
    }
    Ok(statement)
}

/// Deepest expression nesting (parentheses, `NOT`, unary signs) a statement
/// may use.
pub const MAX_NESTING: usize = 64;

/// Recursive-descent parser over a token stream.
pub struct SqlParser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl SqlParser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        SqlParser { tokens, pos: 0, depth: 0 }
    }

    /// Runs `inner` one nesting level deeper.
    fn nested<T>(&mut self, inner: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(Error::parse_at(
                self.position(),
                format!("expression nests deeper than {} levels", MAX_NESTING),
            ));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn peek(&self, ahead: usize) -> &Token {
        self.tokens.get(self.pos + ahead).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.position)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.consume(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::parse_at(self.position(), format!("expected {}, found {}", expected, self.current()))
    }

    fn tokens_remain_after_semicolon(&self) -> bool {
        self.pos > 0 && matches!(self.tokens.get(self.pos - 1).map(|s| &s.token), Some(Token::Semicolon))
    }

    /// Soft keywords (`TABLES`, `MIN`, ...) arrive as identifiers.
    fn at_word(&self, word: &str) -> bool {
        matches!(self.current(), Token::Identifier(name) if name.eq_ignore_ascii_case(word))
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        if self.at_word(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(word))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn signed_integer(&mut self) -> Result<i64> {
        let negative = self.consume(&Token::Minus);
        match self.current() {
            Token::IntLit(n) => {
                let n = *n;
                self.advance();
                Ok(if negative { -n } else { n })
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Select => Ok(Statement::Select(self.parse_select()?)),
            Token::Create => self.parse_create_table(),
            Token::Drop => self.parse_drop_table(),
            Token::Show => self.parse_show(),
            Token::Insert => self.parse_insert(),
            Token::Update => Err(Error::unsupported("UPDATE is not supported")),
            Token::Delete => Err(Error::unsupported("DELETE is not supported")),
            _ => Err(self.unexpected("statement")),
        }
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect(Token::Select)?;
        if self.at(&Token::Distinct) {
            return Err(Error::unsupported("SELECT DISTINCT is not supported"));
        }

        let mut projections = vec![self.parse_projection()?];
        while self.consume(&Token::Comma) {
            projections.push(self.parse_projection()?);
        }

        let mut from = None;
        if self.consume(&Token::From) {
            if self.at(&Token::LParen) {
                return Err(Error::unsupported("subqueries are not supported"));
            }
            from = Some(self.identifier()?);
            if matches!(self.current(), Token::Join | Token::Comma)
                || self.at_word("inner")
                || self.at_word("left")
                || self.at_word("cross")
            {
                return Err(Error::unsupported("JOIN is not supported"));
            }
        }

        let selection = if self.consume(&Token::Where) { Some(self.parse_expr()?) } else { None };

        match self.current() {
            Token::Group => return Err(Error::unsupported("GROUP BY is not supported")),
            Token::Having => return Err(Error::unsupported("HAVING is not supported")),
            Token::Order => return Err(Error::unsupported("ORDER BY is not supported")),
            _ => {}
        }

        let mut limit = None;
        if self.consume(&Token::Limit) {
            match self.current() {
                Token::IntLit(n) if *n >= 0 => {
                    limit = Some(*n as u64);
                    self.advance();
                }
                _ => return Err(self.unexpected("non-negative LIMIT")),
            }
        }
        if self.at(&Token::Union) {
            return Err(Error::unsupported("UNION is not supported"));
        }

        Ok(Select { projections, from, selection, limit })
    }

    fn parse_projection(&mut self) -> Result<Projection> {
        if self.consume(&Token::Star) {
            return Ok(Projection::Wildcard);
        }
        let expr = self.parse_expr()?;
        let alias = if self.consume(&Token::As) {
            Some(self.identifier()?)
        } else if let Token::Identifier(name) = self.current() {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        };
        Ok(Projection::Expr { expr, alias })
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        self.expect(Token::Create)?;
        self.expect(Token::Table)?;
        let if_not_exists = if self.consume(&Token::If) {
            self.expect(Token::Not)?;
            self.expect(Token::Exists)?;
            true
        } else {
            false
        };
        let name = self.identifier()?;
        self.expect(Token::LParen)?;
        let mut columns = vec![self.parse_column_def()?];
        while self.consume(&Token::Comma) {
            columns.push(self.parse_column_def()?);
        }
        self.expect(Token::RParen)?;
        Ok(Statement::CreateTable(CreateTable { name, if_not_exists, columns }))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.identifier()?;
        let type_name = self.identifier()?;
        // DECIMAL(2) and friends: the argument is read so the type is
        // rejected by name rather than by syntax.
        if self.consume(&Token::LParen) {
            self.signed_integer()?;
            self.expect(Token::RParen)?;
        }

        let mut constraints = Vec::new();
        loop {
            if self.at_word("min") {
                self.advance();
                constraints.push(ColumnConstraint::Min(self.signed_integer()?));
            } else if self.at_word("max") {
                self.advance();
                constraints.push(ColumnConstraint::Max(self.signed_integer()?));
            } else if self.at_word("cachesize") {
                self.advance();
                let size = self.signed_integer()?;
                let size = u32::try_from(size)
                    .map_err(|_| Error::range(format!("CACHESIZE {} is out of range", size)))?;
                constraints.push(ColumnConstraint::CacheSize(size));
            } else if self.at_word("timequantum") {
                self.advance();
                let Token::StringLit(quantum) = self.current() else {
                    return Err(self.unexpected("time quantum string"));
                };
                constraints.push(ColumnConstraint::TimeQuantum(quantum.clone()));
                self.advance();
            } else {
                break;
            }
        }
        Ok(ColumnDef { name, type_name, constraints })
    }

    fn parse_drop_table(&mut self) -> Result<Statement> {
        self.expect(Token::Drop)?;
        self.expect(Token::Table)?;
        let if_exists = if self.consume(&Token::If) {
            self.expect(Token::Exists)?;
            true
        } else {
            false
        };
        let name = self.identifier()?;
        Ok(Statement::DropTable { name, if_exists })
    }

    fn parse_show(&mut self) -> Result<Statement> {
        self.expect(Token::Show)?;
        if self.at_word("tables") {
            self.advance();
            return Ok(Statement::ShowTables);
        }
        self.expect_word("columns")?;
        self.expect(Token::From)?;
        let table = self.identifier()?;
        Ok(Statement::ShowColumns { table })
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect(Token::Insert)?;
        self.expect(Token::Into)?;
        let table = self.identifier()?;

        self.expect(Token::LParen)?;
        let mut columns = vec![self.identifier()?];
        while self.consume(&Token::Comma) {
            columns.push(self.identifier()?);
        }
        self.expect(Token::RParen)?;

        if self.at(&Token::Select) {
            return Err(Error::unsupported("INSERT ... SELECT is not supported"));
        }
        self.expect(Token::Values)?;
        let mut rows = vec![self.parse_tuple()?];
        while self.consume(&Token::Comma) {
            rows.push(self.parse_tuple()?);
        }
        Ok(Statement::Insert(Insert { table, columns, rows }))
    }

    fn parse_tuple(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen)?;
        let mut values = vec![self.parse_expr()?];
        while self.consume(&Token::Comma) {
            values.push(self.parse_expr()?);
        }
        self.expect(Token::RParen)?;
        Ok(values)
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(Self::parse_or)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.consume(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.consume(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.consume(&Token::Not) {
            let expr = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr) });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        let op = match self.current() {
            Token::Eq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::binary(left, op, right));
        }

        if self.consume(&Token::Is) {
            let negated = self.consume(&Token::Not);
            self.expect(Token::Null)?;
            return Ok(Expr::IsNull { expr: Box::new(left), negated });
        }

        let negated = if self.at(&Token::Not) && matches!(self.peek(1), Token::In | Token::Between) {
            self.advance();
            true
        } else {
            false
        };
        if self.consume(&Token::In) {
            self.expect(Token::LParen)?;
            if self.at(&Token::Select) {
                return Err(Error::unsupported("subqueries are not supported"));
            }
            let mut list = vec![self.parse_expr()?];
            while self.consume(&Token::Comma) {
                list.push(self.parse_expr()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::InList { expr: Box::new(left), list, negated });
        }
        if self.consume(&Token::Between) {
            let low = self.parse_additive()?;
            self.expect(Token::And)?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between { expr: Box::new(left), low: Box::new(low), high: Box::new(high), negated });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                Token::Concat => BinaryOp::Concat,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.consume(&Token::Minus) {
            // Fold negative literals so i64::MIN stays representable.
            return match self.current() {
                Token::IntLit(n) => {
                    let n = *n;
                    self.advance();
                    Ok(Expr::Literal(Literal::Int(-n)))
                }
                Token::DecimalLit(d) => {
                    let d = *d;
                    self.advance();
                    Ok(Expr::Literal(Literal::Decimal(-d)))
                }
                _ => {
                    let expr = self.nested(Self::parse_unary)?;
                    Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr) })
                }
            };
        }
        if self.consume(&Token::Plus) {
            return self.nested(Self::parse_unary);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let position = self.position();
        match self.advance() {
            Token::IntLit(n) => Ok(Expr::Literal(Literal::Int(n))),
            Token::DecimalLit(d) => Ok(Expr::Literal(Literal::Decimal(d))),
            Token::StringLit(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::Null => Ok(Expr::Literal(Literal::Null)),
            Token::LParen => {
                if self.at(&Token::Select) {
                    return Err(Error::unsupported("subqueries are not supported"));
                }
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.at(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    while self.consume(&Token::Comma) {
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::Identifier(name) if self.at(&Token::LParen) => self.parse_function(name),
            Token::Identifier(name) => Ok(Expr::Column(name)),
            Token::Exists => Err(Error::unsupported("subqueries are not supported")),
            other => Err(Error::parse_at(position, format!("expected expression, found {}", other))),
        }
    }

    fn parse_function(&mut self, name: String) -> Result<Expr> {
        let Some(func) = AggregateFunc::from_name(&name) else {
            return Err(Error::unsupported(format!("function {} is not supported", name.to_ascii_uppercase())));
        };
        self.expect(Token::LParen)?;
        if self.at(&Token::Distinct) {
            return Err(Error::unsupported(format!("{}(DISTINCT ...) is not supported", func.name())));
        }
        let arg = if func == AggregateFunc::Count && self.consume(&Token::Star) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect(Token::RParen)?;
        Ok(Expr::Aggregate { func, arg })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn select(sql: &str) -> Select {
        match parse(sql).unwrap() {
            Statement::Select(select) => select,
            other => panic!("expected SELECT, got {:?}", other),
        }
    }

    #[test]
    fn select_literal() {
        let stmt = select("select 1");
        assert_eq!(stmt.from, None);
        assert_eq!(
            stmt.projections,
            vec![Projection::Expr { expr: Expr::Literal(Literal::Int(1)), alias: None }]
        );
    }

    #[test]
    fn arithmetic_precedence() {
        let stmt = select("SELECT 1 + 2 * 3 AS x;");
        let Projection::Expr { expr, alias } = &stmt.projections[0] else {
            panic!("expected expression");
        };
        assert_eq!(alias.as_deref(), Some("x"));
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
    }

    #[test]
    fn where_clause_shapes() {
        let stmt = select("SELECT * FROM t WHERE a > 1 AND NOT b IN (1, 2) OR c BETWEEN -5 AND 5 LIMIT 10");
        assert_eq!(stmt.projections, vec![Projection::Wildcard]);
        assert_eq!(stmt.from.as_deref(), Some("t"));
        assert_eq!(stmt.limit, Some(10));
        assert_eq!(
            stmt.selection.unwrap().to_string(),
            "(((a > 1) AND NOT b IN (1, 2)) OR c BETWEEN -5 AND 5)"
        );
    }

    #[test]
    fn not_in_and_is_null() {
        let stmt = select("SELECT _id FROM t WHERE a NOT IN (1) AND b IS NOT NULL");
        assert_eq!(stmt.selection.unwrap().to_string(), "(a NOT IN (1) AND b IS NOT NULL)");
    }

    #[test]
    fn aggregates() {
        let stmt = select("SELECT COUNT(*), sum(age) FROM t");
        assert_eq!(
            stmt.projections[0],
            Projection::Expr { expr: Expr::Aggregate { func: AggregateFunc::Count, arg: None }, alias: None }
        );
        let Projection::Expr { expr, .. } = &stmt.projections[1] else {
            panic!("expected expression");
        };
        assert_eq!(expr.to_string(), "SUM(age)");
    }

    #[test]
    fn create_table_with_constraints() {
        let stmt = parse(
            "CREATE TABLE IF NOT EXISTS users (_id STRING, age INT MIN -10 MAX 120, tags STRINGSET CACHESIZE 100, \
             seen IDSETQ TIMEQUANTUM 'YMD')",
        )
        .unwrap();
        let Statement::CreateTable(create) = stmt else {
            panic!("expected CREATE TABLE");
        };
        assert!(create.if_not_exists);
        assert_eq!(create.columns.len(), 4);
        assert_eq!(create.columns[1].constraints, vec![ColumnConstraint::Min(-10), ColumnConstraint::Max(120)]);
        assert_eq!(create.columns[2].constraints, vec![ColumnConstraint::CacheSize(100)]);
        assert_eq!(create.columns[3].constraints, vec![ColumnConstraint::TimeQuantum("YMD".into())]);
    }

    #[test]
    fn insert_rows_and_sets() {
        let stmt = parse("INSERT INTO t (_id, a, tags) VALUES (1, 2, [3, 4]), (2, NULL, [])").unwrap();
        let Statement::Insert(insert) = stmt else {
            panic!("expected INSERT");
        };
        assert_eq!(insert.columns, vec!["_id", "a", "tags"]);
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.rows[1][2], Expr::List(vec![]));
    }

    #[test]
    fn ddl_and_show() {
        assert_eq!(
            parse("DROP TABLE IF EXISTS t").unwrap(),
            Statement::DropTable { name: "t".into(), if_exists: true }
        );
        assert_eq!(parse("show tables").unwrap(), Statement::ShowTables);
        assert_eq!(parse("SHOW COLUMNS FROM t").unwrap(), Statement::ShowColumns { table: "t".into() });
    }

    #[test]
    fn unsupported_constructs() {
        for sql in [
            "SELECT * FROM a JOIN b ON x = y",
            "SELECT a FROM t GROUP BY a",
            "SELECT a FROM t ORDER BY a",
            "UPDATE t SET a = 1",
            "DELETE FROM t",
            "SELECT * FROM (SELECT 1)",
            "SELECT a FROM t WHERE a IN (SELECT b FROM u)",
            "SELECT upper(a) FROM t",
            "SELECT 1; SELECT 2",
        ] {
            assert_eq!(parse(sql).unwrap_err().kind, ErrorKind::Unsupported, "{}", sql);
        }
    }

    #[test]
    fn syntax_errors_report_position() {
        let err = parse("SELECT 1 +").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.position, Some(10));

        let err = parse("SELEC 1").unwrap_err();
        assert_eq!(err.position, Some(0));
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let err = parse(&format!("SELECT {}1", "(".repeat(10_000))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.position.is_some());

        let err = parse(&format!("SELECT _id FROM t WHERE {}a = 1", "NOT ".repeat(10_000))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(parse(&format!("SELECT {}1", "- ".repeat(10_000))).unwrap_err().kind, ErrorKind::Parse);

        let parens = MAX_NESTING - 2;
        assert!(parse(&format!("SELECT {}1{}", "(".repeat(parens), ")".repeat(parens))).is_ok());
    }
}
