//! Recursive-descent parser for the statement language.

use crate::cql::ParseError;
use crate::cql::ast::{
    ColumnDefinition, ParsedStatement, QualifiedName, Relation, Selection, Statement, Term,
};
use crate::cql::lexer::{Token, tokenize};
use crate::types::{ColumnType, StringValue};

/// Parse a single statement. A trailing `;` is optional.
pub fn parse(source: &str) -> Result<ParsedStatement, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        bind_markers: 0,
    };
    let statement = parser.statement()?;
    parser.accept(&Token::Semicolon);
    if let Some(token) = parser.peek() {
        return Err(ParseError::Syntax(format!(
            "unexpected {token:?} after end of statement"
        )));
    }
    Ok(ParsedStatement {
        statement,
        bind_marker_count: parser.bind_markers,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    bind_markers: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ParseError::Syntax("unexpected end of statement".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        let found = self.next()?;
        if &found == token {
            Ok(())
        } else {
            Err(ParseError::Syntax(format!(
                "expected {token:?}, found {found:?}"
            )))
        }
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        let found = self.next()?;
        if found.is_keyword(keyword) {
            Ok(())
        } else {
            Err(ParseError::Syntax(format!(
                "expected {}, found {found:?}",
                keyword.to_ascii_uppercase()
            )))
        }
    }

    /// Unquoted identifiers are case-folded; quoted ones are kept as written.
    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.next()? {
            Token::Identifier(name) => Ok(name.to_lowercase()),
            Token::QuotedIdentifier(name) => Ok(name),
            other => Err(ParseError::Syntax(format!(
                "expected identifier, found {other:?}"
            ))),
        }
    }

    fn qualified_name(&mut self) -> Result<QualifiedName, ParseError> {
        let first = self.identifier()?;
        if self.accept(&Token::Dot) {
            let name = self.identifier()?;
            Ok(QualifiedName {
                keyspace: Some(first),
                name,
            })
        } else {
            Ok(QualifiedName {
                keyspace: None,
                name: first,
            })
        }
    }

    /// Resolve a type token. Aliases collapse here and nowhere else.
    fn column_type(&mut self) -> Result<ColumnType, ParseError> {
        match self.next()? {
            Token::Identifier(name) | Token::QuotedIdentifier(name) => {
                Ok(ColumnType::resolve_declared_type(&name)?)
            }
            other => Err(ParseError::Syntax(format!("expected type, found {other:?}"))),
        }
    }

    fn if_not_exists(&mut self) -> Result<bool, ParseError> {
        if self.accept_keyword("if") {
            self.expect_keyword("not")?;
            self.expect_keyword("exists")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn if_exists(&mut self) -> Result<bool, ParseError> {
        if self.accept_keyword("if") {
            self.expect_keyword("exists")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.next()?;
        if keyword.is_keyword("create") {
            if self.accept_keyword("keyspace") {
                self.create_keyspace()
            } else if self.accept_keyword("table") || self.accept_keyword("columnfamily") {
                self.create_table()
            } else {
                Err(ParseError::Syntax(
                    "expected KEYSPACE or TABLE after CREATE".to_string(),
                ))
            }
        } else if keyword.is_keyword("drop") {
            if self.accept_keyword("keyspace") {
                let if_exists = self.if_exists()?;
                let name = self.identifier()?;
                Ok(Statement::DropKeyspace { name, if_exists })
            } else if self.accept_keyword("table") || self.accept_keyword("columnfamily") {
                let if_exists = self.if_exists()?;
                let table = self.qualified_name()?;
                Ok(Statement::DropTable { table, if_exists })
            } else {
                Err(ParseError::Syntax(
                    "expected KEYSPACE or TABLE after DROP".to_string(),
                ))
            }
        } else if keyword.is_keyword("use") {
            let keyspace = self.identifier()?;
            Ok(Statement::Use { keyspace })
        } else if keyword.is_keyword("insert") {
            self.insert()
        } else if keyword.is_keyword("select") {
            self.select()
        } else if keyword.is_keyword("delete") {
            self.delete()
        } else {
            Err(ParseError::Syntax(format!(
                "unsupported statement starting with {keyword:?}"
            )))
        }
    }

    fn create_keyspace(&mut self) -> Result<Statement, ParseError> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.identifier()?;
        if self.accept_keyword("with") {
            self.skip_properties()?;
        }
        Ok(Statement::CreateKeyspace {
            name,
            if_not_exists,
        })
    }

    /// Skip a `WITH` property list. Replication and table options have no
    /// effect on a single node, but brackets must still balance.
    fn skip_properties(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Semicolon if depth == 0 => break,
                Token::LeftBrace | Token::LeftParen => depth += 1,
                Token::RightBrace | Token::RightParen => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        ParseError::Syntax("unbalanced brackets in properties".to_string())
                    })?;
                }
                _ => {}
            }
            self.pos += 1;
        }
        if depth == 0 {
            Ok(())
        } else {
            Err(ParseError::Syntax(
                "unbalanced brackets in properties".to_string(),
            ))
        }
    }

    fn create_table(&mut self) -> Result<Statement, ParseError> {
        let if_not_exists = self.if_not_exists()?;
        let table = self.qualified_name()?;
        self.expect(&Token::LeftParen)?;

        let mut columns = Vec::new();
        let mut partition_key: Option<String> = None;
        loop {
            if self.accept_keyword("primary") {
                self.expect_keyword("key")?;
                self.expect(&Token::LeftParen)?;
                if self.peek() == Some(&Token::LeftParen) {
                    return Err(ParseError::Syntax(
                        "composite partition keys are not supported".to_string(),
                    ));
                }
                let key = self.identifier()?;
                if self.peek() == Some(&Token::Comma) {
                    return Err(ParseError::Syntax(
                        "clustering columns are not supported".to_string(),
                    ));
                }
                self.expect(&Token::RightParen)?;
                if partition_key.replace(key).is_some() {
                    return Err(ParseError::Syntax(
                        "multiple PRIMARY KEY definitions".to_string(),
                    ));
                }
            } else {
                let name = self.identifier()?;
                let column_type = self.column_type()?;
                if self.accept_keyword("primary") {
                    self.expect_keyword("key")?;
                    if partition_key.replace(name.as_str().to_owned()).is_some() {
                        return Err(ParseError::Syntax(
                            "multiple PRIMARY KEY definitions".to_string(),
                        ));
                    }
                }
                columns.push(ColumnDefinition { name, column_type });
            }

            if !self.accept(&Token::Comma) {
                break;
            }
            // A trailing comma before ')' is tolerated.
            if self.peek() == Some(&Token::RightParen) {
                break;
            }
        }
        self.expect(&Token::RightParen)?;

        if self.accept_keyword("with") {
            self.skip_properties()?;
        }

        let partition_key = partition_key
            .ok_or_else(|| ParseError::Syntax("no PRIMARY KEY specified".to_string()))?;
        Ok(Statement::CreateTable {
            table,
            if_not_exists,
            columns,
            partition_key,
        })
    }

    fn insert(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("into")?;
        let table = self.qualified_name()?;

        self.expect(&Token::LeftParen)?;
        let mut columns = vec![self.identifier()?];
        while self.accept(&Token::Comma) {
            columns.push(self.identifier()?);
        }
        self.expect(&Token::RightParen)?;

        self.expect_keyword("values")?;
        self.expect(&Token::LeftParen)?;
        let mut values = vec![self.term()?];
        while self.accept(&Token::Comma) {
            values.push(self.term()?);
        }
        self.expect(&Token::RightParen)?;

        Ok(Statement::Insert {
            table,
            columns,
            values,
        })
    }

    fn select(&mut self) -> Result<Statement, ParseError> {
        let selection = if self.accept(&Token::Star) {
            Selection::Wildcard
        } else {
            let mut columns = vec![self.identifier()?];
            while self.accept(&Token::Comma) {
                columns.push(self.identifier()?);
            }
            Selection::Columns(columns)
        };
        self.expect_keyword("from")?;
        let table = self.qualified_name()?;
        let relations = if self.accept_keyword("where") {
            self.relations()?
        } else {
            Vec::new()
        };
        if self.accept_keyword("allow") {
            self.expect_keyword("filtering")?;
        }
        Ok(Statement::Select {
            table,
            selection,
            relations,
        })
    }

    fn delete(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("from")?;
        let table = self.qualified_name()?;
        self.expect_keyword("where")?;
        let relations = self.relations()?;
        Ok(Statement::Delete { table, relations })
    }

    fn relations(&mut self) -> Result<Vec<Relation>, ParseError> {
        let mut relations = vec![self.relation()?];
        while self.accept_keyword("and") {
            relations.push(self.relation()?);
        }
        Ok(relations)
    }

    fn relation(&mut self) -> Result<Relation, ParseError> {
        let column = self.identifier()?;
        if self.accept(&Token::Equals) {
            let term = self.term()?;
            Ok(Relation::Eq { column, term })
        } else if self.accept_keyword("in") {
            self.expect(&Token::LeftParen)?;
            let mut terms = Vec::new();
            if !self.accept(&Token::RightParen) {
                terms.push(self.term()?);
                while self.accept(&Token::Comma) {
                    terms.push(self.term()?);
                }
                self.expect(&Token::RightParen)?;
            }
            Ok(Relation::In { column, terms })
        } else {
            Err(ParseError::Syntax(format!(
                "expected '=' or IN after column {column}"
            )))
        }
    }

    fn term(&mut self) -> Result<Term, ParseError> {
        // `(type) term` is a cast; any other '(' is a syntax error here.
        if self.peek() == Some(&Token::LeftParen)
            && matches!(
                self.peek_at(1),
                Some(Token::Identifier(_) | Token::QuotedIdentifier(_))
            )
            && self.peek_at(2) == Some(&Token::RightParen)
        {
            self.expect(&Token::LeftParen)?;
            let column_type = self.column_type()?;
            self.expect(&Token::RightParen)?;
            let term = self.term()?;
            return Ok(Term::Cast {
                column_type,
                term: Box::new(term),
            });
        }

        match self.next()? {
            Token::String(s) => Ok(Term::String(s)),
            Token::Hex(digits) => StringValue::from_hex(&digits)
                .map(Term::Hex)
                .ok_or_else(|| ParseError::Syntax(format!("invalid hex literal 0x{digits}"))),
            Token::QuestionMark => {
                let index = self.bind_markers;
                self.bind_markers += 1;
                Ok(Term::BindMarker(index))
            }
            token if token.is_keyword("null") => Ok(Term::Null),
            other => Err(ParseError::Syntax(format!(
                "expected a value, found {other:?}"
            ))),
        }
    }
}
