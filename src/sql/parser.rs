//! Recursive-descent parser for the SQL dialect (spec.md §4.7, grounded
//! on `original_source/backend/parser/Parser.go`). One `Command` per
//! call to `parse`; the tokenizer is expected to be fully consumed by
//! the statement's own grammar (trailing tokens are a parse error,
//! matching the original's end-of-input checks).

use crate::catalog::{CompareOp, WhereClause};
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::common::value::FieldType;
use crate::sql::ast::*;
use crate::sql::tokenizer::Tokenizer;
use crate::vm::IsolationLevel;

pub fn parse(input: &str) -> RsqlResult<Command> {
    let mut t = Tokenizer::new(input);
    let head = t.peek()?;
    if head.is_empty() {
        return Err(RsqlError::InvalidCommand("empty statement".to_string()));
    }
    t.pop();
    match head.to_ascii_lowercase().as_str() {
        "begin" => parse_begin(&mut t).map(Command::Begin),
        "commit" => {
            expect_end(&mut t)?;
            Ok(Command::Commit)
        }
        "abort" => {
            expect_end(&mut t)?;
            Ok(Command::Abort)
        }
        "create" => parse_create(&mut t).map(Command::Create),
        "drop" => parse_drop(&mut t).map(Command::Drop),
        "insert" => parse_insert(&mut t).map(Command::Insert),
        "delete" => parse_delete(&mut t).map(Command::Delete),
        "update" => parse_update(&mut t).map(Command::Update),
        "select" => parse_select(&mut t).map(Command::Select),
        "show" => parse_show(&mut t).map(Command::Show),
        other => Err(RsqlError::InvalidCommand(format!("unknown statement '{}'", other))),
    }
}

fn expect_end(t: &mut Tokenizer) -> RsqlResult<()> {
    let tok = t.peek()?;
    if !tok.is_empty() {
        return Err(RsqlError::InvalidCommand(format!("unexpected trailing input '{}'", tok)));
    }
    Ok(())
}

fn expect_word(t: &mut Tokenizer, word: &str) -> RsqlResult<()> {
    let tok = t.peek()?;
    if tok.to_ascii_lowercase() != word {
        return Err(RsqlError::InvalidCommand(format!("expected '{}', found '{}'", word, tok)));
    }
    t.pop();
    Ok(())
}

fn next_name(t: &mut Tokenizer) -> RsqlResult<String> {
    let tok = t.peek()?;
    if tok.is_empty() {
        return Err(RsqlError::InvalidCommand("expected a name".to_string()));
    }
    t.pop();
    Ok(tok)
}

fn parse_begin(t: &mut Tokenizer) -> RsqlResult<BeginStatement> {
    let tok = t.peek()?;
    if tok.is_empty() {
        return Ok(BeginStatement { isolation_level: IsolationLevel::ReadCommitted });
    }
    expect_word(t, "isolation")?;
    expect_word(t, "level")?;
    let first = next_name(t)?.to_ascii_lowercase();
    let level = match first.as_str() {
        "read" => {
            expect_word(t, "committed")?;
            IsolationLevel::ReadCommitted
        }
        "repeatable" => {
            expect_word(t, "read")?;
            IsolationLevel::RepeatableRead
        }
        other => return Err(RsqlError::InvalidCommand(format!("unknown isolation level '{}'", other))),
    };
    expect_end(t)?;
    Ok(BeginStatement { isolation_level: level })
}

fn parse_create(t: &mut Tokenizer) -> RsqlResult<CreateStatement> {
    expect_word(t, "table")?;
    let table_name = next_name(t)?;

    let mut fields = Vec::new();
    loop {
        let field_name = next_name(t)?;
        let type_name = next_name(t)?;
        let kind = FieldType::from_name(&type_name.to_ascii_lowercase())?;
        fields.push((field_name, kind, false));

        let tok = t.peek()?;
        if tok == "," {
            t.pop();
            continue;
        }
        if tok == "(" {
            t.pop();
            break;
        }
        return Err(RsqlError::InvalidCommand(format!("expected ',' or '(', found '{}'", tok)));
    }

    expect_word(t, "index")?;
    loop {
        let tok = t.peek()?;
        if tok == ")" {
            t.pop();
            break;
        }
        let name = next_name(t)?;
        let found = fields.iter_mut().find(|(n, _, _)| n == &name);
        match found {
            Some(entry) => entry.2 = true,
            None => return Err(RsqlError::FieldNotFound(name)),
        }
    }
    expect_end(t)?;
    Ok(CreateStatement { table_name, fields })
}

fn parse_drop(t: &mut Tokenizer) -> RsqlResult<DropStatement> {
    expect_word(t, "table")?;
    let table_name = next_name(t)?;
    expect_end(t)?;
    Ok(DropStatement { table_name })
}

fn parse_insert(t: &mut Tokenizer) -> RsqlResult<InsertStatement> {
    expect_word(t, "into")?;
    let table_name = next_name(t)?;
    expect_word(t, "values")?;
    let mut values = Vec::new();
    loop {
        let tok = t.peek()?;
        if tok.is_empty() {
            break;
        }
        values.push(tok);
        t.pop();
    }
    if values.is_empty() {
        return Err(RsqlError::InvalidCommand("insert requires at least one value".to_string()));
    }
    Ok(InsertStatement { table_name, values })
}

fn parse_delete(t: &mut Tokenizer) -> RsqlResult<DeleteStatement> {
    expect_word(t, "from")?;
    let table_name = next_name(t)?;
    let where_clause = parse_optional_where(t)?;
    expect_end(t)?;
    Ok(DeleteStatement { table_name, where_clause })
}

fn parse_update(t: &mut Tokenizer) -> RsqlResult<UpdateStatement> {
    let table_name = next_name(t)?;
    expect_word(t, "set")?;
    let field_name = next_name(t)?;
    expect_word(t, "=")?;
    let value = next_name(t)?;
    let where_clause = parse_optional_where(t)?;
    expect_end(t)?;
    Ok(UpdateStatement { table_name, field_name, value, where_clause })
}

fn parse_select(t: &mut Tokenizer) -> RsqlResult<SelectStatement> {
    // Column projection is accepted but ignored: every SELECT returns the
    // full row (SPEC_FULL.md's grammar does not define partial projection).
    let first = next_name(t)?;
    if first != "*" {
        loop {
            let tok = t.peek()?;
            if tok == "," {
                t.pop();
                let _ = next_name(t)?;
                continue;
            }
            break;
        }
    }
    expect_word(t, "from")?;
    let table_name = next_name(t)?;
    let where_clause = parse_optional_where(t)?;
    expect_end(t)?;
    Ok(SelectStatement { table_name, where_clause })
}

fn parse_show(t: &mut Tokenizer) -> RsqlResult<ShowStatement> {
    expect_word(t, "table")?;
    let table_name = next_name(t)?;
    expect_end(t)?;
    Ok(ShowStatement { table_name })
}

fn parse_optional_where(t: &mut Tokenizer) -> RsqlResult<Option<WhereClause>> {
    let tok = t.peek()?;
    if tok.is_empty() {
        return Ok(None);
    }
    expect_word(t, "where")?;
    let field = next_name(t)?;
    let op1 = parse_cmp_op(t)?;
    let value1 = next_name(t)?;

    let tok = t.peek()?;
    let and_leg = match tok.to_ascii_lowercase().as_str() {
        "and" => {
            t.pop();
            let field2 = next_name(t)?;
            if field2 != field {
                return Err(RsqlError::InvalidCommand(
                    "a WHERE clause's two legs must name the same field".to_string(),
                ));
            }
            let op2 = parse_cmp_op(t)?;
            let value2 = next_name(t)?;
            Some((op2, value2))
        }
        "or" => {
            return Err(RsqlError::InvalidCommand("OR is not supported in WHERE clauses".to_string()));
        }
        _ => None,
    };
    Ok(Some(WhereClause { field, op1, value1, and_leg }))
}

fn parse_cmp_op(t: &mut Tokenizer) -> RsqlResult<CompareOp> {
    let tok = next_name(t)?;
    match tok.as_str() {
        "<" => Ok(CompareOp::Lt),
        "<=" => Ok(CompareOp::Le),
        "=" => Ok(CompareOp::Eq),
        ">=" => Ok(CompareOp::Ge),
        ">" => Ok(CompareOp::Gt),
        other => Err(RsqlError::InvalidCommand(format!("unknown comparison operator '{}'", other))),
    }
}
