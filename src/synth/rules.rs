//! Inverse templates, one per recognised statement shape.
//!
//! Each function receives a single statement (leading comments stripped, no
//! terminator) and returns its inverse, or `None` when the statement does
//! not have the shape the rule expects.

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, recognize},
    error::{Error, ErrorKind},
    multi::many1_count,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use super::lexer::{find_keyword, is_ident_char, parenthesized, split_top_level};

/// Type written for a re-added column whose original type is lost.
pub const UNKNOWN_TYPE_PLACEHOLDER: &str = "UNKNOWN_TYPE";

/// Change-log table the DELETE inverse reads from.
pub const CHANGE_LOG_TABLE: &str = "change_log";

type Res<'a, T> = IResult<&'a str, T>;

/// Case-insensitive keyword with a word boundary, consuming trailing space.
fn kw<'a>(word: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag_no_case::<_, _, Error<&'a str>>(word)(input)?;
        if rest.starts_with(is_ident_char) {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        let (rest, _) = multispace0::<_, Error<&'a str>>(rest)?;
        Ok((rest, matched))
    }
}

fn quoted_ident(input: &str) -> Res<&str> {
    recognize(delimited(char('"'), take_while(|c: char| c != '"'), char('"')))(input)
}

/// Identifier, possibly schema-qualified and/or double-quoted.
fn ident(input: &str) -> Res<&str> {
    let (rest, name) = recognize(many1_count(alt((
        quoted_ident,
        take_while1(|c: char| is_ident_char(c) || c == '.'),
    ))))(input)?;
    let (rest, _) = multispace0::<_, Error<&str>>(rest)?;
    Ok((rest, name))
}

/// Identifier that must not be one of `reserved` (catches positional
/// extraction landing on a keyword, e.g. `CREATE INDEX ON t`).
fn ident_except<'a>(reserved: &'static [&'static str]) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    move |input: &'a str| {
        let (rest, name) = ident(input)?;
        if reserved.iter().any(|r| name.eq_ignore_ascii_case(r)) {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
        }
        Ok((rest, name))
    }
}

fn if_not_exists(input: &str) -> Res<&str> {
    recognize(tuple((kw("IF"), kw("NOT"), kw("EXISTS"))))(input)
}

fn if_exists(input: &str) -> Res<&str> {
    recognize(tuple((kw("IF"), kw("EXISTS"))))(input)
}

fn or_replace(input: &str) -> Res<&str> {
    recognize(tuple((kw("OR"), kw("REPLACE"))))(input)
}

fn temporary(input: &str) -> Res<&str> {
    alt((kw("TEMPORARY"), kw("TEMP")))(input)
}

/// `ALTER TABLE [IF EXISTS] [ONLY] <name>`
fn alter_table(input: &str) -> Res<&str> {
    preceded(
        tuple((kw("ALTER"), kw("TABLE"), opt(if_exists), opt(kw("ONLY")))),
        ident,
    )(input)
}

pub fn create_table(stmt: &str) -> Option<String> {
    let (_, name) = preceded(
        tuple((
            kw("CREATE"),
            opt(alt((kw("GLOBAL"), kw("LOCAL")))),
            opt(alt((temporary, kw("UNLOGGED")))),
            kw("TABLE"),
            opt(if_not_exists),
        )),
        ident,
    )(stmt)
    .ok()?;
    Some(format!("DROP TABLE IF EXISTS {} CASCADE;", name))
}

pub fn add_column(stmt: &str) -> Option<String> {
    let (_, (table, column)) = tuple((
        alter_table,
        preceded(tuple((kw("ADD"), kw("COLUMN"), opt(if_not_exists))), ident),
    ))(stmt)
    .ok()?;
    Some(format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
        table, column
    ))
}

pub fn drop_column(stmt: &str) -> Option<String> {
    let (_, (table, column)) = tuple((
        alter_table,
        preceded(tuple((kw("DROP"), kw("COLUMN"), opt(if_exists))), ident),
    ))(stmt)
    .ok()?;
    Some(format!(
        "ALTER TABLE {} ADD COLUMN {} {};",
        table, column, UNKNOWN_TYPE_PLACEHOLDER
    ))
}

pub fn rename_column(stmt: &str) -> Option<String> {
    let (_, (table, from, to)) = tuple((
        alter_table,
        preceded(
            tuple((kw("RENAME"), opt(kw("COLUMN")))),
            ident_except(&["TO", "CONSTRAINT"]),
        ),
        preceded(kw("TO"), ident),
    ))(stmt)
    .ok()?;
    Some(format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {};",
        table, to, from
    ))
}

pub fn rename_table(stmt: &str) -> Option<String> {
    let (_, (from, to)) =
        tuple((alter_table, preceded(tuple((kw("RENAME"), kw("TO"))), ident)))(stmt).ok()?;

    // `ALTER TABLE s.a RENAME TO b` leaves the table at s.b.
    let (renamed, original) = match from.rsplit_once('.') {
        Some((schema, bare)) if !to.contains('.') => (format!("{}.{}", schema, to), bare),
        _ => (to.to_string(), from),
    };
    Some(format!("ALTER TABLE {} RENAME TO {};", renamed, original))
}

pub fn add_constraint(stmt: &str) -> Option<String> {
    let (_, (table, constraint)) = tuple((
        alter_table,
        preceded(tuple((kw("ADD"), kw("CONSTRAINT"))), ident),
    ))(stmt)
    .ok()?;
    Some(format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
        table, constraint
    ))
}

/// `INSERT INTO t (a, b) VALUES (1, 2)[, (3, 4) ...]` → one `DELETE` per
/// row tuple, matching every listed column positionally.
pub fn insert(stmt: &str) -> Option<String> {
    let (rest, table) = preceded(tuple((kw("INSERT"), kw("INTO"))), ident)(stmt).ok()?;
    let (columns, rest) = parenthesized(rest)?;
    let columns = split_top_level(columns, ',');
    let (mut rest, _) = multispace0::<_, Error<&str>>(rest).ok()?;
    rest = kw("VALUES")(rest).ok()?.0;

    let mut deletes = Vec::new();
    while let Some((values, after)) = parenthesized(rest) {
        let values = split_top_level(values, ',');
        if values.len() != columns.len() || columns.iter().any(|c| c.is_empty()) {
            return None;
        }
        let predicate = columns
            .iter()
            .zip(&values)
            .map(|(column, value)| {
                if value.eq_ignore_ascii_case("NULL") {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} = {}", column, value)
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        deletes.push(format!("DELETE FROM {} WHERE {};", table, predicate));

        let after = after.trim_start();
        match after.strip_prefix(',') {
            Some(next) => rest = next.trim_start(),
            None => break,
        }
    }

    if deletes.is_empty() {
        None
    } else {
        Some(deletes.join("\n"))
    }
}

/// Copies the forward SET and WHERE clauses verbatim. This does not restore
/// the previous values; the caller attaches a warning.
pub fn update(stmt: &str) -> Option<String> {
    let rest = kw("UPDATE")(stmt).ok()?.0;
    let set = find_keyword(rest, "SET")?;
    let target = rest[..set].trim();
    let after_set = &rest[set + "SET".len()..];
    let where_at = find_keyword(after_set, "WHERE")?;
    let assignments = after_set[..where_at].trim();
    let predicate = after_set[where_at + "WHERE".len()..].trim();
    if target.is_empty() || assignments.is_empty() || predicate.is_empty() {
        return None;
    }
    Some(format!(
        "UPDATE {} SET {} WHERE {};",
        target, assignments, predicate
    ))
}

/// Best effort: re-inserts the latest deleted row recorded in the
/// change-log table, which must already exist.
pub fn delete(stmt: &str) -> Option<String> {
    let (_, table) = preceded(
        tuple((kw("DELETE"), kw("FROM"), opt(kw("ONLY")))),
        ident,
    )(stmt)
    .ok()?;
    Some(format!(
        "INSERT INTO {table} (SELECT * FROM {log} WHERE table_name = '{table}' AND operation = 'DELETE' ORDER BY change_time DESC LIMIT 1);",
        table = table,
        log = CHANGE_LOG_TABLE
    ))
}

pub fn create_index(stmt: &str) -> Option<String> {
    let (_, name) = preceded(
        tuple((
            kw("CREATE"),
            opt(kw("UNIQUE")),
            kw("INDEX"),
            opt(kw("CONCURRENTLY")),
            opt(if_not_exists),
        )),
        ident_except(&["ON"]),
    )(stmt)
    .ok()?;
    Some(format!("DROP INDEX IF EXISTS {};", name))
}

pub fn create_trigger(stmt: &str) -> Option<String> {
    let (_, name) = preceded(
        tuple((
            kw("CREATE"),
            opt(or_replace),
            opt(temporary),
            opt(kw("CONSTRAINT")),
            kw("TRIGGER"),
            opt(if_not_exists),
        )),
        ident,
    )(stmt)
    .ok()?;
    Some(format!("DROP TRIGGER IF EXISTS {};", name))
}

pub fn create_view(stmt: &str) -> Option<String> {
    let (_, (materialized, name)) = preceded(
        tuple((kw("CREATE"), opt(or_replace), opt(temporary), opt(kw("RECURSIVE")))),
        tuple((
            opt(kw("MATERIALIZED")),
            preceded(tuple((kw("VIEW"), opt(if_not_exists))), ident),
        )),
    )(stmt)
    .ok()?;
    let kind = if materialized.is_some() {
        "MATERIALIZED VIEW"
    } else {
        "VIEW"
    };
    Some(format!("DROP {} IF EXISTS {};", kind, name))
}

pub fn create_sequence(stmt: &str) -> Option<String> {
    let (_, name) = preceded(
        tuple((
            kw("CREATE"),
            opt(alt((temporary, kw("UNLOGGED")))),
            kw("SEQUENCE"),
            opt(if_not_exists),
        )),
        ident,
    )(stmt)
    .ok()?;
    Some(format!("DROP SEQUENCE IF EXISTS {};", name))
}

pub fn create_schema(stmt: &str) -> Option<String> {
    let (_, name) = preceded(
        tuple((kw("CREATE"), kw("SCHEMA"), opt(if_not_exists))),
        ident_except(&["AUTHORIZATION"]),
    )(stmt)
    .ok()?;
    Some(format!("DROP SCHEMA IF EXISTS {} CASCADE;", name))
}

pub fn create_routine(stmt: &str) -> Option<String> {
    let (_, (kind, name)) = preceded(
        tuple((kw("CREATE"), opt(or_replace))),
        tuple((alt((kw("PROCEDURE"), kw("FUNCTION"))), ident)),
    )(stmt)
    .ok()?;
    Some(format!(
        "DROP {} IF EXISTS {};",
        kind.to_ascii_uppercase(),
        name
    ))
}
