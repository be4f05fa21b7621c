//! Rollback Synthesizer
//!
//! Derives an inverse script from a forward script's text. This is a
//! heuristic over the statement surface, not a SQL parser: each top-level
//! statement is matched against an ordered rule table and the first rule
//! that recognises it renders the inverse. Statements no rule recognises
//! produce nothing, so "no automatic rollback available" stays explicit.
//!
//! Inverses are concatenated in forward order, not reversed.

pub mod lexer;
mod rules;

pub use lexer::{has_statements, split_statements};
pub use rules::{CHANGE_LOG_TABLE, UNKNOWN_TYPE_PLACEHOLDER};

use std::fmt;

/// The statement shapes the synthesizer recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    CreateTable,
    AddColumn,
    DropColumn,
    RenameColumn,
    RenameTable,
    AddConstraint,
    Insert,
    Update,
    Delete,
    CreateIndex,
    CreateTrigger,
    CreateView,
    CreateSequence,
    CreateSchema,
    CreateRoutine,
}

impl RuleKind {
    /// Known weakness of this rule's inverse, if any.
    pub fn caveat(self) -> Option<&'static str> {
        match self {
            RuleKind::DropColumn => Some(
                "dropped column type cannot be recovered; replace UNKNOWN_TYPE before running",
            ),
            RuleKind::Update => Some(
                "UPDATE inverse repeats the forward SET/WHERE and does not restore previous values",
            ),
            RuleKind::Delete => Some(
                "DELETE inverse re-inserts from the change_log table, which must already exist",
            ),
            _ => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::CreateTable => "CREATE TABLE",
            RuleKind::AddColumn => "ADD COLUMN",
            RuleKind::DropColumn => "DROP COLUMN",
            RuleKind::RenameColumn => "RENAME COLUMN",
            RuleKind::RenameTable => "RENAME TABLE",
            RuleKind::AddConstraint => "ADD CONSTRAINT",
            RuleKind::Insert => "INSERT",
            RuleKind::Update => "UPDATE",
            RuleKind::Delete => "DELETE",
            RuleKind::CreateIndex => "CREATE INDEX",
            RuleKind::CreateTrigger => "CREATE TRIGGER",
            RuleKind::CreateView => "CREATE VIEW",
            RuleKind::CreateSequence => "CREATE SEQUENCE",
            RuleKind::CreateSchema => "CREATE SCHEMA",
            RuleKind::CreateRoutine => "CREATE PROCEDURE/FUNCTION",
        };
        f.write_str(name)
    }
}

/// One entry of the rule table: a statement shape and its inverse template.
pub struct Rule {
    pub kind: RuleKind,
    invert: fn(&str) -> Option<String>,
}

impl Rule {
    pub fn apply(&self, statement: &str) -> Option<String> {
        (self.invert)(statement)
    }
}

/// Rules in priority order; the first match wins.
pub static RULES: &[Rule] = &[
    Rule { kind: RuleKind::CreateTable, invert: rules::create_table },
    Rule { kind: RuleKind::AddColumn, invert: rules::add_column },
    Rule { kind: RuleKind::DropColumn, invert: rules::drop_column },
    Rule { kind: RuleKind::RenameColumn, invert: rules::rename_column },
    Rule { kind: RuleKind::RenameTable, invert: rules::rename_table },
    Rule { kind: RuleKind::AddConstraint, invert: rules::add_constraint },
    Rule { kind: RuleKind::Insert, invert: rules::insert },
    Rule { kind: RuleKind::Update, invert: rules::update },
    Rule { kind: RuleKind::Delete, invert: rules::delete },
    Rule { kind: RuleKind::CreateIndex, invert: rules::create_index },
    Rule { kind: RuleKind::CreateTrigger, invert: rules::create_trigger },
    Rule { kind: RuleKind::CreateView, invert: rules::create_view },
    Rule { kind: RuleKind::CreateSequence, invert: rules::create_sequence },
    Rule { kind: RuleKind::CreateSchema, invert: rules::create_schema },
    Rule { kind: RuleKind::CreateRoutine, invert: rules::create_routine },
];

/// Inverse of a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInverse {
    pub forward: String,
    /// `None` when no rule recognised the statement.
    pub rule: Option<RuleKind>,
    pub inverse: Option<String>,
}

/// Result of inverting a whole script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synthesis {
    pub statements: Vec<StatementInverse>,
}

impl Synthesis {
    /// Concatenated inverse SQL in forward statement order.
    pub fn sql(&self) -> String {
        self.statements
            .iter()
            .filter_map(|s| s.inverse.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True when no statement produced an inverse.
    pub fn is_empty(&self) -> bool {
        self.statements.iter().all(|s| s.inverse.is_none())
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.statements
            .iter()
            .filter(|s| s.inverse.is_none())
            .map(|s| s.forward.as_str())
    }

    /// Caveats of the rules that fired, deduplicated, in first-use order.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        for caveat in self.statements.iter().filter_map(|s| s.rule?.caveat()) {
            if !warnings.contains(&caveat) {
                warnings.push(caveat);
            }
        }
        warnings
    }

    /// File content for a materialised rollback script: warning comments,
    /// then the inverse SQL.
    pub fn render(&self, forward_name: &str) -> String {
        let mut out = String::new();
        if self.is_empty() {
            out.push_str(&format!(
                "-- No automatic rollback available for {}.\n-- Write the inverse statements by hand.\n",
                forward_name
            ));
            return out;
        }
        for warning in self.warnings() {
            out.push_str(&format!("-- WARNING: {}\n", warning));
        }
        for statement in self.unmatched() {
            let first_line = statement.lines().next().unwrap_or_default();
            out.push_str(&format!("-- not inverted: {}\n", first_line));
        }
        out.push_str(&self.sql());
        out.push('\n');
        out
    }
}

/// Invert one statement with the first matching rule.
pub fn invert_statement(statement: &str) -> StatementInverse {
    let hit = RULES
        .iter()
        .find_map(|rule| rule.apply(statement).map(|sql| (rule.kind, sql)));
    StatementInverse {
        forward: statement.to_string(),
        rule: hit.as_ref().map(|(kind, _)| *kind),
        inverse: hit.map(|(_, sql)| sql),
    }
}

/// Invert every top-level statement of `forward_sql`.
pub fn synthesize_detailed(forward_sql: &str) -> Synthesis {
    Synthesis {
        statements: split_statements(forward_sql)
            .into_iter()
            .map(invert_statement)
            .collect(),
    }
}

/// Inverse SQL for `forward_sql`, or an empty string when nothing matched.
pub fn synthesize(forward_sql: &str) -> String {
    synthesize_detailed(forward_sql).sql()
}
