use std::collections::HashMap;

use crate::grid::Grid;
use crate::rules::{
    Clause, Rule, Ruleset, RulesetError, Tribe, TribeSet, ANY_TRIBE_ID, DEAD_TRIBE_ID, MAX_TRIBES,
};

/// A ruleset with every tribe-id reference resolved to integer indices.
///
/// Compilation happens once per install so the per-cell hot loop never
/// touches strings. The id→index table is kept for resolving `draw`
/// commands that arrive later.
#[derive(Debug, Clone)]
pub struct CompiledRuleset {
    pub cols: u32,
    pub rows: u32,
    pub tribes: Vec<Tribe>,
    /// Index of the reserved dead tribe.
    pub dead: u8,
    index: HashMap<String, u8>,
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    clause: CompiledClause,
    tribe: u8,
}

/// Clause tree over tribe index sets. A closed enumeration: there is no
/// "unknown variant" case left to mishandle at evaluation time.
#[derive(Debug, Clone)]
enum CompiledClause {
    Is(TribeSet),
    Count { tribes: TribeSet, lo: u8, hi: u8 },
    /// `Equality` compares references, not grid state, so it folds to a
    /// constant during compilation.
    Const(bool),
    Not(Box<CompiledClause>),
    And(Vec<CompiledClause>),
    Or(Vec<CompiledClause>),
}

impl CompiledRuleset {
    /// Validate and compile a ruleset. Any unknown tribe reference, missing
    /// dead tribe, or structural defect is rejected here rather than
    /// surfacing as a silently-false clause mid-simulation.
    pub fn compile(ruleset: &Ruleset) -> Result<Self, RulesetError> {
        if ruleset.cols == 0 || ruleset.rows == 0 {
            return Err(RulesetError::EmptyGrid {
                cols: ruleset.cols,
                rows: ruleset.rows,
            });
        }
        if ruleset.tribes.len() > MAX_TRIBES {
            return Err(RulesetError::TooManyTribes(ruleset.tribes.len()));
        }

        let mut index = HashMap::new();
        for (i, tribe) in ruleset.tribes.iter().enumerate() {
            if index.insert(tribe.id.clone(), i as u8).is_some() {
                return Err(RulesetError::DuplicateTribe(tribe.id.clone()));
            }
        }
        let dead = *index
            .get(DEAD_TRIBE_ID)
            .ok_or(RulesetError::MissingDeadTribe)?;

        let count = ruleset.tribes.len();
        let rules = ruleset
            .rules
            .iter()
            .map(|rule| compile_rule(rule, &index, count))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cols: ruleset.cols,
            rows: ruleset.rows,
            tribes: ruleset.tribes.clone(),
            dead,
            index,
            rules,
        })
    }

    /// Evaluate the rules in order for the cell at `(x, y)` against the
    /// given grid snapshot. First match wins; no match means dead.
    pub fn apply(&self, grid: &Grid, x: i32, y: i32) -> u8 {
        for rule in &self.rules {
            if rule.clause.eval(grid, x, y) {
                return rule.tribe;
            }
        }
        self.dead
    }

    /// Resolve a tribe id against the current install. `None` for ids this
    /// ruleset does not know (including the `any` wildcard, which is not an
    /// installed tribe).
    pub fn tribe_index(&self, id: &str) -> Option<u8> {
        self.index.get(id).copied()
    }

    pub fn tribe_count(&self) -> usize {
        self.tribes.len()
    }
}

fn compile_rule(
    rule: &Rule,
    index: &HashMap<String, u8>,
    tribe_count: usize,
) -> Result<CompiledRule, RulesetError> {
    if rule.tribe == ANY_TRIBE_ID {
        return Err(RulesetError::AnyAsTarget);
    }
    let tribe = *index
        .get(&rule.tribe)
        .ok_or_else(|| RulesetError::UnknownTribe(rule.tribe.clone()))?;
    Ok(CompiledRule {
        clause: compile_clause(&rule.clause, index, tribe_count)?,
        tribe,
    })
}

fn compile_clause(
    clause: &Clause,
    index: &HashMap<String, u8>,
    tribe_count: usize,
) -> Result<CompiledClause, RulesetError> {
    Ok(match clause {
        Clause::Is { tribes } => CompiledClause::Is(resolve_set(tribes, index, tribe_count)?),
        Clause::Count { tribes, interval } => CompiledClause::Count {
            tribes: resolve_set(tribes, index, tribe_count)?,
            lo: interval.0,
            hi: interval.1,
        },
        Clause::Equality { tribe1, tribe2 } => {
            check_reference(tribe1, index)?;
            check_reference(tribe2, index)?;
            CompiledClause::Const(tribe1 == tribe2)
        }
        Clause::Not { clause } => {
            CompiledClause::Not(Box::new(compile_clause(clause, index, tribe_count)?))
        }
        Clause::And { clauses } => {
            CompiledClause::And(compile_list(clauses, index, tribe_count)?)
        }
        Clause::Or { clauses } => CompiledClause::Or(compile_list(clauses, index, tribe_count)?),
    })
}

fn compile_list(
    clauses: &[Clause],
    index: &HashMap<String, u8>,
    tribe_count: usize,
) -> Result<Vec<CompiledClause>, RulesetError> {
    if clauses.is_empty() {
        return Err(RulesetError::EmptyClauseList);
    }
    clauses
        .iter()
        .map(|c| compile_clause(c, index, tribe_count))
        .collect()
}

/// Resolve a set of tribe ids to an index bitmask. The `any` wildcard
/// broadens to the full installed set.
fn resolve_set(
    tribes: &[String],
    index: &HashMap<String, u8>,
    tribe_count: usize,
) -> Result<TribeSet, RulesetError> {
    if tribes.is_empty() {
        return Err(RulesetError::EmptyTribeList);
    }
    let mut set = TribeSet::EMPTY;
    for id in tribes {
        if id == ANY_TRIBE_ID {
            return Ok(TribeSet::full(tribe_count));
        }
        set.insert(
            *index
                .get(id)
                .ok_or_else(|| RulesetError::UnknownTribe(id.clone()))?,
        );
    }
    Ok(set)
}

fn check_reference(id: &str, index: &HashMap<String, u8>) -> Result<(), RulesetError> {
    if id == ANY_TRIBE_ID || index.contains_key(id) {
        Ok(())
    } else {
        Err(RulesetError::UnknownTribe(id.to_string()))
    }
}

impl CompiledClause {
    fn eval(&self, grid: &Grid, x: i32, y: i32) -> bool {
        match self {
            CompiledClause::Is(set) => set.contains(grid.get(x, y)),
            CompiledClause::Count { tribes, lo, hi } => {
                let n = grid.count_neighbors(x, y, *tribes);
                *lo <= n && n <= *hi
            }
            CompiledClause::Const(value) => *value,
            CompiledClause::Not(clause) => !clause.eval(grid, x, y),
            CompiledClause::And(clauses) => clauses.iter().all(|c| c.eval(grid, x, y)),
            CompiledClause::Or(clauses) => clauses.iter().any(|c| c.eval(grid, x, y)),
        }
    }
}
